//! Market data collaborator port trait.

use chrono::NaiveDate;

use crate::domain::bar::PriceBar;
use crate::domain::error::EngineError;
use crate::domain::region::Region;

/// Supplies raw bars on request. Implementations own their timeout bound;
/// a fetch past it surfaces as `UpstreamUnavailable` and is not retried
/// by the engine.
pub trait MarketDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        region: Region,
        since: NaiveDate,
    ) -> Result<Vec<PriceBar>, EngineError>;
}
