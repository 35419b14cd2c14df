//! Holdings collaborator port trait.

use crate::domain::error::EngineError;
use crate::domain::holding::HoldingsSnapshot;
use crate::domain::region::Region;

/// Supplies the current per-region holdings. Read-only to the engine.
pub trait HoldingsPort {
    fn fetch_holdings(&self, region: Region) -> Result<HoldingsSnapshot, EngineError>;
}
