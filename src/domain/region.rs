//! Portfolio regions and per-region market conventions.
//!
//! A region is a currency/market grouping with its own holdings and benchmark
//! ETF. Benchmarks are always priced in the base currency, so benchmark bars
//! live under the USD region regardless of the portfolio being valued.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Usd,
    Cad,
    Intl,
}

/// Region under which every benchmark price series is stored.
pub const BENCHMARK_REGION: Region = Region::Usd;

impl Region {
    pub const ALL: [Region; 3] = [Region::Usd, Region::Cad, Region::Intl];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Usd => "USD",
            Region::Cad => "CAD",
            Region::Intl => "INTL",
        }
    }

    /// Benchmark ETF used when no override is configured.
    pub fn default_benchmark(&self) -> &'static str {
        match self {
            Region::Usd => "SPY",
            Region::Cad => "XIU",
            Region::Intl => "VXUS",
        }
    }

    /// Exchange suffix appended to a holding's symbol when its primary
    /// listing is quoted outside the base market.
    pub fn exchange_suffix(&self) -> Option<&'static str> {
        match self {
            Region::Cad => Some(".TO"),
            Region::Usd | Region::Intl => None,
        }
    }

    /// Priced-symbol candidates for a holding, most specific first. The
    /// suffixed listing is preferred; the bare symbol remains as the
    /// best-available fallback. Symbols that already carry a suffix are
    /// used as-is.
    pub fn priced_symbol_candidates(&self, symbol: &str) -> Vec<String> {
        if symbol.contains('.') {
            return vec![symbol.to_string()];
        }
        match self.exchange_suffix() {
            Some(suffix) => vec![format!("{symbol}{suffix}"), symbol.to_string()],
            None => vec![symbol.to_string()],
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USD" => Ok(Region::Usd),
            "CAD" => Ok(Region::Cad),
            "INTL" => Ok(Region::Intl),
            other => Err(EngineError::UnknownRegion {
                value: other.to_string(),
            }),
        }
    }
}

/// Benchmark symbol per region, overridable from configuration.
#[derive(Debug, Clone)]
pub struct Benchmarks {
    usd: String,
    cad: String,
    intl: String,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            usd: Region::Usd.default_benchmark().to_string(),
            cad: Region::Cad.default_benchmark().to_string(),
            intl: Region::Intl.default_benchmark().to_string(),
        }
    }
}

impl Benchmarks {
    pub fn new(usd: String, cad: String, intl: String) -> Self {
        Self { usd, cad, intl }
    }

    pub fn symbol_for(&self, region: Region) -> &str {
        match region {
            Region::Usd => &self.usd,
            Region::Cad => &self.cad,
            Region::Intl => &self.intl,
        }
    }
}
