//! Holdings supplied by the external portfolio collaborator.
//!
//! Read-only to the engine: lots are consumed for valuation, never mutated.

use crate::domain::region::Region;

#[derive(Debug, Clone, PartialEq)]
pub struct HoldingLot {
    pub symbol: String,
    pub region: Region,
    pub quantity: f64,
    pub stock_type: String,
    pub rating: String,
}

/// Per-region list of lots as of "now".
#[derive(Debug, Clone)]
pub struct HoldingsSnapshot {
    pub region: Region,
    pub lots: Vec<HoldingLot>,
}

impl HoldingsSnapshot {
    pub fn new(region: Region, lots: Vec<HoldingLot>) -> Self {
        Self { region, lots }
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Distinct holding symbols in insertion order.
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.lots
            .iter()
            .filter(|lot| seen.insert(lot.symbol.clone()))
            .map(|lot| lot.symbol.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lot(symbol: &str, quantity: f64) -> HoldingLot {
        HoldingLot {
            symbol: symbol.into(),
            region: Region::Usd,
            quantity,
            stock_type: "Common".into(),
            rating: "A".into(),
        }
    }

    #[test]
    fn symbols_deduplicate_preserving_order() {
        let snapshot = HoldingsSnapshot::new(
            Region::Usd,
            vec![lot("AAPL", 10.0), lot("MSFT", 5.0), lot("AAPL", 2.0)],
        );
        assert_eq!(snapshot.symbols(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = HoldingsSnapshot::new(Region::Cad, vec![]);
        assert!(snapshot.is_empty());
        assert!(snapshot.symbols().is_empty());
    }
}
