//! Port traits: the seams between the engine and its collaborators.

pub mod config_port;
pub mod holdings_port;
pub mod indicator_store_port;
pub mod market_data_port;
pub mod price_store_port;
