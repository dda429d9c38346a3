//! Port traits the domain depends on; adapters implement them.

pub mod config_port;
pub mod llm_port;
pub mod market_port;
pub mod state_port;
