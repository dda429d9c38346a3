//! Concrete adapter implementations for ports.

pub mod file_config_adapter;
pub mod together_adapter;
pub mod binance_adapter;
pub mod json_state_adapter;
pub mod trade_csv;
