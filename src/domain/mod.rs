//! Core domain types and logic.

pub mod error;
pub mod market;
pub mod position;
pub mod wallet;
pub mod metrics;
pub mod instruction;
pub mod plan_parser;
pub mod strategy;
pub mod symbols;
pub mod agents;
pub mod pipeline;
pub mod execution;
pub mod rate_limit;
pub mod retry;
pub mod session;
pub mod config_validation;
