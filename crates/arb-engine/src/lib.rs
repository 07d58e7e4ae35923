//! Arbitrage Engine (simulated)
//!
//! Opportunity scanning and trade execution with synthesized data, sitting
//! behind the platform's access-control layer.

pub mod executor;
pub mod scanner;

pub use executor::{ExecutorConfig, TradeExecutor, TradeRequest, TradeResult, TradeStatus};
pub use scanner::{Opportunity, OpportunityScanner};
