//! Trade execution, simulated.
//!
//! Fills are synthesized after a fixed latency so callers exercise a real
//! async round trip without touching an exchange.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A request to execute against a scanned opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub opportunity_id: String,
    pub pair: String,
    pub amount_usd: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Filled,
    Rejected,
}

/// Result of a simulated execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub trade_id: String,
    pub opportunity_id: String,
    pub pair: String,
    pub amount_usd: Decimal,
    pub status: TradeStatus,
    /// Synthesized profit: a flat 25 bps of notional on fills.
    pub profit_usd: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Configuration for the simulated executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Synthetic exchange round-trip latency.
    pub fill_latency: Duration,
    /// Requests above this notional are rejected as too large to fill.
    pub max_notional_usd: Decimal,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fill_latency: Duration::from_millis(150),
            max_notional_usd: Decimal::new(100_000, 0),
        }
    }
}

/// Simulated trade executor.
pub struct TradeExecutor {
    config: ExecutorConfig,
}

impl TradeExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute a trade request, returning the synthesized fill.
    pub async fn execute(&self, request: &TradeRequest) -> TradeResult {
        tokio::time::sleep(self.config.fill_latency).await;

        let (status, profit_usd) = if request.amount_usd <= Decimal::ZERO
            || request.amount_usd > self.config.max_notional_usd
        {
            (TradeStatus::Rejected, Decimal::ZERO)
        } else {
            // 25 bps of notional.
            (
                TradeStatus::Filled,
                request.amount_usd * Decimal::new(25, 4),
            )
        };

        let result = TradeResult {
            trade_id: Uuid::new_v4().to_string(),
            opportunity_id: request.opportunity_id.clone(),
            pair: request.pair.clone(),
            amount_usd: request.amount_usd,
            status,
            profit_usd,
            executed_at: Utc::now(),
        };
        tracing::info!(
            trade_id = %result.trade_id,
            pair = %result.pair,
            status = ?result.status,
            "Trade executed"
        );
        result
    }
}

impl Default for TradeExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64) -> TradeRequest {
        TradeRequest {
            opportunity_id: "opp-eth-usdc-001".to_string(),
            pair: "ETH/USDC".to_string(),
            amount_usd: Decimal::from(amount),
        }
    }

    #[tokio::test]
    async fn test_fill_with_synthetic_profit() {
        let executor = TradeExecutor::new(ExecutorConfig {
            fill_latency: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });
        let result = executor.execute(&request(10_000)).await;
        assert_eq!(result.status, TradeStatus::Filled);
        assert_eq!(result.profit_usd, Decimal::new(25, 0)); // 25 bps of 10k
        assert_eq!(result.pair, "ETH/USDC");
    }

    #[tokio::test]
    async fn test_oversized_and_nonpositive_requests_rejected() {
        let executor = TradeExecutor::new(ExecutorConfig {
            fill_latency: Duration::from_millis(1),
            max_notional_usd: Decimal::from(1_000),
        });

        let result = executor.execute(&request(5_000)).await;
        assert_eq!(result.status, TradeStatus::Rejected);
        assert_eq!(result.profit_usd, Decimal::ZERO);

        let result = executor.execute(&request(0)).await;
        assert_eq!(result.status, TradeStatus::Rejected);
    }

    #[tokio::test]
    async fn test_distinct_trade_ids() {
        let executor = TradeExecutor::new(ExecutorConfig {
            fill_latency: Duration::from_millis(1),
            ..ExecutorConfig::default()
        });
        let a = executor.execute(&request(100)).await;
        let b = executor.execute(&request(100)).await;
        assert_ne!(a.trade_id, b.trade_id);
    }
}
