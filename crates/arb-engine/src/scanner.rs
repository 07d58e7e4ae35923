//! Opportunity scanning, simulated.
//!
//! Real venue connectivity is out of scope for this service; the scanner
//! serves a deterministic set of cross-exchange spreads so the access-control
//! layer in front of it has something realistic to protect.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A cross-exchange price discrepancy worth acting on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// Spread in basis points, net of nothing (fees are the executor's
    /// problem).
    pub spread_bps: Decimal,
    pub max_size_usd: Decimal,
    pub observed_at: DateTime<Utc>,
}

/// Serves the current set of opportunities.
pub struct OpportunityScanner;

impl OpportunityScanner {
    pub fn new() -> Self {
        Self
    }

    /// Current opportunities, best spread first.
    pub async fn scan(&self) -> Vec<Opportunity> {
        let now = Utc::now();
        let opportunities = vec![
            Opportunity {
                id: "opp-eth-usdc-001".to_string(),
                pair: "ETH/USDC".to_string(),
                buy_exchange: "kraken".to_string(),
                sell_exchange: "binance".to_string(),
                buy_price: Decimal::new(3_412_50, 2),
                sell_price: Decimal::new(3_429_75, 2),
                spread_bps: Decimal::new(505, 2),
                max_size_usd: Decimal::new(25_000, 0),
                observed_at: now,
            },
            Opportunity {
                id: "opp-btc-usdt-002".to_string(),
                pair: "BTC/USDT".to_string(),
                buy_exchange: "coinbase".to_string(),
                sell_exchange: "okx".to_string(),
                buy_price: Decimal::new(97_104_00, 2),
                sell_price: Decimal::new(97_401_10, 2),
                spread_bps: Decimal::new(306, 2),
                max_size_usd: Decimal::new(50_000, 0),
                observed_at: now,
            },
            Opportunity {
                id: "opp-sol-usdc-003".to_string(),
                pair: "SOL/USDC".to_string(),
                buy_exchange: "binance".to_string(),
                sell_exchange: "kraken".to_string(),
                buy_price: Decimal::new(212_34, 2),
                sell_price: Decimal::new(212_81, 2),
                spread_bps: Decimal::new(221, 2),
                max_size_usd: Decimal::new(8_000, 0),
                observed_at: now,
            },
        ];
        tracing::debug!(count = opportunities.len(), "Opportunity scan served");
        opportunities
    }
}

impl Default for OpportunityScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_returns_opportunities_best_first() {
        let scanner = OpportunityScanner::new();
        let opps = scanner.scan().await;
        assert!(!opps.is_empty());
        for pair in opps.windows(2) {
            assert!(pair[0].spread_bps >= pair[1].spread_bps);
        }
        for opp in &opps {
            assert!(opp.sell_price > opp.buy_price);
            assert!(opp.spread_bps > Decimal::ZERO);
        }
    }
}
