//! Arbitrage handlers: opportunity listing and gated trade execution.

use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use arb_engine::{Opportunity, TradeRequest, TradeResult};
use security::{AccessClaims, Operation};

use crate::error::ApiResult;
use crate::handlers::ClientIp;
use crate::state::AppState;

/// A cross-exchange opportunity.
#[derive(Debug, Serialize, ToSchema)]
pub struct OpportunityDto {
    pub id: String,
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread_bps: Decimal,
    pub max_size_usd: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl From<Opportunity> for OpportunityDto {
    fn from(o: Opportunity) -> Self {
        Self {
            id: o.id,
            pair: o.pair,
            buy_exchange: o.buy_exchange,
            sell_exchange: o.sell_exchange,
            buy_price: o.buy_price,
            sell_price: o.sell_price,
            spread_bps: o.spread_bps,
            max_size_usd: o.max_size_usd,
            observed_at: o.observed_at,
        }
    }
}

/// Trade execution request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteTradeRequest {
    pub opportunity_id: String,
    pub pair: String,
    pub amount_usd: Decimal,
    /// Explicit confirmation, required for trades above the threshold.
    #[serde(default)]
    pub confirmed: bool,
}

/// Execution result.
#[derive(Debug, Serialize, ToSchema)]
pub struct TradeResultDto {
    pub trade_id: String,
    pub opportunity_id: String,
    pub pair: String,
    pub amount_usd: Decimal,
    pub status: String,
    pub profit_usd: Decimal,
    pub executed_at: DateTime<Utc>,
}

impl From<TradeResult> for TradeResultDto {
    fn from(r: TradeResult) -> Self {
        Self {
            trade_id: r.trade_id,
            opportunity_id: r.opportunity_id,
            pair: r.pair,
            amount_usd: r.amount_usd,
            status: match r.status {
                arb_engine::TradeStatus::Filled => "filled".to_string(),
                arb_engine::TradeStatus::Rejected => "rejected".to_string(),
            },
            profit_usd: r.profit_usd,
            executed_at: r.executed_at,
        }
    }
}

/// List current opportunities.
#[utoipa::path(
    get,
    path = "/api/v1/arbitrage/opportunities",
    responses(
        (status = 200, description = "Current opportunities, best spread first", body = [OpportunityDto]),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "arbitrage"
)]
pub async fn list_opportunities(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<OpportunityDto>>> {
    let opportunities = state.scanner.scan().await;
    Ok(Json(
        opportunities.into_iter().map(OpportunityDto::from).collect(),
    ))
}

/// Execute a trade against an opportunity.
///
/// The request passes the critical-operation validator before it reaches the
/// executor: role policy, and explicit confirmation for large notionals.
#[utoipa::path(
    post,
    path = "/api/v1/arbitrage/execute",
    request_body = ExecuteTradeRequest,
    responses(
        (status = 200, description = "Trade executed", body = TradeResultDto),
        (status = 400, description = "Confirmation required"),
        (status = 403, description = "Trader or admin role required"),
    ),
    security(("bearer_auth" = [])),
    tag = "arbitrage"
)]
pub async fn execute_trade(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<AccessClaims>,
    ClientIp(ip): ClientIp,
    Json(req): Json<ExecuteTradeRequest>,
) -> ApiResult<Json<TradeResultDto>> {
    let operation = Operation::TradeExecution {
        amount_usd: req.amount_usd,
        pair: Some(req.pair.clone()),
    };

    // Stage one: bounce unconfirmed large trades before the user lookup.
    state
        .validator
        .precheck(&claims.sub, &operation, req.confirmed, ip)
        .await?;

    // Stage two: role policy, audited.
    state
        .validator
        .validate(&claims.sub, &operation, req.confirmed, ip)
        .await?;

    let result = state
        .executor
        .execute(&TradeRequest {
            opportunity_id: req.opportunity_id,
            pair: req.pair,
            amount_usd: req.amount_usd,
        })
        .await;

    Ok(Json(TradeResultDto::from(result)))
}
