//! Two-stage validation for operations that can move money or change how the
//! platform trades.
//!
//! Stage one ([`CriticalOperationValidator::precheck`]) runs before the user
//! lookup: a large trade without the caller's explicit confirmation is
//! bounced immediately, and the denial is audited. Stage two
//! ([`CriticalOperationValidator::validate`]) loads the user, applies the
//! per-operation role policy, and audits every outcome, allowed or denied.
//! Anything the policy does not recognize is denied. No denial leaves either
//! stage without an audit write.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

use crate::audit::{AuditAction, AuditLog};
use crate::error::{SecurityError, SecurityResult};
use crate::user::{Role, UserDirectory};

/// Operating modes the platform can be switched between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    /// Simulated fills, no real funds at risk.
    Paper,
    /// Real orders against real balances.
    Live,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradingMode::Paper => "paper",
            TradingMode::Live => "live",
        }
    }
}

/// A critical operation, parsed from its wire tag and payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation_type", content = "data", rename_all = "snake_case")]
pub enum Operation {
    ModeSwitch {
        mode: TradingMode,
    },
    TradeExecution {
        amount_usd: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pair: Option<String>,
    },
    ConfigUpdate {
        #[serde(default)]
        keys: Vec<String>,
    },
}

impl Operation {
    /// Wire tag, as audited and as received from clients.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Operation::ModeSwitch { .. } => "mode_switch",
            Operation::TradeExecution { .. } => "trade_execution",
            Operation::ConfigUpdate { .. } => "config_update",
        }
    }

    /// Parse a raw `operation_type` + `data` pair. An unrecognized type is a
    /// policy denial: new operation types are denied until policy is written
    /// for them. A recognized type with a payload that does not match its
    /// shape is reported separately, so callers can tell "fix your request"
    /// from "this operation is not allowed".
    pub fn parse(operation_type: &str, data: &serde_json::Value) -> SecurityResult<Self> {
        if !matches!(
            operation_type,
            "mode_switch" | "trade_execution" | "config_update"
        ) {
            return Err(SecurityError::UnknownOperationType(
                operation_type.to_string(),
            ));
        }
        let tagged = serde_json::json!({
            "operation_type": operation_type,
            "data": data,
        });
        serde_json::from_value(tagged).map_err(|e| {
            SecurityError::InvalidOperationPayload(format!("{operation_type}: {e}"))
        })
    }
}

/// A validation that passed. `requires_two_factor` flags operations for which
/// the client should re-prompt for a TOTP code; the flag is advisory and is
/// not enforced server-side.
#[derive(Debug, Clone, Serialize)]
pub struct Validated {
    pub requires_two_factor: bool,
}

/// Policy engine for critical operations.
pub struct CriticalOperationValidator {
    users: Arc<dyn UserDirectory>,
    audit: Arc<AuditLog>,
    confirmation_threshold_usd: Decimal,
}

impl CriticalOperationValidator {
    pub fn new(users: Arc<dyn UserDirectory>, audit: Arc<AuditLog>) -> Self {
        Self {
            users,
            audit,
            confirmation_threshold_usd: Decimal::from(1000),
        }
    }

    pub fn with_threshold(mut self, threshold_usd: Decimal) -> Self {
        self.confirmation_threshold_usd = threshold_usd;
        self
    }

    /// Stage one: confirmation check, run before the user lookup.
    ///
    /// Trades above the threshold need the caller's explicit `confirmed`
    /// flag; everything else passes through to stage two. A denial here is
    /// audited like any other, marked as a precheck denial.
    pub async fn precheck(
        &self,
        user_id: &str,
        operation: &Operation,
        confirmed: bool,
        ip: Option<IpAddr>,
    ) -> SecurityResult<()> {
        if let Operation::TradeExecution { amount_usd, .. } = operation {
            if *amount_usd > self.confirmation_threshold_usd && !confirmed {
                let reason = format!(
                    "trades above ${} require explicit confirmation",
                    self.confirmation_threshold_usd
                );
                self.audit
                    .append(
                        Some(user_id),
                        AuditAction::ValidateOperation,
                        serde_json::json!({
                            "operation_type": operation.type_tag(),
                            "allowed": false,
                            "reason": &reason,
                            "stage": "precheck",
                        }),
                        ip,
                    )
                    .await;
                return Err(SecurityError::ConfirmationRequired(reason));
            }
        }
        Ok(())
    }

    /// Stage two: role policy per operation, with every outcome audited.
    ///
    /// The confirmation rule is re-applied here so the policy holds even for
    /// callers that bypass [`precheck`](Self::precheck).
    pub async fn validate(
        &self,
        user_id: &str,
        operation: &Operation,
        confirmed: bool,
        ip: Option<IpAddr>,
    ) -> SecurityResult<Validated> {
        let user = match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return self
                    .deny(user_id, operation, "user not found", ip)
                    .await;
            }
            Err(e) => {
                // Fail closed: a storage fault denies rather than allows.
                tracing::error!(error = %e, user_id, "User lookup failed during validation");
                return self
                    .deny(user_id, operation, "validation unavailable", ip)
                    .await;
            }
        };

        let decision: Result<Validated, String> = match operation {
            Operation::ModeSwitch { mode } => {
                if !user.role.can_trade() {
                    Err("mode switching requires trader or admin role".to_string())
                } else {
                    // Switching to live is flagged for 2FA re-confirmation
                    // when the user has it enrolled.
                    Ok(Validated {
                        requires_two_factor: *mode == TradingMode::Live
                            && user.two_factor_enabled,
                    })
                }
            }
            Operation::TradeExecution { amount_usd, .. } => {
                if !user.role.can_trade() {
                    Err("trade execution requires trader or admin role".to_string())
                } else if *amount_usd > self.confirmation_threshold_usd && !confirmed {
                    Err(format!(
                        "trades above ${} require explicit confirmation",
                        self.confirmation_threshold_usd
                    ))
                } else {
                    Ok(Validated {
                        requires_two_factor: false,
                    })
                }
            }
            Operation::ConfigUpdate { .. } => {
                if !user.role.can_configure() {
                    Err("configuration updates require admin role".to_string())
                } else {
                    Ok(Validated {
                        requires_two_factor: false,
                    })
                }
            }
        };

        match decision {
            Ok(validated) => {
                self.audit
                    .append(
                        Some(user_id),
                        AuditAction::ValidateOperation,
                        serde_json::json!({
                            "operation_type": operation.type_tag(),
                            "allowed": true,
                            "role": user.role.as_str(),
                            "requires_two_factor": validated.requires_two_factor,
                        }),
                        ip,
                    )
                    .await;
                Ok(validated)
            }
            Err(reason) => self.deny(user_id, operation, &reason, ip).await,
        }
    }

    async fn deny(
        &self,
        user_id: &str,
        operation: &Operation,
        reason: &str,
        ip: Option<IpAddr>,
    ) -> SecurityResult<Validated> {
        self.audit
            .append(
                Some(user_id),
                AuditAction::ValidateOperation,
                serde_json::json!({
                    "operation_type": operation.type_tag(),
                    "allowed": false,
                    "reason": reason,
                }),
                ip,
            )
            .await;
        if reason.contains("confirmation") {
            Err(SecurityError::ConfirmationRequired(reason.to_string()))
        } else {
            Err(SecurityError::PermissionDenied(reason.to_string()))
        }
    }
}
