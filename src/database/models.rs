//! Recharge and user records as stored

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::BigDecimal, FromRow};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::{DatabaseError, DatabaseErrorKind};

/// Lifecycle of a recharge: `pending` moves once to a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RechargeStatus {
    Pending,
    Completed,
    Failed,
}

impl RechargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RechargeStatus::Pending => "pending",
            RechargeStatus::Completed => "completed",
            RechargeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RechargeStatus::Pending)
    }
}

impl fmt::Display for RechargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RechargeStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RechargeStatus::Pending),
            "completed" => Ok(RechargeStatus::Completed),
            "failed" => Ok(RechargeStatus::Failed),
            other => Err(DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("unknown recharge status '{}'", other),
            })),
        }
    }
}

/// A single wallet top-up attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recharge {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub merchant_transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response_code: Option<String>,
    pub status: RechargeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `recharges` row
#[derive(Debug, Clone, FromRow)]
pub struct RechargeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: BigDecimal,
    pub merchant_transaction_id: String,
    pub gateway_transaction_id: Option<String>,
    pub gateway_response_code: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RechargeRow> for Recharge {
    type Error = DatabaseError;

    fn try_from(row: RechargeRow) -> Result<Self, Self::Error> {
        Ok(Recharge {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            merchant_transaction_id: row.merchant_transaction_id,
            gateway_transaction_id: row.gateway_transaction_id,
            gateway_response_code: row.gateway_response_code,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of a completed transition
#[derive(Debug, Clone)]
pub struct CompletedRecharge {
    pub recharge: Recharge,
    /// False when the owning user no longer exists
    pub wallet_credited: bool,
}

/// Wallet owner
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub phone: Option<String>,
    pub wallet_balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            RechargeStatus::Pending,
            RechargeStatus::Completed,
            RechargeStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RechargeStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<RechargeStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!RechargeStatus::Pending.is_terminal());
        assert!(RechargeStatus::Completed.is_terminal());
        assert!(RechargeStatus::Failed.is_terminal());
    }

    #[test]
    fn test_recharge_serializes_camel_case() {
        let now = Utc::now();
        let recharge = Recharge {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: "500.00".parse().unwrap(),
            merchant_transaction_id: "MT1".to_string(),
            gateway_transaction_id: None,
            gateway_response_code: None,
            status: RechargeStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&recharge).unwrap();
        assert_eq!(value["merchantTransactionId"], "MT1");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["amount"], "500.00");
        assert!(value["gatewayTransactionId"].is_null());
    }
}
