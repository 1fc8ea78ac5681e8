//! Storage traits shared by the Postgres and in-memory backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::types::BigDecimal;
use std::sync::OnceLock;
use uuid::Uuid;

use super::error::DatabaseError;
use super::models::{CompletedRecharge, Recharge, User};

/// Gateway limit on merchant transaction id length
pub const MERCHANT_TRANSACTION_ID_MAX_LEN: usize = 35;

/// Persisted collection of recharge attempts
#[async_trait]
pub trait RechargeRepository: Send + Sync {
    /// Persist a `pending` record with a freshly generated merchant transaction id
    async fn create(&self, user_id: Uuid, amount: BigDecimal) -> Result<Recharge, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recharge>, DatabaseError>;

    async fn find_by_merchant_transaction_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Option<Recharge>, DatabaseError>;

    /// Compensating removal; returns whether a row was deleted
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// `pending -> completed` plus the owner's wallet credit, atomically
    async fn mark_completed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<CompletedRecharge, DatabaseError>;

    /// `pending -> failed`
    async fn mark_failed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<Recharge, DatabaseError>;

    /// Newest first
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Recharge>, DatabaseError>;

    /// Pending records created within `[created_after, created_before]`, oldest first
    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Recharge>, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

/// Read access to wallet owners
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
}

/// `MT` + UTC `yyMMddHHmmss` + 16 hex chars of a v4 UUID
pub fn generate_merchant_transaction_id(now: DateTime<Utc>) -> String {
    let entropy = Uuid::new_v4().simple().to_string();
    format!("MT{}{}", now.format("%y%m%d%H%M%S"), &entropy[..16])
}

/// Ids the gateway accepts: alphanumerics, `_` and `-`, at most 35 chars
pub fn is_valid_merchant_transaction_id(id: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,35}$").ok());
    match pattern {
        Some(re) => re.is_match(id),
        None => false,
    }
}
