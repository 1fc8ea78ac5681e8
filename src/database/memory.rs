//! In-process store implementing both repositories behind one lock
//!
//! Used for local wiring and tests. Every mutation happens under a single write
//! guard, so the completed transition and the wallet credit are observed together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{DatabaseError, DatabaseErrorKind};
use super::models::{CompletedRecharge, Recharge, RechargeStatus, User};
use super::repository::{generate_merchant_transaction_id, RechargeRepository, UserRepository};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    recharges: HashMap<Uuid, (u64, Recharge)>,
    next_seq: u64,
}

impl State {
    fn transition(
        &mut self,
        id: Uuid,
        status: RechargeStatus,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<Recharge, DatabaseError> {
        if let Some(gateway_id) = gateway_transaction_id {
            let taken = self.recharges.values().any(|(_, r)| {
                r.id != id && r.gateway_transaction_id.as_deref() == Some(gateway_id)
            });
            if taken {
                return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                    constraint: "recharges_gateway_transaction_id_key".to_string(),
                }));
            }
        }

        let (_, recharge) = self
            .recharges
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("recharge", id))?;

        if recharge.status.is_terminal() {
            return Err(DatabaseError::invalid_state(id, recharge.status));
        }

        recharge.status = status;
        if let Some(gateway_id) = gateway_transaction_id {
            recharge.gateway_transaction_id = Some(gateway_id.to_string());
        }
        if let Some(code) = response_code {
            recharge.gateway_response_code = Some(code.to_string());
        }
        recharge.updated_at = Utc::now();

        Ok(recharge.clone())
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a wallet owner with the given opening balance
    pub async fn insert_user(&self, phone: Option<&str>, wallet_balance: BigDecimal) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            phone: phone.map(str::to_string),
            wallet_balance,
            created_at: now,
            updated_at: now,
        };
        self.state
            .write()
            .await
            .users
            .insert(user.id, user.clone());
        user
    }

    pub async fn remove_user(&self, id: Uuid) -> bool {
        self.state.write().await.users.remove(&id).is_some()
    }

    pub async fn recharge_count(&self) -> usize {
        self.state.read().await.recharges.len()
    }

    /// Rewrites a record's creation time; reconciliation windows key off it
    pub async fn set_created_at(&self, id: Uuid, created_at: DateTime<Utc>) -> bool {
        match self.state.write().await.recharges.get_mut(&id) {
            Some((_, recharge)) => {
                recharge.created_at = created_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl RechargeRepository for InMemoryStore {
    async fn create(&self, user_id: Uuid, amount: BigDecimal) -> Result<Recharge, DatabaseError> {
        if amount < BigDecimal::from(1) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConstraintViolation {
                message: "amount must be at least 1".to_string(),
            }));
        }

        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                constraint: "recharges_user_id_fkey".to_string(),
            }));
        }

        let now = Utc::now();
        let recharge = Recharge {
            id: Uuid::new_v4(),
            user_id,
            amount,
            merchant_transaction_id: generate_merchant_transaction_id(now),
            gateway_transaction_id: None,
            gateway_response_code: None,
            status: RechargeStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.recharges.insert(recharge.id, (seq, recharge.clone()));

        Ok(recharge)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recharge>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .recharges
            .get(&id)
            .map(|(_, r)| r.clone()))
    }

    async fn find_by_merchant_transaction_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Option<Recharge>, DatabaseError> {
        Ok(self
            .state
            .read()
            .await
            .recharges
            .values()
            .find(|(_, r)| r.merchant_transaction_id == merchant_transaction_id)
            .map(|(_, r)| r.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.state.write().await.recharges.remove(&id).is_some())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<CompletedRecharge, DatabaseError> {
        let mut state = self.state.write().await;
        let recharge = state.transition(
            id,
            RechargeStatus::Completed,
            gateway_transaction_id,
            response_code,
        )?;

        let wallet_credited = match state.users.get_mut(&recharge.user_id) {
            Some(user) => {
                user.wallet_balance = &user.wallet_balance + &recharge.amount;
                user.updated_at = Utc::now();
                true
            }
            None => {
                tracing::warn!(
                    recharge_id = %recharge.id,
                    user_id = %recharge.user_id,
                    "Recharge completed but owning user is missing; wallet not credited"
                );
                false
            }
        };

        Ok(CompletedRecharge {
            recharge,
            wallet_credited,
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<Recharge, DatabaseError> {
        self.state.write().await.transition(
            id,
            RechargeStatus::Failed,
            gateway_transaction_id,
            response_code,
        )
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Recharge>, DatabaseError> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, Recharge)> = state
            .recharges
            .values()
            .filter(|(_, r)| r.user_id == user_id)
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Recharge>, DatabaseError> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, Recharge)> = state
            .recharges
            .values()
            .filter(|(_, r)| {
                r.status == RechargeStatus::Pending
                    && r.created_at <= created_before
                    && r.created_at >= created_after
            })
            .collect();
        rows.sort_by(|(sa, a), (sb, b)| a.created_at.cmp(&b.created_at).then(sa.cmp(sb)));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }
}
