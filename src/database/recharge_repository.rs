use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{CompletedRecharge, Recharge, RechargeRow};
use crate::database::repository::{generate_merchant_transaction_id, RechargeRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::BigDecimal, PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

const RECHARGE_COLUMNS: &str = "id, user_id, amount, merchant_transaction_id, \
     gateway_transaction_id, gateway_response_code, status, created_at, updated_at";

/// Postgres-backed recharge store
#[derive(Clone)]
pub struct PgRechargeRepository {
    pool: PgPool,
}

impl PgRechargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        key: &str,
    ) -> Result<Option<Recharge>, DatabaseError> {
        sqlx::query_as::<_, RechargeRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Recharge::try_from)
            .transpose()
    }

    /// Explains why a conditional update touched no row
    async fn transition_conflict(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> DatabaseError {
        let status: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM recharges WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await;

        match status {
            Ok(Some(status)) => DatabaseError::invalid_state(id, status),
            Ok(None) => DatabaseError::not_found("recharge", id),
            Err(e) => DatabaseError::from_sqlx(e),
        }
    }

    /// Terminal transition guarded by `status = 'pending'`
    async fn transition(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: &str,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<Recharge, DatabaseError> {
        let sql = format!(
            "UPDATE recharges
             SET status = $2,
                 gateway_transaction_id = COALESCE($3, gateway_transaction_id),
                 gateway_response_code = COALESCE($4, gateway_response_code),
                 updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            RECHARGE_COLUMNS
        );

        let row = sqlx::query_as::<_, RechargeRow>(&sql)
            .bind(id)
            .bind(status)
            .bind(gateway_transaction_id)
            .bind(response_code)
            .fetch_optional(&mut **tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        match row {
            Some(row) => Recharge::try_from(row),
            None => Err(Self::transition_conflict(tx, id).await),
        }
    }
}

#[async_trait]
impl RechargeRepository for PgRechargeRepository {
    async fn create(&self, user_id: Uuid, amount: BigDecimal) -> Result<Recharge, DatabaseError> {
        if amount < BigDecimal::from(1) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConstraintViolation {
                message: "amount must be at least 1".to_string(),
            }));
        }

        // No foreign key on user_id: the owner must exist at insert time only
        let sql = format!(
            "INSERT INTO recharges (id, user_id, amount, merchant_transaction_id, status)
             SELECT $1::uuid, $2::uuid, $3::numeric, $4::text, 'pending'
             WHERE EXISTS (SELECT 1 FROM users WHERE id = $2)
             RETURNING {}",
            RECHARGE_COLUMNS
        );

        let row = sqlx::query_as::<_, RechargeRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(amount)
            .bind(generate_merchant_transaction_id(Utc::now()))
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| {
                DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                    constraint: "recharges_user_id_fkey".to_string(),
                })
            })?;

        Recharge::try_from(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Recharge>, DatabaseError> {
        let sql = format!("SELECT {} FROM recharges WHERE id = $1", RECHARGE_COLUMNS);
        sqlx::query_as::<_, RechargeRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Recharge::try_from)
            .transpose()
    }

    async fn find_by_merchant_transaction_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<Option<Recharge>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM recharges WHERE merchant_transaction_id = $1",
            RECHARGE_COLUMNS
        );
        self.fetch_optional(&sql, merchant_transaction_id).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM recharges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<CompletedRecharge, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let recharge =
            Self::transition(&mut tx, id, "completed", gateway_transaction_id, response_code)
                .await?;

        let credited = sqlx::query(
            "UPDATE users
             SET wallet_balance = wallet_balance + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(recharge.user_id)
        .bind(&recharge.amount)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?
        .rows_affected()
            > 0;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        if !credited {
            warn!(
                recharge_id = %recharge.id,
                user_id = %recharge.user_id,
                "Recharge completed but owning user is missing; wallet not credited"
            );
        }

        Ok(CompletedRecharge {
            recharge,
            wallet_credited: credited,
        })
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        gateway_transaction_id: Option<&str>,
        response_code: Option<&str>,
    ) -> Result<Recharge, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let recharge =
            Self::transition(&mut tx, id, "failed", gateway_transaction_id, response_code).await?;
        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(recharge)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Recharge>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM recharges WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            RECHARGE_COLUMNS
        );

        sqlx::query_as::<_, RechargeRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .into_iter()
            .map(Recharge::try_from)
            .collect()
    }

    async fn list_pending(
        &self,
        created_before: DateTime<Utc>,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Recharge>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM recharges
             WHERE status = 'pending' AND created_at <= $1 AND created_at >= $2
             ORDER BY created_at ASC
             LIMIT $3",
            RECHARGE_COLUMNS
        );

        sqlx::query_as::<_, RechargeRow>(&sql)
            .bind(created_before)
            .bind(created_after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .into_iter()
            .map(Recharge::try_from)
            .collect()
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        super::health_check(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::RechargeStatus;
    use crate::database::user_repository::PgUserRepository;
    use crate::database::repository::UserRepository;

    async fn setup() -> Option<(PgRechargeRepository, PgUserRepository)> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let pool = crate::database::init_pool(&url, None).await.ok()?;
        crate::database::run_migrations(&pool).await.ok()?;
        Some((
            PgRechargeRepository::new(pool.clone()),
            PgUserRepository::new(pool),
        ))
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_complete_credits_wallet_once() {
        let (recharges, users) = setup().await.expect("database available");
        let user = users.create(Some("9999999999")).await.unwrap();

        let recharge = recharges
            .create(user.id, "500.00".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(recharge.status, RechargeStatus::Pending);

        let done = recharges
            .mark_completed(recharge.id, Some("T123"), Some("PAYMENT_SUCCESS"))
            .await
            .unwrap();
        assert!(done.wallet_credited);
        assert_eq!(done.recharge.status, RechargeStatus::Completed);

        let again = recharges
            .mark_completed(recharge.id, Some("T123"), Some("PAYMENT_SUCCESS"))
            .await
            .unwrap_err();
        assert!(matches!(again.kind, DatabaseErrorKind::InvalidState { .. }));

        let user = users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.wallet_balance, "500.00".parse::<BigDecimal>().unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_complete_keeps_record_when_owner_removed() {
        let (recharges, users) = setup().await.expect("database available");
        let user = users.create(None).await.unwrap();
        let recharge = recharges.create(user.id, BigDecimal::from(75)).await.unwrap();

        assert!(users.remove(user.id).await.unwrap());
        assert!(recharges.find_by_id(recharge.id).await.unwrap().is_some());

        let done = recharges
            .mark_completed(recharge.id, Some("T-ORPHAN"), Some("PAYMENT_SUCCESS"))
            .await
            .unwrap();
        assert!(!done.wallet_credited);
        assert_eq!(done.recharge.status, RechargeStatus::Completed);
        assert_eq!(recharges.list_by_user(user.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_create_rejects_unknown_owner() {
        let (recharges, _) = setup().await.expect("database available");
        let err = recharges
            .create(Uuid::new_v4(), BigDecimal::from(10))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_delete_and_history_order() {
        let (recharges, users) = setup().await.expect("database available");
        let user = users.create(None).await.unwrap();

        let first = recharges.create(user.id, BigDecimal::from(10)).await.unwrap();
        let second = recharges.create(user.id, BigDecimal::from(20)).await.unwrap();

        let history = recharges.list_by_user(user.id).await.unwrap();
        assert_eq!(history.first().map(|r| r.id), Some(second.id));

        assert!(recharges.delete(first.id).await.unwrap());
        assert!(recharges.find_by_id(first.id).await.unwrap().is_none());
    }
}
