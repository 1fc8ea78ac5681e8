//! Health check module
//! Reports the state of the recharge store

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error};

use crate::database::repository::RechargeRepository;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn RechargeRepository>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn RechargeRepository>) -> Self {
        Self { store }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let started = Instant::now();
        let database = match timeout(CHECK_TIMEOUT, self.store.ping()).await {
            Ok(Ok(())) => {
                let elapsed = started.elapsed().as_millis();
                debug!(response_time_ms = elapsed as u64, "Database health check OK");
                ComponentHealth::up(Some(elapsed))
            }
            Ok(Err(e)) => {
                error!(error = %e, "Database health check failed");
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!("Database health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        };

        if database.status != ComponentState::Up {
            health_status.status = HealthState::Unhealthy;
        }
        health_status
            .checks
            .insert("database".to_string(), database);

        health_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::{DatabaseError, DatabaseErrorKind};
    use crate::database::memory::InMemoryStore;
    use crate::database::models::{CompletedRecharge, Recharge};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::types::BigDecimal;
    use uuid::Uuid;

    struct DownStore;

    #[async_trait]
    impl RechargeRepository for DownStore {
        async fn create(&self, _: Uuid, _: BigDecimal) -> Result<Recharge, DatabaseError> {
            unimplemented!()
        }
        async fn find_by_id(&self, _: Uuid) -> Result<Option<Recharge>, DatabaseError> {
            unimplemented!()
        }
        async fn find_by_merchant_transaction_id(
            &self,
            _: &str,
        ) -> Result<Option<Recharge>, DatabaseError> {
            unimplemented!()
        }
        async fn delete(&self, _: Uuid) -> Result<bool, DatabaseError> {
            unimplemented!()
        }
        async fn mark_completed(
            &self,
            _: Uuid,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<CompletedRecharge, DatabaseError> {
            unimplemented!()
        }
        async fn mark_failed(
            &self,
            _: Uuid,
            _: Option<&str>,
            _: Option<&str>,
        ) -> Result<Recharge, DatabaseError> {
            unimplemented!()
        }
        async fn list_by_user(&self, _: Uuid) -> Result<Vec<Recharge>, DatabaseError> {
            unimplemented!()
        }
        async fn list_pending(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
            _: i64,
        ) -> Result<Vec<Recharge>, DatabaseError> {
            unimplemented!()
        }
        async fn ping(&self) -> Result<(), DatabaseError> {
            Err(DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "connection refused".to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn test_healthy_store() {
        let checker = HealthChecker::new(Arc::new(InMemoryStore::new()));
        let status = checker.check_health().await;
        assert!(status.is_healthy());
        assert_eq!(status.checks["database"].status, ComponentState::Up);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unhealthy() {
        let checker = HealthChecker::new(Arc::new(DownStore));
        let status = checker.check_health().await;
        assert!(!status.is_healthy());

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "unhealthy");
        assert_eq!(value["checks"]["database"]["status"], "down");
        assert!(value["checks"]["database"]["details"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }
}
