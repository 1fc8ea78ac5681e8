//! Recharge workflow
//!
//! Creates pending recharge records, opens a hosted payment session for them,
//! and settles them against the gateway's payment status. A completed
//! settlement credits the owner's wallet exactly once.

use crate::config::{RechargeConfig, VerificationMode};
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::models::{Recharge, RechargeStatus};
use crate::database::repository::{
    is_valid_merchant_transaction_id, RechargeRepository, UserRepository,
};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ExternalError, ValidationError};
use crate::payments::{PaymentGateway, PaymentRequest, PaymentState, StatusResponse};
use crate::payments::utils::to_minor_units;
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Callback result code the gateway sends for a successful payment
const GATEWAY_SUCCESS_CODE: &str = "PAYMENT_SUCCESS";

/// Result of a successful create
#[derive(Debug, Clone)]
pub struct CreatedRecharge {
    pub recharge: Recharge,
    pub redirect_url: String,
    /// Gateway body, passed through to the client
    pub gateway_response: JsonValue,
}

/// What the caller supplies to settle a recharge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationRequest {
    /// Client-initiated status poll
    Poll {
        recharge_id: Uuid,
        merchant_transaction_id: String,
    },
    /// Gateway-initiated notification
    Callback {
        merchant_transaction_id: String,
        code: Option<String>,
        transaction_id: Option<String>,
    },
}

impl VerificationRequest {
    fn merchant_transaction_id(&self) -> &str {
        match self {
            VerificationRequest::Poll {
                merchant_transaction_id,
                ..
            }
            | VerificationRequest::Callback {
                merchant_transaction_id,
                ..
            } => merchant_transaction_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationStatus {
    Success,
    Failed,
    Pending,
}

impl VerificationStatus {
    pub fn message(&self) -> &'static str {
        match self {
            VerificationStatus::Success => "Success",
            VerificationStatus::Failed => "Failed",
            VerificationStatus::Pending => "Pending",
        }
    }

    fn from_record(status: RechargeStatus) -> Self {
        match status {
            RechargeStatus::Completed => VerificationStatus::Success,
            RechargeStatus::Failed => VerificationStatus::Failed,
            RechargeStatus::Pending => VerificationStatus::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub recharge: Recharge,
    pub status: VerificationStatus,
    /// True only for the call that performed the credit
    pub wallet_credited: bool,
}

/// Counters from one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

pub struct RechargeService {
    recharges: Arc<dyn RechargeRepository>,
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: RechargeConfig,
}

impl RechargeService {
    pub fn new(
        recharges: Arc<dyn RechargeRepository>,
        users: Arc<dyn UserRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: RechargeConfig,
    ) -> Self {
        Self {
            recharges,
            users,
            gateway,
            settings,
        }
    }

    pub fn verification_mode(&self) -> VerificationMode {
        self.settings.verification_mode
    }

    pub fn settings(&self) -> &RechargeConfig {
        &self.settings
    }

    /// Accepts a JSON number or a numeric string
    pub fn parse_amount(value: Option<&JsonValue>) -> AppResult<BigDecimal> {
        let invalid = |raw: String, reason: &str| {
            AppError::validation(ValidationError::InvalidAmount {
                amount: raw,
                reason: reason.to_string(),
            })
        };

        match value {
            None | Some(JsonValue::Null) => Err(AppError::validation(
                ValidationError::MissingField {
                    field: "amount".to_string(),
                },
            )),
            Some(JsonValue::Number(n)) => BigDecimal::from_str(&n.to_string())
                .map_err(|_| invalid(n.to_string(), "Amount must be numeric")),
            Some(JsonValue::String(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(invalid(s.clone(), "Amount must be numeric"));
                }
                BigDecimal::from_str(trimmed)
                    .map_err(|_| invalid(s.clone(), "Amount must be numeric"))
            }
            Some(other) => Err(invalid(other.to_string(), "Amount must be numeric")),
        }
    }

    /// Range check, then normalization to two decimal places
    pub fn validate_amount(&self, amount: &BigDecimal) -> AppResult<BigDecimal> {
        if amount < &self.settings.min_amount {
            return Err(AppError::validation(ValidationError::InvalidAmount {
                amount: amount.to_string(),
                reason: format!("Amount must be at least {}", self.settings.min_amount),
            }));
        }
        if amount > &self.settings.max_amount {
            return Err(AppError::validation(ValidationError::OutOfRange {
                field: "amount".to_string(),
                min: Some(self.settings.min_amount.to_string()),
                max: Some(self.settings.max_amount.to_string()),
            }));
        }

        Ok(amount.with_scale_round(2, RoundingMode::HalfUp))
    }

    /// Validate, persist a pending record, then open the gateway session.
    /// A gateway failure removes the record again.
    pub async fn create_recharge(
        &self,
        user_id: Uuid,
        amount: &BigDecimal,
    ) -> AppResult<CreatedRecharge> {
        let amount = self.validate_amount(amount)?;

        let user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            AppError::validation(ValidationError::UnknownUser {
                user_id: user_id.to_string(),
            })
        })?;

        let recharge = self.recharges.create(user.id, amount.clone()).await?;
        info!(
            recharge_id = %recharge.id,
            user_id = %user.id,
            merchant_transaction_id = %recharge.merchant_transaction_id,
            amount = %recharge.amount,
            "Recharge record created"
        );

        let request = PaymentRequest {
            merchant_transaction_id: recharge.merchant_transaction_id.clone(),
            merchant_user_id: user.id.to_string(),
            amount,
            mobile_number: user.phone.clone(),
        };

        match self.gateway.create_payment(request).await {
            Ok(response) => {
                info!(
                    recharge_id = %recharge.id,
                    gateway = self.gateway.name(),
                    "Payment session opened"
                );
                Ok(CreatedRecharge {
                    recharge,
                    redirect_url: response.redirect_url,
                    gateway_response: response.raw,
                })
            }
            Err(gateway_err) => {
                warn!(
                    recharge_id = %recharge.id,
                    error = %gateway_err,
                    "Payment initiation failed, removing recharge record"
                );
                if let Err(e) = self.recharges.delete(recharge.id).await {
                    error!(
                        recharge_id = %recharge.id,
                        error = %e,
                        "Failed to remove recharge record after gateway failure"
                    );
                }
                Err(gateway_err.into())
            }
        }
    }

    /// Resolve the record named by the request and settle it against the
    /// gateway's payment status
    pub async fn verify(&self, request: VerificationRequest) -> AppResult<VerificationOutcome> {
        let merchant_transaction_id = request.merchant_transaction_id();
        if !is_valid_merchant_transaction_id(merchant_transaction_id) {
            return Err(AppError::validation(ValidationError::InvalidFormat {
                field: "merchantTransactionId".to_string(),
                reason: "must be 1-35 characters of letters, digits, '_' or '-'".to_string(),
            }));
        }

        let recharge = match &request {
            VerificationRequest::Poll {
                recharge_id,
                merchant_transaction_id,
            } => self
                .recharges
                .find_by_id(*recharge_id)
                .await?
                .filter(|r| &r.merchant_transaction_id == merchant_transaction_id),
            VerificationRequest::Callback {
                merchant_transaction_id,
                ..
            } => {
                self.recharges
                    .find_by_merchant_transaction_id(merchant_transaction_id)
                    .await?
            }
        }
        .ok_or_else(|| AppError::recharge_not_found(merchant_transaction_id))?;

        let callback_code = match &request {
            VerificationRequest::Callback {
                code,
                transaction_id,
                ..
            } => {
                info!(
                    recharge_id = %recharge.id,
                    code = ?code,
                    transaction_id = ?transaction_id,
                    "Gateway callback received"
                );
                code.clone()
            }
            VerificationRequest::Poll { .. } => None,
        };

        self.settle(recharge, callback_code.as_deref()).await
    }

    async fn settle(
        &self,
        recharge: Recharge,
        callback_code: Option<&str>,
    ) -> AppResult<VerificationOutcome> {
        if recharge.status.is_terminal() {
            return Ok(VerificationOutcome {
                status: VerificationStatus::from_record(recharge.status),
                recharge,
                wallet_credited: false,
            });
        }

        let status = self
            .gateway
            .get_payment_status(&recharge.merchant_transaction_id)
            .await
            .map_err(|e| {
                AppError::new(AppErrorKind::External(ExternalError::PaymentGateway {
                    provider: self.gateway.name().to_string(),
                    message: "Failed to verify payment status".to_string(),
                    is_retryable: e.is_retryable(),
                }))
                .with_context(e.to_string())
            })?;

        self.check_consistency(&recharge, &status, callback_code);

        let gateway_transaction_id = status.gateway_transaction_id.as_deref();
        let response_code = status.response_code.as_deref();

        match status.state {
            PaymentState::Completed => {
                match self
                    .recharges
                    .mark_completed(recharge.id, gateway_transaction_id, response_code)
                    .await
                {
                    Ok(done) => {
                        info!(
                            recharge_id = %done.recharge.id,
                            amount = %done.recharge.amount,
                            wallet_credited = done.wallet_credited,
                            "Recharge completed"
                        );
                        Ok(VerificationOutcome {
                            recharge: done.recharge,
                            status: VerificationStatus::Success,
                            wallet_credited: done.wallet_credited,
                        })
                    }
                    Err(e) => self.lost_race(recharge.id, e).await,
                }
            }
            PaymentState::Failed => {
                match self
                    .recharges
                    .mark_failed(recharge.id, gateway_transaction_id, response_code)
                    .await
                {
                    Ok(failed) => {
                        info!(
                            recharge_id = %failed.id,
                            response_code = ?failed.gateway_response_code,
                            "Recharge failed"
                        );
                        Ok(VerificationOutcome {
                            recharge: failed,
                            status: VerificationStatus::Failed,
                            wallet_credited: false,
                        })
                    }
                    Err(e) => self.lost_race(recharge.id, e).await,
                }
            }
            PaymentState::Pending | PaymentState::Unknown => Ok(VerificationOutcome {
                recharge,
                status: VerificationStatus::Pending,
                wallet_credited: false,
            }),
        }
    }

    /// Another settlement got there first: report what it stored
    async fn lost_race(&self, id: Uuid, err: DatabaseError) -> AppResult<VerificationOutcome> {
        if !matches!(err.kind, DatabaseErrorKind::InvalidState { .. }) {
            return Err(err.into());
        }

        let stored = self
            .recharges
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::recharge_not_found(id.to_string()))?;

        Ok(VerificationOutcome {
            status: VerificationStatus::from_record(stored.status),
            recharge: stored,
            wallet_credited: false,
        })
    }

    fn check_consistency(
        &self,
        recharge: &Recharge,
        status: &StatusResponse,
        callback_code: Option<&str>,
    ) {
        if let Some(code) = callback_code {
            let claims_success = code == GATEWAY_SUCCESS_CODE;
            if claims_success != (status.state == PaymentState::Completed) {
                warn!(
                    recharge_id = %recharge.id,
                    callback_code = code,
                    gateway_state = ?status.state,
                    "Callback code disagrees with gateway status; using gateway status"
                );
            }
        }

        if let (Some(reported), Ok(expected)) =
            (status.amount, to_minor_units(&recharge.amount))
        {
            if reported != expected {
                warn!(
                    recharge_id = %recharge.id,
                    expected_minor = expected,
                    reported_minor = reported,
                    "Gateway reported a different amount"
                );
            }
        }
    }

    /// Settles pending records created between `window` and `min_age` ago
    pub async fn reconcile_pending(
        &self,
        min_age: Duration,
        window: Duration,
        limit: i64,
    ) -> AppResult<ReconcileReport> {
        let now = Utc::now();
        let to_chrono = |d: Duration| {
            chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(365))
        };

        let pending = self
            .recharges
            .list_pending(now - to_chrono(min_age), now - to_chrono(window), limit)
            .await?;

        let mut report = ReconcileReport {
            examined: pending.len(),
            ..ReconcileReport::default()
        };

        for recharge in pending {
            let id = recharge.id;
            match self.settle(recharge, None).await {
                Ok(outcome) => match outcome.status {
                    VerificationStatus::Success => report.completed += 1,
                    VerificationStatus::Failed => report.failed += 1,
                    VerificationStatus::Pending => report.still_pending += 1,
                },
                Err(e) => {
                    report.errors += 1;
                    warn!(recharge_id = %id, error = %e, context = ?e.context, "Reconciliation failed");
                }
            }
        }

        Ok(report)
    }

    /// Logs a warning when a signed callback body fails its signature check.
    /// The gateway status call still decides the outcome.
    pub fn callback_signature_valid(&self, payload: &str, signature: Option<&str>) -> bool {
        let valid = self
            .gateway
            .verify_callback_signature(payload, signature)
            .unwrap_or(true);
        if !valid {
            warn!(
                gateway = self.gateway.name(),
                signature_present = signature.is_some(),
                "Callback signature mismatch"
            );
        }
        valid
    }

    /// Caller's recharges, newest first
    pub async fn history(&self, user_id: Uuid) -> AppResult<Vec<Recharge>> {
        Ok(self.recharges.list_by_user(user_id).await?)
    }

    pub async fn balance(&self, user_id: Uuid) -> AppResult<BigDecimal> {
        let user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::UserNotFound {
                user_id: user_id.to_string(),
            }))
        })?;
        Ok(user.wallet_balance)
    }
}
