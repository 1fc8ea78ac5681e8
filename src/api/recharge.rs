//! Recharge endpoints: create, verify, history, balance

use crate::api::AppState;
use crate::config::VerificationMode;
use crate::error::{AppError, AppResult, ValidationError};
use crate::middleware::auth::AuthUser;
use crate::middleware::error::get_request_id_from_headers;
use crate::services::{RechargeService, VerificationRequest};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value as JsonValue};
use tracing::info;
use uuid::Uuid;

fn tag(headers: &HeaderMap) -> impl Fn(AppError) -> AppError + '_ {
    move |err| match get_request_id_from_headers(headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

fn json_body(body: Result<Json<JsonValue>, JsonRejection>) -> AppResult<JsonValue> {
    body.map(|Json(v)| v).map_err(|rejection| {
        AppError::validation(ValidationError::InvalidFormat {
            field: "body".to_string(),
            reason: rejection.body_text(),
        })
    })
}

fn string_field(body: &JsonValue, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| body.get(*name))
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Reads the verify body in the shape the configured mode expects
pub fn parse_verification(mode: VerificationMode, body: &JsonValue) -> AppResult<VerificationRequest> {
    match mode {
        VerificationMode::Poll => {
            let recharge_id = string_field(body, &["rechargeId"]);
            let merchant_transaction_id = string_field(
                body,
                &["merchantTransactionId", "phonepeMerchantTransactionId"],
            );

            let (Some(recharge_id), Some(merchant_transaction_id)) =
                (recharge_id, merchant_transaction_id)
            else {
                return Err(AppError::validation(ValidationError::MissingField {
                    field: "rechargeId and merchantTransactionId".to_string(),
                }));
            };

            let recharge_id = Uuid::parse_str(&recharge_id).map_err(|_| {
                AppError::validation(ValidationError::InvalidFormat {
                    field: "rechargeId".to_string(),
                    reason: "must be a UUID".to_string(),
                })
            })?;

            Ok(VerificationRequest::Poll {
                recharge_id,
                merchant_transaction_id,
            })
        }
        VerificationMode::Callback => {
            // Server-to-server notifications wrap the payload as {"response": base64}
            let decoded = string_field(body, &["response"])
                .and_then(|encoded| STANDARD.decode(encoded).ok())
                .and_then(|bytes| serde_json::from_slice::<JsonValue>(&bytes).ok());

            let (fields, code) = match &decoded {
                Some(inner) => (
                    inner.get("data").cloned().unwrap_or(JsonValue::Null),
                    string_field(inner, &["code"]),
                ),
                None => (body.clone(), string_field(body, &["code"])),
            };

            let merchant_transaction_id = string_field(&fields, &["merchantTransactionId"])
                .ok_or_else(|| {
                    AppError::validation(ValidationError::MissingField {
                        field: "merchantTransactionId".to_string(),
                    })
                })?;

            Ok(VerificationRequest::Callback {
                merchant_transaction_id,
                code,
                transaction_id: string_field(&fields, &["transactionId"]),
            })
        }
    }
}

/// POST /api/recharge/create
pub async fn create_recharge(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let tag = tag(&headers);
    let body = json_body(body).map_err(&tag)?;
    let amount = RechargeService::parse_amount(body.get("amount")).map_err(&tag)?;

    let created = state
        .recharge_service
        .create_recharge(user.user_id, &amount)
        .await
        .map_err(&tag)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "data": created.gateway_response,
            "rechargeId": created.recharge.id,
            "redirectUrl": created.redirect_url,
        })),
    ))
}

/// POST /api/recharge/verify (public: called by the gateway or the client)
pub async fn verify_recharge(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> AppResult<Json<JsonValue>> {
    let tag = tag(&headers);
    let body = json_body(body).map_err(&tag)?;
    let mode = state.recharge_service.verification_mode();
    if mode == VerificationMode::Callback {
        if let Some(encoded) = body.get("response").and_then(|v| v.as_str()) {
            let signature = headers.get("X-VERIFY").and_then(|v| v.to_str().ok());
            state
                .recharge_service
                .callback_signature_valid(encoded, signature);
        }
    }
    let request = parse_verification(mode, &body).map_err(&tag)?;

    let outcome = state
        .recharge_service
        .verify(request)
        .await
        .map_err(&tag)?;

    info!(
        recharge_id = %outcome.recharge.id,
        result = outcome.status.message(),
        "Recharge verification handled"
    );

    Ok(Json(json!({
        "success": true,
        "message": outcome.status.message(),
        "recharge": outcome.recharge,
    })))
}

/// GET /api/recharge/history
pub async fn recharge_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
) -> AppResult<Json<JsonValue>> {
    let recharges = state
        .recharge_service
        .history(user.user_id)
        .await
        .map_err(tag(&headers))?;

    Ok(Json(json!({
        "success": true,
        "recharges": recharges,
    })))
}

/// GET /api/recharge/balance
pub async fn wallet_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    user: AuthUser,
) -> AppResult<Json<JsonValue>> {
    let balance = state
        .recharge_service
        .balance(user.user_id)
        .await
        .map_err(tag(&headers))?;

    Ok(Json(json!({
        "success": true,
        "balance": balance,
    })))
}
