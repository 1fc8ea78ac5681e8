//! PhonePe client against a local stub of the pay and status endpoints

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use std::sync::{Arc, Mutex};
use wallet_recharge::config::{GatewayConfig, GatewayEnvironment};
use wallet_recharge::payments::providers::phonepe::decode_request_payload;
use wallet_recharge::payments::providers::PhonePeGateway;
use wallet_recharge::payments::utils::x_verify;
use wallet_recharge::payments::{PaymentError, PaymentGateway, PaymentRequest, PaymentState};

const MERCHANT: &str = "MERCHANTUAT";
const SALT: &str = "stub-salt";

#[derive(Clone, Default)]
struct Stub {
    last_payload: Arc<Mutex<Option<JsonValue>>>,
}

fn checksum_ok(headers: &HeaderMap, material: &str) -> bool {
    let expected = x_verify(material, SALT, "1");
    headers.get("X-VERIFY").and_then(|v| v.to_str().ok()) == Some(expected.as_str())
        && headers.get("X-MERCHANT-ID").and_then(|v| v.to_str().ok()) == Some(MERCHANT)
}

async fn pay(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let encoded = body["request"].as_str().unwrap_or_default().to_string();
    if !checksum_ok(&headers, &format!("{}/pg/v1/pay", encoded)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "code": "UNAUTHORIZED", "message": "Key not found" })),
        );
    }

    let payload = decode_request_payload(&encoded).unwrap_or(JsonValue::Null);
    *stub.last_payload.lock().unwrap() = Some(payload.clone());

    if payload["merchantUserId"] == "rejected-user" {
        return (
            StatusCode::OK,
            Json(json!({ "success": false, "code": "BAD_REQUEST", "message": "Invalid mobile" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "code": "PAYMENT_INITIATED",
            "message": "Payment initiated",
            "data": {
                "merchantId": MERCHANT,
                "merchantTransactionId": payload["merchantTransactionId"],
                "instrumentResponse": {
                    "type": "PAY_PAGE",
                    "redirectInfo": { "url": "https://mercury.example/pay/abc", "method": "GET" }
                }
            }
        })),
    )
}

async fn status(
    Path((merchant, mtid)): Path<(String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<JsonValue>) {
    if !checksum_ok(&headers, &format!("/pg/v1/status/{}/{}", merchant, mtid)) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "code": "UNAUTHORIZED", "message": "Key not found" })),
        );
    }

    let body = match mtid.as_str() {
        "MTDONE" => json!({
            "success": true,
            "code": "PAYMENT_SUCCESS",
            "data": {
                "merchantTransactionId": mtid,
                "transactionId": "T2601011200",
                "amount": 50000,
                "state": "COMPLETED",
                "responseCode": "SUCCESS"
            }
        }),
        "MTFAIL" => json!({
            "success": false,
            "code": "PAYMENT_ERROR",
            "data": {
                "merchantTransactionId": mtid,
                "transactionId": "T2601011201",
                "amount": 50000,
                "state": "FAILED",
                "responseCode": "ZM"
            }
        }),
        "MTWAIT" => json!({
            "success": false,
            "code": "PAYMENT_PENDING",
            "message": "Payment is pending"
        }),
        _ => json!({
            "success": false,
            "code": "INTERNAL_SERVER_ERROR",
            "message": "There is an error trying to process your transaction"
        }),
    };

    (StatusCode::OK, Json(body))
}

async fn spawn_stub() -> (String, Stub) {
    let stub = Stub::default();
    let app = Router::new()
        .route("/pg/v1/pay", post(pay))
        .route("/pg/v1/status/{merchant}/{mtid}", get(status))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), stub)
}

fn gateway(base_url: String, salt_key: &str) -> PhonePeGateway {
    PhonePeGateway::new(GatewayConfig {
        merchant_id: MERCHANT.to_string(),
        salt_key: salt_key.to_string(),
        salt_index: "1".to_string(),
        environment: GatewayEnvironment::Sandbox,
        base_url,
        frontend_url: "https://app.example.com".to_string(),
        backend_url: "https://api.example.com".to_string(),
        redirect_mode: Some("REDIRECT".to_string()),
        timeout_secs: 5,
        max_retries: 0,
    })
    .unwrap()
}

fn request(user: &str) -> PaymentRequest {
    PaymentRequest {
        merchant_transaction_id: "MT260101120000a1b2c3d4e5f60718".to_string(),
        merchant_user_id: user.to_string(),
        amount: "500".parse().unwrap(),
        mobile_number: Some("9876543210".to_string()),
    }
}

#[tokio::test]
async fn test_create_payment_returns_redirect_url() {
    let (base_url, stub) = spawn_stub().await;
    let gateway = gateway(base_url, SALT);

    let response = gateway.create_payment(request("user-1")).await.unwrap();
    assert_eq!(response.redirect_url, "https://mercury.example/pay/abc");
    assert_eq!(response.raw["code"], "PAYMENT_INITIATED");

    let payload = stub.last_payload.lock().unwrap().clone().unwrap();
    assert_eq!(payload["merchantId"], MERCHANT);
    assert_eq!(payload["amount"], 50000);
    assert_eq!(
        payload["redirectUrl"],
        "https://app.example.com/dashboard/payment-callback"
    );
    assert_eq!(payload["callbackUrl"], "https://api.example.com/api/recharge/verify");
    assert_eq!(payload["redirectMode"], "REDIRECT");
    assert_eq!(payload["paymentInstrument"]["type"], "PAY_PAGE");
}

#[tokio::test]
async fn test_create_payment_surfaces_gateway_rejection() {
    let (base_url, _) = spawn_stub().await;
    let gateway = gateway(base_url, SALT);

    let err = gateway
        .create_payment(request("rejected-user"))
        .await
        .unwrap_err();
    match err {
        PaymentError::ProviderError {
            message,
            provider_code,
            ..
        } => {
            assert_eq!(message, "PhonePe error: Invalid mobile");
            assert_eq!(provider_code.as_deref(), Some("BAD_REQUEST"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_wrong_salt_is_rejected_by_gateway() {
    let (base_url, _) = spawn_stub().await;
    let gateway = gateway(base_url, "wrong-salt");

    let err = gateway.create_payment(request("user-1")).await.unwrap_err();
    assert_eq!(err.provider_code(), Some("UNAUTHORIZED"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_status_states() {
    let (base_url, _) = spawn_stub().await;
    let gateway = gateway(base_url, SALT);

    let done = gateway.get_payment_status("MTDONE").await.unwrap();
    assert_eq!(done.state, PaymentState::Completed);
    assert_eq!(done.gateway_transaction_id.as_deref(), Some("T2601011200"));
    assert_eq!(done.response_code.as_deref(), Some("SUCCESS"));
    assert_eq!(done.amount, Some(50000));

    let failed = gateway.get_payment_status("MTFAIL").await.unwrap();
    assert_eq!(failed.state, PaymentState::Failed);
    assert_eq!(failed.response_code.as_deref(), Some("ZM"));

    let pending = gateway.get_payment_status("MTWAIT").await.unwrap();
    assert_eq!(pending.state, PaymentState::Pending);
    assert!(pending.gateway_transaction_id.is_none());

    let err = gateway.get_payment_status("MTBROKEN").await.unwrap_err();
    assert_eq!(err.provider_code(), Some("INTERNAL_SERVER_ERROR"));
}
