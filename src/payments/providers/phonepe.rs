use crate::config::GatewayConfig;
use crate::logging::mask_phone;
use crate::middleware::logging::log_external_call;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    GatewayEnvelope, PaymentRequest, PaymentResponse, PaymentState, StatusResponse,
};
use crate::payments::utils::{to_minor_units, x_verify, PaymentHttpClient};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

const PROVIDER: &str = "phonepe";
const PAY_PATH: &str = "/pg/v1/pay";
const STATUS_PATH: &str = "/pg/v1/status";
/// Frontend route the hosted page returns the payer to
const REDIRECT_PATH: &str = "/dashboard/payment-callback";
/// Route on this service the gateway calls server-to-server
const CALLBACK_PATH: &str = "/api/recharge/verify";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PayPayload<'a> {
    merchant_id: &'a str,
    merchant_transaction_id: &'a str,
    merchant_user_id: &'a str,
    amount: i64,
    redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_mode: Option<&'a str>,
    callback_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mobile_number: Option<&'a str>,
    payment_instrument: PaymentInstrument,
}

#[derive(Debug, Serialize)]
struct PaymentInstrument {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PayData {
    instrument_response: Option<InstrumentResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentResponse {
    redirect_info: Option<RedirectInfo>,
}

#[derive(Debug, Deserialize)]
struct RedirectInfo {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    merchant_transaction_id: Option<String>,
    transaction_id: Option<String>,
    amount: Option<i64>,
    state: Option<String>,
    response_code: Option<String>,
}

/// PhonePe standard checkout (PG v1) client
pub struct PhonePeGateway {
    config: GatewayConfig,
    http: PaymentHttpClient,
}

impl PhonePeGateway {
    pub fn new(config: GatewayConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Base64 JSON payload sent as `{"request": ...}`
    fn encode_payload(&self, request: &PaymentRequest) -> PaymentResult<String> {
        let payload = PayPayload {
            merchant_id: &self.config.merchant_id,
            merchant_transaction_id: &request.merchant_transaction_id,
            merchant_user_id: &request.merchant_user_id,
            amount: to_minor_units(&request.amount)?,
            redirect_url: format!("{}{}", self.config.frontend_url, REDIRECT_PATH),
            redirect_mode: self.config.redirect_mode.as_deref(),
            callback_url: format!("{}{}", self.config.backend_url, CALLBACK_PATH),
            mobile_number: request.mobile_number.as_deref(),
            payment_instrument: PaymentInstrument { kind: "PAY_PAGE" },
        };

        let json = serde_json::to_vec(&payload).map_err(|e| PaymentError::ValidationError {
            message: format!("failed to encode payment payload: {}", e),
            field: None,
        })?;

        Ok(STANDARD.encode(json))
    }

    fn status_path(&self, merchant_transaction_id: &str) -> String {
        format!(
            "{}/{}/{}",
            STATUS_PATH, self.config.merchant_id, merchant_transaction_id
        )
    }

    fn rejection(envelope_code: Option<String>, message: Option<String>) -> PaymentError {
        PaymentError::provider(
            PROVIDER,
            format!(
                "PhonePe error: {}",
                message.unwrap_or_else(|| "Unknown error".to_string())
            ),
            envelope_code,
        )
    }
}

#[async_trait]
impl PaymentGateway for PhonePeGateway {
    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse> {
        let encoded = self.encode_payload(&request)?;
        let checksum = x_verify(
            &format!("{}{}", encoded, PAY_PATH),
            &self.config.salt_key,
            &self.config.salt_index,
        );

        info!(
            merchant_transaction_id = %request.merchant_transaction_id,
            amount = %request.amount,
            mobile = %request.mobile_number.as_deref().map(mask_phone).unwrap_or_default(),
            "Initiating PhonePe payment"
        );

        let body = serde_json::json!({ "request": encoded });
        let raw = log_external_call(
            PROVIDER,
            PAY_PATH,
            self.http.request_json(
                reqwest::Method::POST,
                &self.endpoint(PAY_PATH),
                Some(&body),
                &[
                    ("Content-Type", "application/json"),
                    ("X-VERIFY", checksum.as_str()),
                    ("X-MERCHANT-ID", self.config.merchant_id.as_str()),
                ],
            ),
        )
        .await?;

        let envelope: GatewayEnvelope<PayData> = serde_json::from_value(raw.clone())
            .map_err(|e| {
                PaymentError::provider(PROVIDER, format!("unexpected pay response: {}", e), None)
            })?;

        if !envelope.success {
            return Err(Self::rejection(envelope.code, envelope.message));
        }

        let redirect_url = envelope
            .data
            .and_then(|d| d.instrument_response)
            .and_then(|i| i.redirect_info)
            .map(|r| r.url)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                PaymentError::provider(PROVIDER, "PhonePe response missing redirect URL", None)
            })?;

        Ok(PaymentResponse { redirect_url, raw })
    }

    async fn get_payment_status(
        &self,
        merchant_transaction_id: &str,
    ) -> PaymentResult<StatusResponse> {
        let path = self.status_path(merchant_transaction_id);
        let checksum = x_verify(&path, &self.config.salt_key, &self.config.salt_index);

        let raw = log_external_call(
            PROVIDER,
            STATUS_PATH,
            self.http.request_json(
                reqwest::Method::GET,
                &self.endpoint(&path),
                None,
                &[
                    ("Content-Type", "application/json"),
                    ("X-VERIFY", checksum.as_str()),
                    ("X-MERCHANT-ID", self.config.merchant_id.as_str()),
                ],
            ),
        )
        .await?;

        let envelope: GatewayEnvelope<StatusData> = serde_json::from_value(raw.clone())
            .map_err(|e| {
                PaymentError::provider(PROVIDER, format!("unexpected status response: {}", e), None)
            })?;

        // A failed payment comes back as success=false with data.state=FAILED
        let data = match envelope.data {
            Some(data) => data,
            None if envelope.code.as_deref() == Some("PAYMENT_PENDING") => StatusData {
                merchant_transaction_id: None,
                transaction_id: None,
                amount: None,
                state: Some("PENDING".to_string()),
                response_code: None,
            },
            None => return Err(Self::rejection(envelope.code, envelope.message)),
        };

        let state = data
            .state
            .as_deref()
            .map(PaymentState::from_gateway)
            .unwrap_or(PaymentState::Unknown);

        if state == PaymentState::Unknown {
            warn!(
                merchant_transaction_id,
                gateway_state = ?data.state,
                code = ?envelope.code,
                "Unrecognized PhonePe payment state"
            );
        }

        Ok(StatusResponse {
            merchant_transaction_id: data
                .merchant_transaction_id
                .unwrap_or_else(|| merchant_transaction_id.to_string()),
            state,
            gateway_transaction_id: data.transaction_id.filter(|t| !t.is_empty()),
            response_code: data.response_code.or(envelope.code),
            amount: data.amount,
            raw,
        })
    }

    fn name(&self) -> &'static str {
        PROVIDER
    }

    /// Callback `X-VERIFY` is `sha256(response + salt)###index`
    fn verify_callback_signature(&self, payload: &str, signature: Option<&str>) -> Option<bool> {
        let expected = x_verify(payload, &self.config.salt_key, &self.config.salt_index);
        Some(signature.map(str::trim) == Some(expected.as_str()))
    }
}

/// Decodes the base64 `request` body, for inspecting what was sent
pub fn decode_request_payload(encoded: &str) -> Option<JsonValue> {
    let bytes = STANDARD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayEnvironment;

    fn config() -> GatewayConfig {
        GatewayConfig {
            merchant_id: "MERCHANTUAT".to_string(),
            salt_key: "salt-key".to_string(),
            salt_index: "1".to_string(),
            environment: GatewayEnvironment::Sandbox,
            base_url: "https://api-preprod.phonepe.com/apis/pg-sandbox".to_string(),
            frontend_url: "https://app.example.com".to_string(),
            backend_url: "https://api.example.com".to_string(),
            redirect_mode: None,
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            merchant_transaction_id: "MT260101000000abcdef0123456789".to_string(),
            merchant_user_id: "user-1".to_string(),
            amount: "500".parse().unwrap(),
            mobile_number: Some("9999999999".to_string()),
        }
    }

    #[test]
    fn payload_carries_gateway_contract_fields() {
        let gateway = PhonePeGateway::new(config()).unwrap();
        let encoded = gateway.encode_payload(&request()).unwrap();
        let payload = decode_request_payload(&encoded).unwrap();

        assert_eq!(payload["merchantId"], "MERCHANTUAT");
        assert_eq!(
            payload["merchantTransactionId"],
            "MT260101000000abcdef0123456789"
        );
        assert_eq!(payload["merchantUserId"], "user-1");
        assert_eq!(payload["amount"], 50_000);
        assert_eq!(
            payload["redirectUrl"],
            "https://app.example.com/dashboard/payment-callback"
        );
        assert_eq!(
            payload["callbackUrl"],
            "https://api.example.com/api/recharge/verify"
        );
        assert_eq!(payload["mobileNumber"], "9999999999");
        assert_eq!(payload["paymentInstrument"]["type"], "PAY_PAGE");
        assert!(payload.get("redirectMode").is_none());
    }

    #[test]
    fn payload_includes_redirect_mode_when_configured() {
        let mut cfg = config();
        cfg.redirect_mode = Some("POST".to_string());
        let gateway = PhonePeGateway::new(cfg).unwrap();
        let mut req = request();
        req.mobile_number = None;

        let payload = decode_request_payload(&gateway.encode_payload(&req).unwrap()).unwrap();
        assert_eq!(payload["redirectMode"], "POST");
        assert!(payload.get("mobileNumber").is_none());
    }

    #[test]
    fn status_path_embeds_merchant_and_transaction() {
        let gateway = PhonePeGateway::new(config()).unwrap();
        assert_eq!(
            gateway.status_path("MT1"),
            "/pg/v1/status/MERCHANTUAT/MT1"
        );
    }

    #[test]
    fn callback_signature_uses_salt_and_index() {
        let gateway = PhonePeGateway::new(config()).unwrap();
        let payload = "eyJjb2RlIjoiUEFZTUVOVF9TVUNDRVNTIn0=";
        let signed = x_verify(payload, "salt-key", "1");

        assert_eq!(gateway.verify_callback_signature(payload, Some(&signed)), Some(true));
        assert_eq!(
            gateway.verify_callback_signature(payload, Some(&x_verify(payload, "other", "1"))),
            Some(false)
        );
        assert_eq!(gateway.verify_callback_signature(payload, None), Some(false));
    }

    #[test]
    fn rejection_prefixes_gateway_message() {
        let err = PhonePeGateway::rejection(
            Some("BAD_REQUEST".to_string()),
            Some("Invalid amount".to_string()),
        );
        assert_eq!(err.user_message(), "PhonePe error: Invalid amount");
        assert_eq!(err.provider_code(), Some("BAD_REQUEST"));

        let err = PhonePeGateway::rejection(None, None);
        assert_eq!(err.user_message(), "PhonePe error: Unknown error");
    }
}
