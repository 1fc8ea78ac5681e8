use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Request to open a hosted payment page
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub merchant_transaction_id: String,
    pub merchant_user_id: String,
    /// Major currency units
    pub amount: BigDecimal,
    pub mobile_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentResponse {
    /// Hosted page the payer is sent to
    pub redirect_url: String,
    /// Gateway body as received, handed back to the client
    pub raw: JsonValue,
}

/// Payment state as reported by the gateway
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Completed,
    Failed,
    Pending,
    Unknown,
}

impl PaymentState {
    pub fn from_gateway(state: &str) -> Self {
        match state.trim().to_uppercase().as_str() {
            "COMPLETED" => PaymentState::Completed,
            "FAILED" => PaymentState::Failed,
            "PENDING" => PaymentState::Pending,
            _ => PaymentState::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Completed | PaymentState::Failed)
    }
}

#[derive(Debug, Clone)]
pub struct StatusResponse {
    pub merchant_transaction_id: String,
    pub state: PaymentState,
    pub gateway_transaction_id: Option<String>,
    pub response_code: Option<String>,
    /// Minor units, when the gateway reports it
    pub amount: Option<i64>,
    pub raw: JsonValue,
}

/// Response wrapper shared by the PhonePe endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_states_map_to_payment_states() {
        assert_eq!(PaymentState::from_gateway("COMPLETED"), PaymentState::Completed);
        assert_eq!(PaymentState::from_gateway("FAILED"), PaymentState::Failed);
        assert_eq!(PaymentState::from_gateway("PENDING"), PaymentState::Pending);
        assert_eq!(PaymentState::from_gateway("REFUNDED"), PaymentState::Unknown);
        assert!(!PaymentState::Pending.is_terminal());
        assert!(PaymentState::Failed.is_terminal());
    }

    #[test]
    fn envelope_tolerates_missing_fields() {
        let env: GatewayEnvelope<JsonValue> =
            serde_json::from_str(r#"{"success":false,"message":"bad request"}"#).unwrap();
        assert!(!env.success);
        assert!(env.data.is_none());
        assert_eq!(env.message.as_deref(), Some("bad request"));
    }
}
