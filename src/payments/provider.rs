use crate::payments::error::PaymentResult;
use crate::payments::types::{PaymentRequest, PaymentResponse, StatusResponse};
use async_trait::async_trait;

/// Hosted-checkout payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session and returns where to send the payer
    async fn create_payment(&self, request: PaymentRequest) -> PaymentResult<PaymentResponse>;

    /// Authoritative state of a payment
    async fn get_payment_status(&self, merchant_transaction_id: &str)
        -> PaymentResult<StatusResponse>;

    fn name(&self) -> &'static str;

    /// Checks the signature on a server-to-server callback body.
    /// `None` when the gateway does not sign its callbacks.
    fn verify_callback_signature(&self, _payload: &str, _signature: Option<&str>) -> Option<bool> {
        None
    }
}
