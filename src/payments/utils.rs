use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use reqwest::Client;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    provider: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            provider,
            timeout,
            max_retries,
        })
    }

    /// Sends a request and returns the JSON body of a 2xx response.
    ///
    /// Network failures, 429 and 5xx are retried up to `max_retries` times with
    /// exponential backoff. Other non-2xx responses surface the gateway's
    /// `message`/`code` when the body carries them.
    pub async fn request_json(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&JsonValue>,
        headers: &[(&str, &str)],
    ) -> PaymentResult<JsonValue> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url).timeout(self.timeout);
            for (k, v) in headers {
                request = request.header(*k, *v);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();

                    if status.is_success() {
                        return serde_json::from_str::<JsonValue>(&text).map_err(|e| {
                            PaymentError::provider(
                                self.provider,
                                format!("invalid gateway JSON response: {}", e),
                                None,
                            )
                        });
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        warn!(
                            provider = self.provider,
                            status = %status,
                            attempt = attempt + 1,
                            "gateway error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    if status.as_u16() == 429 {
                        return Err(PaymentError::RateLimitError {
                            message: "gateway rate limit exceeded".to_string(),
                        });
                    }

                    return Err(self.error_from_body(status, &text));
                }
                Err(e) => {
                    last_error = Some(PaymentError::NetworkError {
                        message: format!("gateway request failed: {}", e),
                    });
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "gateway request failed".to_string(),
        }))
    }

    fn error_from_body(&self, status: reqwest::StatusCode, text: &str) -> PaymentError {
        let parsed = serde_json::from_str::<JsonValue>(text).ok();
        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let message = field("message").unwrap_or_else(|| format!("HTTP {}", status));
        let code = field("code").or_else(|| Some(status.as_u16().to_string()));

        PaymentError::ProviderError {
            provider: self.provider.to_string(),
            message,
            provider_code: code,
            retryable: status.is_server_error(),
        }
    }
}

/// `hex(sha256(material + salt_key)) + "###" + salt_index`
pub fn x_verify(material: &str, salt_key: &str, salt_index: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hasher.update(salt_key.as_bytes());
    format!("{}###{}", hex::encode(hasher.finalize()), salt_index)
}

/// Major units to integer minor units (x100), rounding half-up
pub fn to_minor_units(amount: &BigDecimal) -> PaymentResult<i64> {
    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
        .ok_or_else(|| PaymentError::ValidationError {
            message: format!("amount {} is out of range", amount),
            field: Some("amount".to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn pay_checksum_matches_known_digest() {
        let payload = "eyJtZXJjaGFudElkIjoiTTEifQ==";
        assert_eq!(
            x_verify(&format!("{}{}", payload, "/pg/v1/pay"), "salt-key", "1"),
            "399db80e530a9b40bdf0d238f169780f009bdb2434d1eb3d93ccddff2774aed0###1"
        );
    }

    #[test]
    fn status_checksum_matches_known_digest() {
        assert_eq!(
            x_verify("/pg/v1/status/M1/MT1", "salt-key", "2"),
            "c841cfca72e6fea00e7b75e2133d98c1a429b33448b9ead47c42e801e4748826###2"
        );
    }

    #[test]
    fn checksum_is_deterministic() {
        let a = x_verify("payload/pg/v1/pay", "k", "1");
        let b = x_verify("payload/pg/v1/pay", "k", "1");
        assert_eq!(a, b);
        assert_ne!(a, x_verify("payload/pg/v1/pay", "k2", "1"));
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(&dec("500")).unwrap(), 50_000);
        assert_eq!(to_minor_units(&dec("1.005")).unwrap(), 101);
        assert_eq!(to_minor_units(&dec("1.004")).unwrap(), 100);
        assert_eq!(to_minor_units(&dec("99.99")).unwrap(), 9_999);
    }

    #[test]
    fn minor_units_reject_overflow() {
        assert!(to_minor_units(&dec("1e30")).is_err());
    }
}
