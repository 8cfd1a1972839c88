//! services/api/src/adapters/billing.rs
//!
//! This module contains the adapter for the billing provider (Polar). It
//! implements the `BillingService` port for checkout creation and provides
//! Standard Webhooks signature verification for inbound events.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use promptdeck_core::ports::{
    BillingProduct, BillingService, CheckoutRequest, CheckoutSession, CheckoutStatus,
    ExternalServiceError, PortError, PortResult, PortalSession,
};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SANDBOX_BASE_URL: &str = "https://sandbox-api.polar.sh/v1";
const PRODUCTION_BASE_URL: &str = "https://api.polar.sh/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `BillingService` against the Polar REST API.
#[derive(Clone)]
pub struct PolarBillingAdapter {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

#[derive(Deserialize)]
struct CheckoutResponse {
    id: String,
    url: String,
}

#[derive(Deserialize)]
struct CheckoutDetailResponse {
    id: String,
    status: String,
    url: Option<String>,
}

#[derive(Deserialize)]
struct CustomerSessionResponse {
    customer_portal_url: String,
}

#[derive(Deserialize)]
struct ProductItem {
    id: String,
    name: String,
    description: Option<String>,
}

#[derive(Deserialize)]
struct ProductListResponse {
    items: Vec<ProductItem>,
}

impl PolarBillingAdapter {
    /// Creates a new `PolarBillingAdapter`. `sandbox` selects the provider's
    /// test environment; `timeout` bounds every request end to end.
    pub fn new(
        access_token: String,
        sandbox: bool,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let base_url = if sandbox {
            SANDBOX_BASE_URL
        } else {
            PRODUCTION_BASE_URL
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            access_token,
            base_url: base_url.to_string(),
        })
    }

    /// Maps a non-success provider status onto the port taxonomy.
    async fn map_status_error(operation: &str, response: reqwest::Response) -> PortError {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => PortError::NotFound(format!("{operation}: {detail}")),
            401 | 403 => PortError::External(ExternalServiceError::Unauthenticated(detail)),
            422 => PortError::External(ExternalServiceError::InvalidRequest(detail)),
            429 => PortError::External(ExternalServiceError::RateLimited(detail)),
            _ => PortError::External(ExternalServiceError::Other(format!(
                "{operation} failed ({status}): {detail}"
            ))),
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> PortError {
    let external = if e.is_timeout() {
        ExternalServiceError::Timeout(e.to_string())
    } else {
        ExternalServiceError::Other(e.to_string())
    };
    PortError::External(external)
}

//=========================================================================================
// `BillingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl BillingService for PolarBillingAdapter {
    async fn create_checkout(&self, request: CheckoutRequest) -> PortResult<CheckoutSession> {
        let mut body = json!({
            "products": [request.product_id],
            "customer_email": request.customer_email,
            "customer_external_id": request.customer_external_id.to_string(),
        });
        if let Some(success_url) = &request.success_url {
            body["success_url"] = json!(success_url);
        }

        let response = self
            .http
            .post(format!("{}/checkouts", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::map_status_error("checkout", response).await);
        }

        let checkout: CheckoutResponse = response.json().await.map_err(map_transport_error)?;
        Ok(CheckoutSession {
            checkout_id: checkout.id,
            checkout_url: checkout.url,
        })
    }

    async fn get_checkout(&self, checkout_id: &str) -> PortResult<CheckoutStatus> {
        let response = self
            .http
            .get(format!("{}/checkouts/{checkout_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::map_status_error("checkout lookup", response).await);
        }

        let detail: CheckoutDetailResponse = response.json().await.map_err(map_transport_error)?;
        Ok(CheckoutStatus {
            checkout_id: detail.id,
            status: detail.status,
            checkout_url: detail.url,
        })
    }

    async fn create_customer_portal(&self, customer_id: &str) -> PortResult<PortalSession> {
        let response = self
            .http
            .post(format!("{}/customer-sessions", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&json!({ "customer_id": customer_id }))
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::map_status_error("customer portal", response).await);
        }

        let session: CustomerSessionResponse =
            response.json().await.map_err(map_transport_error)?;
        Ok(PortalSession {
            portal_url: session.customer_portal_url,
        })
    }

    async fn list_products(&self) -> PortResult<Vec<BillingProduct>> {
        let response = self
            .http
            .get(format!("{}/products", self.base_url))
            .query(&[("is_archived", "false")])
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(Self::map_status_error("product list", response).await);
        }

        let list: ProductListResponse = response.json().await.map_err(map_transport_error)?;
        Ok(list
            .items
            .into_iter()
            .map(|item| BillingProduct {
                id: item.id,
                name: item.name,
                description: item.description,
            })
            .collect())
    }
}

//=========================================================================================
// Webhook Signature Verification (Standard Webhooks)
//=========================================================================================

/// Verifies a Standard Webhooks HMAC-SHA256 signature.
///
/// The signed content is `"{id}.{timestamp}.{body}"`. The `webhook-signature`
/// header carries one or more space-separated `v1,<base64>` entries; the
/// payload is accepted when any entry matches. The secret arrives as
/// `whsec_<base64 key>`.
pub fn verify_webhook_signature(
    secret: &str,
    webhook_id: &str,
    webhook_timestamp: &str,
    signature_header: &str,
    body: &[u8],
) -> bool {
    let encoded_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let Ok(key) = base64::engine::general_purpose::STANDARD.decode(encoded_key) else {
        return false;
    };

    let mut signed_content =
        Vec::with_capacity(webhook_id.len() + webhook_timestamp.len() + body.len() + 2);
    signed_content.extend_from_slice(webhook_id.as_bytes());
    signed_content.push(b'.');
    signed_content.extend_from_slice(webhook_timestamp.as_bytes());
    signed_content.push(b'.');
    signed_content.extend_from_slice(body);

    for entry in signature_header.split_whitespace() {
        let Some(candidate) = entry.strip_prefix("v1,") else {
            continue;
        };
        let Ok(candidate_bytes) = base64::engine::general_purpose::STANDARD.decode(candidate)
        else {
            continue;
        };
        // Mac::verify_slice is constant-time.
        let Ok(mut mac) = HmacSha256::new_from_slice(&key) else {
            return false;
        };
        mac.update(&signed_content);
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, id: &str, timestamp: &str, body: &[u8]) -> String {
        let encoded_key = secret.strip_prefix("whsec_").unwrap();
        let key = base64::engine::general_purpose::STANDARD
            .decode(encoded_key)
            .unwrap();
        let mut mac = HmacSha256::new_from_slice(&key).unwrap();
        mac.update(format!("{id}.{timestamp}.").as_bytes());
        mac.update(body);
        let tag = mac.finalize().into_bytes();
        format!(
            "v1,{}",
            base64::engine::general_purpose::STANDARD.encode(tag)
        )
    }

    const SECRET: &str = "whsec_dGVzdC1zZWNyZXQta2V5LWZvci1obWFj";

    #[test]
    fn accepts_a_correctly_signed_payload() {
        let body = br#"{"type":"subscription.created"}"#;
        let header = sign(SECRET, "msg_1", "1720000000", body);
        assert!(verify_webhook_signature(
            SECRET,
            "msg_1",
            "1720000000",
            &header,
            body
        ));
    }

    #[test]
    fn accepts_when_any_listed_signature_matches() {
        let body = br#"{"type":"subscription.created"}"#;
        let good = sign(SECRET, "msg_1", "1720000000", body);
        let header = format!("v1,AAAA {good}");
        assert!(verify_webhook_signature(
            SECRET,
            "msg_1",
            "1720000000",
            &header,
            body
        ));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let header = sign(SECRET, "msg_1", "1720000000", br#"{"type":"a"}"#);
        assert!(!verify_webhook_signature(
            SECRET,
            "msg_1",
            "1720000000",
            &header,
            br#"{"type":"b"}"#
        ));
    }

    #[test]
    fn rejects_a_signature_minted_with_another_secret() {
        let other = "whsec_b3RoZXItc2VjcmV0LWtleS1mb3ItaG1hYw==";
        let body = br#"{"type":"subscription.created"}"#;
        let header = sign(other, "msg_1", "1720000000", body);
        assert!(!verify_webhook_signature(
            SECRET,
            "msg_1",
            "1720000000",
            &header,
            body
        ));
    }

    #[test]
    fn rejects_garbage_headers() {
        let body = b"{}";
        assert!(!verify_webhook_signature(SECRET, "m", "1", "", body));
        assert!(!verify_webhook_signature(SECRET, "m", "1", "v1,!!!", body));
        assert!(!verify_webhook_signature(SECRET, "m", "1", "v2,AAAA", body));
    }
}
