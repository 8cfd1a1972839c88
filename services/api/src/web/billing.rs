//! services/api/src/web/billing.rs
//!
//! Billing endpoints: checkout creation and lookup, the customer portal,
//! the product list, and the unauthenticated webhook receiver. The webhook
//! verifies its signature before any decoding; a payload that fails
//! verification is rejected outright.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use promptdeck_core::billing::{BillingEvents, EventOutcome, SubscriptionEvent};
use promptdeck_core::ports::{CheckoutRequest, PortError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::adapters::verify_webhook_signature;
use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CheckoutCreateRequest {
    pub product_id: String,
    pub success_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutCreateResponse {
    pub checkout_id: String,
    pub checkout_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutStatusResponse {
    pub checkout_id: String,
    pub status: String,
    pub checkout_url: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CustomerPortalResponse {
    pub portal_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

//=========================================================================================
// Webhook Payload (provider shape, decoded leniently)
//=========================================================================================

#[derive(Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Deserialize)]
struct WebhookData {
    id: Option<String>,
    status: Option<String>,
    customer_id: Option<String>,
    customer_external_id: Option<String>,
    customer: Option<WebhookCustomer>,
    product: Option<WebhookProduct>,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct WebhookCustomer {
    id: Option<String>,
    external_id: Option<String>,
}

#[derive(Deserialize)]
struct WebhookProduct {
    name: Option<String>,
}

impl WebhookEnvelope {
    fn into_event(self) -> SubscriptionEvent {
        let customer_id = self
            .data
            .customer_id
            .clone()
            .or_else(|| self.data.customer.as_ref().and_then(|c| c.id.clone()));
        let customer_external_id = self.data.customer_external_id.clone().or_else(|| {
            self.data
                .customer
                .as_ref()
                .and_then(|c| c.external_id.clone())
        });
        // data.id is the subscription id only on subscription.* events.
        let subscription_id = if self.event_type.starts_with("subscription.") {
            self.data.id.clone()
        } else {
            None
        };
        SubscriptionEvent {
            event_type: self.event_type,
            subscription_id,
            customer_id,
            customer_external_id,
            status: self.data.status,
            plan_name: self.data.product.and_then(|p| p.name),
            current_period_start: self.data.current_period_start,
            current_period_end: self.data.current_period_end,
        }
    }
}

/// Missing or non-ASCII signature headers fail exactly like a bad signature.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::WebhookSignature)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /billing/checkout - Create a checkout session for the caller
#[utoipa::path(
    post,
    path = "/billing/checkout",
    request_body = CheckoutCreateRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutCreateResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 502, description = "Billing provider error")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_checkout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<CheckoutCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.get_user_by_id(user_id).await?;

    let session = state
        .billing_adapter
        .create_checkout(CheckoutRequest {
            product_id: req.product_id,
            customer_email: user.email,
            customer_external_id: user.id,
            success_url: req.success_url,
        })
        .await?;

    Ok(Json(CheckoutCreateResponse {
        checkout_id: session.checkout_id,
        checkout_url: session.checkout_url,
    }))
}

/// GET /billing/checkout/{checkout_id} - Look up a checkout session's state
#[utoipa::path(
    get,
    path = "/billing/checkout/{checkout_id}",
    params(("checkout_id" = String, Path, description = "Provider checkout session id")),
    responses(
        (status = 200, description = "Checkout session state", body = CheckoutStatusResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "Checkout session not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn checkout_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user_id): Extension<Uuid>,
    Path(checkout_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.billing_adapter.get_checkout(&checkout_id).await?;
    Ok(Json(CheckoutStatusResponse {
        checkout_id: status.checkout_id,
        status: status.status,
        checkout_url: status.checkout_url,
    }))
}

/// POST /billing/portal - Open a customer portal session for the caller
///
/// Requires a billing customer already linked to the account, which happens
/// the first time a webhook for the user arrives.
#[utoipa::path(
    post,
    path = "/billing/portal",
    responses(
        (status = 200, description = "Portal session created", body = CustomerPortalResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 404, description = "No billing customer linked to this account")
    ),
    security(("bearer_auth" = []))
)]
pub async fn customer_portal_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.db.get_user_by_id(user_id).await?;
    let customer_id = user.billing_customer_id.ok_or_else(|| {
        PortError::NotFound("No billing customer is linked to this account".to_string())
    })?;

    let session = state
        .billing_adapter
        .create_customer_portal(&customer_id)
        .await?;
    Ok(Json(CustomerPortalResponse {
        portal_url: session.portal_url,
    }))
}

/// GET /billing/products - List purchasable products
#[utoipa::path(
    get,
    path = "/billing/products",
    responses(
        (status = 200, description = "Available products", body = [ProductResponse]),
        (status = 502, description = "Billing provider error")
    )
)]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state.billing_adapter.list_products().await?;
    Ok(Json(
        products
            .into_iter()
            .map(|p| ProductResponse {
                id: p.id,
                name: p.name,
                description: p.description,
            })
            .collect::<Vec<_>>(),
    ))
}

/// POST /billing/webhook - Receive a provider event
///
/// Unauthenticated, but guarded by the Standard Webhooks HMAC signature. The
/// raw body is verified byte-for-byte before any JSON decoding happens.
#[utoipa::path(
    post,
    path = "/billing/webhook",
    request_body(content = Vec<u8>, content_type = "application/json"),
    responses(
        (status = 202, description = "Event accepted", body = WebhookAck),
        (status = 403, description = "Signature verification failed"),
        (status = 422, description = "Undecodable payload")
    )
)]
pub async fn billing_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_id = header_str(&headers, "webhook-id")?;
    let webhook_timestamp = header_str(&headers, "webhook-timestamp")?;
    let signature = header_str(&headers, "webhook-signature")?;

    if !verify_webhook_signature(
        &state.config.billing_webhook_secret,
        webhook_id,
        webhook_timestamp,
        signature,
        &body,
    ) {
        warn!("billing webhook rejected: bad signature");
        return Err(ApiError::WebhookSignature);
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Port(PortError::Validation(format!("Undecodable webhook: {e}"))))?;
    let event = envelope.into_event();

    let events = BillingEvents::new(state.db.clone());
    match events.apply(&event).await? {
        EventOutcome::Applied { user_id, premium } => {
            info!(%user_id, premium, event_type = %event.event_type, "billing event applied");
        }
        EventOutcome::NoChange => {
            info!(event_type = %event.event_type, "billing event had no premium effect");
        }
        EventOutcome::Ignored(reason) => {
            warn!(event_type = %event.event_type, "billing event ignored: {reason}");
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookAck {
            status: "ok".to_string(),
        }),
    ))
}
