//! crates/promptdeck_core/src/billing.rs
//!
//! Maps validated billing webhook events onto the identity store: subscription
//! lifecycle events flip the user's premium flag and keep the local
//! subscription row current.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::NewSubscription;
use crate::ports::{DatabaseService, PortResult};

/// A billing webhook event after signature verification and JSON decoding.
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    /// Provider event type, e.g. `subscription.created`.
    pub event_type: String,
    /// Provider-side subscription id.
    pub subscription_id: Option<String>,
    /// Provider-side customer id.
    pub customer_id: Option<String>,
    /// Our user id, echoed back from checkout metadata when present.
    pub customer_external_id: Option<String>,
    pub status: Option<String>,
    pub plan_name: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// What an event does to the premium flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumChange {
    Grant,
    Revoke,
    /// Recognized event with no premium effect, or an unrecognized type.
    None,
}

/// Decides the premium effect of an event from its type and (for updates) its
/// subscription status.
pub fn premium_change(event_type: &str, status: Option<&str>) -> PremiumChange {
    match event_type {
        "subscription.created" | "subscription.active" => PremiumChange::Grant,
        "subscription.updated" => match status {
            Some("active") | Some("trialing") => PremiumChange::Grant,
            Some("canceled") | Some("incomplete_expired") | Some("past_due") => {
                PremiumChange::Revoke
            }
            _ => PremiumChange::None,
        },
        "subscription.canceled" => PremiumChange::Revoke,
        // A confirmed checkout grants access before the subscription events land.
        "checkout.updated" => match status {
            Some("confirmed") => PremiumChange::Grant,
            _ => PremiumChange::None,
        },
        _ => PremiumChange::None,
    }
}

/// The result of applying one event, surfaced so the web layer can log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Premium flag updated for the given user.
    Applied { user_id: Uuid, premium: bool },
    /// Recognized type, no premium effect.
    NoChange,
    /// The event could not be mapped to a user, or its type is unknown.
    Ignored(String),
}

#[derive(Clone)]
pub struct BillingEvents {
    db: Arc<dyn DatabaseService>,
}

impl BillingEvents {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Applies one validated event.
    ///
    /// User resolution order: `customer_external_id` (our UUID, set at
    /// checkout creation) first, then the persisted billing customer id. The
    /// billing customer id is linked on the first successful resolution so
    /// later events resolve without the external id. Events that match no
    /// user are reported as `Ignored`, never as an error.
    pub async fn apply(&self, event: &SubscriptionEvent) -> PortResult<EventOutcome> {
        let recognized = matches!(
            event.event_type.as_str(),
            "subscription.created"
                | "subscription.updated"
                | "subscription.active"
                | "subscription.canceled"
                | "checkout.created"
                | "checkout.updated"
        );
        if !recognized {
            return Ok(EventOutcome::Ignored(format!(
                "unhandled billing event type {}",
                event.event_type
            )));
        }

        let change = premium_change(&event.event_type, event.status.as_deref());

        let user = match self.resolve_user(event).await? {
            Some(user) => user,
            None => {
                return Ok(EventOutcome::Ignored(format!(
                    "no user matched billing event {}",
                    event.event_type
                )))
            }
        };

        if let Some(customer_id) = event.customer_id.as_deref() {
            if user.billing_customer_id.as_deref() != Some(customer_id) {
                self.db.link_billing_customer(user.id, customer_id).await?;
            }
        }

        if event.subscription_id.is_some() {
            self.db
                .upsert_subscription(NewSubscription {
                    user_id: user.id,
                    provider_subscription_id: event.subscription_id.clone(),
                    plan_name: event.plan_name.clone(),
                    status: event.status.clone(),
                    current_period_start: event.current_period_start,
                    current_period_end: event.current_period_end,
                })
                .await?;
        }

        match change {
            PremiumChange::Grant => {
                self.db.set_premium(user.id, true).await?;
                Ok(EventOutcome::Applied {
                    user_id: user.id,
                    premium: true,
                })
            }
            PremiumChange::Revoke => {
                self.db.set_premium(user.id, false).await?;
                Ok(EventOutcome::Applied {
                    user_id: user.id,
                    premium: false,
                })
            }
            PremiumChange::None => Ok(EventOutcome::NoChange),
        }
    }

    async fn resolve_user(
        &self,
        event: &SubscriptionEvent,
    ) -> PortResult<Option<crate::domain::User>> {
        if let Some(external) = event.customer_external_id.as_deref() {
            if let Ok(user_id) = external.parse::<Uuid>() {
                match self.db.get_user_by_id(user_id).await {
                    Ok(user) => return Ok(Some(user)),
                    Err(crate::ports::PortError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(customer_id) = event.customer_id.as_deref() {
            return self.db.find_user_by_billing_customer(customer_id).await;
        }

        Ok(None)
    }
}
