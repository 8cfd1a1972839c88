//! crates/promptdeck_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    NewProject, NewPrompt, NewSubscription, Project, ProjectPatch, Prompt, PromptPatch,
    PromptVersion, Subscription, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// Failure of an external collaborator (completion or billing provider).
#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("Provider rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Provider rejected credentials: {0}")]
    Unauthenticated(String),
    #[error("Provider request timed out: {0}")]
    Timeout(String),
    #[error("Provider rejected the request: {0}")]
    InvalidRequest(String),
    #[error("Provider error: {0}")]
    Other(String),
}

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The resource does not exist.
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The resource exists but the acting user does not own it.
    #[error("Not enough permissions: {0}")]
    Forbidden(String),
    /// Malformed input, caught before persistence.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The operation conflicts with current state (e.g. already processing).
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    External(#[from] ExternalServiceError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The persistence boundary. Every mutation is expected to be a single short
/// transaction inside the adapter; no long-lived locks are held across calls.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    /// Flips the premium flag. Only the billing event path calls this.
    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> PortResult<()>;

    async fn link_billing_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()>;

    async fn find_user_by_billing_customer(&self, customer_id: &str) -> PortResult<Option<User>>;

    // --- Project Management ---
    async fn insert_project(&self, project: NewProject) -> PortResult<Project>;

    async fn get_project(&self, project_id: Uuid) -> PortResult<Option<Project>>;

    async fn list_projects(&self, user_id: Uuid) -> PortResult<Vec<Project>>;

    async fn update_project(&self, project_id: Uuid, patch: &ProjectPatch) -> PortResult<Project>;

    /// Cascade-deletes the project's prompts and their versions.
    async fn delete_project(&self, project_id: Uuid) -> PortResult<()>;

    // --- Prompt Management ---
    async fn insert_prompt(&self, prompt: NewPrompt) -> PortResult<Prompt>;

    async fn get_prompt(&self, prompt_id: Uuid) -> PortResult<Option<Prompt>>;

    async fn list_prompts(&self, project_id: Uuid) -> PortResult<Vec<Prompt>>;

    /// Applies only the fields present in the patch; absent fields are left
    /// untouched. Last writer wins on concurrent updates.
    async fn update_prompt_fields(
        &self,
        prompt_id: Uuid,
        patch: &PromptPatch,
    ) -> PortResult<Prompt>;

    /// Cascade-deletes the prompt's versions.
    async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()>;

    async fn set_share_token(&self, prompt_id: Uuid, token: &str) -> PortResult<()>;

    async fn find_prompt_by_share_token(&self, token: &str) -> PortResult<Option<Prompt>>;

    // --- Prompt Versions ---
    /// Records an immutable snapshot with `version_number = max + 1` and
    /// applies the patch to the prompt in one atomic unit: either the version
    /// row and the field update both land, or neither does. A failed call
    /// leaves no orphan version behind, so retrying it is safe.
    async fn snapshot_and_update(
        &self,
        prompt_id: Uuid,
        snapshot_text: &str,
        snapshot_generated: Option<&str>,
        patch: &PromptPatch,
    ) -> PortResult<Prompt>;

    async fn list_versions(&self, prompt_id: Uuid) -> PortResult<Vec<PromptVersion>>;

    // --- Subscriptions ---
    /// Inserts or updates by provider subscription id.
    async fn upsert_subscription(&self, sub: NewSubscription) -> PortResult<Subscription>;
}

/// Parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt_text: String,
    /// Caller-supplied system instruction; the adapter falls back to its fixed
    /// default when this is `None`.
    pub system_instruction: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            system_instruction: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Generates text for a prompt via the external completion provider.
    async fn generate(&self, request: CompletionRequest) -> PortResult<String>;
}

/// A checkout session minted by the billing provider.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub checkout_id: String,
    pub checkout_url: String,
}

/// Parameters for creating a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub product_id: String,
    pub customer_email: String,
    /// Our user id, echoed back by webhooks as `customer_external_id`.
    pub customer_external_id: Uuid,
    pub success_url: Option<String>,
}

/// The current state of a checkout session, as reported by the provider.
#[derive(Debug, Clone)]
pub struct CheckoutStatus {
    pub checkout_id: String,
    pub status: String,
    pub checkout_url: Option<String>,
}

/// A customer-portal session where the user manages their subscription.
#[derive(Debug, Clone)]
pub struct PortalSession {
    pub portal_url: String,
}

/// A purchasable product/plan as listed by the provider.
#[derive(Debug, Clone)]
pub struct BillingProduct {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[async_trait]
pub trait BillingService: Send + Sync {
    async fn create_checkout(&self, request: CheckoutRequest) -> PortResult<CheckoutSession>;

    /// Fetches the state of an existing checkout session.
    async fn get_checkout(&self, checkout_id: &str) -> PortResult<CheckoutStatus>;

    /// Opens a customer-portal session for a linked billing customer.
    async fn create_customer_portal(&self, customer_id: &str) -> PortResult<PortalSession>;

    /// Lists the provider's purchasable products.
    async fn list_products(&self) -> PortResult<Vec<BillingProduct>>;
}
