//! crates/promptdeck_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_premium: bool,
    /// Billing provider customer id, linked the first time a webhook or
    /// checkout identifies this user.
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
}

/// Represents a project owned by a single user. Projects own prompts and
/// cascade-delete them.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: bool,
    /// Reserved for project-level sharing; no current flow sets it.
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The processing state of a prompt. Exactly one status holds at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStatus::Pending => "pending",
            PromptStatus::Processing => "processing",
            PromptStatus::Completed => "completed",
            PromptStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PromptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PromptStatus::Pending),
            "processing" => Ok(PromptStatus::Processing),
            "completed" => Ok(PromptStatus::Completed),
            "failed" => Ok(PromptStatus::Failed),
            other => Err(format!("unknown prompt status: {other}")),
        }
    }
}

/// Represents a prompt inside a project.
///
/// `user_id` is a denormalized copy of the owning project's owner; access is
/// always re-validated through the parent project, never trusted from this
/// field alone.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub prompt_text: String,
    pub generated_content: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub prompt_type: Option<String>,
    pub status: PromptStatus,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable historical copy of a prompt's text/generated-content pair,
/// taken just before an overwriting update.
#[derive(Debug, Clone)]
pub struct PromptVersion {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub version_number: i32,
    pub prompt_text: String,
    pub generated_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A billing provider subscription attached to a user.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_subscription_id: Option<String>,
    pub plan_name: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//=========================================================================================
// Insert / Patch Payloads
//=========================================================================================

/// Fields required to insert a new project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: bool,
}

/// Fields required to insert a new prompt. Status always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewPrompt {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub prompt_text: String,
    pub prompt_type: Option<String>,
}

/// Sparse update for a project: `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

impl ProjectPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.idea_text.is_none()
            && self.tags.is_none()
            && self.is_public.is_none()
    }
}

/// Sparse update for a prompt: `None` fields are left untouched.
///
/// `generated_at` is never accepted from callers; the lifecycle manager stamps
/// it when non-empty generated content arrives.
#[derive(Debug, Clone, Default)]
pub struct PromptPatch {
    pub prompt_text: Option<String>,
    pub generated_content: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub prompt_type: Option<String>,
    pub status: Option<PromptStatus>,
}

impl PromptPatch {
    pub fn is_empty(&self) -> bool {
        self.prompt_text.is_none()
            && self.generated_content.is_none()
            && self.generated_at.is_none()
            && self.prompt_type.is_none()
            && self.status.is_none()
    }
}

/// Subscription fields carried by a billing webhook event.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub provider_subscription_id: Option<String>,
    pub plan_name: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}
