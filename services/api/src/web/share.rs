//! services/api/src/web/share.rs
//!
//! Share-link endpoints: the owner mints a token for a prompt, anyone holding
//! the token reads that prompt without authenticating.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use promptdeck_core::domain::Prompt;
use promptdeck_core::share::SharePublisher;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ShareLinkResponse {
    pub share_token: String,
    /// Relative URL for the public view of the prompt.
    pub share_path: String,
}

/// The public view of a shared prompt. Owner and project identifiers are
/// deliberately absent.
#[derive(Serialize, ToSchema)]
pub struct SharedPromptResponse {
    pub prompt_text: String,
    pub generated_content: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub prompt_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Prompt> for SharedPromptResponse {
    fn from(prompt: Prompt) -> Self {
        Self {
            prompt_text: prompt.prompt_text,
            generated_content: prompt.generated_content,
            generated_at: prompt.generated_at,
            prompt_type: prompt.prompt_type,
            status: prompt.status.to_string(),
            created_at: prompt.created_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /prompts/{prompt_id}/share - Mint (or return) the prompt's share token
#[utoipa::path(
    post,
    path = "/prompts/{prompt_id}/share",
    params(("prompt_id" = Uuid, Path, description = "The prompt to share")),
    responses(
        (status = 200, description = "The share link", body = ShareLinkResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_share_link_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let publisher = SharePublisher::new(state.db.clone());
    let token = publisher.create_link(prompt_id, user_id).await?;
    let share_path = format!("/share/{token}");
    Ok(Json(ShareLinkResponse {
        share_token: token,
        share_path,
    }))
}

/// GET /share/{token} - Public, unauthenticated view of a shared prompt
#[utoipa::path(
    get,
    path = "/share/{token}",
    params(("token" = String, Path, description = "An opaque share token")),
    responses(
        (status = 200, description = "The shared prompt", body = SharedPromptResponse),
        (status = 404, description = "Unknown or malformed token")
    )
)]
pub async fn shared_prompt_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let publisher = SharePublisher::new(state.db.clone());
    let prompt = publisher.resolve(&token).await?;
    Ok(Json(SharedPromptResponse::from(prompt)))
}
