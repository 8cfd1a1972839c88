//! services/api/src/web/prompts.rs
//!
//! Axum handlers for prompt CRUD, version history, and the completion
//! trigger. All mutations go through the core lifecycle manager.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use promptdeck_core::domain::{Prompt, PromptPatch, PromptStatus, PromptVersion};
use promptdeck_core::lifecycle::PromptLifecycle;
use promptdeck_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::completion_task::generate_and_save_completion;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct PromptCreateRequest {
    pub prompt_text: String,
    pub prompt_type: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PromptUpdateRequest {
    pub prompt_text: Option<String>,
    pub generated_content: Option<String>,
    pub prompt_type: Option<String>,
    /// One of `pending`, `processing`, `completed`, `failed`.
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PromptResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub prompt_text: String,
    pub generated_content: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub prompt_type: Option<String>,
    pub status: String,
    pub share_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Prompt> for PromptResponse {
    fn from(prompt: Prompt) -> Self {
        Self {
            id: prompt.id,
            project_id: prompt.project_id,
            prompt_text: prompt.prompt_text,
            generated_content: prompt.generated_content,
            generated_at: prompt.generated_at,
            prompt_type: prompt.prompt_type,
            status: prompt.status.to_string(),
            share_token: prompt.share_token,
            created_at: prompt.created_at,
            updated_at: prompt.updated_at,
        }
    }
}

/// The lightweight payload for status polling.
#[derive(Serialize, ToSchema)]
pub struct PromptStatusResponse {
    pub id: Uuid,
    pub status: String,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, ToSchema)]
pub struct PromptVersionResponse {
    pub id: Uuid,
    pub version_number: i32,
    pub prompt_text: String,
    pub generated_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PromptVersion> for PromptVersionResponse {
    fn from(version: PromptVersion) -> Self {
        Self {
            id: version.id,
            version_number: version.version_number,
            prompt_text: version.prompt_text,
            generated_content: version.generated_content,
            created_at: version.created_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /projects/{project_id}/prompts - Create a prompt under a project
#[utoipa::path(
    post,
    path = "/projects/{project_id}/prompts",
    params(("project_id" = Uuid, Path, description = "The owning project")),
    request_body = PromptCreateRequest,
    responses(
        (status = 201, description = "Prompt created", body = PromptResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such project"),
        (status = 422, description = "Prompt text empty after sanitization")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<PromptCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompt = lifecycle
        .create_prompt(project_id, &req.prompt_text, req.prompt_type, user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(PromptResponse::from(prompt))))
}

/// GET /projects/{project_id}/prompts - List a project's prompts
#[utoipa::path(
    get,
    path = "/projects/{project_id}/prompts",
    params(("project_id" = Uuid, Path, description = "The owning project")),
    responses(
        (status = 200, description = "The project's prompts", body = [PromptResponse]),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such project")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_prompts_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompts = lifecycle
        .list_prompts_for_project(project_id, user_id)
        .await?;
    let body: Vec<PromptResponse> = prompts.into_iter().map(PromptResponse::from).collect();
    Ok(Json(body))
}

/// GET /prompts/{prompt_id} - Fetch one prompt
#[utoipa::path(
    get,
    path = "/prompts/{prompt_id}",
    params(("prompt_id" = Uuid, Path, description = "The prompt to fetch")),
    responses(
        (status = 200, description = "The prompt", body = PromptResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompt = lifecycle.get_prompt(prompt_id, user_id).await?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// PUT /prompts/{prompt_id} - Sparse update, versioning the previous content
#[utoipa::path(
    put,
    path = "/prompts/{prompt_id}",
    params(("prompt_id" = Uuid, Path, description = "The prompt to update")),
    request_body = PromptUpdateRequest,
    responses(
        (status = 200, description = "The updated prompt", body = PromptResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt"),
        (status = 422, description = "Invalid request")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
    Json(req): Json<PromptUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status = req
        .status
        .as_deref()
        .map(|s| {
            s.parse::<PromptStatus>()
                .map_err(|e| ApiError::Port(PortError::Validation(e)))
        })
        .transpose()?;

    let lifecycle = PromptLifecycle::new(state.db.clone());
    let patch = PromptPatch {
        prompt_text: req.prompt_text,
        generated_content: req.generated_content,
        generated_at: None,
        prompt_type: req.prompt_type,
        status,
    };
    let prompt = lifecycle.update_prompt(prompt_id, patch, user_id).await?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// DELETE /prompts/{prompt_id} - Delete a prompt and its versions
#[utoipa::path(
    delete,
    path = "/prompts/{prompt_id}",
    params(("prompt_id" = Uuid, Path, description = "The prompt to delete")),
    responses(
        (status = 200, description = "Prompt deleted; body is its final state", body = PromptResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompt = lifecycle.delete_prompt(prompt_id, user_id).await?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// POST /prompts/{prompt_id}/process - Kick off completion generation
///
/// Responds as soon as the prompt is marked `processing`; the completion runs
/// in a detached task and the caller polls the status endpoint for the result.
#[utoipa::path(
    post,
    path = "/prompts/{prompt_id}/process",
    params(("prompt_id" = Uuid, Path, description = "The prompt to process")),
    responses(
        (status = 202, description = "Processing started", body = PromptStatusResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt"),
        (status = 409, description = "Already processing")
    ),
    security(("bearer_auth" = []))
)]
pub async fn process_prompt_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompt = lifecycle.begin_processing(prompt_id, user_id).await?;

    info!(%prompt_id, "spawning completion task");
    tokio::spawn(generate_and_save_completion(
        state.clone(),
        prompt_id,
        user_id,
        prompt.prompt_text.clone(),
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(PromptStatusResponse {
            id: prompt.id,
            status: prompt.status.to_string(),
            generated_at: prompt.generated_at,
        }),
    ))
}

/// GET /prompts/{prompt_id}/status - Poll processing state
#[utoipa::path(
    get,
    path = "/prompts/{prompt_id}/status",
    params(("prompt_id" = Uuid, Path, description = "The prompt to poll")),
    responses(
        (status = 200, description = "Current status", body = PromptStatusResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt")
    ),
    security(("bearer_auth" = []))
)]
pub async fn prompt_status_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let prompt = lifecycle.get_prompt(prompt_id, user_id).await?;
    Ok(Json(PromptStatusResponse {
        id: prompt.id,
        status: prompt.status.to_string(),
        generated_at: prompt.generated_at,
    }))
}

/// GET /prompts/{prompt_id}/versions - Version history, oldest first
#[utoipa::path(
    get,
    path = "/prompts/{prompt_id}/versions",
    params(("prompt_id" = Uuid, Path, description = "The prompt whose history to list")),
    responses(
        (status = 200, description = "Version history", body = [PromptVersionResponse]),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such prompt")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_versions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(prompt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = PromptLifecycle::new(state.db.clone());
    let versions = lifecycle.list_versions(prompt_id, user_id).await?;
    let body: Vec<PromptVersionResponse> = versions
        .into_iter()
        .map(PromptVersionResponse::from)
        .collect();
    Ok(Json(body))
}
