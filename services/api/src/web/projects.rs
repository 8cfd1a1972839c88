//! services/api/src/web/projects.rs
//!
//! Axum handlers for project CRUD. Every route is owner-scoped through the
//! bearer token; cross-user access surfaces as 403 and missing rows as 404.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use promptdeck_core::domain::{Project, ProjectPatch};
use promptdeck_core::projects::ProjectService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct ProjectCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub idea_text: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            description: project.description,
            idea_text: project.idea_text,
            tags: project.tags,
            is_public: project.is_public,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /projects - Create a project
#[utoipa::path(
    post,
    path = "/projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 422, description = "Invalid request")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<ProjectCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProjectService::new(state.db.clone());
    let project = service
        .create(
            user_id,
            req.name,
            req.description,
            req.idea_text,
            req.tags,
            req.is_public,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}

/// GET /projects - List the caller's projects
#[utoipa::path(
    get,
    path = "/projects",
    responses(
        (status = 200, description = "The caller's projects", body = [ProjectResponse]),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProjectService::new(state.db.clone());
    let projects = service.list(user_id).await?;
    let body: Vec<ProjectResponse> = projects.into_iter().map(ProjectResponse::from).collect();
    Ok(Json(body))
}

/// GET /projects/{project_id} - Fetch one project
#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    params(("project_id" = Uuid, Path, description = "The project to fetch")),
    responses(
        (status = 200, description = "The project", body = ProjectResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such project")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProjectService::new(state.db.clone());
    let project = service.get(project_id, user_id).await?;
    Ok(Json(ProjectResponse::from(project)))
}

/// PUT /projects/{project_id} - Sparse update
#[utoipa::path(
    put,
    path = "/projects/{project_id}",
    params(("project_id" = Uuid, Path, description = "The project to update")),
    request_body = ProjectUpdateRequest,
    responses(
        (status = 200, description = "The updated project", body = ProjectResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such project"),
        (status = 422, description = "Invalid request")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ProjectUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProjectService::new(state.db.clone());
    let patch = ProjectPatch {
        name: req.name,
        description: req.description,
        idea_text: req.idea_text,
        tags: req.tags,
        is_public: req.is_public,
    };
    let project = service.update(project_id, patch, user_id).await?;
    Ok(Json(ProjectResponse::from(project)))
}

/// DELETE /projects/{project_id} - Delete a project and everything under it
#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    params(("project_id" = Uuid, Path, description = "The project to delete")),
    responses(
        (status = 200, description = "Project deleted; body is its final state", body = ProjectResponse),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "No such project")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let service = ProjectService::new(state.db.clone());
    let project = service.delete(project_id, user_id).await?;
    Ok(Json(ProjectResponse::from(project)))
}
