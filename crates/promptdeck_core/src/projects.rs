//! crates/promptdeck_core/src/projects.rs
//!
//! Owner-scoped project CRUD. Deleting a project cascades to its prompts and
//! their versions in the store.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{NewProject, Project, ProjectPatch};
use crate::lifecycle::validate_project_ownership;
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Clone)]
pub struct ProjectService {
    db: Arc<dyn DatabaseService>,
}

impl ProjectService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        name: String,
        description: Option<String>,
        idea_text: Option<String>,
        tags: Option<Vec<String>>,
        is_public: bool,
    ) -> PortResult<Project> {
        if name.trim().is_empty() {
            return Err(PortError::Validation("Project name is empty".to_string()));
        }

        self.db
            .insert_project(NewProject {
                user_id,
                name,
                description,
                idea_text,
                tags,
                is_public,
            })
            .await
    }

    /// Missing project -> `NotFound`; foreign owner -> `Forbidden`.
    pub async fn get(&self, project_id: Uuid, user_id: Uuid) -> PortResult<Project> {
        validate_project_ownership(self.db.as_ref(), project_id, user_id).await
    }

    pub async fn list(&self, user_id: Uuid) -> PortResult<Vec<Project>> {
        self.db.list_projects(user_id).await
    }

    pub async fn update(
        &self,
        project_id: Uuid,
        patch: ProjectPatch,
        user_id: Uuid,
    ) -> PortResult<Project> {
        let current = validate_project_ownership(self.db.as_ref(), project_id, user_id).await?;

        if patch.is_empty() {
            return Ok(current);
        }
        if let Some(name) = patch.name.as_deref() {
            if name.trim().is_empty() {
                return Err(PortError::Validation("Project name is empty".to_string()));
            }
        }

        self.db.update_project(project_id, &patch).await
    }

    /// Returns the pre-delete snapshot.
    pub async fn delete(&self, project_id: Uuid, user_id: Uuid) -> PortResult<Project> {
        let project = validate_project_ownership(self.db.as_ref(), project_id, user_id).await?;
        self.db.delete_project(project_id).await?;
        Ok(project)
    }
}
