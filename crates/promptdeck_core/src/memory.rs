//! crates/promptdeck_core/src/memory.rs
//!
//! An in-memory `DatabaseService` backed by hash maps behind a `Mutex`.
//! Used by the unit tests in this crate and by the API integration tests; it
//! honors the same uniqueness and cascade rules as the Postgres schema.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    NewProject, NewPrompt, NewSubscription, Project, ProjectPatch, Prompt, PromptPatch,
    PromptStatus, PromptVersion, Subscription, User, UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

struct StoredUser {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, StoredUser>,
    projects: HashMap<Uuid, Project>,
    prompts: HashMap<Uuid, Prompt>,
    versions: Vec<PromptVersion>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
pub struct MemoryDb {
    inner: Mutex<Inner>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning only happens when a test already panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply_prompt_patch(prompt: &mut Prompt, patch: &PromptPatch) {
    if let Some(text) = &patch.prompt_text {
        prompt.prompt_text = text.clone();
    }
    if let Some(generated) = &patch.generated_content {
        prompt.generated_content = Some(generated.clone());
    }
    if let Some(generated_at) = patch.generated_at {
        prompt.generated_at = Some(generated_at);
    }
    if let Some(prompt_type) = &patch.prompt_type {
        prompt.prompt_type = Some(prompt_type.clone());
    }
    if let Some(status) = patch.status {
        prompt.status = status;
    }
    prompt.updated_at = Utc::now();
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> PortResult<User> {
        let mut inner = self.lock();
        if inner.users.values().any(|u| u.user.email == email) {
            return Err(PortError::Conflict(format!(
                "email {email} already registered"
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            full_name: full_name.map(str::to_string),
            is_active: true,
            is_superuser: false,
            is_premium: false,
            billing_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let inner = self.lock();
        inner
            .users
            .values()
            .find(|u| u.user.email == email)
            .map(|u| UserCredentials {
                id: u.user.id,
                email: u.user.email.clone(),
                password_hash: u.password_hash.clone(),
                is_active: u.user.is_active,
            })
            .ok_or_else(|| PortError::NotFound(format!("User {email} not found")))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let inner = self.lock();
        inner
            .users
            .get(&user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))
    }

    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> PortResult<()> {
        let mut inner = self.lock();
        let stored = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))?;
        stored.user.is_premium = is_premium;
        stored.user.updated_at = Utc::now();
        Ok(())
    }

    async fn link_billing_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
        let mut inner = self.lock();
        let taken = inner
            .users
            .values()
            .any(|u| u.user.id != user_id && u.user.billing_customer_id.as_deref() == Some(customer_id));
        if taken {
            return Err(PortError::Conflict(format!(
                "billing customer {customer_id} already linked"
            )));
        }
        let stored = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))?;
        stored.user.billing_customer_id = Some(customer_id.to_string());
        stored.user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_user_by_billing_customer(&self, customer_id: &str) -> PortResult<Option<User>> {
        let inner = self.lock();
        Ok(inner
            .users
            .values()
            .find(|u| u.user.billing_customer_id.as_deref() == Some(customer_id))
            .map(|u| u.user.clone()))
    }

    async fn insert_project(&self, project: NewProject) -> PortResult<Project> {
        let mut inner = self.lock();
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            user_id: project.user_id,
            name: project.name,
            description: project.description,
            idea_text: project.idea_text,
            tags: project.tags,
            is_public: project.is_public,
            share_token: None,
            created_at: now,
            updated_at: now,
        };
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Option<Project>> {
        Ok(self.lock().projects.get(&project_id).cloned())
    }

    async fn list_projects(&self, user_id: Uuid) -> PortResult<Vec<Project>> {
        let inner = self.lock();
        let mut projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn update_project(&self, project_id: Uuid, patch: &ProjectPatch) -> PortResult<Project> {
        let mut inner = self.lock();
        let project = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| PortError::NotFound(format!("Project {project_id} not found")))?;

        if let Some(name) = &patch.name {
            project.name = name.clone();
        }
        if let Some(description) = &patch.description {
            project.description = Some(description.clone());
        }
        if let Some(idea_text) = &patch.idea_text {
            project.idea_text = Some(idea_text.clone());
        }
        if let Some(tags) = &patch.tags {
            project.tags = Some(tags.clone());
        }
        if let Some(is_public) = patch.is_public {
            project.is_public = is_public;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn delete_project(&self, project_id: Uuid) -> PortResult<()> {
        let mut inner = self.lock();
        if inner.projects.remove(&project_id).is_none() {
            return Err(PortError::NotFound(format!(
                "Project {project_id} not found"
            )));
        }
        let prompt_ids: Vec<Uuid> = inner
            .prompts
            .values()
            .filter(|p| p.project_id == project_id)
            .map(|p| p.id)
            .collect();
        for id in &prompt_ids {
            inner.prompts.remove(id);
        }
        inner.versions.retain(|v| !prompt_ids.contains(&v.prompt_id));
        Ok(())
    }

    async fn insert_prompt(&self, prompt: NewPrompt) -> PortResult<Prompt> {
        let mut inner = self.lock();
        let now = Utc::now();
        let prompt = Prompt {
            id: Uuid::new_v4(),
            project_id: prompt.project_id,
            user_id: prompt.user_id,
            prompt_text: prompt.prompt_text,
            generated_content: None,
            generated_at: None,
            prompt_type: prompt.prompt_type,
            status: PromptStatus::Pending,
            share_token: None,
            created_at: now,
            updated_at: now,
        };
        inner.prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn get_prompt(&self, prompt_id: Uuid) -> PortResult<Option<Prompt>> {
        Ok(self.lock().prompts.get(&prompt_id).cloned())
    }

    async fn list_prompts(&self, project_id: Uuid) -> PortResult<Vec<Prompt>> {
        let inner = self.lock();
        let mut prompts: Vec<Prompt> = inner
            .prompts
            .values()
            .filter(|p| p.project_id == project_id)
            .cloned()
            .collect();
        prompts.sort_by_key(|p| p.created_at);
        Ok(prompts)
    }

    async fn update_prompt_fields(
        &self,
        prompt_id: Uuid,
        patch: &PromptPatch,
    ) -> PortResult<Prompt> {
        let mut inner = self.lock();
        let prompt = inner
            .prompts
            .get_mut(&prompt_id)
            .ok_or_else(|| PortError::NotFound(format!("Prompt {prompt_id} not found")))?;
        apply_prompt_patch(prompt, patch);
        Ok(prompt.clone())
    }

    async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()> {
        let mut inner = self.lock();
        if inner.prompts.remove(&prompt_id).is_none() {
            return Err(PortError::NotFound(format!(
                "Prompt {prompt_id} not found"
            )));
        }
        inner.versions.retain(|v| v.prompt_id != prompt_id);
        Ok(())
    }

    async fn set_share_token(&self, prompt_id: Uuid, token: &str) -> PortResult<()> {
        let mut inner = self.lock();
        if inner
            .prompts
            .values()
            .any(|p| p.share_token.as_deref() == Some(token))
        {
            return Err(PortError::Conflict("share token already in use".to_string()));
        }
        let prompt = inner
            .prompts
            .get_mut(&prompt_id)
            .ok_or_else(|| PortError::NotFound(format!("Prompt {prompt_id} not found")))?;
        prompt.share_token = Some(token.to_string());
        prompt.updated_at = Utc::now();
        Ok(())
    }

    async fn find_prompt_by_share_token(&self, token: &str) -> PortResult<Option<Prompt>> {
        let inner = self.lock();
        Ok(inner
            .prompts
            .values()
            .find(|p| p.share_token.as_deref() == Some(token))
            .cloned())
    }

    async fn snapshot_and_update(
        &self,
        prompt_id: Uuid,
        snapshot_text: &str,
        snapshot_generated: Option<&str>,
        patch: &PromptPatch,
    ) -> PortResult<Prompt> {
        // Snapshot and field update happen under one lock, so either both
        // land or (on the NotFound path) neither does.
        let mut inner = self.lock();
        if !inner.prompts.contains_key(&prompt_id) {
            return Err(PortError::NotFound(format!(
                "Prompt {prompt_id} not found"
            )));
        }
        let next = inner
            .versions
            .iter()
            .filter(|v| v.prompt_id == prompt_id)
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        inner.versions.push(PromptVersion {
            id: Uuid::new_v4(),
            prompt_id,
            version_number: next,
            prompt_text: snapshot_text.to_string(),
            generated_content: snapshot_generated.map(str::to_string),
            created_at: Utc::now(),
        });

        let prompt = inner
            .prompts
            .get_mut(&prompt_id)
            .ok_or_else(|| PortError::NotFound(format!("Prompt {prompt_id} not found")))?;
        apply_prompt_patch(prompt, patch);
        Ok(prompt.clone())
    }

    async fn list_versions(&self, prompt_id: Uuid) -> PortResult<Vec<PromptVersion>> {
        let inner = self.lock();
        let mut versions: Vec<PromptVersion> = inner
            .versions
            .iter()
            .filter(|v| v.prompt_id == prompt_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn upsert_subscription(&self, sub: NewSubscription) -> PortResult<Subscription> {
        let mut inner = self.lock();
        let now = Utc::now();

        if let Some(existing) = inner.subscriptions.iter_mut().find(|s| {
            s.provider_subscription_id.is_some()
                && s.provider_subscription_id == sub.provider_subscription_id
        }) {
            existing.plan_name = sub.plan_name;
            existing.status = sub.status;
            existing.current_period_start = sub.current_period_start;
            existing.current_period_end = sub.current_period_end;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: sub.user_id,
            provider_subscription_id: sub.provider_subscription_id,
            plan_name: sub.plan_name,
            status: sub.status,
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            created_at: now,
            updated_at: now,
        };
        inner.subscriptions.push(subscription.clone());
        Ok(subscription)
    }
}
