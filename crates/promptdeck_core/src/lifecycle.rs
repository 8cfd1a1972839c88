//! crates/promptdeck_core/src/lifecycle.rs
//!
//! The prompt lifecycle manager. Every mutation of a prompt goes through this
//! service, which enforces ownership authorization, sanitizes incoming text,
//! keeps the status domain legal, and snapshots a version before an update
//! overwrites prompt text or generated content.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{NewPrompt, Project, Prompt, PromptPatch, PromptStatus, PromptVersion};
use crate::ports::{DatabaseService, PortError, PortResult};

/// Strips whitespace runs down to single spaces, trims the ends, then removes
/// the literal characters `< > { } [ ] \ ^ ~`.
///
/// Applied to every incoming prompt text before persistence, at creation and
/// update.
pub fn sanitize_prompt_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}' | '[' | ']' | '\\' | '^' | '~'))
        .collect()
}

/// Loads a project and checks that `user_id` owns it.
///
/// A missing project is `NotFound`; an existing project owned by someone else
/// is `Forbidden`. Authorization is always decided here, from the project row,
/// never from denormalized copies.
pub async fn validate_project_ownership(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> PortResult<Project> {
    let project = db
        .get_project(project_id)
        .await?
        .ok_or_else(|| PortError::NotFound("Project not found".to_string()))?;

    if project.user_id != user_id {
        return Err(PortError::Forbidden("Not the project owner".to_string()));
    }

    Ok(project)
}

/// Mediates all prompt mutations. Constructed once at startup around the
/// database port and shared by the web layer and background tasks.
#[derive(Clone)]
pub struct PromptLifecycle {
    db: Arc<dyn DatabaseService>,
}

impl PromptLifecycle {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Loads a prompt and re-validates ownership through its parent project.
    ///
    /// Error ordering contract: absent prompt -> `NotFound`, absent parent ->
    /// `NotFound`, foreign owner -> `Forbidden`. Content is never returned on
    /// the failure paths.
    pub async fn get_prompt(&self, prompt_id: Uuid, user_id: Uuid) -> PortResult<Prompt> {
        let prompt = self
            .db
            .get_prompt(prompt_id)
            .await?
            .ok_or_else(|| PortError::NotFound("Prompt not found".to_string()))?;

        validate_project_ownership(self.db.as_ref(), prompt.project_id, user_id).await?;

        Ok(prompt)
    }

    /// Creates a prompt under a project the user owns, with sanitized text and
    /// status `pending`.
    pub async fn create_prompt(
        &self,
        project_id: Uuid,
        prompt_text: &str,
        prompt_type: Option<String>,
        user_id: Uuid,
    ) -> PortResult<Prompt> {
        validate_project_ownership(self.db.as_ref(), project_id, user_id).await?;

        let sanitized = sanitize_prompt_text(prompt_text);
        if sanitized.trim().is_empty() {
            return Err(PortError::Validation(
                "Prompt text is empty after sanitization".to_string(),
            ));
        }

        self.db
            .insert_prompt(NewPrompt {
                project_id,
                user_id,
                prompt_text: sanitized,
                prompt_type,
            })
            .await
    }

    /// Returns every prompt in a project the user owns.
    pub async fn list_prompts_for_project(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<Prompt>> {
        validate_project_ownership(self.db.as_ref(), project_id, user_id).await?;
        self.db.list_prompts(project_id).await
    }

    /// Applies a sparse update to a prompt the user owns.
    ///
    /// Before any field is overwritten, the current text/generated-content
    /// pair is captured; if the update actually changes either of them and the
    /// captured pair is non-empty, it is persisted as the next numbered
    /// version in the same store transaction as the field update, so a failed
    /// update never leaves a stray version behind. `generated_at` is stamped
    /// whenever non-empty generated content arrives.
    ///
    /// Concurrent updates to the same prompt are last-writer-wins on the
    /// prompt fields; version numbers are allocated inside the store.
    pub async fn update_prompt(
        &self,
        prompt_id: Uuid,
        mut patch: PromptPatch,
        user_id: Uuid,
    ) -> PortResult<Prompt> {
        let current = self.get_prompt(prompt_id, user_id).await?;

        // Candidate snapshot, captured before any overwrite.
        let snapshot_text = current.prompt_text.clone();
        let snapshot_generated = current.generated_content.clone();

        if let Some(text) = patch.prompt_text.as_deref() {
            patch.prompt_text = Some(sanitize_prompt_text(text));
        }

        patch.generated_at = None;
        if let Some(generated) = patch.generated_content.as_deref() {
            if !generated.is_empty() {
                patch.generated_at = Some(Utc::now());
            }
        }

        let text_changes = patch
            .prompt_text
            .as_deref()
            .map(|incoming| incoming != current.prompt_text)
            .unwrap_or(false);
        let generated_changes = patch
            .generated_content
            .as_deref()
            .map(|incoming| Some(incoming) != current.generated_content.as_deref())
            .unwrap_or(false);

        let should_snapshot = text_changes || generated_changes;
        let snapshot_has_content = !snapshot_text.is_empty()
            || snapshot_generated.as_deref().is_some_and(|g| !g.is_empty());

        if patch.is_empty() {
            return Ok(current);
        }

        if should_snapshot && snapshot_has_content {
            return self
                .db
                .snapshot_and_update(
                    prompt_id,
                    &snapshot_text,
                    snapshot_generated.as_deref(),
                    &patch,
                )
                .await;
        }

        self.db.update_prompt_fields(prompt_id, &patch).await
    }

    /// Deletes a prompt the user owns, cascading its versions. Returns the
    /// pre-delete snapshot.
    pub async fn delete_prompt(&self, prompt_id: Uuid, user_id: Uuid) -> PortResult<Prompt> {
        let prompt = self.get_prompt(prompt_id, user_id).await?;
        self.db.delete_prompt(prompt_id).await?;
        Ok(prompt)
    }

    /// Moves a prompt into `processing` so a background completion task can be
    /// enqueued. Rejects with `Conflict` while a previous run is still in
    /// flight; the caller gets the prompt back immediately and never waits for
    /// the completion itself.
    pub async fn begin_processing(&self, prompt_id: Uuid, user_id: Uuid) -> PortResult<Prompt> {
        let prompt = self.get_prompt(prompt_id, user_id).await?;

        if prompt.status == PromptStatus::Processing {
            return Err(PortError::Conflict(
                "Prompt is already being processed".to_string(),
            ));
        }

        self.db
            .update_prompt_fields(
                prompt_id,
                &PromptPatch {
                    status: Some(PromptStatus::Processing),
                    ..Default::default()
                },
            )
            .await
    }

    /// Returns the version history of a prompt the user owns, oldest first.
    pub async fn list_versions(
        &self,
        prompt_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Vec<PromptVersion>> {
        self.get_prompt(prompt_id, user_id).await?;
        self.db.list_versions(prompt_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        NewProject, NewSubscription, ProjectPatch, Subscription, User, UserCredentials,
    };
    use crate::memory::MemoryDb;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn setup() -> (Arc<MemoryDb>, PromptLifecycle, Uuid, Uuid) {
        let db = Arc::new(MemoryDb::new());
        let owner = db
            .create_user("owner@example.com", "hash", None)
            .await
            .unwrap();
        let project = db
            .insert_project(NewProject {
                user_id: owner.id,
                name: "demo".to_string(),
                description: None,
                idea_text: None,
                tags: None,
                is_public: false,
            })
            .await
            .unwrap();
        let lifecycle = PromptLifecycle::new(db.clone() as Arc<dyn DatabaseService>);
        (db, lifecycle, owner.id, project.id)
    }

    #[test]
    fn sanitize_collapses_trims_and_strips() {
        assert_eq!(
            sanitize_prompt_text("  vibe   coding <script>  "),
            "vibe coding script"
        );
        assert_eq!(sanitize_prompt_text("a\t\nb"), "a b");
        assert_eq!(sanitize_prompt_text(r"{a}[b]\c^d~e"), "abcde");
        assert_eq!(sanitize_prompt_text(""), "");
    }

    #[tokio::test]
    async fn create_starts_pending_with_sanitized_text() {
        let (_db, lifecycle, owner, project) = setup().await;

        let prompt = lifecycle
            .create_prompt(project, "  add   <dark> mode  ", None, owner)
            .await
            .unwrap();

        assert_eq!(prompt.prompt_text, "add dark mode");
        assert_eq!(prompt.status, PromptStatus::Pending);
        assert_eq!(prompt.user_id, owner);
    }

    #[tokio::test]
    async fn create_rejects_text_that_sanitizes_to_nothing() {
        let (_db, lifecycle, owner, project) = setup().await;

        let err = lifecycle
            .create_prompt(project, "  <> {}  ", None, owner)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[tokio::test]
    async fn foreign_user_gets_forbidden_not_notfound() {
        let (db, lifecycle, owner, project) = setup().await;
        let intruder = db
            .create_user("intruder@example.com", "hash", None)
            .await
            .unwrap();
        let prompt = lifecycle
            .create_prompt(project, "secret idea", None, owner)
            .await
            .unwrap();

        let get = lifecycle.get_prompt(prompt.id, intruder.id).await;
        assert!(matches!(get, Err(PortError::Forbidden(_))));

        let update = lifecycle
            .update_prompt(
                prompt.id,
                PromptPatch {
                    prompt_text: Some("stolen".to_string()),
                    ..Default::default()
                },
                intruder.id,
            )
            .await;
        assert!(matches!(update, Err(PortError::Forbidden(_))));

        let delete = lifecycle.delete_prompt(prompt.id, intruder.id).await;
        assert!(matches!(delete, Err(PortError::Forbidden(_))));
    }

    #[tokio::test]
    async fn missing_prompt_is_notfound() {
        let (_db, lifecycle, owner, _project) = setup().await;
        let err = lifecycle.get_prompt(Uuid::new_v4(), owner).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn unchanged_text_creates_no_version() {
        let (_db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "same text", None, owner)
            .await
            .unwrap();

        lifecycle
            .update_prompt(
                prompt.id,
                PromptPatch {
                    prompt_text: Some("same text".to_string()),
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();

        let versions = lifecycle.list_versions(prompt.id, owner).await.unwrap();
        assert!(versions.is_empty());
    }

    #[tokio::test]
    async fn changed_text_creates_exactly_one_version_with_previous_values() {
        let (_db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "first draft", None, owner)
            .await
            .unwrap();

        let updated = lifecycle
            .update_prompt(
                prompt.id,
                PromptPatch {
                    prompt_text: Some("second draft".to_string()),
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();
        assert_eq!(updated.prompt_text, "second draft");

        let versions = lifecycle.list_versions(prompt.id, owner).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].prompt_text, "first draft");
        assert_eq!(versions[0].generated_content, None);
    }

    #[tokio::test]
    async fn version_numbers_increase_from_previous_max() {
        let (_db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "v1", None, owner)
            .await
            .unwrap();

        for text in ["v2", "v3", "v4"] {
            lifecycle
                .update_prompt(
                    prompt.id,
                    PromptPatch {
                        prompt_text: Some(text.to_string()),
                        ..Default::default()
                    },
                    owner,
                )
                .await
                .unwrap();
        }

        let versions = lifecycle.list_versions(prompt.id, owner).await.unwrap();
        let numbers: Vec<i32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(versions[2].prompt_text, "v3");
    }

    #[tokio::test]
    async fn generated_content_update_stamps_generated_at() {
        let (_db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "needs generation", None, owner)
            .await
            .unwrap();
        assert!(prompt.generated_at.is_none());

        let updated = lifecycle
            .update_prompt(
                prompt.id,
                PromptPatch {
                    generated_content: Some("generated body".to_string()),
                    status: Some(PromptStatus::Completed),
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();

        assert_eq!(updated.generated_content.as_deref(), Some("generated body"));
        assert!(updated.generated_at.is_some());
        assert_eq!(updated.status, PromptStatus::Completed);

        // The pre-update state (empty generated content) was versioned.
        let versions = lifecycle.list_versions(prompt.id, owner).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].prompt_text, "needs generation");
        assert_eq!(versions[0].generated_content, None);
    }

    #[tokio::test]
    async fn begin_processing_conflicts_while_processing() {
        let (_db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "process me", None, owner)
            .await
            .unwrap();

        let processing = lifecycle.begin_processing(prompt.id, owner).await.unwrap();
        assert_eq!(processing.status, PromptStatus::Processing);

        let err = lifecycle.begin_processing(prompt.id, owner).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(_)));

        // State unchanged by the rejected call.
        let current = lifecycle.get_prompt(prompt.id, owner).await.unwrap();
        assert_eq!(current.status, PromptStatus::Processing);
    }

    #[tokio::test]
    async fn delete_returns_snapshot_and_cascades_versions() {
        let (db, lifecycle, owner, project) = setup().await;
        let prompt = lifecycle
            .create_prompt(project, "short lived", None, owner)
            .await
            .unwrap();
        lifecycle
            .update_prompt(
                prompt.id,
                PromptPatch {
                    prompt_text: Some("still short lived".to_string()),
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();

        let deleted = lifecycle.delete_prompt(prompt.id, owner).await.unwrap();
        assert_eq!(deleted.id, prompt.id);

        assert!(db.get_prompt(prompt.id).await.unwrap().is_none());
        assert!(db.list_versions(prompt.id).await.unwrap().is_empty());
    }

    /// Delegates to `MemoryDb` but makes the first snapshot-and-update call
    /// fail before touching any state, like a dropped connection would.
    struct FlakyDb {
        inner: Arc<MemoryDb>,
        fail_next_snapshot: AtomicBool,
    }

    impl FlakyDb {
        fn new(inner: Arc<MemoryDb>) -> Self {
            Self {
                inner,
                fail_next_snapshot: AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl DatabaseService for FlakyDb {
        async fn create_user(
            &self,
            email: &str,
            password_hash: &str,
            full_name: Option<&str>,
        ) -> PortResult<User> {
            self.inner.create_user(email, password_hash, full_name).await
        }

        async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
            self.inner.get_user_by_email(email).await
        }

        async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
            self.inner.get_user_by_id(user_id).await
        }

        async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> PortResult<()> {
            self.inner.set_premium(user_id, is_premium).await
        }

        async fn link_billing_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
            self.inner.link_billing_customer(user_id, customer_id).await
        }

        async fn find_user_by_billing_customer(
            &self,
            customer_id: &str,
        ) -> PortResult<Option<User>> {
            self.inner.find_user_by_billing_customer(customer_id).await
        }

        async fn insert_project(&self, project: NewProject) -> PortResult<Project> {
            self.inner.insert_project(project).await
        }

        async fn get_project(&self, project_id: Uuid) -> PortResult<Option<Project>> {
            self.inner.get_project(project_id).await
        }

        async fn list_projects(&self, user_id: Uuid) -> PortResult<Vec<Project>> {
            self.inner.list_projects(user_id).await
        }

        async fn update_project(
            &self,
            project_id: Uuid,
            patch: &ProjectPatch,
        ) -> PortResult<Project> {
            self.inner.update_project(project_id, patch).await
        }

        async fn delete_project(&self, project_id: Uuid) -> PortResult<()> {
            self.inner.delete_project(project_id).await
        }

        async fn insert_prompt(&self, prompt: NewPrompt) -> PortResult<Prompt> {
            self.inner.insert_prompt(prompt).await
        }

        async fn get_prompt(&self, prompt_id: Uuid) -> PortResult<Option<Prompt>> {
            self.inner.get_prompt(prompt_id).await
        }

        async fn list_prompts(&self, project_id: Uuid) -> PortResult<Vec<Prompt>> {
            self.inner.list_prompts(project_id).await
        }

        async fn update_prompt_fields(
            &self,
            prompt_id: Uuid,
            patch: &PromptPatch,
        ) -> PortResult<Prompt> {
            self.inner.update_prompt_fields(prompt_id, patch).await
        }

        async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()> {
            self.inner.delete_prompt(prompt_id).await
        }

        async fn set_share_token(&self, prompt_id: Uuid, token: &str) -> PortResult<()> {
            self.inner.set_share_token(prompt_id, token).await
        }

        async fn find_prompt_by_share_token(&self, token: &str) -> PortResult<Option<Prompt>> {
            self.inner.find_prompt_by_share_token(token).await
        }

        async fn snapshot_and_update(
            &self,
            prompt_id: Uuid,
            snapshot_text: &str,
            snapshot_generated: Option<&str>,
            patch: &PromptPatch,
        ) -> PortResult<Prompt> {
            if self.fail_next_snapshot.swap(false, Ordering::SeqCst) {
                return Err(PortError::Unexpected(
                    "connection reset by peer".to_string(),
                ));
            }
            self.inner
                .snapshot_and_update(prompt_id, snapshot_text, snapshot_generated, patch)
                .await
        }

        async fn list_versions(&self, prompt_id: Uuid) -> PortResult<Vec<PromptVersion>> {
            self.inner.list_versions(prompt_id).await
        }

        async fn upsert_subscription(&self, sub: NewSubscription) -> PortResult<Subscription> {
            self.inner.upsert_subscription(sub).await
        }
    }

    #[tokio::test]
    async fn failed_update_leaves_no_version_and_retry_mints_one() {
        let (db, _lifecycle, owner, project) = setup().await;
        let lifecycle = PromptLifecycle::new(Arc::new(FlakyDb::new(db.clone())));
        let prompt = lifecycle
            .create_prompt(project, "draft one", None, owner)
            .await
            .unwrap();

        let patch = PromptPatch {
            prompt_text: Some("draft two".to_string()),
            ..Default::default()
        };

        let err = lifecycle
            .update_prompt(prompt.id, patch.clone(), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));

        // The failed update stored nothing.
        let current = lifecycle.get_prompt(prompt.id, owner).await.unwrap();
        assert_eq!(current.prompt_text, "draft one");
        assert!(lifecycle.list_versions(prompt.id, owner).await.unwrap().is_empty());

        // The retry succeeds and exactly one version exists afterwards.
        let updated = lifecycle
            .update_prompt(prompt.id, patch, owner)
            .await
            .unwrap();
        assert_eq!(updated.prompt_text, "draft two");

        let versions = lifecycle.list_versions(prompt.id, owner).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].version_number, 1);
        assert_eq!(versions[0].prompt_text, "draft one");
    }
}
