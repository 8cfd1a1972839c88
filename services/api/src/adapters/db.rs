//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promptdeck_core::domain::{
    NewProject, NewPrompt, NewSubscription, Project, ProjectPatch, Prompt, PromptPatch,
    PromptStatus, PromptVersion, Subscription, User, UserCredentials,
};
use promptdeck_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// One attempt at the snapshot-plus-update transaction. Both statements
    /// run inside a single transaction; dropping it before commit rolls back
    /// the version row on any failure path.
    async fn try_snapshot_and_update(
        &self,
        prompt_id: Uuid,
        snapshot_text: &str,
        snapshot_generated: Option<&str>,
        patch: &PromptPatch,
    ) -> PortResult<Prompt> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        sqlx::query(
            "INSERT INTO prompt_versions (id, prompt_id, version_number, prompt_text, generated_content) \
             SELECT $1, $2, COALESCE(MAX(version_number), 0) + 1, $3, $4 \
             FROM prompt_versions WHERE prompt_id = $2",
        )
        .bind(Uuid::new_v4())
        .bind(prompt_id)
        .bind(snapshot_text)
        .bind(snapshot_generated)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let sql = format!(
            "UPDATE prompts SET \
                prompt_text = COALESCE($2, prompt_text), \
                generated_content = COALESCE($3, generated_content), \
                generated_at = COALESCE($4, generated_at), \
                prompt_type = COALESCE($5, prompt_type), \
                status = COALESCE($6, status), \
                updated_at = now() \
             WHERE id = $1 RETURNING {PROMPT_COLUMNS}"
        );
        let record: Option<PromptRecord> = sqlx::query_as(&sql)
            .bind(prompt_id)
            .bind(&patch.prompt_text)
            .bind(&patch.generated_content)
            .bind(patch.generated_at)
            .bind(&patch.prompt_type)
            .bind(patch.status.map(|s| s.as_str()))
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db_error)?;
        let prompt = record
            .map(PromptRecord::to_domain)
            .transpose()?
            .ok_or_else(|| PortError::NotFound(format!("Prompt {prompt_id} not found")))?;

        tx.commit().await.map_err(map_db_error)?;
        Ok(prompt)
    }
}

/// Maps driver errors onto the port taxonomy. Unique-constraint violations
/// surface as `Conflict` so callers can react (duplicate email, share-token
/// collision); everything else is opaque.
fn map_db_error(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return PortError::Conflict(db_err.message().to_string());
        }
    }
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    full_name: Option<String>,
    is_active: bool,
    is_superuser: bool,
    is_premium: bool,
    billing_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            is_active: self.is_active,
            is_superuser: self.is_superuser,
            is_premium: self.is_premium,
            billing_customer_id: self.billing_customer_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    is_active: bool,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            email: self.email,
            password_hash: self.password_hash,
            is_active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct ProjectRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    idea_text: Option<String>,
    tags: Option<Vec<String>>,
    is_public: bool,
    share_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProjectRecord {
    fn to_domain(self) -> Project {
        Project {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            idea_text: self.idea_text,
            tags: self.tags,
            is_public: self.is_public,
            share_token: self.share_token,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct PromptRecord {
    id: Uuid,
    project_id: Uuid,
    user_id: Uuid,
    prompt_text: String,
    generated_content: Option<String>,
    generated_at: Option<DateTime<Utc>>,
    prompt_type: Option<String>,
    status: String,
    share_token: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PromptRecord {
    fn to_domain(self) -> PortResult<Prompt> {
        let status = self
            .status
            .parse::<PromptStatus>()
            .map_err(PortError::Unexpected)?;
        Ok(Prompt {
            id: self.id,
            project_id: self.project_id,
            user_id: self.user_id,
            prompt_text: self.prompt_text,
            generated_content: self.generated_content,
            generated_at: self.generated_at,
            prompt_type: self.prompt_type,
            status,
            share_token: self.share_token,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct VersionRecord {
    id: Uuid,
    prompt_id: Uuid,
    version_number: i32,
    prompt_text: String,
    generated_content: Option<String>,
    created_at: DateTime<Utc>,
}
impl VersionRecord {
    fn to_domain(self) -> PromptVersion {
        PromptVersion {
            id: self.id,
            prompt_id: self.prompt_id,
            version_number: self.version_number,
            prompt_text: self.prompt_text,
            generated_content: self.generated_content,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRecord {
    id: Uuid,
    user_id: Uuid,
    provider_subscription_id: Option<String>,
    plan_name: Option<String>,
    status: Option<String>,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SubscriptionRecord {
    fn to_domain(self) -> Subscription {
        Subscription {
            id: self.id,
            user_id: self.user_id,
            provider_subscription_id: self.provider_subscription_id,
            plan_name: self.plan_name,
            status: self.status,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const USER_COLUMNS: &str = "id, email, full_name, is_active, is_superuser, is_premium, \
     billing_customer_id, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, user_id, name, description, idea_text, tags, is_public, \
     share_token, created_at, updated_at";
const PROMPT_COLUMNS: &str = "id, project_id, user_id, prompt_text, generated_content, \
     generated_at, prompt_type, status, share_token, created_at, updated_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        full_name: Option<&str>,
    ) -> PortResult<User> {
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, full_name) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let record: UserRecord = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(email)
            .bind(password_hash)
            .bind(full_name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record: Option<CredentialsRecord> =
            sqlx::query_as("SELECT id, email, password_hash, is_active FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_error)?;
        record
            .map(CredentialsRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("User {email} not found")))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record: Option<UserRecord> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        record
            .map(UserRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("User {user_id} not found")))
    }

    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE users SET is_premium = $1, updated_at = now() WHERE id = $2")
                .bind(is_premium)
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }

    async fn link_billing_customer(&self, user_id: Uuid, customer_id: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET billing_customer_id = $1, updated_at = now() WHERE id = $2",
        )
        .bind(customer_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {user_id} not found")));
        }
        Ok(())
    }

    async fn find_user_by_billing_customer(&self, customer_id: &str) -> PortResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE billing_customer_id = $1");
        let record: Option<UserRecord> = sqlx::query_as(&sql)
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.map(UserRecord::to_domain))
    }

    async fn insert_project(&self, project: NewProject) -> PortResult<Project> {
        let sql = format!(
            "INSERT INTO projects (id, user_id, name, description, idea_text, tags, is_public) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PROJECT_COLUMNS}"
        );
        let record: ProjectRecord = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(project.user_id)
            .bind(&project.name)
            .bind(&project.description)
            .bind(&project.idea_text)
            .bind(&project.tags)
            .bind(project.is_public)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.to_domain())
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1");
        let record: Option<ProjectRecord> = sqlx::query_as(&sql)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(record.map(ProjectRecord::to_domain))
    }

    async fn list_projects(&self, user_id: Uuid) -> PortResult<Vec<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE user_id = $1 ORDER BY created_at ASC"
        );
        let records: Vec<ProjectRecord> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(records.into_iter().map(ProjectRecord::to_domain).collect())
    }

    async fn update_project(&self, project_id: Uuid, patch: &ProjectPatch) -> PortResult<Project> {
        let sql = format!(
            "UPDATE projects SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                idea_text = COALESCE($4, idea_text), \
                tags = COALESCE($5, tags), \
                is_public = COALESCE($6, is_public), \
                updated_at = now() \
             WHERE id = $1 RETURNING {PROJECT_COLUMNS}"
        );
        let record: Option<ProjectRecord> = sqlx::query_as(&sql)
            .bind(project_id)
            .bind(&patch.name)
            .bind(&patch.description)
            .bind(&patch.idea_text)
            .bind(&patch.tags)
            .bind(patch.is_public)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        record
            .map(ProjectRecord::to_domain)
            .ok_or_else(|| PortError::NotFound(format!("Project {project_id} not found")))
    }

    async fn delete_project(&self, project_id: Uuid) -> PortResult<()> {
        // Prompts and versions go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Project {project_id} not found"
            )));
        }
        Ok(())
    }

    async fn insert_prompt(&self, prompt: NewPrompt) -> PortResult<Prompt> {
        let sql = format!(
            "INSERT INTO prompts (id, project_id, user_id, prompt_text, prompt_type, status) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PROMPT_COLUMNS}"
        );
        let record: PromptRecord = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(prompt.project_id)
            .bind(prompt.user_id)
            .bind(&prompt.prompt_text)
            .bind(&prompt.prompt_type)
            .bind(PromptStatus::Pending.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        record.to_domain()
    }

    async fn get_prompt(&self, prompt_id: Uuid) -> PortResult<Option<Prompt>> {
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = $1");
        let record: Option<PromptRecord> = sqlx::query_as(&sql)
            .bind(prompt_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        record.map(PromptRecord::to_domain).transpose()
    }

    async fn list_prompts(&self, project_id: Uuid) -> PortResult<Vec<Prompt>> {
        let sql = format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts WHERE project_id = $1 ORDER BY created_at ASC"
        );
        let records: Vec<PromptRecord> = sqlx::query_as(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;
        records.into_iter().map(PromptRecord::to_domain).collect()
    }

    async fn update_prompt_fields(
        &self,
        prompt_id: Uuid,
        patch: &PromptPatch,
    ) -> PortResult<Prompt> {
        let sql = format!(
            "UPDATE prompts SET \
                prompt_text = COALESCE($2, prompt_text), \
                generated_content = COALESCE($3, generated_content), \
                generated_at = COALESCE($4, generated_at), \
                prompt_type = COALESCE($5, prompt_type), \
                status = COALESCE($6, status), \
                updated_at = now() \
             WHERE id = $1 RETURNING {PROMPT_COLUMNS}"
        );
        let record: Option<PromptRecord> = sqlx::query_as(&sql)
            .bind(prompt_id)
            .bind(&patch.prompt_text)
            .bind(&patch.generated_content)
            .bind(patch.generated_at)
            .bind(&patch.prompt_type)
            .bind(patch.status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        record
            .map(PromptRecord::to_domain)
            .transpose()?
            .ok_or_else(|| PortError::NotFound(format!("Prompt {prompt_id} not found")))
    }

    async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = $1")
            .bind(prompt_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Prompt {prompt_id} not found")));
        }
        Ok(())
    }

    async fn set_share_token(&self, prompt_id: Uuid, token: &str) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE prompts SET share_token = $1, updated_at = now() WHERE id = $2")
                .bind(token)
                .bind(prompt_id)
                .execute(&self.pool)
                .await
                .map_err(map_db_error)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Prompt {prompt_id} not found")));
        }
        Ok(())
    }

    async fn find_prompt_by_share_token(&self, token: &str) -> PortResult<Option<Prompt>> {
        let sql = format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE share_token = $1");
        let record: Option<PromptRecord> = sqlx::query_as(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        record.map(PromptRecord::to_domain).transpose()
    }

    async fn snapshot_and_update(
        &self,
        prompt_id: Uuid,
        snapshot_text: &str,
        snapshot_generated: Option<&str>,
        patch: &PromptPatch,
    ) -> PortResult<Prompt> {
        // Two snapshots racing under READ COMMITTED can both read the same
        // MAX(version_number); the unique (prompt_id, version_number) pair
        // aborts the loser, which is retried with a fresh number.
        const MAX_ATTEMPTS: u32 = 3;
        let mut last_err = PortError::Unexpected("version allocation failed".to_string());
        for _ in 0..MAX_ATTEMPTS {
            match self
                .try_snapshot_and_update(prompt_id, snapshot_text, snapshot_generated, patch)
                .await
            {
                Err(PortError::Conflict(msg)) => last_err = PortError::Conflict(msg),
                other => return other,
            }
        }
        Err(last_err)
    }

    async fn list_versions(&self, prompt_id: Uuid) -> PortResult<Vec<PromptVersion>> {
        let records: Vec<VersionRecord> = sqlx::query_as(
            "SELECT id, prompt_id, version_number, prompt_text, generated_content, created_at \
             FROM prompt_versions WHERE prompt_id = $1 ORDER BY version_number ASC",
        )
        .bind(prompt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(records.into_iter().map(VersionRecord::to_domain).collect())
    }

    async fn upsert_subscription(&self, sub: NewSubscription) -> PortResult<Subscription> {
        let record: SubscriptionRecord = sqlx::query_as(
            "INSERT INTO subscriptions \
                (id, user_id, provider_subscription_id, plan_name, status, \
                 current_period_start, current_period_end) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (provider_subscription_id) DO UPDATE SET \
                plan_name = EXCLUDED.plan_name, \
                status = EXCLUDED.status, \
                current_period_start = EXCLUDED.current_period_start, \
                current_period_end = EXCLUDED.current_period_end, \
                updated_at = now() \
             RETURNING id, user_id, provider_subscription_id, plan_name, status, \
                 current_period_start, current_period_end, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(sub.user_id)
        .bind(&sub.provider_subscription_id)
        .bind(&sub.plan_name)
        .bind(&sub.status)
        .bind(sub.current_period_start)
        .bind(sub.current_period_end)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(record.to_domain())
    }
}
