//! crates/promptdeck_core/src/share.rs
//!
//! The share publisher: mints opaque tokens that grant unauthenticated,
//! read-only access to exactly one prompt.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::Prompt;
use crate::lifecycle::validate_project_ownership;
use crate::ports::{DatabaseService, PortError, PortResult};

/// How many fresh tokens to try when an insert reports a uniqueness conflict.
/// Tokens carry 122 random bits, so a second attempt is already unlikely to be
/// needed.
const MINT_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct SharePublisher {
    db: Arc<dyn DatabaseService>,
}

impl SharePublisher {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Returns the prompt's share token, minting one on first call.
    ///
    /// Idempotent: a prompt that already carries a token gets the same token
    /// back unchanged. Requires ownership of the prompt's parent project.
    pub async fn create_link(&self, prompt_id: Uuid, user_id: Uuid) -> PortResult<String> {
        let prompt = self
            .db
            .get_prompt(prompt_id)
            .await?
            .ok_or_else(|| PortError::NotFound("Prompt not found".to_string()))?;

        validate_project_ownership(self.db.as_ref(), prompt.project_id, user_id).await?;

        if let Some(token) = prompt.share_token {
            return Ok(token);
        }

        let mut last_err = None;
        for _ in 0..MINT_ATTEMPTS {
            let token = Uuid::new_v4().simple().to_string();
            match self.db.set_share_token(prompt_id, &token).await {
                Ok(()) => return Ok(token),
                Err(PortError::Conflict(_)) => {
                    last_err = Some(PortError::Conflict("Share token collision".to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            PortError::Unexpected("Failed to mint a share token".to_string())
        }))
    }

    /// Public lookup by exact token. Malformed and unknown tokens are
    /// indistinguishable: both are a uniform `NotFound`.
    pub async fn resolve(&self, token: &str) -> PortResult<Prompt> {
        self.db
            .find_prompt_by_share_token(token)
            .await?
            .ok_or_else(|| {
                PortError::NotFound("Shared prompt not found or token is invalid".to_string())
            })
    }
}
