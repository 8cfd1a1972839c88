//! services/api/src/web/completion_task.rs
//!
//! The detached background task that generates completion content for a
//! prompt. Spawned by the process endpoint; never awaited by a request.

use promptdeck_core::domain::{PromptPatch, PromptStatus};
use promptdeck_core::lifecycle::PromptLifecycle;
use promptdeck_core::ports::CompletionRequest;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::web::state::AppState;

/// Calls the completion provider for a prompt already marked `processing`,
/// then persists the outcome.
///
/// Success stores the generated content and flips the status to `completed`
/// (versioning the overwritten content on the way). Any provider failure
/// flips the status to `failed`; a failure while persisting that terminal
/// state is logged and dropped, since there is no caller left to notify.
pub async fn generate_and_save_completion(
    state: Arc<AppState>,
    prompt_id: Uuid,
    user_id: Uuid,
    prompt_text: String,
) {
    let lifecycle = PromptLifecycle::new(state.db.clone());

    let request = CompletionRequest::new(prompt_text);
    let terminal_patch = match state.completion_adapter.generate(request).await {
        Ok(content) => {
            info!(%prompt_id, "completion generated");
            PromptPatch {
                generated_content: Some(content),
                status: Some(PromptStatus::Completed),
                ..Default::default()
            }
        }
        Err(e) => {
            error!(%prompt_id, "completion generation failed: {:?}", e);
            PromptPatch {
                status: Some(PromptStatus::Failed),
                ..Default::default()
            }
        }
    };

    if let Err(e) = lifecycle
        .update_prompt(prompt_id, terminal_patch, user_id)
        .await
    {
        error!(%prompt_id, "failed to persist completion outcome: {:?}", e);
    }
}
