//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use promptdeck_core::ports::{BillingService, CompletionService, DatabaseService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub completion_adapter: Arc<dyn CompletionService>,
    pub billing_adapter: Arc<dyn BillingService>,
    pub config: Arc<Config>,
}
