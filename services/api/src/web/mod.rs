//! services/api/src/web/mod.rs
//!
//! The web layer: route handlers, auth middleware, router assembly, and the
//! master OpenAPI definition.

pub mod auth;
pub mod billing;
pub mod completion_task;
pub mod middleware;
pub mod projects;
pub mod prompts;
pub mod share;
pub mod state;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::token_handler,
        auth::me_handler,
        projects::create_project_handler,
        projects::list_projects_handler,
        projects::get_project_handler,
        projects::update_project_handler,
        projects::delete_project_handler,
        prompts::create_prompt_handler,
        prompts::list_prompts_handler,
        prompts::get_prompt_handler,
        prompts::update_prompt_handler,
        prompts::delete_prompt_handler,
        prompts::process_prompt_handler,
        prompts::prompt_status_handler,
        prompts::list_versions_handler,
        share::create_share_link_handler,
        share::shared_prompt_handler,
        billing::create_checkout_handler,
        billing::checkout_status_handler,
        billing::customer_portal_handler,
        billing::list_products_handler,
        billing::billing_webhook_handler,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::TokenRequest,
        auth::TokenResponse,
        auth::UserResponse,
        projects::ProjectCreateRequest,
        projects::ProjectUpdateRequest,
        projects::ProjectResponse,
        prompts::PromptCreateRequest,
        prompts::PromptUpdateRequest,
        prompts::PromptResponse,
        prompts::PromptStatusResponse,
        prompts::PromptVersionResponse,
        share::ShareLinkResponse,
        share::SharedPromptResponse,
        billing::CheckoutCreateRequest,
        billing::CheckoutCreateResponse,
        billing::CheckoutStatusResponse,
        billing::CustomerPortalResponse,
        billing::ProductResponse,
        billing::WebhookAck,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "PromptDeck API", description = "Project and prompt management with background completion generation.")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

//=========================================================================================
// Router Assembly
//=========================================================================================

/// Builds the full application router: the public surface, the bearer-guarded
/// surface, and the CORS layer derived from configuration.
pub fn api_router(app_state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/token", post(auth::token_handler))
        .route("/share/{token}", get(share::shared_prompt_handler))
        .route("/billing/webhook", post(billing::billing_webhook_handler))
        .route("/billing/products", get(billing::list_products_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/users/me", get(auth::me_handler))
        .route(
            "/projects",
            post(projects::create_project_handler).get(projects::list_projects_handler),
        )
        .route(
            "/projects/{project_id}",
            get(projects::get_project_handler)
                .put(projects::update_project_handler)
                .delete(projects::delete_project_handler),
        )
        .route(
            "/projects/{project_id}/prompts",
            post(prompts::create_prompt_handler).get(prompts::list_prompts_handler),
        )
        .route(
            "/prompts/{prompt_id}",
            get(prompts::get_prompt_handler)
                .put(prompts::update_prompt_handler)
                .delete(prompts::delete_prompt_handler),
        )
        .route(
            "/prompts/{prompt_id}/process",
            post(prompts::process_prompt_handler),
        )
        .route(
            "/prompts/{prompt_id}/status",
            get(prompts::prompt_status_handler),
        )
        .route(
            "/prompts/{prompt_id}/versions",
            get(prompts::list_versions_handler),
        )
        .route(
            "/prompts/{prompt_id}/share",
            post(share::create_share_link_handler),
        )
        .route("/billing/checkout", post(billing::create_checkout_handler))
        .route(
            "/billing/checkout/{checkout_id}",
            get(billing::checkout_status_handler),
        )
        .route("/billing/portal", post(billing::customer_portal_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state)
}
