//! End-to-end flows over the assembled router, backed by the in-memory store
//! and stub provider adapters.

use api_lib::config::Config;
use api_lib::web::{api_router, state::AppState};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::Engine;
use hmac::{Hmac, Mac};
use promptdeck_core::memory::MemoryDb;
use promptdeck_core::ports::{
    BillingProduct, BillingService, CheckoutRequest, CheckoutSession, CheckoutStatus,
    CompletionRequest, CompletionService, ExternalServiceError, PortError, PortResult,
    PortalSession,
};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

const JWT_SECRET: &str = "integration-test-secret";
const WEBHOOK_SECRET: &str = "whsec_dGVzdC1zZWNyZXQta2V5LWZvci1obWFj";

//=========================================================================================
// Stub Adapters
//=========================================================================================

/// Completion stub: echoes a fixed response after an optional delay.
struct StubCompletion {
    delay: Duration,
    fail: bool,
}

#[async_trait]
impl CompletionService for StubCompletion {
    async fn generate(&self, request: CompletionRequest) -> PortResult<String> {
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(PortError::External(ExternalServiceError::Other(
                "stubbed outage".to_string(),
            )));
        }
        Ok(format!("GENERATED: {}", request.prompt_text))
    }
}

struct StubBilling;

#[async_trait]
impl BillingService for StubBilling {
    async fn create_checkout(&self, _request: CheckoutRequest) -> PortResult<CheckoutSession> {
        Ok(CheckoutSession {
            checkout_id: "co_stub".to_string(),
            checkout_url: "https://billing.example/checkout/co_stub".to_string(),
        })
    }

    async fn get_checkout(&self, checkout_id: &str) -> PortResult<CheckoutStatus> {
        if checkout_id != "co_stub" {
            return Err(PortError::NotFound("checkout lookup".to_string()));
        }
        Ok(CheckoutStatus {
            checkout_id: checkout_id.to_string(),
            status: "succeeded".to_string(),
            checkout_url: Some("https://billing.example/checkout/co_stub".to_string()),
        })
    }

    async fn create_customer_portal(&self, customer_id: &str) -> PortResult<PortalSession> {
        Ok(PortalSession {
            portal_url: format!("https://billing.example/portal/{customer_id}"),
        })
    }

    async fn list_products(&self) -> PortResult<Vec<BillingProduct>> {
        Ok(vec![BillingProduct {
            id: "prod_pro".to_string(),
            name: "Pro".to_string(),
            description: Some("Premium plan".to_string()),
        }])
    }
}

//=========================================================================================
// Harness
//=========================================================================================

fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        jwt_secret: JWT_SECRET.to_string(),
        jwt_ttl_minutes: 30,
        openai_api_key: None,
        openai_model: "gpt-4".to_string(),
        completion_max_tokens: 2000,
        completion_temperature: 0.7,
        completion_timeout_seconds: 120,
        billing_access_token: None,
        billing_webhook_secret: WEBHOOK_SECRET.to_string(),
        billing_sandbox: true,
        billing_timeout_seconds: 30,
        allowed_origins: vec![],
    }
}

fn build_router(completion: StubCompletion) -> Router {
    let state = Arc::new(AppState {
        db: Arc::new(MemoryDb::new()),
        completion_adapter: Arc::new(completion),
        billing_adapter: Arc::new(StubBilling),
        config: Arc::new(test_config()),
    });
    api_router(state)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// Registers an account and returns its bearer token.
async fn register_and_login(router: &Router, email: &str) -> String {
    let (status, _) = send(
        router,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({"email": email, "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        router,
        json_request(
            "POST",
            "/auth/token",
            None,
            json!({"email": email, "password": "hunter2-hunter2"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn create_project(router: &Router, token: &str, name: &str) -> String {
    let (status, body) = send(
        router,
        json_request("POST", "/projects", Some(token), json!({"name": name})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn create_prompt(router: &Router, token: &str, project_id: &str, text: &str) -> String {
    let (status, body) = send(
        router,
        json_request(
            "POST",
            &format!("/projects/{project_id}/prompts"),
            Some(token),
            json!({"prompt_text": text}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn poll_until_terminal(router: &Router, token: &str, prompt_id: &str) -> String {
    for _ in 0..50 {
        let (status, body) = send(
            router,
            empty_request("GET", &format!("/prompts/{prompt_id}/status"), Some(token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let current = body["status"].as_str().unwrap().to_string();
        if current == "completed" || current == "failed" {
            return current;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("prompt never reached a terminal status");
}

//=========================================================================================
// Flows
//=========================================================================================

#[tokio::test]
async fn register_create_process_poll_flow() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "flow@example.com").await;
    let project_id = create_project(&router, &token, "launch plan").await;
    let prompt_id = create_prompt(&router, &token, &project_id, "write a readme").await;

    let (status, body) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/process"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");

    let terminal = poll_until_terminal(&router, &token, &prompt_id).await;
    assert_eq!(terminal, "completed");

    let (status, body) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generated_content"], "GENERATED: write a readme");
    assert!(body["generated_at"].is_string());

    // The completion overwrote the original content, so exactly one version
    // exists and it holds the pre-overwrite pair.
    let (status, body) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}/versions"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let versions = body.as_array().unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0]["version_number"], 1);
    assert_eq!(versions[0]["prompt_text"], "write a readme");
    assert!(versions[0]["generated_content"].is_null());
}

#[tokio::test]
async fn processing_twice_conflicts() {
    let router = build_router(StubCompletion {
        delay: Duration::from_secs(30),
        fail: false,
    });
    let token = register_and_login(&router, "conflict@example.com").await;
    let project_id = create_project(&router, &token, "p").await;
    let prompt_id = create_prompt(&router, &token, &project_id, "slow one").await;

    let (status, _) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/process"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/process"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn provider_failure_marks_prompt_failed() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: true,
    });
    let token = register_and_login(&router, "fail@example.com").await;
    let project_id = create_project(&router, &token, "p").await;
    let prompt_id = create_prompt(&router, &token, &project_id, "doomed").await;

    let (status, _) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/process"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let terminal = poll_until_terminal(&router, &token, &prompt_id).await;
    assert_eq!(terminal, "failed");

    // No generated content arrived, so nothing was versioned.
    let (_, body) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}/versions"), Some(&token)),
    )
    .await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn ownership_is_enforced_across_accounts() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let owner = register_and_login(&router, "owner@example.com").await;
    let intruder = register_and_login(&router, "intruder@example.com").await;
    let project_id = create_project(&router, &owner, "private").await;
    let prompt_id = create_prompt(&router, &owner, &project_id, "secret sauce").await;

    let (status, _) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}"), Some(&intruder)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        empty_request("GET", &format!("/projects/{project_id}"), Some(&intruder)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn share_link_grants_public_read_access() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "sharer@example.com").await;
    let project_id = create_project(&router, &token, "public stuff").await;
    let prompt_id = create_prompt(&router, &token, &project_id, "share me").await;

    let (status, body) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/share"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let share_token = body["share_token"].as_str().unwrap().to_string();

    // Minting again returns the same token.
    let (_, body) = send(
        &router,
        empty_request("POST", &format!("/prompts/{prompt_id}/share"), Some(&token)),
    )
    .await;
    assert_eq!(body["share_token"], share_token.as_str());

    // Anyone holding the token reads the prompt without credentials.
    let (status, body) = send(
        &router,
        empty_request("GET", &format!("/share/{share_token}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt_text"], "share me");
    assert!(body.get("user_id").is_none());

    let (status, _) = send(&router, empty_request("GET", "/share/garbage", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_answers_with_the_removed_resource() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "cleaner@example.com").await;
    let project_id = create_project(&router, &token, "doomed project").await;
    let prompt_id = create_prompt(&router, &token, &project_id, "doomed prompt").await;

    let (status, body) = send(
        &router,
        empty_request("DELETE", &format!("/prompts/{prompt_id}"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], prompt_id.as_str());
    assert_eq!(body["prompt_text"], "doomed prompt");

    let (status, _) = send(
        &router,
        empty_request("GET", &format!("/prompts/{prompt_id}"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &router,
        empty_request("DELETE", &format!("/projects/{project_id}"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], project_id.as_str());
    assert_eq!(body["name"], "doomed project");

    let (status, _) = send(
        &router,
        empty_request("GET", &format!("/projects/{project_id}"), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//=========================================================================================
// Billing Webhook
//=========================================================================================

fn sign_webhook(id: &str, timestamp: &str, body: &str) -> String {
    let key = base64::engine::general_purpose::STANDARD
        .decode(WEBHOOK_SECRET.strip_prefix("whsec_").unwrap())
        .unwrap();
    let mut mac = Hmac::<Sha256>::new_from_slice(&key).unwrap();
    mac.update(format!("{id}.{timestamp}.{body}").as_bytes());
    format!(
        "v1,{}",
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    )
}

fn webhook_request(body: String, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/billing/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("webhook-id", "msg_1")
        .header("webhook-timestamp", "1720000000")
        .header("webhook-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn signed_subscription_event_grants_premium() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "payer@example.com").await;

    let (_, me) = send(&router, empty_request("GET", "/users/me", Some(&token))).await;
    assert_eq!(me["is_premium"], false);
    let user_id = me["id"].as_str().unwrap().to_string();

    let body = json!({
        "type": "subscription.created",
        "data": {
            "id": "sub_42",
            "status": "active",
            "customer_id": "cus_42",
            "customer": {"id": "cus_42", "external_id": user_id},
            "product": {"name": "pro"}
        }
    })
    .to_string();
    let signature = sign_webhook("msg_1", "1720000000", &body);

    let (status, _) = send(&router, webhook_request(body, &signature)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, me) = send(&router, empty_request("GET", "/users/me", Some(&token))).await;
    assert_eq!(me["is_premium"], true);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_before_processing() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "victim@example.com").await;
    let (_, me) = send(&router, empty_request("GET", "/users/me", Some(&token))).await;
    let user_id = me["id"].as_str().unwrap().to_string();

    let body = json!({
        "type": "subscription.created",
        "data": {
            "id": "sub_evil",
            "status": "active",
            "customer": {"id": "cus_evil", "external_id": user_id}
        }
    })
    .to_string();

    let (status, _) = send(&router, webhook_request(body, "v1,Zm9yZ2VkCg==")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, me) = send(&router, empty_request("GET", "/users/me", Some(&token))).await;
    assert_eq!(me["is_premium"], false);
}

#[tokio::test]
async fn checkout_endpoint_returns_provider_session() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "shopper@example.com").await;

    let (status, body) = send(
        &router,
        json_request(
            "POST",
            "/billing/checkout",
            Some(&token),
            json!({"product_id": "prod_pro"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_id"], "co_stub");
    assert_eq!(
        body["checkout_url"],
        "https://billing.example/checkout/co_stub"
    );

    // The session can be looked up afterwards.
    let (status, body) = send(
        &router,
        empty_request("GET", "/billing/checkout/co_stub", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checkout_id"], "co_stub");
    assert_eq!(body["status"], "succeeded");

    let (status, _) = send(
        &router,
        empty_request("GET", "/billing/checkout/co_unknown", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&router, empty_request("GET", "/billing/checkout/co_stub", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn product_list_is_public() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });

    let (status, body) = send(&router, empty_request("GET", "/billing/products", None)).await;
    assert_eq!(status, StatusCode::OK);
    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["id"], "prod_pro");
    assert_eq!(products[0]["name"], "Pro");
}

#[tokio::test]
async fn customer_portal_requires_a_linked_billing_customer() {
    let router = build_router(StubCompletion {
        delay: Duration::ZERO,
        fail: false,
    });
    let token = register_and_login(&router, "subscriber@example.com").await;

    // No billing customer linked yet.
    let (status, _) = send(
        &router,
        empty_request("POST", "/billing/portal", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // A signed subscription event links the customer id.
    let (_, me) = send(&router, empty_request("GET", "/users/me", Some(&token))).await;
    let user_id = me["id"].as_str().unwrap().to_string();
    let body = json!({
        "type": "subscription.created",
        "data": {
            "id": "sub_77",
            "status": "active",
            "customer": {"id": "cus_77", "external_id": user_id}
        }
    })
    .to_string();
    let signature = sign_webhook("msg_1", "1720000000", &body);
    let (status, _) = send(&router, webhook_request(body, &signature)).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(
        &router,
        empty_request("POST", "/billing/portal", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["portal_url"], "https://billing.example/portal/cus_77");
}
