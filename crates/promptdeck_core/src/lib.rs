pub mod billing;
pub mod domain;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod projects;
pub mod share;

pub use domain::{
    NewProject, NewPrompt, NewSubscription, Project, ProjectPatch, Prompt, PromptPatch,
    PromptStatus, PromptVersion, Subscription, User, UserCredentials,
};
pub use lifecycle::{sanitize_prompt_text, PromptLifecycle};
pub use ports::{
    BillingService, CheckoutRequest, CheckoutSession, CompletionRequest, CompletionService,
    DatabaseService, ExternalServiceError, PortError, PortResult,
};
pub use share::SharePublisher;
