pub mod billing;
pub mod completion_llm;
pub mod db;

pub use billing::{verify_webhook_signature, PolarBillingAdapter};
pub use completion_llm::OpenAiCompletionAdapter;
pub use db::DbAdapter;
