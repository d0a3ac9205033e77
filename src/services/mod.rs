// Veraz Core Services

pub mod authenticity;
pub mod config_store;
pub mod prompts;
pub mod providers;

pub use authenticity::{AuthenticityService, RetryPolicy};
pub use config_store::*;
pub use providers::{
    ContentFilter, HttpModelAdapter, InvocationConfig, ModelAdapter, ModelInvocation,
    ProviderKind, RawReply, ResponseFormat,
};
