//! Completion-provider contract for relaycrm AI workflow nodes.
//!
//! The workflow engine's AI nodes depend on the narrow contract defined
//! here: entitlement checking plus single-shot completion with token and
//! cost accounting. Provider implementations live in the surrounding
//! application.

pub mod error;
pub mod provider;

pub use error::AiError;
pub use provider::{Completion, CompletionProvider, CompletionRequest, MockCompletionProvider};
