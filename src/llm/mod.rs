//! Text-transformation services: the chat client, dialect rewriting and
//! tone classification.

mod classifier;
mod client;
mod rewriter;
pub mod structured;

pub use classifier::{ToneCategory, ToneClassifier};
pub use client::{ChatClient, ChatClientConfig, ChatRequest, LlmError, TextService};
pub use rewriter::{DialectRewriter, RewriteOutcome, RewriterConfig, VALIDATION_KEY};
