//! EmberLM Library
//!
//! Transport-agnostic session engine for a locally-hosted text-generation
//! model: prompt assembly from rolling conversation history, blocking and
//! streaming generation against a pluggable model runtime, rolling
//! performance metrics, and per-client usage quotas.

pub mod error;
pub mod language;
pub mod metrics;
pub mod prompt;
pub mod quota;
pub mod runtime;
pub mod service;
pub mod session;
pub mod types;

pub use error::EngineError;
pub use metrics::{MetricsRecorder, MetricsSnapshot};
pub use prompt::PromptBuilder;
pub use quota::{Admission, DenyReason, UsageGovernor, UsageLimits};
pub use runtime::{ModelRuntime, RuntimeError, RuntimeParams, SharedRuntime};
pub use service::{InferenceService, ModelInfo};
pub use session::stream::{GenerationStream, StreamChunk};
pub use session::{CompletionHook, GenerationResponse, SessionEngine};
pub use types::config::{EngineConfig, GenerationParams};
pub use types::message::{GenerationStats, Message, Role};
