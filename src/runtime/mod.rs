//! Model runtime boundary
//!
//! The engine drives a loaded model exclusively through the [`ModelRuntime`]
//! trait. The numerical kernel (llama.cpp or otherwise) lives behind it and
//! is supplied by the embedding host; this crate only defines the contract
//! it requires.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::types::config::{EngineConfig, GenerationParams};

/// Parameters handed to the runtime at load time
#[derive(Debug, Clone)]
pub struct RuntimeParams {
    /// Context window size in tokens
    pub context_size: u32,
    /// Worker threads
    pub threads: u32,
    /// Number of GPU layers to offload
    pub gpu_layers: u32,
    /// Prompt processing batch size
    pub batch_size: u32,
}

impl From<&EngineConfig> for RuntimeParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            context_size: config.context_size,
            threads: config.threads,
            gpu_layers: config.gpu_layers,
            batch_size: config.batch_size,
        }
    }
}

/// Errors raised by the model runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

/// Capability contract for a locally-hosted text-generation backend.
///
/// Implementations maintain internal state (KV cache) that is not safe for
/// concurrent use, so callers hold the [`SharedRuntime`] lock for the full
/// duration of a generation.
#[async_trait]
pub trait ModelRuntime: Send {
    /// Load the model at `path` into memory.
    async fn load(&mut self, path: &Path, params: &RuntimeParams) -> Result<(), RuntimeError>;

    /// Whether a model is currently loaded.
    fn is_loaded(&self) -> bool;

    /// Drop the loaded model and release its resources.
    fn unload(&mut self);

    /// Run a prompt to completion and return the generated text.
    async fn complete(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, RuntimeError>;

    /// Run a prompt, sending each token chunk through `tokens` as it is
    /// produced, and return the full text handed to the channel.
    ///
    /// A failed send means the consumer stopped pulling: the runtime must
    /// stop decoding and return the text delivered so far.
    async fn complete_streaming(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        tokens: mpsc::Sender<String>,
    ) -> Result<String, RuntimeError>;
}

/// The single exclusively-held runtime handle shared by all sessions.
pub type SharedRuntime = Arc<Mutex<Box<dyn ModelRuntime>>>;

/// Wrap a runtime implementation into a [`SharedRuntime`].
pub fn shared(runtime: impl ModelRuntime + 'static) -> SharedRuntime {
    Arc::new(Mutex::new(Box::new(runtime)))
}
