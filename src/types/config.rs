//! Configuration types
//!
//! Engine configuration and per-request generation parameters.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::prompt::DEFAULT_HISTORY_WINDOW;

/// Default identity preamble prepended to every prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are EmberLM, a fast, lightweight AI coding assistant running on local hardware.

Your core capabilities:
- Write correct, efficient code in Python, JavaScript, TypeScript, C++, Rust, Go, Java, Bash and more
- Explain code and programming concepts clearly and concisely
- Help debug, review and optimize existing code
- Answer general programming questions

When responding:
1. Prefer direct, runnable code
2. Fence code blocks with the right language tag
3. Keep explanations short and concrete
4. Point out pitfalls and better alternatives where relevant

You identify yourself as \"EmberLM\" when asked.
";

/// Engine configuration
///
/// Covers the model handed to the runtime, prompt assembly, and the
/// default sampling parameters for requests that omit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the model file handed to the runtime
    pub model_path: String,
    /// Display name reported in responses and status payloads
    pub model_name: String,
    /// Context window size in tokens
    pub context_size: u32,
    /// Worker threads for the runtime
    pub threads: u32,
    /// Number of GPU layers to offload (0 = CPU only)
    pub gpu_layers: u32,
    /// Prompt processing batch size
    pub batch_size: u32,
    /// Identity preamble prepended to every prompt
    pub system_prompt: String,
    /// Number of history turns included when building a prompt
    pub history_window: usize,
    /// Default sampling parameters
    pub defaults: GenerationParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: "models/emberlm-v1-q4_k_m.gguf".to_string(),
            model_name: "EmberLM-v1".to_string(),
            context_size: 2048,
            threads: 4,
            gpu_layers: 0,
            batch_size: 512,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_window: DEFAULT_HISTORY_WINDOW,
            defaults: GenerationParams::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from defaults plus `EMBERLM_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("EMBERLM_MODEL_PATH") {
            config.model_path = path;
        }
        if let Some(threads) = env_u32("EMBERLM_N_THREADS") {
            config.threads = threads;
        }
        if let Some(layers) = env_u32("EMBERLM_N_GPU_LAYERS") {
            config.gpu_layers = layers;
        }
        if let Some(batch) = env_u32("EMBERLM_N_BATCH") {
            config.batch_size = batch;
        }
        config
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Per-request sampling parameters
///
/// Constructed fresh per call and never mutated after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
    /// Top-p (nucleus sampling) threshold
    pub top_p: f32,
    /// Top-k sampling cutoff
    pub top_k: u32,
    /// Repetition penalty
    pub repeat_penalty: f32,
    /// Sequences that terminate generation
    pub stop: Vec<String>,
    /// Advisory flag for hosts that build requests from wire payloads
    #[serde(default)]
    pub stream: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.1,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            stop: vec!["<|endoftext|>".to_string(), "<|eot_id|>".to_string()],
            stream: false,
        }
    }
}

impl GenerationParams {
    /// Validate parameter ranges.
    ///
    /// Out-of-range values are rejected rather than clamped so caller
    /// mistakes surface instead of being silently corrected.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_tokens == 0 {
            return Err(EngineError::InvalidRequest(
                "max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EngineError::InvalidRequest(format!(
                "temperature {} out of range [0, 2]",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(EngineError::InvalidRequest(format!(
                "top_p {} out of range [0, 1]",
                self.top_p
            )));
        }
        if self.top_k == 0 {
            return Err(EngineError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }
        if self.repeat_penalty <= 0.0 {
            return Err(EngineError::InvalidRequest(format!(
                "repeat_penalty {} must be positive",
                self.repeat_penalty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.context_size, 2048);
        assert_eq!(config.gpu_layers, 0);
        assert_eq!(config.history_window, 8);
        assert!(config.system_prompt.contains("EmberLM"));
    }

    #[test]
    fn test_default_params() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 2048);
        assert_eq!(params.temperature, 0.1);
        assert_eq!(params.top_k, 40);
        assert!(params.stop.contains(&"<|eot_id|>".to_string()));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_reject_out_of_range() {
        let mut params = GenerationParams {
            temperature: 2.5,
            ..GenerationParams::default()
        };
        assert!(params.validate().is_err());

        params.temperature = -0.1;
        assert!(params.validate().is_err());

        params.temperature = 0.7;
        params.max_tokens = 0;
        assert!(params.validate().is_err());

        params.max_tokens = 128;
        params.top_p = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_reject_nan_temperature() {
        let params = GenerationParams {
            temperature: f32::NAN,
            ..GenerationParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.context_size, back.context_size);
        assert_eq!(config.defaults, back.defaults);
    }
}
