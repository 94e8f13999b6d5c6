//! Conversation session engine
//!
//! Coordinates one client's exchanges with the model runtime: prompt
//! assembly, blocking or streaming generation, and history and metrics
//! bookkeeping.

pub mod stream;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::EngineError;
use crate::language;
use crate::metrics::{tokens_per_second, MetricsRecorder, MetricsSnapshot};
use crate::prompt::PromptBuilder;
use crate::runtime::SharedRuntime;
use crate::session::stream::GenerationStream;
use crate::types::config::{EngineConfig, GenerationParams};
use crate::types::message::{GenerationStats, Message, Role};

/// Channel capacity for streamed token chunks.
const STREAM_BUFFER: usize = 32;

/// Marker prefix recorded in history when the runtime fails mid-turn.
const ERROR_MARKER: &str = "[generation error]";

/// Called by the stream producer once the assistant turn is recorded.
pub type CompletionHook = Box<dyn FnOnce(&GenerationStats) + Send + 'static>;

/// A completed generation, possibly degraded by a runtime failure.
///
/// Serializes with the wire field names a host binding exposes directly:
/// `response`, `tokens_generated`, `model` and an optional `error`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    /// Generated text, or a substitute message when `error` is set
    #[serde(rename = "response")]
    pub text: String,
    /// Stats for this generation
    #[serde(flatten)]
    pub stats: GenerationStats,
    /// Display name of the serving model
    pub model: String,
    /// Set when the runtime failed and `text` is a substitute message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives one client's conversation against the shared model runtime.
///
/// History is owned by the session and only ever appended to; the shared
/// runtime handle serializes generations across all sessions.
pub struct SessionEngine {
    id: Uuid,
    config: EngineConfig,
    prompt: PromptBuilder,
    runtime: SharedRuntime,
    metrics: Arc<MetricsRecorder>,
    history: Arc<Mutex<Vec<Message>>>,
}

impl SessionEngine {
    pub fn new(config: EngineConfig, runtime: SharedRuntime, metrics: Arc<MetricsRecorder>) -> Self {
        let prompt = PromptBuilder::new(config.system_prompt.clone(), config.history_window);
        let id = Uuid::new_v4();
        debug!(session = %id, "session created");
        Self {
            id,
            config,
            prompt,
            runtime,
            metrics,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generate a reply to `input`, blocking until the runtime finishes.
    ///
    /// Appends the user turn and the assistant turn to history, in that
    /// order. A runtime failure is captured as a degraded response: the
    /// assistant turn carries an error marker, `error` is set, and history
    /// still grows by exactly two turns so the audit trail stays complete.
    pub async fn generate(
        &self,
        input: &str,
        params: &GenerationParams,
    ) -> Result<GenerationResponse, EngineError> {
        validate_input(input)?;
        params.validate()?;

        let mut rt = self.runtime.lock().await;
        if !rt.is_loaded() {
            return Err(EngineError::ModelNotLoaded);
        }

        let prompt = {
            let history = self.history.lock().expect("history lock poisoned");
            self.prompt.format(&history, input)
        };
        self.push(Message::new(Role::User, input));

        let started = Instant::now();
        let result = rt.complete(&prompt, params).await;
        let elapsed = started.elapsed().as_secs_f64();

        let (text, error) = match result {
            Ok(text) => (text.trim().to_string(), None),
            Err(e) => {
                error!(session = %self.id, "generation failed: {e}");
                (format!("{ERROR_MARKER} {e}"), Some(e.to_string()))
            }
        };

        let tokens = if error.is_none() {
            estimate_tokens(&text)
        } else {
            0
        };
        let stats = GenerationStats {
            tokens_generated: tokens,
            generation_time: elapsed,
            tokens_per_second: tokens_per_second(tokens, elapsed),
        };
        self.metrics.record(tokens, elapsed);
        self.push(Message::assistant(text.clone(), stats));
        debug!(session = %self.id, tokens, "generation finished in {elapsed:.2}s");

        Ok(GenerationResponse {
            text,
            stats,
            model: self.config.model_name.clone(),
            error,
        })
    }

    /// Start a streaming generation.
    ///
    /// The returned stream yields token chunks paired with running
    /// metrics. Whether the caller drains the stream or drops it early,
    /// the text it actually consumed is recorded as the assistant turn,
    /// and `on_done` (if any) runs after that bookkeeping completes.
    pub async fn stream(
        &self,
        input: &str,
        params: &GenerationParams,
        on_done: Option<CompletionHook>,
    ) -> Result<GenerationStream, EngineError> {
        validate_input(input)?;
        params.validate()?;
        if !self.runtime.lock().await.is_loaded() {
            return Err(EngineError::ModelNotLoaded);
        }

        let prompt = {
            let history = self.history.lock().expect("history lock poisoned");
            self.prompt.format(&history, input)
        };
        self.push(Message::new(Role::User, input));

        let (chunk_tx, chunk_rx) = mpsc::channel(STREAM_BUFFER);
        let (report_tx, report_rx) = oneshot::channel();
        let stream = GenerationStream::new(chunk_rx, report_tx);

        let runtime = Arc::clone(&self.runtime);
        let history = Arc::clone(&self.history);
        let metrics = Arc::clone(&self.metrics);
        let params = params.clone();
        let session = self.id;
        tokio::spawn(async move {
            let started = Instant::now();
            let result = {
                let mut rt = runtime.lock().await;
                rt.complete_streaming(&prompt, &params, chunk_tx).await
            };
            let elapsed = started.elapsed().as_secs_f64();

            if let Err(e) = &result {
                error!(session = %session, "streaming generation failed: {e}");
            }

            // The consumer reports what it actually saw, on exhaustion or
            // drop, whichever comes first.
            let outcome = report_rx.await.unwrap_or_default();

            let (text, tokens) = if outcome.text.is_empty() {
                match result {
                    Err(e) => (format!("{ERROR_MARKER} {e}"), 0),
                    Ok(_) => (String::new(), 0),
                }
            } else {
                (outcome.text, outcome.tokens)
            };

            let stats = GenerationStats {
                tokens_generated: tokens,
                generation_time: elapsed,
                tokens_per_second: tokens_per_second(tokens, elapsed),
            };
            metrics.record(tokens, elapsed);
            history
                .lock()
                .expect("history lock poisoned")
                .push(Message::assistant(text, stats));
            debug!(session = %session, tokens, "stream finished in {elapsed:.2}s");

            if let Some(hook) = on_done {
                hook(&stats);
            }
        });

        Ok(stream)
    }

    /// Chronological snapshot of the last `limit` turns, or all of them.
    pub fn history(&self, limit: Option<usize>) -> Vec<Message> {
        let history = self.history.lock().expect("history lock poisoned");
        match limit {
            Some(n) => history[history.len().saturating_sub(n)..].to_vec(),
            None => history.clone(),
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().expect("history lock poisoned").len()
    }

    /// Truncate conversation history. Metrics are unaffected.
    pub fn clear_history(&self) {
        self.history.lock().expect("history lock poisoned").clear();
        debug!(session = %self.id, "history cleared");
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Best-effort syntax-highlight hint for `code`.
    pub fn detect_language(&self, code: &str) -> &'static str {
        language::detect_language(code)
    }

    /// Markdown code fence with a detected or supplied language tag.
    pub fn format_code_block(&self, code: &str, language_hint: Option<&str>) -> String {
        language::format_code_block(code, language_hint)
    }

    fn push(&self, message: Message) {
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(message);
    }
}

fn validate_input(input: &str) -> Result<(), EngineError> {
    if input.trim().is_empty() {
        return Err(EngineError::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Whitespace token estimate for non-streaming completions, where the
/// runtime reports no per-token count.
pub(crate) fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::MockRuntime;
    use crate::runtime::shared;

    fn engine(mock: MockRuntime) -> SessionEngine {
        SessionEngine::new(
            EngineConfig::default(),
            shared(mock),
            Arc::new(MetricsRecorder::new()),
        )
    }

    fn done_hook() -> (CompletionHook, oneshot::Receiver<GenerationStats>) {
        let (tx, rx) = oneshot::channel();
        let hook: CompletionHook = Box::new(move |stats| {
            let _ = tx.send(*stats);
        });
        (hook, rx)
    }

    #[tokio::test]
    async fn test_generate_appends_user_and_assistant_turns() {
        let engine = engine(MockRuntime::with_chunks(&["Hello", " world"]));
        let response = engine
            .generate("hi there", &GenerationParams::default())
            .await
            .unwrap();

        assert_eq!(response.text, "Hello world");
        assert!(response.error.is_none());
        assert_eq!(response.stats.tokens_generated, 2);

        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hi there");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "Hello world");
        assert!(history[1].stats.is_some());

        assert_eq!(engine.metrics().total_requests, 1);
        assert_eq!(engine.metrics().total_tokens_generated, 2);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_degraded_not_fatal() {
        let engine = engine(MockRuntime::failing("backend exploded"));
        let response = engine
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap();

        assert!(response.error.is_some());
        assert!(response.text.starts_with(ERROR_MARKER));
        assert_eq!(response.stats.tokens_generated, 0);

        // History still grows by exactly two turns.
        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert!(history[1].content.contains("backend exploded"));
    }

    #[tokio::test]
    async fn test_unloaded_runtime_is_a_hard_error() {
        let engine = engine(MockRuntime::unloaded());
        let err = engine
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelNotLoaded));
        assert_eq!(engine.history_len(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_rejected_before_history() {
        let engine = engine(MockRuntime::with_chunks(&["x"]));

        let err = engine
            .generate("   ", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));

        let params = GenerationParams {
            temperature: 9.0,
            ..GenerationParams::default()
        };
        let err = engine.generate("hi", &params).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));

        assert_eq!(engine.history_len(), 0);
    }

    #[tokio::test]
    async fn test_stream_full_consumption() {
        let engine = engine(MockRuntime::with_chunks(&["one ", "two ", "three"]));
        let (hook, done) = done_hook();

        let mut stream = engine
            .stream("count", &GenerationParams::default(), Some(hook))
            .await
            .unwrap();

        let mut tokens = 0;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            tokens += 1;
            assert_eq!(chunk.tokens_so_far, tokens);
            text.push_str(&chunk.text);
        }
        assert_eq!(text, "one two three");

        let stats = done.await.unwrap();
        assert_eq!(stats.tokens_generated, 3);

        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "one two three");
        assert_eq!(engine.metrics().total_requests, 1);
    }

    #[tokio::test]
    async fn test_stream_abandonment_records_consumed_prefix() {
        let engine = engine(MockRuntime::with_chunks(&["a", "b", "c", "d", "e"]));
        let (hook, done) = done_hook();

        let mut stream = engine
            .stream("go", &GenerationParams::default(), Some(hook))
            .await
            .unwrap();

        for _ in 0..3 {
            stream.next().await.unwrap();
        }
        drop(stream);

        let stats = done.await.unwrap();
        assert_eq!(stats.tokens_generated, 3);

        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "abc");
    }

    #[tokio::test]
    async fn test_stream_runtime_failure_records_error_marker() {
        let engine = engine(MockRuntime::failing("gpu fell off"));
        let (hook, done) = done_hook();

        let stream = engine
            .stream("go", &GenerationParams::default(), Some(hook))
            .await
            .unwrap();
        let text = stream.collect().await;
        assert!(text.is_empty());

        done.await.unwrap();
        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert!(history[1].content.contains("gpu fell off"));
    }

    #[tokio::test]
    async fn test_clear_history_keeps_metrics() {
        let engine = engine(MockRuntime::with_chunks(&["ok"]));
        engine
            .generate("hi", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(engine.history_len(), 2);

        engine.clear_history();
        assert_eq!(engine.history_len(), 0);
        assert_eq!(engine.metrics().total_requests, 1);
    }

    #[tokio::test]
    async fn test_history_limit_returns_most_recent_in_order() {
        let engine = engine(MockRuntime::with_chunks(&["r"]));
        for i in 0..3 {
            engine
                .generate(&format!("q{i}"), &GenerationParams::default())
                .await
                .unwrap();
        }

        let tail = engine.history(Some(2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].role, Role::User);
        assert_eq!(tail[0].content, "q2");
        assert_eq!(tail[1].role, Role::Assistant);
    }

    #[test]
    fn test_response_wire_shape() {
        let response = GenerationResponse {
            text: "hello".to_string(),
            stats: GenerationStats {
                tokens_generated: 1,
                generation_time: 0.1,
                tokens_per_second: 10.0,
            },
            model: "EmberLM-v1".to_string(),
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["response"], "hello");
        assert_eq!(json["tokens_generated"], 1);
        assert_eq!(json["model"], "EmberLM-v1");
        assert!(json.get("error").is_none());
    }
}
