//! Client-facing request surface
//!
//! Combines per-client sessions, the usage governor, process-global
//! metrics, and the shared model runtime behind the transport-agnostic
//! operations a host binding maps onto its routes.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::metrics::{MetricsRecorder, MetricsSnapshot};
use crate::quota::{Admission, DenyReason, UsageGovernor, UsageLimits};
use crate::runtime::{RuntimeParams, SharedRuntime};
use crate::session::stream::GenerationStream;
use crate::session::{CompletionHook, GenerationResponse, SessionEngine};
use crate::types::config::{EngineConfig, GenerationParams};
use crate::types::message::{GenerationStats, Message};

/// One tracked client: its session plus the gate that serializes the
/// admit, generate, record sequence so two concurrent requests cannot
/// both pass the same quota slice.
struct ClientSlot {
    engine: SessionEngine,
    gate: Arc<Mutex<()>>,
    last_used: std::sync::Mutex<DateTime<Utc>>,
}

impl ClientSlot {
    fn touch(&self) {
        *self.last_used.lock().expect("slot lock poisoned") = Utc::now();
    }

    fn last_seen(&self) -> DateTime<Utc> {
        *self.last_used.lock().expect("slot lock poisoned")
    }
}

/// Loaded-model summary for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub model_path: String,
    pub model_name: String,
    pub context_size: u32,
    pub metrics: MetricsSnapshot,
}

/// Transport-agnostic inference service keyed by client identifier.
///
/// Sessions are created lazily on first contact and share one runtime
/// handle and one metrics recorder.
pub struct InferenceService {
    config: EngineConfig,
    runtime: SharedRuntime,
    governor: Arc<UsageGovernor>,
    metrics: Arc<MetricsRecorder>,
    clients: DashMap<String, Arc<ClientSlot>>,
}

impl InferenceService {
    pub fn new(config: EngineConfig, runtime: SharedRuntime, limits: UsageLimits) -> Self {
        Self {
            config,
            runtime,
            governor: Arc::new(UsageGovernor::new(limits)),
            metrics: Arc::new(MetricsRecorder::new()),
            clients: DashMap::new(),
        }
    }

    /// Load the model described by the service config into the runtime.
    pub async fn load_model(&self) -> Result<(), EngineError> {
        let mut rt = self.runtime.lock().await;
        let params = RuntimeParams::from(&self.config);
        rt.load(Path::new(&self.config.model_path), &params).await?;
        info!(model = %self.config.model_name, "model loaded");
        Ok(())
    }

    /// Unload the model, releasing runtime resources.
    pub async fn unload_model(&self) {
        self.runtime.lock().await.unload();
        info!("model unloaded");
    }

    pub async fn is_loaded(&self) -> bool {
        self.runtime.lock().await.is_loaded()
    }

    /// Run one blocking generation for `client_id`.
    pub async fn generate(
        &self,
        client_id: &str,
        input: &str,
        params: &GenerationParams,
    ) -> Result<GenerationResponse, EngineError> {
        let slot = self.slot(client_id);
        slot.touch();
        let _gate = slot.gate.lock().await;

        if let Admission::Denied(reason) = self.governor.check_limit(client_id) {
            warn!(client = %client_id, %reason, "request denied");
            return Err(deny(reason));
        }

        let response = slot.engine.generate(input, params).await?;
        self.governor
            .record_usage(client_id, response.stats.tokens_generated);
        Ok(response)
    }

    /// Start one streaming generation for `client_id`.
    ///
    /// Usage is recorded once the stream finishes or is abandoned; the
    /// client's gate stays held until then.
    pub async fn stream_generate(
        &self,
        client_id: &str,
        input: &str,
        params: &GenerationParams,
    ) -> Result<GenerationStream, EngineError> {
        let slot = self.slot(client_id);
        slot.touch();
        let gate = Arc::clone(&slot.gate).lock_owned().await;

        if let Admission::Denied(reason) = self.governor.check_limit(client_id) {
            warn!(client = %client_id, %reason, "request denied");
            return Err(deny(reason));
        }

        let governor = Arc::clone(&self.governor);
        let client = client_id.to_string();
        let hook: CompletionHook = Box::new(move |stats: &GenerationStats| {
            governor.record_usage(&client, stats.tokens_generated);
            drop(gate);
        });

        slot.engine.stream(input, params, Some(hook)).await
    }

    /// Process-wide metrics across all clients.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Chronological history snapshot for one client.
    pub fn history(&self, client_id: &str, limit: Option<usize>) -> Vec<Message> {
        match self.clients.get(client_id) {
            Some(slot) => slot.engine.history(limit),
            None => Vec::new(),
        }
    }

    pub fn clear_history(&self, client_id: &str) {
        if let Some(slot) = self.clients.get(client_id) {
            slot.engine.clear_history();
        }
    }

    /// Status summary for health and info endpoints.
    pub async fn model_info(&self) -> ModelInfo {
        ModelInfo {
            loaded: self.is_loaded().await,
            model_path: self.config.model_path.clone(),
            model_name: self.config.model_name.clone(),
            context_size: self.config.context_size,
            metrics: self.metrics(),
        }
    }

    /// Forget sessions and usage counters idle longer than `max_idle`.
    pub fn sweep_idle(&self, max_idle: Duration) {
        let now = Utc::now();
        let before = self.clients.len();
        self.clients
            .retain(|_, slot| now - slot.last_seen() <= max_idle);
        let evicted = before - self.clients.len();
        if evicted > 0 {
            debug!(evicted, "swept idle sessions");
        }
        self.governor.sweep_stale_at(max_idle, now);
    }

    pub fn governor(&self) -> &UsageGovernor {
        &self.governor
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of tracked client sessions.
    pub fn active_sessions(&self) -> usize {
        self.clients.len()
    }

    fn slot(&self, client_id: &str) -> Arc<ClientSlot> {
        self.clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                debug!(client = %client_id, "new client session");
                Arc::new(ClientSlot {
                    engine: SessionEngine::new(
                        self.config.clone(),
                        Arc::clone(&self.runtime),
                        Arc::clone(&self.metrics),
                    ),
                    gate: Arc::new(Mutex::new(())),
                    last_used: std::sync::Mutex::new(Utc::now()),
                })
            })
            .clone()
    }
}

fn deny(reason: DenyReason) -> EngineError {
    match reason {
        DenyReason::RateLimited(_) => EngineError::RateLimited(reason),
        _ => EngineError::QuotaExceeded(reason),
    }
}
