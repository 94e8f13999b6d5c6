//! Message types
//!
//! Defines conversation turn structures and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from the user
    User,
    /// Message from the AI assistant
    Assistant,
    /// Reserved for prompt assembly; never stored in history
    System,
}

/// A single conversation turn
///
/// Turns are immutable once appended to history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The content of the message
    pub content: String,
    /// When the turn was created
    pub timestamp: DateTime<Utc>,
    /// Generation stats, present on assistant turns produced by the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<GenerationStats>,
}

impl Message {
    /// Create a new message with the current timestamp
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            stats: None,
        }
    }

    /// Create an assistant turn carrying the stats of the generation that
    /// produced it
    pub fn assistant(content: impl Into<String>, stats: GenerationStats) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            stats: Some(stats),
        }
    }
}

/// Performance figures for one completed generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Number of tokens produced
    pub tokens_generated: u64,
    /// Wall-clock generation time in seconds
    pub generation_time: f64,
    /// Throughput over the whole generation
    pub tokens_per_second: f64,
}
