//! Streaming token delivery
//!
//! A generation stream is a finite, non-restartable pull sequence. The
//! consumer may stop pulling at any point; on exhaustion or drop the
//! stream reports exactly the text the consumer saw, and the session
//! engine records that text as the assistant turn.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::metrics::tokens_per_second;

/// One streamed token chunk plus metrics computed up to that point
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// The token text
    pub text: String,
    /// Chunks received so far, including this one
    pub tokens_so_far: u64,
    /// Seconds elapsed since the stream started
    pub elapsed_secs: f64,
    /// Running throughput; 0 while no time has elapsed
    pub tokens_per_second: f64,
}

/// What the consumer actually received, reported back to the producer
#[derive(Debug, Default)]
pub(crate) struct StreamOutcome {
    pub(crate) text: String,
    pub(crate) tokens: u64,
}

/// Pull side of one streaming generation.
///
/// Dropping the stream is the cancellation signal: the producer observes
/// the closed channel, stops the runtime, and records whatever was
/// consumed up to that point.
pub struct GenerationStream {
    rx: mpsc::Receiver<String>,
    report: Option<oneshot::Sender<StreamOutcome>>,
    consumed: String,
    tokens: u64,
    started: Instant,
}

impl GenerationStream {
    pub(crate) fn new(rx: mpsc::Receiver<String>, report: oneshot::Sender<StreamOutcome>) -> Self {
        Self {
            rx,
            report: Some(report),
            consumed: String::new(),
            tokens: 0,
            started: Instant::now(),
        }
    }

    /// Pull the next chunk, or `None` once generation is finished.
    pub async fn next(&mut self) -> Option<StreamChunk> {
        match self.rx.recv().await {
            Some(text) => {
                self.tokens += 1;
                self.consumed.push_str(&text);
                let elapsed = self.started.elapsed().as_secs_f64();
                Some(StreamChunk {
                    text,
                    tokens_so_far: self.tokens,
                    elapsed_secs: elapsed,
                    tokens_per_second: tokens_per_second(self.tokens, elapsed),
                })
            }
            None => {
                self.send_report();
                None
            }
        }
    }

    /// Drain the remaining chunks and return their concatenated text.
    pub async fn collect(mut self) -> String {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            text.push_str(&chunk.text);
        }
        text
    }

    fn send_report(&mut self) {
        if let Some(report) = self.report.take() {
            let _ = report.send(StreamOutcome {
                text: std::mem::take(&mut self.consumed),
                tokens: self.tokens,
            });
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        self.send_report();
    }
}
