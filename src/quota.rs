//! Per-client usage quotas
//!
//! Daily message/token ceilings and a sliding per-minute request ceiling,
//! tracked per client identifier in a concurrent keyed store. Day rollover
//! is lazy: counters reset the next time the client is touched, not on a
//! background timer.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Length of the sliding rate window.
const RATE_WINDOW_SECS: i64 = 60;

/// Quota ceilings applied to every client
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UsageLimits {
    /// Messages admitted per client per day
    pub daily_messages: u32,
    /// Tokens charged per client per day
    pub daily_tokens: u64,
    /// Requests admitted per client per rate window
    pub per_minute: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            daily_messages: 50,
            daily_tokens: 50_000,
            per_minute: 10,
        }
    }
}

/// Rolling usage counters for one client
#[derive(Debug, Clone)]
struct ClientUsage {
    day: NaiveDate,
    messages_today: u32,
    tokens_today: u64,
    requests_this_minute: u32,
    last_request: Option<DateTime<Utc>>,
}

impl ClientUsage {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            messages_today: 0,
            tokens_today: 0,
            requests_this_minute: 0,
            last_request: None,
        }
    }

    /// Reset all counters when the stored day is no longer `today`.
    ///
    /// Called at the top of every check and record so the rollover logic
    /// lives in one place.
    fn roll_over(&mut self, today: NaiveDate) {
        if self.day != today {
            *self = Self::new(today);
        }
    }

    fn in_rate_window(&self, now: DateTime<Utc>) -> bool {
        match self.last_request {
            Some(last) => (now - last).num_seconds() < RATE_WINDOW_SECS,
            None => false,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Denied(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Daily message ceiling, with the configured limit
    DailyMessages(u32),
    /// Daily token ceiling, with the configured limit
    DailyTokens(u64),
    /// Per-minute ceiling, with the configured limit
    RateLimited(u32),
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::DailyMessages(limit) => {
                write!(f, "Daily message limit reached ({limit})")
            }
            DenyReason::DailyTokens(limit) => write!(f, "Daily token limit reached ({limit})"),
            DenyReason::RateLimited(limit) => write!(f, "Rate limit reached ({limit}/min)"),
        }
    }
}

/// Admission control over the per-client usage store.
///
/// `check_limit` and `record_usage` are each atomic under the per-entry
/// lock. Callers that need the whole check-then-record sequence to be
/// atomic hold their own per-client gate around it, as `InferenceService`
/// does.
#[derive(Debug, Default)]
pub struct UsageGovernor {
    clients: DashMap<String, ClientUsage>,
    limits: UsageLimits,
}

impl UsageGovernor {
    pub fn new(limits: UsageLimits) -> Self {
        Self {
            clients: DashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    /// Decide whether a request from `client_id` may proceed right now.
    ///
    /// Admission denial is an expected outcome, so it is returned as a
    /// value rather than an error.
    pub fn check_limit(&self, client_id: &str) -> Admission {
        self.check_limit_at(client_id, Utc::now())
    }

    /// Clock-injected variant of [`check_limit`](Self::check_limit).
    pub fn check_limit_at(&self, client_id: &str, now: DateTime<Utc>) -> Admission {
        let mut entry = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientUsage::new(now.date_naive()));
        let usage = entry.value_mut();
        usage.roll_over(now.date_naive());

        // A lapsed window means the minute counter is stale, not spent.
        if usage.last_request.is_some() && !usage.in_rate_window(now) {
            usage.requests_this_minute = 0;
        }

        let admission = if usage.messages_today >= self.limits.daily_messages {
            Admission::Denied(DenyReason::DailyMessages(self.limits.daily_messages))
        } else if usage.tokens_today >= self.limits.daily_tokens {
            Admission::Denied(DenyReason::DailyTokens(self.limits.daily_tokens))
        } else if usage.in_rate_window(now) && usage.requests_this_minute >= self.limits.per_minute
        {
            Admission::Denied(DenyReason::RateLimited(self.limits.per_minute))
        } else {
            Admission::Allowed
        };

        if let Admission::Denied(reason) = admission {
            debug!(client = %client_id, %reason, "admission denied");
        }
        admission
    }

    /// Charge one message and `tokens` tokens to `client_id`.
    pub fn record_usage(&self, client_id: &str, tokens: u64) {
        self.record_usage_at(client_id, tokens, Utc::now())
    }

    /// Clock-injected variant of [`record_usage`](Self::record_usage).
    pub fn record_usage_at(&self, client_id: &str, tokens: u64, now: DateTime<Utc>) {
        let mut entry = self
            .clients
            .entry(client_id.to_string())
            .or_insert_with(|| ClientUsage::new(now.date_naive()));
        let usage = entry.value_mut();
        usage.roll_over(now.date_naive());

        if usage.in_rate_window(now) {
            usage.requests_this_minute += 1;
        } else {
            usage.requests_this_minute = 1;
        }
        usage.messages_today += 1;
        usage.tokens_today += tokens;
        usage.last_request = Some(now);
    }

    /// Drop clients that have been idle longer than `max_idle`.
    ///
    /// The store never evicts on its own; hosts call this on whatever
    /// cadence suits them.
    pub fn sweep_stale(&self, max_idle: Duration) {
        self.sweep_stale_at(max_idle, Utc::now())
    }

    /// Clock-injected variant of [`sweep_stale`](Self::sweep_stale).
    pub fn sweep_stale_at(&self, max_idle: Duration, now: DateTime<Utc>) {
        let before = self.clients.len();
        self.clients.retain(|_, usage| match usage.last_request {
            Some(last) => now - last <= max_idle,
            None => usage.day == now.date_naive(),
        });
        let evicted = before - self.clients.len();
        if evicted > 0 {
            debug!(evicted, "swept stale clients");
        }
    }

    /// Number of tracked clients.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
