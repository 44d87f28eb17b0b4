//! Bounded in-memory state. Everything here has a fixed capacity or a
//! TTL — the gateway must be able to run for months without growing.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fallback capacity for the recent-callback journal.
pub const RECENT_CALLBACKS_CAPACITY: usize = 100;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// One cached upstream access token with its expiry. Both platform APIs
/// hand out tokens valid for ~2 hours; callers pass the advertised TTL
/// minus their own safety margin.
#[derive(Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, or `None` if absent or expired.
    pub fn get(&self) -> Option<String> {
        let slot = self.slot.lock();
        slot.as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.value.clone())
    }

    pub fn put(&self, value: String, ttl: Duration) {
        *self.slot.lock() = Some(CachedToken {
            value,
            expires_at: Instant::now() + ttl,
        });
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// Metadata about one handled callback. Message content is deliberately
/// absent: the journal exists for operators, not for payload capture.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallbackRecord {
    pub platform: &'static str,
    pub kind: String,
    pub ok: bool,
    pub at: String,
}

/// Fixed-capacity journal of recent callbacks, oldest evicted first.
pub struct RecentCallbacks {
    capacity: usize,
    entries: Mutex<VecDeque<CallbackRecord>>,
}

impl RecentCallbacks {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, platform: &'static str, kind: impl Into<String>, ok: bool) {
        let record = CallbackRecord {
            platform,
            kind: kind.into(),
            ok,
            at: Utc::now().to_rfc3339(),
        };
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Newest-first snapshot for the debug endpoint.
    pub fn snapshot(&self) -> Vec<CallbackRecord> {
        self.entries.lock().iter().rev().cloned().collect()
    }
}
