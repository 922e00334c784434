//! Request bookkeeping: per-node request state, the in-flight set and the
//! timeout policy hook.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Whether a range fetch for a node is outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    Pending { since: Instant },
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending { .. })
    }
}

/// Decides when a pending request is considered lost.
pub trait RequestTimeout {
    fn is_expired(&self, elapsed: Duration) -> bool;
}

/// Never expire: a lost reply leaves the node pending for good.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimeout;

impl RequestTimeout for NoTimeout {
    fn is_expired(&self, _elapsed: Duration) -> bool {
        false
    }
}

/// Expire requests older than a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeout(pub Duration);

impl RequestTimeout for FixedTimeout {
    fn is_expired(&self, elapsed: Duration) -> bool {
        elapsed >= self.0
    }
}

/// Paths with an outstanding request. Replies are matched by path.
#[derive(Debug, Default)]
pub struct InFlight {
    paths: BTreeMap<String, Instant>,
}

impl InFlight {
    pub fn insert(&mut self, path: &str, since: Instant) -> bool {
        self.paths.insert(path.to_string(), since).is_none()
    }

    /// Returns `false` when the path was not outstanding.
    pub fn complete(&mut self, path: &str) -> bool {
        self.paths.remove(path).is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove and return every path the policy considers lost.
    pub fn drain_expired(&mut self, policy: &dyn RequestTimeout, now: Instant) -> Vec<String> {
        let expired: Vec<String> = self
            .paths
            .iter()
            .filter(|(_, since)| policy.is_expired(now.saturating_duration_since(**since)))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &expired {
            self.paths.remove(path);
        }
        expired
    }
}
