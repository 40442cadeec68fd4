//! Single-flight lock table
//!
//! One entry per source ever seen. A source is capturing while its entry
//! names an owning session. The mutex is only held for the test-and-set
//! and clear operations, never across I/O.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Single-flight state of one source
#[derive(Debug, Clone, Default)]
struct SourceState {
    /// Identifier as first seen
    source_id: String,
    /// Session currently holding the source
    owner: Option<String>,
}

impl SourceState {
    fn is_capturing(&self) -> bool {
        self.owner.is_some()
    }
}

/// Result of trying to claim a source
#[derive(Debug)]
pub enum ClaimOutcome {
    Claimed(SourceClaim),
    /// Another session holds the source; a routine skip
    AlreadyCapturing,
}

/// Table of per-source capture flags, keyed case-insensitively
#[derive(Debug, Default)]
pub struct SourceStateTable {
    states: Mutex<HashMap<String, SourceState>>,
}

impl SourceStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(source_id: &str) -> String {
        source_id.trim().to_lowercase()
    }

    pub fn is_capturing(&self, source_id: &str) -> bool {
        self.states
            .lock()
            .get(&Self::key(source_id))
            .map(SourceState::is_capturing)
            .unwrap_or(false)
    }

    /// Atomically test-and-set the capture flag for a source
    pub fn try_claim(self: &Arc<Self>, source_id: &str, session_id: &str) -> ClaimOutcome {
        let key = Self::key(source_id);
        let mut states = self.states.lock();
        let state = states.entry(key.clone()).or_insert_with(|| SourceState {
            source_id: source_id.trim().to_string(),
            owner: None,
        });

        if state.is_capturing() {
            return ClaimOutcome::AlreadyCapturing;
        }
        state.owner = Some(session_id.to_string());

        ClaimOutcome::Claimed(SourceClaim {
            table: Arc::clone(self),
            key,
            session_id: session_id.to_string(),
        })
    }

    /// Clear the flag regardless of owner (manual recovery).
    ///
    /// Returns whether the source was capturing.
    pub fn mark_finished(&self, source_id: &str) -> bool {
        let mut states = self.states.lock();
        match states.get_mut(&Self::key(source_id)) {
            Some(state) => state.owner.take().is_some(),
            None => false,
        }
    }

    /// Sources currently capturing, sorted
    pub fn capturing_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self
            .states
            .lock()
            .values()
            .filter(|s| s.is_capturing())
            .map(|s| s.source_id.clone())
            .collect();
        sources.sort();
        sources
    }

    fn release(&self, key: &str, session_id: &str) -> bool {
        let mut states = self.states.lock();
        match states.get_mut(key) {
            Some(state) if state.owner.as_deref() == Some(session_id) => {
                state.owner = None;
                true
            }
            _ => false,
        }
    }
}

/// Ownership of a source's capture flag, released on drop.
///
/// Release only clears the flag if this session still owns it, so a manual
/// `mark_finished` followed by a new claim is never undone by a stale guard.
#[derive(Debug)]
pub struct SourceClaim {
    table: Arc<SourceStateTable>,
    key: String,
    session_id: String,
}

impl SourceClaim {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SourceClaim {
    fn drop(&mut self) {
        if self.table.release(&self.key, &self.session_id) {
            tracing::debug!("Released capture lock for '{}' ({})", self.key, self.session_id);
        }
    }
}
