// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory CSRF token store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tokio::task::JoinHandle;

use super::CsrfConfig;

// =============================================================================
// CsrfTokenStore
// =============================================================================

/// Process-wide store of outstanding CSRF tokens.
///
/// Tokens are keyed by value and grouped per session in insertion order so
/// the per-session cap can evict the oldest first. The two maps are kept
/// consistent under a single mutex; every operation is atomic with respect to
/// concurrent issue/validate/sweep calls.
///
/// Instances are constructed explicitly and injected wherever needed; there
/// is no global store.
pub struct CsrfTokenStore {
    config: CsrfConfig,
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    /// Token value to record.
    tokens: HashMap<String, TokenRecord>,
    /// Session to owned token values, oldest first.
    sessions: HashMap<String, Vec<String>>,
}

/// Bookkeeping for one outstanding token.
#[derive(Debug, Clone)]
struct TokenRecord {
    session_id: String,
    created_at: Instant,
    expires_at: Instant,
}

/// Store statistics for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of outstanding tokens.
    pub total_tokens: usize,
    /// Number of sessions with at least one token.
    pub active_sessions: usize,
}

impl CsrfTokenStore {
    /// Creates an empty store.
    pub fn new(config: CsrfConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Stores a freshly issued token for a session.
    ///
    /// If the session is already at its token cap, the oldest outstanding
    /// token for that session is evicted.
    pub fn store_token(&self, session_id: &str, token: &str) {
        let now = Instant::now();
        let record = TokenRecord {
            session_id: session_id.to_string(),
            created_at: now,
            expires_at: now + self.config.token_ttl,
        };

        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        inner.tokens.insert(token.to_string(), record);

        let session = inner
            .sessions
            .entry(session_id.to_string())
            .or_default();
        session.push(token.to_string());

        if session.len() > self.config.max_tokens_per_session {
            let oldest = session.remove(0);
            inner.tokens.remove(&oldest);
            tracing::debug!(session_id, "Evicted oldest CSRF token over session cap");
        }
    }

    /// Validates a token against its owning session.
    ///
    /// A token is valid only when looked up under the session it was issued
    /// for and before its expiry. Expired tokens are removed on the spot.
    pub fn validate_token(&self, token: &str, session_id: &str) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let (expired, session_matches) = match inner.tokens.get(token) {
            Some(record) => (
                Instant::now() > record.expires_at,
                record.session_id == session_id,
            ),
            None => return false,
        };

        if expired {
            Self::remove_locked(inner, token);
            return false;
        }

        session_matches
    }

    /// Removes a single token.
    ///
    /// Removal is idempotent; removing an absent token is a no-op.
    pub fn remove_token(&self, token: &str) {
        let mut inner = self.inner.lock().unwrap();
        Self::remove_locked(&mut inner, token);
    }

    /// Removes all tokens owned by a session (e.g. on logout).
    ///
    /// Returns the number of tokens removed.
    pub fn remove_session_tokens(&self, session_id: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let Some(tokens) = inner.sessions.remove(session_id) else {
            return 0;
        };
        let removed = tokens.len();
        for token in tokens {
            inner.tokens.remove(&token);
        }
        removed
    }

    /// Removes every expired token store-wide.
    ///
    /// Returns the number of tokens removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;

        let expired: Vec<String> = inner
            .tokens
            .iter()
            .filter(|(_, record)| now > record.expires_at)
            .map(|(token, _)| token.clone())
            .collect();

        for token in &expired {
            Self::remove_locked(inner, token);
        }

        expired.len()
    }

    /// Returns `true` if the token is unknown or older than the rotation
    /// interval.
    pub fn is_rotation_due(&self, token: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.tokens.get(token) {
            Some(record) => record.created_at.elapsed() > self.config.rotation_interval,
            None => true,
        }
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().unwrap();
        StoreStats {
            total_tokens: inner.tokens.len(),
            active_sessions: inner.sessions.len(),
        }
    }

    fn remove_locked(inner: &mut StoreInner, token: &str) {
        let Some(record) = inner.tokens.remove(token) else {
            return;
        };
        if let Some(session) = inner.sessions.get_mut(&record.session_id) {
            session.retain(|t| t != token);
            if session.is_empty() {
                inner.sessions.remove(&record.session_id);
            }
        }
    }

    /// Backdates a token's timestamps. Test-only clock control.
    #[cfg(test)]
    pub(crate) fn backdate(&self, token: &str, age: std::time::Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(record) = inner.tokens.get_mut(token) {
            if let Some(created) = Instant::now().checked_sub(age) {
                record.created_at = created;
                record.expires_at = created + self.config.token_ttl;
            }
        }
    }
}

// =============================================================================
// Expiry Sweeper
// =============================================================================

/// Handle to the periodic expiry sweep task.
///
/// The task is owned by whoever holds this handle and is aborted when the
/// handle is dropped, so the sweep cannot outlive the server that started it.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the sweep task.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl CsrfTokenStore {
    /// Starts the periodic expiry sweep for this store.
    ///
    /// The task holds only a weak reference; it exits on its own once the
    /// store is dropped.
    pub fn start_sweeper(store: &Arc<Self>) -> SweeperHandle {
        let interval = store.config.sweep_interval;
        let weak = Arc::downgrade(store);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so sweeps start one
            // interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    break;
                };
                let removed = store.sweep_expired();
                if removed > 0 {
                    tracing::info!(removed, "Cleaned up expired CSRF tokens");
                }
            }
        });

        SweeperHandle { handle }
    }
}

// =============================================================================
// Tests
// =============================================================================
