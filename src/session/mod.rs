//! Shared session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session store is written by the bootstrap step and by auth-provider
//! pushes (sign-in, sign-out, token rotation), and read by the route guard
//! and the data-client binder.
//!
//! DESIGN
//! ======
//! `SessionStore` is an explicit, cloneable container instead of ambient
//! global state. The current snapshot lives in a `watch` channel; every
//! mutation that matters to subscribers is also published as an
//! [`AuthEvent`] on a `broadcast` channel. Writers are serialized, and the
//! snapshot is updated before the event is sent, so a subscriber that
//! receives an event always reads a snapshot at least as new as the event.
//!
//! Each sign-in that changes who is signed in (first sign-in, sign-in after a
//! sign-out, switching users) advances a sign-in epoch. Credential holders
//! bind to the epoch rather than to the user, so a sign-out followed by a
//! sign-in of the same user still counts as a new session.

pub mod bootstrap;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 64;

// =============================================================================
// TYPES
// =============================================================================

/// Authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl User {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), email: None, name: None }
    }
}

/// Process-wide authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub is_initialized: bool,
    pub is_auth_loading: bool,
    pub user: Option<User>,
}

impl Session {
    /// Initialized and no auth operation in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.is_initialized && !self.is_auth_loading
    }

    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}

/// Push notifications from the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
    /// The provider issued a new bearer token; cached credentials are stale.
    TokenRotated,
}

// =============================================================================
// STORE
// =============================================================================

/// Injectable session container with read/subscribe/mutate access.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state: watch::Sender<Session>,
    events: broadcast::Sender<AuthEvent>,
    /// Serializes writers; holds the sign-in epoch.
    write: Mutex<u64>,
    init_claimed: AtomicBool,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_session(Session::default())
    }

    /// Store pre-seeded with `session`. Used by tests and by callers that
    /// restore state from elsewhere.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        let (state, _) = watch::channel(session);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner { state, events, write: Mutex::new(0), init_claimed: AtomicBool::new(false) }),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn read(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every snapshot change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Receiver for auth events published after this call.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Apply `f` to the snapshot without publishing an event.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Session),
    {
        let mut epoch = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.state.send_modify(|s| {
            let before = s.user.as_ref().map(|u| u.id.clone());
            f(s);
            advance_epoch(&mut epoch, before.as_deref(), s.user.as_ref());
        });
    }

    /// Epoch of the current sign-in, or `None` while signed out.
    #[must_use]
    pub fn sign_in_epoch(&self) -> Option<u64> {
        let epoch = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.state.borrow().user.as_ref().map(|_| *epoch)
    }

    /// Mark an auth operation as in flight.
    pub fn begin_loading(&self) {
        self.update(|s| s.is_auth_loading = true);
    }

    /// Settle the session: initialized, not loading, with `user` (or none).
    /// Publishes `SignedIn` / `SignedOut` when the signed-in state changes.
    pub fn resolve(&self, user: Option<User>) {
        let mut epoch = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        let mut was_signed_in = false;
        self.inner.state.send_modify(|s| {
            was_signed_in = s.user.is_some();
            let before = s.user.as_ref().map(|u| u.id.clone());
            s.is_initialized = true;
            s.is_auth_loading = false;
            s.user.clone_from(&user);
            advance_epoch(&mut epoch, before.as_deref(), s.user.as_ref());
        });
        match user {
            Some(user) => self.publish(AuthEvent::SignedIn(user)),
            None if was_signed_in => self.publish(AuthEvent::SignedOut),
            None => {}
        }
    }

    /// Auth provider reports a sign-in.
    pub fn sign_in(&self, user: User) {
        tracing::info!(user_id = %user.id, "session signed in");
        self.resolve(Some(user));
    }

    /// Auth provider reports a sign-out.
    pub fn sign_out(&self) {
        tracing::info!("session signed out");
        self.resolve(None);
    }

    /// Auth provider rotated the bearer token.
    pub fn rotate_token(&self) {
        let _guard = self.inner.write.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(AuthEvent::TokenRotated);
    }

    /// Claim the one-shot right to run initialization. Returns `true` for
    /// exactly one caller over the lifetime of the store.
    pub(crate) fn claim_initialization(&self) -> bool {
        !self.inner.init_claimed.swap(true, Ordering::AcqRel)
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn advance_epoch(epoch: &mut u64, before: Option<&str>, after: Option<&User>) {
    if let Some(after) = after {
        if before != Some(after.id.as_str()) {
            *epoch += 1;
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
