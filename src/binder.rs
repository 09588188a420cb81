//! Data-client binder: keeps a data client's credential in step with the
//! session's rotating bearer token.
//!
//! DESIGN
//! ======
//! One binder per consuming owner. The client is built lazily on the first
//! `client()` call while signed in, memoized for the current sign-in, and
//! its authorization header is mutated in place. Clients are never rebuilt
//! on token change, so the in-place header is the only credential path.
//!
//! The client and the installed token are bound to the session store's
//! sign-in epoch. Whenever the binder observes a different epoch (sign-out,
//! sign-in after sign-out, switching users) it clears the old client's
//! header and forgets both, before anything else touches them.
//!
//! Every token fetch, whether triggered by a request through the client or
//! by a `TokenRotated` event, ends in `install`, the only writer of the
//! client's header. Fetches are not cancelled; a resolution that arrives
//! after teardown, or for an epoch that is no longer current, is dropped.
//!
//! TRADE-OFFS
//! ==========
//! With [`RefreshOrdering::LastResolved`] overlapping fetches race and the
//! one that resolves last wins, even when it was issued first and carries
//! the older token. [`RefreshOrdering::Sequenced`] numbers fetches at issue
//! time and discards any resolution older than the installed one.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::{AuthProvider, AuthToken, TokenOptions};
use crate::client::{AuthorizedClient, ClientFactory, TokenSupplier};
use crate::session::{AuthEvent, SessionStore};

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshOrdering {
    #[default]
    LastResolved,
    Sequenced,
}

impl FromStr for RefreshOrdering {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_resolved" => Ok(Self::LastResolved),
            "sequenced" => Ok(Self::Sequenced),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BinderOptions {
    pub token: TokenOptions,
    pub ordering: RefreshOrdering,
}

// =============================================================================
// BINDER
// =============================================================================

/// Owner-scoped handle. Dropping it tears the binder down.
pub struct DataClientBinder<F: ClientFactory> {
    inner: Arc<BinderInner<F>>,
    listener: JoinHandle<()>,
}

struct BinderInner<F: ClientFactory> {
    id: Uuid,
    store: SessionStore,
    provider: Arc<dyn AuthProvider>,
    factory: F,
    options: BinderOptions,
    alive: AtomicBool,
    issued: AtomicU64,
    state: Mutex<BinderState<F::Client>>,
}

struct BinderState<C> {
    /// Sign-in epoch `client` and `installed` belong to.
    epoch: Option<u64>,
    client: Option<Arc<C>>,
    installed: Option<Installed>,
}

impl<C: AuthorizedClient> BinderState<C> {
    /// Forget everything bound to another epoch. Returns whether a client
    /// was released.
    fn rebind(&mut self, epoch: Option<u64>) -> bool {
        if self.epoch == epoch {
            return false;
        }
        self.epoch = epoch;
        self.installed = None;
        match self.client.take() {
            Some(client) => {
                client.set_authorization(None);
                true
            }
            None => false,
        }
    }
}

struct Installed {
    token: Option<AuthToken>,
    generation: u64,
}

impl<F: ClientFactory> DataClientBinder<F> {
    /// Subscribe to `store` and start reacting to auth events.
    ///
    /// Must be called inside a tokio runtime.
    pub fn mount(store: SessionStore, provider: Arc<dyn AuthProvider>, factory: F, options: BinderOptions) -> Self {
        let events = store.events();
        let inner = Arc::new(BinderInner {
            id: Uuid::new_v4(),
            store,
            provider,
            factory,
            options,
            alive: AtomicBool::new(true),
            issued: AtomicU64::new(0),
            state: Mutex::new(BinderState { epoch: None, client: None, installed: None }),
        });
        let listener = tokio::spawn(listen(Arc::downgrade(&inner), events));
        tracing::debug!(binder = %inner.id, ordering = ?inner.options.ordering, "data-client binder mounted");
        Self { inner, listener }
    }

    /// The memoized client, built on first use. `None` while signed out.
    #[must_use]
    pub fn client(&self) -> Option<Arc<F::Client>> {
        self.inner.client()
    }

    /// Fetch a token now and install it. Returns the token the client holds
    /// afterwards.
    pub async fn refresh(&self) -> Option<AuthToken> {
        self.inner.refresh().await
    }

    /// Stop reacting to session changes and release the client.
    pub fn unmount(self) {
        drop(self);
    }
}

impl<F: ClientFactory> Drop for DataClientBinder<F> {
    fn drop(&mut self) {
        self.inner.alive.store(false, Ordering::Release);
        self.listener.abort();
        self.inner.release("unmounted");
    }
}

impl<F: ClientFactory> BinderInner<F> {
    fn lock(&self) -> std::sync::MutexGuard<'_, BinderState<F::Client>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn client(self: &Arc<Self>) -> Option<Arc<F::Client>> {
        if !self.is_alive() {
            return None;
        }

        let mut state = self.lock();
        let epoch = self.store.sign_in_epoch();
        if state.rebind(epoch) {
            tracing::info!(binder = %self.id, "data client released; session changed");
        }
        epoch?;

        if let Some(client) = &state.client {
            return Some(client.clone());
        }
        let client = Arc::new(self.factory.create(self.supplier()));
        if let Some(installed) = &state.installed {
            client.set_authorization(installed.token.as_ref());
        }
        tracing::debug!(binder = %self.id, "data client created");
        state.client = Some(client.clone());
        Some(client)
    }

    fn supplier(self: &Arc<Self>) -> TokenSupplier {
        let weak = Arc::downgrade(self);
        Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(inner) => inner.refresh().await,
                    None => None,
                }
            })
        })
    }

    async fn refresh(&self) -> Option<AuthToken> {
        let generation = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        let epoch = self.store.sign_in_epoch();
        let fetched = match self.provider.get_token(&self.options.token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(binder = %self.id, error = %e, "token fetch failed; continuing without credentials");
                None
            }
        };
        self.install(fetched, generation, epoch)
    }

    fn install(&self, token: Option<AuthToken>, generation: u64, issued_in: Option<u64>) -> Option<AuthToken> {
        if !self.is_alive() {
            tracing::debug!(binder = %self.id, generation, "binder torn down; dropping fetched token");
            return None;
        }

        let mut state = self.lock();
        let current = self.store.sign_in_epoch();
        if state.rebind(current) {
            tracing::info!(binder = %self.id, "data client released; session changed");
        }
        if current.is_none() || current != issued_in {
            tracing::debug!(binder = %self.id, generation, "session changed during fetch; dropping fetched token");
            return None;
        }

        if self.options.ordering == RefreshOrdering::Sequenced {
            if let Some(installed) = &state.installed {
                if installed.generation > generation {
                    tracing::debug!(
                        binder = %self.id,
                        generation,
                        installed = installed.generation,
                        "discarding stale token fetch"
                    );
                    return installed.token.clone();
                }
            }
        }

        if let Some(client) = &state.client {
            client.set_authorization(token.as_ref());
        }
        tracing::debug!(binder = %self.id, generation, has_token = token.is_some(), "token installed");
        state.installed = Some(Installed { token: token.clone(), generation });
        token
    }

    /// Drop whatever no longer matches the store's current sign-in.
    fn resync(&self) {
        let mut state = self.lock();
        if state.rebind(self.store.sign_in_epoch()) {
            tracing::info!(binder = %self.id, "data client released; session changed");
        }
    }

    fn release(&self, reason: &str) {
        let mut state = self.lock();
        state.installed = None;
        if let Some(client) = state.client.take() {
            client.set_authorization(None);
            tracing::info!(binder = %self.id, reason, "data client released");
        }
    }
}

async fn listen<F: ClientFactory>(binder: Weak<BinderInner<F>>, mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "binder lagged behind auth events; resyncing");
                None
            }
            Err(RecvError::Closed) => break,
        };
        let Some(inner) = binder.upgrade() else { break };
        if !inner.is_alive() {
            break;
        }

        match event {
            Some(AuthEvent::SignedOut) => inner.resync(),
            Some(AuthEvent::SignedIn(user)) => {
                tracing::debug!(binder = %inner.id, user_id = %user.id, "signed in; client will be built on demand");
                inner.resync();
            }
            Some(AuthEvent::TokenRotated) => {
                if inner.store.read().is_signed_in() {
                    // Each rotation is its own task so overlapping fetches race.
                    let inner = inner.clone();
                    tokio::spawn(async move {
                        let _ = inner.refresh().await;
                    });
                }
            }
            None => inner.resync(),
        }
    }
}

#[cfg(test)]
#[path = "binder_test.rs"]
mod tests;
