//! Exactly-once session initialization.
//!
//! The one-shot claim lives on the [`SessionStore`], not on the bootstrap
//! value, so owners that are torn down and rebuilt never re-run the
//! handshake. A failed handshake is returned to the caller and is not
//! retried: the store stays uninitialized and the route guard keeps showing
//! its loading state.

use std::sync::Arc;

use super::SessionStore;
use crate::auth::{AuthError, AuthProvider};

pub struct SessionBootstrap {
    store: SessionStore,
    provider: Arc<dyn AuthProvider>,
}

impl SessionBootstrap {
    #[must_use]
    pub fn new(store: SessionStore, provider: Arc<dyn AuthProvider>) -> Self {
        Self { store, provider }
    }

    /// Initialize the session if nobody has done so yet.
    ///
    /// Returns `Ok(true)` when this call ran the handshake and `Ok(false)`
    /// when it was a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the auth provider's handshake error unchanged.
    pub async fn activate(&self) -> Result<bool, AuthError> {
        if self.store.read().is_initialized || !self.store.claim_initialization() {
            return Ok(false);
        }
        initialize(&self.store, self.provider.as_ref()).await?;
        Ok(true)
    }
}

/// Run the auth handshake and settle `store`.
///
/// # Errors
///
/// Returns the provider error, or [`AuthError::NotLoaded`] if the provider
/// answers without having loaded. The store is left uninitialized.
pub async fn initialize(store: &SessionStore, provider: &dyn AuthProvider) -> Result<(), AuthError> {
    store.begin_loading();
    let snapshot = provider.load().await?;
    if !snapshot.is_loaded {
        return Err(AuthError::NotLoaded);
    }

    let user = if snapshot.is_signed_in { snapshot.user } else { None };
    tracing::info!(
        signed_in = user.is_some(),
        user_id = user.as_ref().map_or("", |u| u.id.as_str()),
        "session initialized"
    );
    store.resolve(user);
    Ok(())
}

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod tests;
