//! Route guard for protected views.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every protected route applies the same decision over the shared session
//! snapshot: show a loading indicator until auth settles, send signed-out
//! users to the login page, render children for signed-in users.
//!
//! The redirect replaces the current history entry and carries the
//! requested location as navigation state (`{"from": "/projects/42"}`) so
//! the login flow can send the user back afterwards.

use std::sync::{Mutex, PoisonError};

use serde_json::{Value, json};

use crate::session::Session;

// =============================================================================
// NAVIGATION
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
    /// Arbitrary payload delivered to the destination.
    pub state: Option<Value>,
}

/// Routing primitive the guard redirects through.
pub trait Navigator {
    fn navigate(&self, path: &str, options: NavigateOptions);
}

impl<F> Navigator for F
where
    F: Fn(&str, NavigateOptions),
{
    fn navigate(&self, path: &str, options: NavigateOptions) {
        self(path, options);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub path: String,
    pub state: Option<Value>,
}

/// In-memory browser-style history with push/replace/back.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<HistoryInner>,
}

#[derive(Debug)]
struct HistoryInner {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl MemoryHistory {
    #[must_use]
    pub fn new(initial: &str) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                entries: vec![HistoryEntry { path: initial.to_owned(), state: None }],
                index: 0,
            }),
        }
    }

    #[must_use]
    pub fn current(&self) -> HistoryEntry {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries[inner.index].clone()
    }

    /// Step back one entry. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.index == 0 {
            return false;
        }
        inner.index -= 1;
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Navigator for MemoryHistory {
    fn navigate(&self, path: &str, options: NavigateOptions) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = HistoryEntry { path: path.to_owned(), state: options.state };
        if options.replace {
            let index = inner.index;
            inner.entries[index] = entry;
        } else {
            let keep = inner.index + 1;
            inner.entries.truncate(keep);
            inner.entries.push(entry);
            inner.index = keep;
        }
    }
}

// =============================================================================
// GUARD
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Loading,
    Redirect { to: String, from: String },
    Render,
}

/// Outcome of guarding a view whose content is `V`.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<V> {
    Loading,
    Redirected { to: String, from: String },
    Content(V),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGuard {
    login_path: String,
}

impl RouteGuard {
    #[must_use]
    pub fn new(login_path: impl Into<String>) -> Self {
        Self { login_path: login_path.into() }
    }

    #[must_use]
    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Pure decision for `location` under `session`.
    #[must_use]
    pub fn decide(&self, session: &Session, location: &str) -> GuardDecision {
        if !session.is_settled() {
            return GuardDecision::Loading;
        }
        if session.user.is_none() {
            return GuardDecision::Redirect { to: self.login_path.clone(), from: location.to_owned() };
        }
        GuardDecision::Render
    }

    /// Decide and act: redirect through `navigator` when unauthenticated,
    /// otherwise hand back `children` untouched (or nothing while loading).
    pub fn guard<N, V>(&self, session: &Session, location: &str, navigator: &N, children: V) -> Guarded<V>
    where
        N: Navigator + ?Sized,
    {
        match self.decide(session, location) {
            GuardDecision::Loading => Guarded::Loading,
            GuardDecision::Redirect { to, from } => {
                tracing::debug!(%to, %from, "redirecting unauthenticated navigation");
                navigator.navigate(&to, NavigateOptions { replace: true, state: Some(json!({ "from": from })) });
                Guarded::Redirected { to, from }
            }
            GuardDecision::Render => Guarded::Content(children),
        }
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_LOGIN_PATH)
    }
}

/// Location the login flow should return to, from redirect state.
///
/// Only same-origin paths pass: `//host` and `/\host` are treated as
/// protocol-relative by browsers.
#[must_use]
pub fn login_return_path(state: Option<&Value>) -> Option<&str> {
    state?
        .get("from")?
        .as_str()
        .filter(|from| from.starts_with('/') && !from.starts_with("//") && !from.starts_with("/\\"))
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
