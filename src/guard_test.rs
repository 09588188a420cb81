use std::cell::RefCell;

use super::*;
use crate::session::User;
use crate::test_support::alice;

fn all_sessions() -> Vec<Session> {
    let mut out = Vec::new();
    for is_initialized in [false, true] {
        for is_auth_loading in [false, true] {
            for user in [None, Some(alice())] {
                out.push(Session { is_initialized, is_auth_loading, user });
            }
        }
    }
    out
}

fn recorder() -> RefCell<Vec<(String, NavigateOptions)>> {
    RefCell::new(Vec::new())
}

// =============================================================================
// decide
// =============================================================================

#[test]
fn unsettled_sessions_always_load() {
    let guard = RouteGuard::default();
    for session in all_sessions().into_iter().filter(|s| !s.is_initialized || s.is_auth_loading) {
        assert_eq!(guard.decide(&session, "/projects"), GuardDecision::Loading, "{session:?}");
    }
}

#[test]
fn settled_without_user_redirects_with_origin() {
    let guard = RouteGuard::new("/sign-in");
    let session = Session { is_initialized: true, is_auth_loading: false, user: None };
    assert_eq!(
        guard.decide(&session, "/projects/p1?tab=cards"),
        GuardDecision::Redirect { to: "/sign-in".into(), from: "/projects/p1?tab=cards".into() }
    );
}

#[test]
fn settled_with_user_renders() {
    let guard = RouteGuard::default();
    let session = Session { is_initialized: true, is_auth_loading: false, user: Some(alice()) };
    assert_eq!(guard.decide(&session, "/projects"), GuardDecision::Render);
}

// =============================================================================
// guard
// =============================================================================

#[test]
fn loading_never_renders_or_navigates() {
    let guard = RouteGuard::default();
    let calls = recorder();
    let nav = |path: &str, opts: NavigateOptions| calls.borrow_mut().push((path.to_owned(), opts));
    for session in all_sessions().into_iter().filter(|s| !s.is_settled()) {
        assert_eq!(guard.guard(&session, "/projects", &nav, "secret"), Guarded::Loading);
    }
    assert!(calls.borrow().is_empty());
}

#[test]
fn redirect_replaces_and_carries_origin() {
    let guard = RouteGuard::default();
    let calls = recorder();
    let nav = |path: &str, opts: NavigateOptions| calls.borrow_mut().push((path.to_owned(), opts));
    let session = Session { is_initialized: true, is_auth_loading: false, user: None };

    let out = guard.guard(&session, "/projects/p1", &nav, "secret");

    assert_eq!(out, Guarded::Redirected { to: "/login".into(), from: "/projects/p1".into() });
    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (path, opts) = &calls[0];
    assert_eq!(path, "/login");
    assert!(opts.replace);
    assert_eq!(login_return_path(opts.state.as_ref()), Some("/projects/p1"));
}

#[test]
fn signed_in_renders_children_unmodified() {
    let guard = RouteGuard::default();
    let calls = recorder();
    let nav = |path: &str, opts: NavigateOptions| calls.borrow_mut().push((path.to_owned(), opts));
    let session = Session { is_initialized: true, is_auth_loading: false, user: Some(User::new("u1")) };
    let children = vec!["card-a".to_owned(), "card-b".to_owned()];

    let out = guard.guard(&session, "/projects", &nav, children.clone());

    assert_eq!(out, Guarded::Content(children));
    assert!(calls.borrow().is_empty());
}

#[test]
fn back_navigation_skips_guarded_page_after_redirect() {
    let guard = RouteGuard::default();
    let history = MemoryHistory::new("/");
    history.navigate("/projects", NavigateOptions::default());
    let session = Session { is_initialized: true, is_auth_loading: false, user: None };

    let _ = guard.guard(&session, "/projects", &history, ());

    assert_eq!(history.current().path, "/login");
    assert!(history.back());
    assert_eq!(history.current().path, "/");
    assert!(!history.back());
}

// =============================================================================
// MemoryHistory
// =============================================================================

#[test]
fn history_push_truncates_forward_entries() {
    let history = MemoryHistory::new("/");
    history.navigate("/a", NavigateOptions::default());
    history.navigate("/b", NavigateOptions::default());
    assert!(history.back());
    history.navigate("/c", NavigateOptions::default());
    assert_eq!(history.len(), 3);
    assert_eq!(history.current().path, "/c");
    assert!(history.back());
    assert_eq!(history.current().path, "/a");
}

#[test]
fn history_replace_keeps_length() {
    let history = MemoryHistory::new("/start");
    history.navigate("/next", NavigateOptions { replace: true, state: Some(json!({ "k": 1 })) });
    assert_eq!(history.len(), 1);
    assert_eq!(history.current(), HistoryEntry { path: "/next".into(), state: Some(json!({ "k": 1 })) });
}

// =============================================================================
// login_return_path
// =============================================================================

#[test]
fn login_return_path_requires_absolute_from() {
    assert_eq!(login_return_path(Some(&json!({ "from": "/p" }))), Some("/p"));
    assert_eq!(login_return_path(Some(&json!({ "from": "https://evil.test" }))), None);
    assert_eq!(login_return_path(Some(&json!({ "from": "//evil.test/p" }))), None);
    assert_eq!(login_return_path(Some(&json!({ "from": "/\\evil.test" }))), None);
    assert_eq!(login_return_path(Some(&json!({ "from": "/projects\\p1" }))), Some("/projects\\p1"));
    assert_eq!(login_return_path(Some(&json!({ "other": 1 }))), None);
    assert_eq!(login_return_path(None), None);
}
