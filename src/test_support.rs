//! Shared fakes for unit tests: in-process HTTP backends and a scripted
//! auth provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{AuthError, AuthProvider, AuthSnapshot, AuthToken, TokenOptions};
use crate::session::User;

/// Bind `router` on an ephemeral localhost port and return its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server");
    });
    format!("http://{addr}")
}

pub fn alice() -> User {
    User { id: "user_alice".into(), email: Some("alice@example.test".into()), name: Some("Alice".into()) }
}

/// One scripted `get_token` answer: wait `delay`, then yield `token`.
pub struct TokenStep {
    pub delay: Duration,
    pub result: Result<Option<&'static str>, ()>,
}

impl TokenStep {
    pub fn ok(delay_ms: u64, token: &'static str) -> Self {
        Self { delay: Duration::from_millis(delay_ms), result: Ok(Some(token)) }
    }

    pub fn none(delay_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), result: Ok(None) }
    }

    pub fn fail(delay_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), result: Err(()) }
    }
}

/// Auth provider with a scripted handshake and token sequence.
pub struct FakeAuth {
    pub snapshot: Mutex<Result<AuthSnapshot, ()>>,
    pub load_delay: Duration,
    pub loads: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub steps: Mutex<VecDeque<TokenStep>>,
}

impl FakeAuth {
    pub fn new(snapshot: AuthSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Ok(snapshot)),
            load_delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
            steps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn failing() -> Self {
        let fake = Self::new(AuthSnapshot::default());
        *fake.snapshot.lock().unwrap() = Err(());
        fake
    }

    pub fn with_load_delay(mut self, delay_ms: u64) -> Self {
        self.load_delay = Duration::from_millis(delay_ms);
        self
    }

    pub fn with_tokens(self, steps: Vec<TokenStep>) -> Self {
        *self.steps.lock().unwrap() = steps.into();
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AuthProvider for FakeAuth {
    async fn load(&self) -> Result<AuthSnapshot, AuthError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .map_err(|()| AuthError::Request("handshake failed".into()))
    }

    async fn get_token(&self, _options: &TokenOptions) -> Result<Option<AuthToken>, AuthError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TokenStep { delay: Duration::ZERO, result: Ok(None) });
        tokio::time::sleep(step.delay).await;
        match step.result {
            Ok(token) => Ok(token.map(AuthToken::new)),
            Err(()) => Err(AuthError::Response { status: 503, body: "unavailable".into() }),
        }
    }
}

pub fn shared(fake: FakeAuth) -> Arc<FakeAuth> {
    Arc::new(fake)
}
