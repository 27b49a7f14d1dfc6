//! Read-only view of the caller's authentication state.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Authentication state supplied by the hosting application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub is_authenticated: bool,
    pub token: Option<String>,
}

impl AuthContext {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            token: Some(token.into()),
        }
    }

    /// The header value to send, if the context is authenticated with a token.
    pub fn authorization(&self) -> Option<String> {
        match (self.is_authenticated, &self.token) {
            (true, Some(token)) if !token.is_empty() => Some(format!("Bearer {token}")),
            _ => None,
        }
    }
}

/// Shared handle to the current [`AuthContext`].
///
/// The scan client only reads from it; the hosting application swaps it on
/// login/logout. Clone is cheap (inner Arc).
#[derive(Debug, Clone, Default)]
pub struct AuthHandle {
    inner: Arc<RwLock<AuthContext>>,
}

impl AuthHandle {
    pub fn new(context: AuthContext) -> Self {
        Self {
            inner: Arc::new(RwLock::new(context)),
        }
    }

    /// Replace the current context.
    pub async fn set(&self, context: AuthContext) {
        *self.inner.write().await = context;
    }

    pub async fn current(&self) -> AuthContext {
        self.inner.read().await.clone()
    }

    /// Attach the authorization header to a request when authenticated.
    pub async fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.inner.read().await.authorization() {
            Some(value) => builder.header(reqwest::header::AUTHORIZATION, value),
            None => builder,
        }
    }
}
