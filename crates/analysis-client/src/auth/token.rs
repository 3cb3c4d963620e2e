//! Token providers
//!
//! The controller asks its provider for a token before every connection
//! attempt, so a rotated token is picked up by the next reconnect.

use parking_lot::RwLock;
use std::fmt;

/// Supplies the token sent as the `token` query parameter
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` to connect anonymously
    fn token(&self) -> Option<String>;
}

/// A token fixed at construction
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A token that can be replaced while the client is running
#[derive(Default)]
pub struct SharedToken {
    inner: RwLock<Option<String>>,
}

impl SharedToken {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self {
            inner: RwLock::new(token),
        }
    }

    /// Replace the token; takes effect on the next connection attempt
    pub fn rotate(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
        tracing::debug!("Auth token rotated");
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().clone()
    }
}

impl fmt::Debug for SharedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedToken")
            .field("set", &self.inner.read().is_some())
            .finish()
    }
}
