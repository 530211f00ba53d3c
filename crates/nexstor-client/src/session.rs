//! Authentication session shared by the client and its transport

use parking_lot::RwLock;
use std::fmt;

/// Bearer token obtained from `auth/login`
///
/// Held behind an `Arc` by both the [`Client`](crate::Client), which refreshes
/// it, and the [`HttpTransport`](crate::HttpTransport), which attaches it to
/// every request.
#[derive(Default)]
pub struct Session {
    token: RwLock<Option<String>>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
