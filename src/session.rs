//! Session token persistence.

use std::sync::{Arc, Mutex, PoisonError};

/// Application-supplied storage for the session token, shared across
/// connector instances.
///
/// An empty string means no token is stored.
pub trait SessionPersistor: Send + Sync {
    fn session_token(&self) -> String;
    fn set_session_token(&self, token: &str);
}

impl<P: SessionPersistor + ?Sized> SessionPersistor for Arc<P> {
    fn session_token(&self) -> String {
        (**self).session_token()
    }

    fn set_session_token(&self, token: &str) {
        (**self).set_session_token(token)
    }
}

/// Keeps the token in process memory.
#[derive(Debug, Default)]
pub struct MemoryPersistor {
    token: Mutex<String>,
}

impl MemoryPersistor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(token.into()),
        }
    }
}

impl SessionPersistor for MemoryPersistor {
    fn session_token(&self) -> String {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_session_token(&self, token: &str) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.to_owned();
    }
}

/// Thin adapter over a [`SessionPersistor`] that maps empty tokens to `None`.
#[derive(Clone)]
pub(crate) struct TokenStore {
    persistor: Arc<dyn SessionPersistor>,
}

impl TokenStore {
    pub(crate) fn new(persistor: Arc<dyn SessionPersistor>) -> Self {
        Self { persistor }
    }

    pub(crate) fn get(&self) -> Option<String> {
        Some(self.persistor.session_token()).filter(|t| !t.is_empty())
    }

    pub(crate) fn set(&self, token: &str) {
        self.persistor.set_session_token(token)
    }

    pub(crate) fn clear(&self) {
        self.persistor.set_session_token("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_reads_as_none() {
        let store = TokenStore::new(Arc::new(MemoryPersistor::new()));
        assert_eq!(store.get(), None);
        store.set("abc");
        assert_eq!(store.get().as_deref(), Some("abc"));
        store.clear();
        assert_eq!(store.get(), None);
    }
}
