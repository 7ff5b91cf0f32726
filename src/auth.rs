//! Session token negotiation.
//!
//! The cached token is optimistic: it is handed out without a round trip
//! and only dropped once the service rejects it.

use crate::{
    config::ConnectorConfig,
    debug::DebugConfig,
    error::{AuthError, HandshakeFailure},
    marshal,
    net::{Request, Status, Transport},
    session::TokenStore,
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, PoisonError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Serialize)]
struct Credentials<'a> {
    uid: &'a str,
    master_token: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Grant {
    auth: bool,
    session_token: String,
}

pub(crate) struct AuthNegotiator {
    domain: String,
    auth_uid: String,
    master_token: String,
    auth_method: String,
    store: TokenStore,
    cached: Mutex<Option<String>>,
    // Held for the whole handshake so at most one is in flight.
    in_flight: tokio::sync::Mutex<()>,
    handshakes: AtomicUsize,
}

impl AuthNegotiator {
    pub(crate) fn new(config: &ConnectorConfig, store: TokenStore) -> Self {
        Self {
            domain: config.domain.clone(),
            auth_uid: config.auth_uid.clone(),
            master_token: config.master_token.clone(),
            auth_method: config.auth_method.clone(),
            store,
            cached: Mutex::new(None),
            in_flight: tokio::sync::Mutex::new(()),
            handshakes: AtomicUsize::new(0),
        }
    }

    fn cached(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        if self.cached().is_some() {
            SessionState::Authenticated
        } else if self.in_flight.try_lock().is_err() {
            SessionState::Authenticating
        } else {
            SessionState::Unauthenticated
        }
    }

    pub(crate) fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::Relaxed)
    }

    /// Returns the cached token, falling back to the persisted one and
    /// finally to a handshake.
    pub(crate) async fn ensure_token(
        &self,
        transport: &dyn Transport,
        debug: &DebugConfig,
    ) -> Result<String, AuthError> {
        let cached = self.cached().clone();
        if let Some(token) = cached {
            return Ok(token);
        }

        let _flight = self.in_flight.lock().await;
        // Another caller may have finished a handshake while we waited.
        let cached = self.cached().clone();
        if let Some(token) = cached {
            return Ok(token);
        }
        if let Some(token) = self.store.get() {
            *self.cached() = Some(token.clone());
            return Ok(token);
        }

        debug.note(format_args!("authenticating as \"{}\"", self.auth_uid));
        match self.handshake(transport).await {
            Ok(token) => {
                self.store.set(&token);
                *self.cached() = Some(token.clone());
                debug.note(format_args!("authenticated, new session token"));
                Ok(token)
            }
            Err(cause) => {
                tracing::warn!(domain = %self.domain, "authentication handshake failed: {cause}");
                Err(AuthError::HandshakeFailed(cause))
            }
        }
    }

    /// Drops `stale` after the service rejected it. A token that has
    /// already been replaced is left alone.
    pub(crate) fn invalidate(&self, stale: &str) {
        let mut cached = self.cached();
        if cached.as_deref() == Some(stale) {
            *cached = None;
            self.store.clear();
            tracing::debug!(domain = %self.domain, "session token invalidated");
        }
    }

    async fn handshake(&self, transport: &dyn Transport) -> Result<String, HandshakeFailure> {
        self.handshakes.fetch_add(1, Ordering::Relaxed);
        let payload = marshal::to_value(&Credentials {
            uid: &self.auth_uid,
            master_token: &self.master_token,
        })?;
        let request = Request {
            method: self.auth_method.clone(),
            payload,
            token: String::new(),
        };

        let response = transport.round_trip(&self.domain, request).await?;
        if response.status != Status::Ok {
            let reason = response
                .message
                .unwrap_or_else(|| format!("{:?}", response.status));
            return Err(HandshakeFailure::Rejected(reason));
        }

        let grant: Grant = marshal::from_value(response.payload)?;
        if grant.auth && !grant.session_token.is_empty() {
            Ok(grant.session_token)
        } else {
            Err(HandshakeFailure::Rejected("no session token granted".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TransportError,
        net::Response,
        session::{MemoryPersistor, SessionPersistor},
        types::Value,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Granting;

    #[async_trait]
    impl Transport for Granting {
        async fn round_trip(&self, _domain: &str, request: Request) -> Result<Response, TransportError> {
            assert!(request.token.is_empty());
            assert_eq!(request.payload.get("uid"), Some(&Value::from("test")));
            Ok(Response::ok(
                [("auth", Value::from(true)), ("session_token", "tok-1".into())]
                    .into_iter()
                    .collect::<Value>(),
            ))
        }
    }

    struct Refusing;

    #[async_trait]
    impl Transport for Refusing {
        async fn round_trip(&self, _domain: &str, _request: Request) -> Result<Response, TransportError> {
            Ok(Response::ok([("auth", false)].into_iter().collect::<Value>()))
        }
    }

    fn negotiator(persistor: Arc<MemoryPersistor>) -> AuthNegotiator {
        let config = ConnectorConfig::new("modulo.srl", "test", "test");
        AuthNegotiator::new(&config, TokenStore::new(persistor))
    }

    #[tokio::test]
    async fn handshake_once_then_cached() {
        let persistor = Arc::new(MemoryPersistor::new());
        let auth = negotiator(persistor.clone());
        let debug = DebugConfig::default();
        assert_eq!(auth.state(), SessionState::Unauthenticated);

        assert_eq!(auth.ensure_token(&Granting, &debug).await.unwrap(), "tok-1");
        assert_eq!(auth.ensure_token(&Granting, &debug).await.unwrap(), "tok-1");
        assert_eq!(auth.handshakes(), 1);
        assert_eq!(auth.state(), SessionState::Authenticated);
        assert_eq!(persistor.session_token(), "tok-1");
    }

    #[tokio::test]
    async fn persisted_token_skips_handshake() {
        let auth = negotiator(Arc::new(MemoryPersistor::with_token("saved")));
        let token = auth
            .ensure_token(&Refusing, &DebugConfig::default())
            .await
            .unwrap();
        assert_eq!(token, "saved");
        assert_eq!(auth.handshakes(), 0);
    }

    #[tokio::test]
    async fn invalidate_only_drops_the_stale_token() {
        let persistor = Arc::new(MemoryPersistor::new());
        let auth = negotiator(persistor.clone());
        let debug = DebugConfig::default();
        auth.ensure_token(&Granting, &debug).await.unwrap();

        auth.invalidate("something-older");
        assert_eq!(auth.state(), SessionState::Authenticated);

        auth.invalidate("tok-1");
        assert_eq!(auth.state(), SessionState::Unauthenticated);
        assert_eq!(persistor.session_token(), "");
    }

    #[tokio::test]
    async fn refused_grant_is_a_handshake_failure() {
        let auth = negotiator(Arc::new(MemoryPersistor::new()));
        let err = auth
            .ensure_token(&Refusing, &DebugConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::HandshakeFailed(HandshakeFailure::Rejected(_))
        ));
        assert_eq!(auth.state(), SessionState::Unauthenticated);
    }
}
