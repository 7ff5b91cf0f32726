use crate::{
    auth::{AuthNegotiator, SessionState},
    config::ConnectorConfig,
    debug::{DebugConfig, DebugSink},
    dispatcher::Dispatcher,
    error::Result,
    marshal,
    net::{client::TcpClient, Transport},
    session::{SessionPersistor, TokenStore},
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Client for invoking named methods on a remote service.
///
/// Authentication is lazy: no I/O happens until the first call. A single
/// connector can be shared between tasks.
///
/// # Example
///
/// ```rust,no_run
/// use dyn_connector::{Connector, MemoryPersistor, Value};
/// use std::sync::Arc;
///
/// # async fn example() -> dyn_connector::Result<()> {
/// let connector = Connector::new("modulo.srl", "test", "test", Arc::new(MemoryPersistor::new()))?;
/// connector.set_debug(true, None, false);
///
/// let request: Value = [("KeyA", 1024)].into_iter().collect();
/// let reply: Value = connector.call("echo", &request).await?;
/// assert_eq!(reply, request);
/// # Ok(())
/// # }
/// ```
pub struct Connector<T = TcpClient> {
    dispatcher: Dispatcher<T>,
    debug: RwLock<DebugConfig>,
}

impl Connector<TcpClient> {
    pub fn new(
        domain: impl Into<String>,
        auth_uid: impl Into<String>,
        master_token: impl Into<String>,
        persistor: Arc<dyn SessionPersistor>,
    ) -> Result<Self> {
        let config = ConnectorConfig::new(domain, auth_uid, master_token);
        let transport = TcpClient::new(config.timeout());
        Self::with_transport(config, persistor, transport)
    }
}

impl<T: Transport> Connector<T> {
    pub fn with_transport(
        config: ConnectorConfig,
        persistor: Arc<dyn SessionPersistor>,
        transport: T,
    ) -> Result<Self> {
        config.validate()?;
        let auth = AuthNegotiator::new(&config, TokenStore::new(persistor));
        Ok(Self {
            dispatcher: Dispatcher::new(config.domain, transport, auth),
            debug: RwLock::new(DebugConfig::default()),
        })
    }

    /// Configures diagnostic tracing. `None` selects [`DebugSink::Tracing`].
    pub fn set_debug(&self, enabled: bool, sink: Option<DebugSink>, verbose: bool) {
        *self.debug.write().unwrap_or_else(PoisonError::into_inner) = DebugConfig {
            enabled,
            sink: sink.unwrap_or_default(),
            verbose,
        };
    }

    pub fn session_state(&self) -> SessionState {
        self.dispatcher.auth().state()
    }

    /// Number of authentication handshakes performed so far.
    pub fn handshakes(&self) -> usize {
        self.dispatcher.auth().handshakes()
    }

    /// Invokes `method` and stores the decoded reply in `response`.
    ///
    /// `response` is only written when the whole call succeeds.
    pub async fn send<Req, Resp>(&self, method: &str, request: &Req, response: &mut Resp) -> Result<()>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        *response = self.call(method, request).await?;
        Ok(())
    }

    /// Invokes `method` and returns the decoded reply.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let debug = self.debug.read().unwrap_or_else(PoisonError::into_inner).clone();
        let payload = marshal::to_value(request)?;
        let token = self.dispatcher.ensure_token(&debug).await?;
        let reply = self.dispatcher.call(method, payload, token, &debug).await?;
        Ok(marshal::from_value(reply)?)
    }
}
