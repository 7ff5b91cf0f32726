//! Client connector for invoking named methods on a remote service.
//!
//! A [`Connector`] marshals typed requests into [`Value`]s, obtains a
//! session token from long-lived credentials when needed, sends the request
//! envelope over a [`Transport`] and decodes the reply. A token rejected by
//! the service is refreshed once and the call retried once.

pub mod auth;
pub mod config;
pub mod connector;
pub mod debug;
mod dispatcher;
pub mod error;
pub mod marshal;
pub mod net;
pub mod session;
pub mod types;

pub use auth::SessionState;
pub use config::ConnectorConfig;
pub use connector::Connector;
pub use debug::{DebugConfig, DebugSink};
pub use error::{
    AuthError, ConfigError, Error, HandshakeFailure, MarshalError, RemoteError, Result,
    TransportError,
};
pub use net::{client::TcpClient, Request, Response, Status, Transport};
pub use session::{MemoryPersistor, SessionPersistor};
pub use types::{Map, Type, Value};
