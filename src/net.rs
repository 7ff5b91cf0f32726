pub mod client;

use crate::{error::TransportError, types::Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    #[serde(with = "crate::marshal::wire")]
    pub payload: Value,
    /// Empty when no session token is held.
    pub token: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    AuthRequired,
    AuthRejected,
    RemoteError,
}

impl Status {
    pub fn is_auth_failure(self) -> bool {
        matches!(self, Status::AuthRequired | Status::AuthRejected)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    #[serde(with = "crate::marshal::wire")]
    pub payload: Value,
    pub message: Option<String>,
}

impl Response {
    pub fn ok(payload: impl Into<Value>) -> Self {
        Self {
            status: Status::Ok,
            payload: payload.into(),
            message: None,
        }
    }

    pub fn auth_required() -> Self {
        Self::status(Status::AuthRequired)
    }

    pub fn auth_rejected() -> Self {
        Self::status(Status::AuthRejected)
    }

    pub fn remote_error(message: impl Into<String>) -> Self {
        Self {
            status: Status::RemoteError,
            payload: Value::Nil,
            message: Some(message.into()),
        }
    }

    fn status(status: Status) -> Self {
        Self {
            status,
            payload: Value::Nil,
            message: None,
        }
    }
}

/// Carries one request envelope to `domain` and returns the response envelope.
///
/// Implementations own their retry and timeout policy; the connector never
/// retries a [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, domain: &str, request: Request) -> Result<Response, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn round_trip(&self, domain: &str, request: Request) -> Result<Response, TransportError> {
        (**self).round_trip(domain, request).await
    }
}
