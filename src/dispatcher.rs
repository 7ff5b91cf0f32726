use crate::{
    auth::AuthNegotiator,
    debug::DebugConfig,
    error::{AuthError, RemoteError, Result, TransportError},
    net::{Request, Response, Status, Transport},
    types::Value,
};

/// Sends request envelopes and classifies the responses.
///
/// An auth failure on the first attempt triggers one re-authentication and
/// one retry; nothing else is retried here.
pub(crate) struct Dispatcher<T> {
    domain: String,
    transport: T,
    auth: AuthNegotiator,
}

impl<T: Transport> Dispatcher<T> {
    pub(crate) fn new(domain: String, transport: T, auth: AuthNegotiator) -> Self {
        Self {
            domain,
            transport,
            auth,
        }
    }

    pub(crate) fn auth(&self) -> &AuthNegotiator {
        &self.auth
    }

    pub(crate) async fn ensure_token(&self, debug: &DebugConfig) -> Result<String> {
        Ok(self.auth.ensure_token(&self.transport, debug).await?)
    }

    async fn send_once(
        &self,
        method: &str,
        payload: &Value,
        token: &str,
        debug: &DebugConfig,
    ) -> std::result::Result<Response, TransportError> {
        debug.request(method, token, payload);
        let request = Request {
            method: method.to_owned(),
            payload: payload.clone(),
            token: token.to_owned(),
        };
        let response = self
            .transport
            .round_trip(&self.domain, request)
            .await
            .map_err(|e| {
                tracing::debug!(domain = %self.domain, method, "transport failure: {e}");
                e
            })?;
        debug.response(method, response.status, &response.payload);
        Ok(response)
    }

    pub(crate) async fn call(
        &self,
        method: &str,
        payload: Value,
        token: String,
        debug: &DebugConfig,
    ) -> Result<Value> {
        let mut response = self.send_once(method, &payload, &token, debug).await?;

        if response.status.is_auth_failure() {
            debug.note(format_args!(
                "\"{method}\" answered {:?}, re-authenticating",
                response.status
            ));
            self.auth.invalidate(&token);
            let token = self.ensure_token(debug).await?;
            response = self.send_once(method, &payload, &token, debug).await?;
        }

        match response.status {
            Status::Ok => Ok(response.payload),
            Status::AuthRequired | Status::AuthRejected => Err(AuthError::Unauthorized.into()),
            Status::RemoteError => Err(RemoteError {
                message: response.message.unwrap_or_default(),
            }
            .into()),
        }
    }
}
