use crate::error::ConfigError;
use serde::Deserialize;
use std::{fmt, time::Duration};

/// Connection settings and long-lived credentials for one connector.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Service domain, optionally with a port (e.g. `"modulo.srl"`).
    pub domain: String,
    pub auth_uid: String,
    pub master_token: String,
    /// Remote method performing the authentication handshake (default: `"auth"`).
    pub auth_method: String,
    /// Transport timeout in seconds (default: 60)
    pub timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            auth_uid: String::new(),
            master_token: String::new(),
            auth_method: "auth".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ConnectorConfig {
    pub fn new(
        domain: impl Into<String>,
        auth_uid: impl Into<String>,
        master_token: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            auth_uid: auth_uid.into(),
            master_token: master_token.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::InvalidArgument("domain must not be empty"));
        }
        if self.auth_uid.is_empty() {
            return Err(ConfigError::InvalidArgument("auth_uid must not be empty"));
        }
        if self.auth_method.is_empty() {
            return Err(ConfigError::InvalidArgument("auth_method must not be empty"));
        }
        // A zero timeout would fail every round trip before it starts.
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidArgument("timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Keeps the master token out of logs.
impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("domain", &self.domain)
            .field("auth_uid", &self.auth_uid)
            .field("master_token", &"<redacted>")
            .field("auth_method", &self.auth_method)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
