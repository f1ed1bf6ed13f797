//! Connection settings for a Crowd server.
//!
//! A `ClientConfig` can only be obtained through `new` or `from_env`, both of
//! which reject blank fields, so every `CrowdClient` holds complete settings
//! and no operation has to re-check them.

use std::env;
use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CrowdError, Result};

pub const ENV_SERVER_URL: &str = "CROWD_SERVER_URL";
pub const ENV_APP_NAME: &str = "CROWD_APP_NAME";
pub const ENV_APP_PASSWORD: &str = "CROWD_APP_PASSWORD";
pub const ENV_TIMEOUT_SECS: &str = "CROWD_TIMEOUT_SECS";

/// Server location and application credentials. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    server_url: String,
    app_name: String,
    app_password: String,
    timeout: Option<Duration>,
}

impl ClientConfig {
    /// `server_url` is the scheme and host, e.g. `https://people.example.com`.
    /// A trailing `/` is dropped.
    pub fn new(
        server_url: impl Into<String>,
        app_name: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Result<Self> {
        let server_url = server_url.into();
        let server_url = require("server URL", server_url.trim_end_matches('/').to_string())?;
        let app_name = require("application name", app_name.into())?;
        let app_password = require("application password", app_password.into())?;
        Ok(Self {
            server_url,
            app_name,
            app_password,
            timeout: None,
        })
    }

    /// Read settings from `CROWD_SERVER_URL`, `CROWD_APP_NAME`,
    /// `CROWD_APP_PASSWORD` and the optional `CROWD_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let config = Self::new(
            env::var(ENV_SERVER_URL).unwrap_or_default(),
            env::var(ENV_APP_NAME).unwrap_or_default(),
            env::var(ENV_APP_PASSWORD).unwrap_or_default(),
        )?;
        match env::var(ENV_TIMEOUT_SECS) {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    CrowdError::Configuration(format!(
                        "{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}"
                    ))
                })?;
                Ok(config.with_timeout(Duration::from_secs(secs)))
            }
            Err(_) => Ok(config),
        }
    }

    /// Overall deadline for a single HTTP exchange, handed to the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn app_password(&self) -> &str {
        &self.app_password
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Value of the `Authorization` header for application authentication.
    pub fn basic_auth(&self) -> String {
        let credentials = format!("{}:{}", self.app_name, self.app_password);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("app_name", &self.app_name)
            .field("app_password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn require(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(CrowdError::Configuration(format!(
            "{field} must be set before using the client"
        )));
    }
    Ok(value)
}
