//! Blocking Crowd client: one protocol round-trip per operation.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::protocol::CrowdProtocol;
use crate::transport::{Transport, UreqTransport};
use crate::types::{GroupList, SessionToken, UserRecord};

/// Remote address bound to sessions when the caller does not name one.
pub const DEFAULT_REMOTE_ADDRESS: &str = "127.0.0.1";

/// Client for Crowd's usermanagement REST API.
///
/// Holds no mutable state: the configuration is fixed at construction and
/// every call is an independent exchange, so a shared reference can be used
/// from several threads when the transport allows it.
#[derive(Debug, Clone)]
pub struct CrowdClient<T = UreqTransport> {
    protocol: CrowdProtocol,
    transport: T,
}

impl CrowdClient<UreqTransport> {
    /// Client over the default `ureq` transport, honouring the configured
    /// timeout.
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.timeout());
        Self::with_transport(config, transport)
    }

    /// Validate the three settings and build a client in one step.
    pub fn connect(
        server_url: impl Into<String>,
        app_name: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(ClientConfig::new(server_url, app_name, app_password)?))
    }
}

impl<T: Transport> CrowdClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            protocol: CrowdProtocol::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.protocol.config()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(method = %request.method, url = %request.url, "sending Crowd request");
        let response = self.transport.execute(&request)?;
        tracing::debug!(status = response.status, url = %request.url, "Crowd responded");
        Ok(response)
    }

    /// Check a user's password. Returns the user on success.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<UserRecord> {
        let request = self.protocol.build_authenticate(username, password)?;
        self.protocol.parse_authenticate(self.send(request)?)
    }

    /// Open an SSO session bound to `DEFAULT_REMOTE_ADDRESS`.
    pub fn create_session_token(&self, username: &str, password: &str) -> Result<SessionToken> {
        self.create_session_token_from(username, password, DEFAULT_REMOTE_ADDRESS)
    }

    /// Open an SSO session bound to `remote_address`, then fetch the session
    /// resource Crowd points at in `Location`.
    pub fn create_session_token_from(
        &self,
        username: &str,
        password: &str,
        remote_address: &str,
    ) -> Result<SessionToken> {
        let request = self
            .protocol
            .build_create_session_token(username, password, remote_address)?;
        let location = self.protocol.parse_create_session_token(self.send(request)?)?;
        let request = self.protocol.build_follow_location(&location);
        self.protocol.parse_session(self.send(request)?)
    }

    pub fn retrieve_token(&self, token: &str) -> Result<SessionToken> {
        let request = self.protocol.build_retrieve_token(token);
        self.protocol.parse_retrieve_token(self.send(request)?)
    }

    /// `Ok(())` means the session is valid for `DEFAULT_REMOTE_ADDRESS`.
    pub fn validate_session_token(&self, token: &str) -> Result<()> {
        self.validate_session_token_from(token, DEFAULT_REMOTE_ADDRESS)
    }

    pub fn validate_session_token_from(&self, token: &str, remote_address: &str) -> Result<()> {
        let request = self
            .protocol
            .build_validate_session_token(token, remote_address)?;
        self.protocol.parse_validate_session_token(self.send(request)?)
    }

    pub fn invalidate_session_token(&self, token: &str) -> Result<()> {
        let request = self.protocol.build_invalidate_session_token(token);
        self.protocol.parse_invalidate_session_token(self.send(request)?)
    }

    /// Fetch a user; with `include_attributes` its custom attributes are
    /// merged into `UserRecord::attributes`.
    pub fn retrieve_user(&self, username: &str, include_attributes: bool) -> Result<UserRecord> {
        let request = self.protocol.build_retrieve_user(username, include_attributes);
        self.protocol
            .parse_retrieve_user(self.send(request)?, include_attributes)
    }

    /// Names of the groups the user is a direct member of.
    pub fn retrieve_user_groups(&self, username: &str) -> Result<GroupList> {
        let request = self.protocol.build_retrieve_user_groups(username);
        self.protocol.parse_retrieve_user_groups(self.send(request)?)
    }
}
