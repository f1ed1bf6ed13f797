//! Blocking client for Atlassian Crowd's usermanagement REST API.
//!
//! # Overview
//! Authenticates users, manages SSO session tokens and reads user and group
//! records. Requests and responses are XML over HTTP with application Basic
//! authentication.
//!
//! # Design
//! - `CrowdProtocol` builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network; each operation is a `build_*` /
//!   `parse_*` pair.
//! - `Transport` executes requests. `UreqTransport` is the default; tests
//!   substitute scripted transports.
//! - `CrowdClient` composes the two and exposes one method per operation.
//! - Server failures map onto `CrowdError`; reason-coded 400s carry a
//!   `Reason`.
//!
//! ```no_run
//! use crowd_core::{ClientConfig, CrowdClient};
//!
//! # fn main() -> crowd_core::Result<()> {
//! let client = CrowdClient::new(ClientConfig::new("https://people.example.com", "app", "secret")?);
//! let session = client.create_session_token("jdoe", "password")?;
//! client.validate_session_token(&session.token)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod reason;
pub mod transport;
pub mod types;
pub mod xml;

pub use client::{CrowdClient, DEFAULT_REMOTE_ADDRESS};
pub use config::ClientConfig;
pub use error::{CrowdError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use protocol::CrowdProtocol;
pub use reason::Reason;
pub use transport::{Transport, UreqTransport};
pub use types::{GroupList, SessionToken, UserRecord};
