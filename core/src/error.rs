//! Error taxonomy for the Crowd client.
//!
//! # Design
//! Crowd reports most failures as a 400 carrying a reason code. Rather than
//! one error type per code, every reason-mapped failure shares the `Reason`
//! variant and carries the `Reason` discriminant plus the server's message.
//! Failures that are not reason-mapped (bad configuration, transport, an
//! unparseable body, an unexpected status) get their own variants.

use thiserror::Error;

use crate::reason::Reason;

pub type Result<T> = std::result::Result<T, CrowdError>;

/// Errors returned by `CrowdClient` operations and `CrowdProtocol` parsers.
#[derive(Debug, Error)]
pub enum CrowdError {
    /// A required client setting is missing. Raised before any request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A body that should have been an XML document could not be read as one.
    #[error("invalid response from server: {0}")]
    InvalidResponse(String),

    /// A request body could not be rendered as XML.
    #[error("failed to serialize request body: {0}")]
    Serialization(String),

    /// The operation does not handle this status code.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Session validation answered 404: the token is unknown or expired.
    #[error("SSO token is invalid or has expired")]
    InvalidSsoToken,

    /// A failure reported by the server that is not reason-mapped.
    #[error("server error: {message}")]
    Server { message: String },

    /// A failure reported with one of the known reason codes.
    #[error("{reason}: {}", reason_text(.reason, .message))]
    Reason {
        reason: Reason,
        message: Option<String>,
    },

    /// A 400 whose reason code is missing or not one of the known codes.
    #[error("unknown reason {code:?}: {}", .message.as_deref().unwrap_or("no message"))]
    UnknownReason {
        code: String,
        message: Option<String>,
    },
}

fn reason_text<'a>(reason: &Reason, message: &'a Option<String>) -> &'a str {
    message.as_deref().unwrap_or(reason.description())
}

impl CrowdError {
    /// The reason code, for reason-mapped failures.
    pub fn reason(&self) -> Option<Reason> {
        match self {
            CrowdError::Reason { reason, .. } => Some(*reason),
            CrowdError::InvalidSsoToken => Some(Reason::InvalidSsoToken),
            _ => None,
        }
    }

    /// The message the server supplied, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            CrowdError::Server { message } => Some(message),
            CrowdError::Reason { message, .. } | CrowdError::UnknownReason { message, .. } => {
                message.as_deref()
            }
            _ => None,
        }
    }

    /// True for a 404 on validation and for an `INVALID_SSO_TOKEN` reason.
    pub fn is_invalid_sso_token(&self) -> bool {
        self.reason() == Some(Reason::InvalidSsoToken)
    }
}
