//! Reason codes reported by Crowd in the body of 400 responses.

use std::fmt;
use std::str::FromStr;

/// A failure reason the server reports as `<error><reason>CODE</reason>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    ApplicationAccessDenied,
    ApplicationPermissionDenied,
    ExpiredCredential,
    GroupNotFound,
    IllegalArgument,
    InactiveAccount,
    InvalidUserAuthentication,
    InvalidCredential,
    InvalidEmail,
    InvalidGroup,
    InvalidSsoToken,
    InvalidUser,
    MembershipNotFound,
    NestedGroupsNotSupported,
    UnsupportedOperation,
    UserNotFound,
    OperationFailed,
}

impl Reason {
    pub const ALL: [Reason; 17] = [
        Reason::ApplicationAccessDenied,
        Reason::ApplicationPermissionDenied,
        Reason::ExpiredCredential,
        Reason::GroupNotFound,
        Reason::IllegalArgument,
        Reason::InactiveAccount,
        Reason::InvalidUserAuthentication,
        Reason::InvalidCredential,
        Reason::InvalidEmail,
        Reason::InvalidGroup,
        Reason::InvalidSsoToken,
        Reason::InvalidUser,
        Reason::MembershipNotFound,
        Reason::NestedGroupsNotSupported,
        Reason::UnsupportedOperation,
        Reason::UserNotFound,
        Reason::OperationFailed,
    ];

    /// Look up a wire token. Matching is exact; Crowd always sends upper
    /// snake case.
    pub fn from_code(code: &str) -> Option<Reason> {
        Reason::ALL.into_iter().find(|reason| reason.as_str() == code)
    }

    /// The token as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::ApplicationAccessDenied => "APPLICATION_ACCESS_DENIED",
            Reason::ApplicationPermissionDenied => "APPLICATION_PERMISSION_DENIED",
            Reason::ExpiredCredential => "EXPIRED_CREDENTIAL",
            Reason::GroupNotFound => "GROUP_NOT_FOUND",
            Reason::IllegalArgument => "ILLEGAL_ARGUMENT",
            Reason::InactiveAccount => "INACTIVE_ACCOUNT",
            Reason::InvalidUserAuthentication => "INVALID_USER_AUTHENTICATION",
            Reason::InvalidCredential => "INVALID_CREDENTIAL",
            Reason::InvalidEmail => "INVALID_EMAIL",
            Reason::InvalidGroup => "INVALID_GROUP",
            Reason::InvalidSsoToken => "INVALID_SSO_TOKEN",
            Reason::InvalidUser => "INVALID_USER",
            Reason::MembershipNotFound => "MEMBERSHIP_NOT_FOUND",
            Reason::NestedGroupsNotSupported => "NESTED_GROUPS_NOT_SUPPORTED",
            Reason::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Reason::UserNotFound => "USER_NOT_FOUND",
            Reason::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Human description used when the server sends no message of its own.
    pub fn description(self) -> &'static str {
        match self {
            Reason::ApplicationAccessDenied => {
                "user does not have access to a particular application"
            }
            Reason::ApplicationPermissionDenied => {
                "application does not have permission to perform the operation"
            }
            Reason::ExpiredCredential => "user credentials have expired",
            Reason::GroupNotFound => "group does not exist",
            Reason::IllegalArgument => "an illegal argument was passed",
            Reason::InactiveAccount => "user account is inactive",
            Reason::InvalidUserAuthentication => "authentication failed for the user",
            Reason::InvalidCredential => "supplied credential is not valid",
            Reason::InvalidEmail => "email address is not valid",
            Reason::InvalidGroup => {
                "given group is invalid, e.g. unknown group type or a group that already exists"
            }
            Reason::InvalidSsoToken => "SSO token is invalid or has expired",
            Reason::InvalidUser => "given user is invalid, e.g. a user that already exists",
            Reason::MembershipNotFound => "membership does not exist",
            Reason::NestedGroupsNotSupported => "nested groups are not supported",
            Reason::UnsupportedOperation => "requested operation is not supported",
            Reason::UserNotFound => "user does not exist",
            Reason::OperationFailed => "operation failed on the server",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by `Reason::from_str` for a token outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownReasonCode(pub String);

impl fmt::Display for UnknownReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown reason code: {}", self.0)
    }
}

impl std::error::Error for UnknownReasonCode {}

impl FromStr for Reason {
    type Err = UnknownReasonCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reason::from_code(s).ok_or_else(|| UnknownReasonCode(s.to_string()))
    }
}
