//! XML documents exchanged with Crowd.
//!
//! # Design
//! Wire shapes are private serde types read and written with `quick-xml`.
//! Every response body goes through `check_document` first, so a malformed
//! body is always reported as `InvalidResponse` and never as a missing field.
//! Past that gate, missing elements default to empty values and unknown
//! elements (`link`, `password`, `created-date`, ...) are ignored.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CrowdError, Result};
use crate::types::{GroupList, SessionToken, UserRecord};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Validation factor bound to a session at creation time.
pub const REMOTE_ADDRESS_FACTOR: &str = "remote_address";

/// Reject anything that is not a single well-formed XML element tree.
pub fn check_document(body: &str) -> Result<()> {
    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut roots = 0usize;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| invalid(format!("malformed XML at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid("closing tag without opening tag"))?;
            }
            Event::Empty(_) if depth == 0 => roots += 1,
            Event::Text(text) if depth == 0 => {
                if !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(invalid("text outside the root element"));
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(invalid("character data outside the root element"));
            }
            Event::Eof => break,
            _ => {}
        }
        if roots > 1 {
            return Err(invalid("more than one root element"));
        }
    }
    if depth != 0 {
        return Err(invalid("document ends inside an element"));
    }
    if roots == 0 {
        return Err(invalid("no root element"));
    }
    Ok(())
}

/// Gate `body` through `check_document`, then deserialize it.
pub(crate) fn parse_document<T: DeserializeOwned>(body: &str) -> Result<T> {
    check_document(body)?;
    quick_xml::de::from_str(body).map_err(|e| invalid(e.to_string()))
}

fn invalid(detail: impl Into<String>) -> CrowdError {
    CrowdError::InvalidResponse(detail.into())
}

fn render<T: Serialize>(document: &T) -> Result<String> {
    let xml =
        quick_xml::se::to_string(document).map_err(|e| CrowdError::Serialization(e.to_string()))?;
    Ok(format!("{XML_DECLARATION}{xml}"))
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "password")]
struct PasswordBody<'a> {
    value: &'a str,
}

#[derive(Serialize)]
#[serde(rename = "authentication-context")]
struct AuthenticationContext<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(rename = "validation-factors")]
    validation_factors: ValidationFactors<'a>,
}

#[derive(Serialize)]
#[serde(rename = "validation-factors")]
struct ValidationFactors<'a> {
    #[serde(rename = "validation-factor")]
    factors: Vec<ValidationFactor<'a>>,
}

#[derive(Serialize)]
struct ValidationFactor<'a> {
    name: &'a str,
    value: &'a str,
}

impl<'a> ValidationFactors<'a> {
    fn remote_address(address: &'a str) -> Self {
        Self {
            factors: vec![ValidationFactor {
                name: REMOTE_ADDRESS_FACTOR,
                value: address,
            }],
        }
    }
}

pub(crate) fn password_body(password: &str) -> Result<String> {
    render(&PasswordBody { value: password })
}

pub(crate) fn authentication_context_body(
    username: &str,
    password: &str,
    remote_address: &str,
) -> Result<String> {
    render(&AuthenticationContext {
        username,
        password,
        validation_factors: ValidationFactors::remote_address(remote_address),
    })
}

pub(crate) fn validation_factors_body(remote_address: &str) -> Result<String> {
    render(&ValidationFactors::remote_address(remote_address))
}

// ---------------------------------------------------------------------------
// Response documents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UserDocument {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "first-name")]
    first_name: String,
    #[serde(rename = "last-name")]
    last_name: String,
    #[serde(rename = "display-name")]
    display_name: String,
    email: String,
    active: String,
    attributes: AttributeList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttributeList {
    attribute: Vec<AttributeDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AttributeDocument {
    #[serde(rename = "@name")]
    name: String,
    values: ValueList,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValueList {
    value: Vec<String>,
}

impl UserDocument {
    /// Custom attributes are merged only when `include_attributes` is set,
    /// each contributing its first value.
    pub(crate) fn into_record(self, include_attributes: bool) -> UserRecord {
        let attributes: BTreeMap<String, String> = if include_attributes {
            self.attributes
                .attribute
                .into_iter()
                .map(|attr| {
                    let first = attr.values.value.into_iter().next().unwrap_or_default();
                    (attr.name, first)
                })
                .collect()
        } else {
            BTreeMap::new()
        };
        UserRecord {
            username: self.name,
            first_name: self.first_name,
            last_name: self.last_name,
            display_name: self.display_name,
            email: self.email,
            active: self.active,
            attributes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SessionDocument {
    token: String,
    user: UserDocument,
}

impl SessionDocument {
    pub(crate) fn into_token(self) -> SessionToken {
        SessionToken {
            token: self.token,
            user: self.user.into_record(false),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GroupsDocument {
    group: Vec<GroupDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupDocument {
    #[serde(rename = "@name")]
    name: String,
}

impl GroupsDocument {
    pub(crate) fn into_names(self) -> GroupList {
        self.group.into_iter().map(|g| g.name).collect()
    }
}

/// Body of a failed request: `<error><reason/><message/></error>`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorDocument {
    pub reason: String,
    pub message: String,
}

impl ErrorDocument {
    /// An empty message counts as no message.
    pub(crate) fn message(&self) -> Option<String> {
        let message = self.message.trim();
        (!message.is_empty()).then(|| message.to_string())
    }
}
