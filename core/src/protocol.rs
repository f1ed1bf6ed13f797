//! Stateless request builder and response parser for Crowd's usermanagement
//! REST API.
//!
//! # Design
//! `CrowdProtocol` holds only a validated `ClientConfig`. Each operation is
//! split into a `build_*` method that produces an `HttpRequest` and a
//! `parse_*` method that consumes an `HttpResponse`. `CrowdClient` runs the
//! round-trip in between; tests can call the two halves directly.
//!
//! Status handling differs per operation and follows what Crowd answers:
//! reason-coded 400s go through `reason_error`, the "plain message" failures
//! through `server_error`, and anything else becomes `UnexpectedStatus`.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::ClientConfig;
use crate::error::{CrowdError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::reason::Reason;
use crate::types::{GroupList, SessionToken, UserRecord};
use crate::xml::{self, ErrorDocument, GroupsDocument, SessionDocument, UserDocument};

/// Path of the REST resources below the server URL.
pub const REST_BASE_PATH: &str = "/crowd/rest/usermanagement/latest";

pub const XML_CONTENT_TYPE: &str = "application/xml";

/// RFC 3986 unreserved characters are left alone; everything else is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn escape(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

#[derive(Debug, Clone)]
pub struct CrowdProtocol {
    config: ClientConfig,
}

impl CrowdProtocol {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{REST_BASE_PATH}{path}", self.config.server_url())
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".to_string(), self.config.basic_auth()),
            ("Content-Type".to_string(), XML_CONTENT_TYPE.to_string()),
            ("Accept".to_string(), XML_CONTENT_TYPE.to_string()),
        ]
    }

    fn request(&self, method: HttpMethod, url: String, body: Option<String>) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: self.headers(),
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    pub fn build_authenticate(&self, username: &str, password: &str) -> Result<HttpRequest> {
        let url = self.url(&format!("/authentication?username={}", escape(username)));
        Ok(self.request(HttpMethod::Post, url, Some(xml::password_body(password)?)))
    }

    pub fn build_create_session_token(
        &self,
        username: &str,
        password: &str,
        remote_address: &str,
    ) -> Result<HttpRequest> {
        let body = xml::authentication_context_body(username, password, remote_address)?;
        Ok(self.request(HttpMethod::Post, self.url("/session"), Some(body)))
    }

    /// GET the session resource a successful creation pointed at.
    pub fn build_follow_location(&self, location: &str) -> HttpRequest {
        self.request(HttpMethod::Get, location.to_string(), None)
    }

    pub fn build_retrieve_token(&self, token: &str) -> HttpRequest {
        let url = self.url(&format!("/session/{}", escape(token)));
        self.request(HttpMethod::Get, url, None)
    }

    pub fn build_validate_session_token(
        &self,
        token: &str,
        remote_address: &str,
    ) -> Result<HttpRequest> {
        let url = self.url(&format!("/session/{}", escape(token)));
        let body = xml::validation_factors_body(remote_address)?;
        Ok(self.request(HttpMethod::Post, url, Some(body)))
    }

    pub fn build_invalidate_session_token(&self, token: &str) -> HttpRequest {
        let url = self.url(&format!("/session/{}", escape(token)));
        self.request(HttpMethod::Delete, url, None)
    }

    pub fn build_retrieve_user(&self, username: &str, include_attributes: bool) -> HttpRequest {
        let mut path = format!("/user?username={}", escape(username));
        if include_attributes {
            path.push_str("&expand=attributes");
        }
        self.request(HttpMethod::Get, self.url(&path), None)
    }

    pub fn build_retrieve_user_groups(&self, username: &str) -> HttpRequest {
        let url = self.url(&format!("/user/group/direct?username={}", escape(username)));
        self.request(HttpMethod::Get, url, None)
    }

    // -----------------------------------------------------------------------
    // Responses
    // -----------------------------------------------------------------------

    pub fn parse_authenticate(&self, response: HttpResponse) -> Result<UserRecord> {
        match response.status {
            200 => Ok(xml::parse_document::<UserDocument>(&response.body)?.into_record(false)),
            400 => Err(reason_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    /// A 201 yields the absolute URL of the new session resource.
    pub fn parse_create_session_token(&self, response: HttpResponse) -> Result<String> {
        match response.status {
            201 => {
                let location = response.header("Location").map(str::trim).unwrap_or("");
                if location.is_empty() {
                    return Err(CrowdError::InvalidResponse(
                        "session created without a Location header".to_string(),
                    ));
                }
                Ok(self.resolve_location(location))
            }
            400 => Err(reason_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    /// Parse the session resource fetched after creation.
    pub fn parse_session(&self, response: HttpResponse) -> Result<SessionToken> {
        match response.status {
            200 => Ok(xml::parse_document::<SessionDocument>(&response.body)?.into_token()),
            _ => Err(unexpected(response)),
        }
    }

    /// Unlike the other session calls, a 400 here is reported with the
    /// server's message only; the reason code is not mapped.
    pub fn parse_retrieve_token(&self, response: HttpResponse) -> Result<SessionToken> {
        match response.status {
            200 => Ok(xml::parse_document::<SessionDocument>(&response.body)?.into_token()),
            400 => Err(server_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    pub fn parse_validate_session_token(&self, response: HttpResponse) -> Result<()> {
        match response.status {
            200 => xml::check_document(&response.body),
            404 => Err(CrowdError::InvalidSsoToken),
            400 => Err(reason_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    pub fn parse_invalidate_session_token(&self, response: HttpResponse) -> Result<()> {
        match response.status {
            204 => Ok(()),
            _ => Err(unexpected(response)),
        }
    }

    pub fn parse_retrieve_user(
        &self,
        response: HttpResponse,
        include_attributes: bool,
    ) -> Result<UserRecord> {
        match response.status {
            200 => Ok(xml::parse_document::<UserDocument>(&response.body)?
                .into_record(include_attributes)),
            400 | 404 => Err(server_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    pub fn parse_retrieve_user_groups(&self, response: HttpResponse) -> Result<GroupList> {
        match response.status {
            200 => Ok(xml::parse_document::<GroupsDocument>(&response.body)?.into_names()),
            404 => Err(server_error(&response)),
            _ => Err(unexpected(response)),
        }
    }

    fn resolve_location(&self, location: &str) -> String {
        if location.starts_with('/') {
            format!("{}{location}", self.config.server_url())
        } else {
            location.to_string()
        }
    }
}

/// Map a reason-coded failure body onto the error taxonomy.
fn reason_error(response: &HttpResponse) -> CrowdError {
    let document: ErrorDocument = match xml::parse_document(&response.body) {
        Ok(document) => document,
        Err(err) => return err,
    };
    let message = document.message();
    let code = document.reason.trim();
    match Reason::from_code(code) {
        Some(reason) => CrowdError::Reason { reason, message },
        None => {
            tracing::warn!(code, status = response.status, "unrecognised reason code from Crowd");
            CrowdError::UnknownReason {
                code: code.to_string(),
                message,
            }
        }
    }
}

/// A failure reported only through the server's message.
fn server_error(response: &HttpResponse) -> CrowdError {
    match xml::parse_document::<ErrorDocument>(&response.body) {
        Ok(document) => CrowdError::Server {
            message: document.message().unwrap_or_default(),
        },
        Err(err) => err,
    }
}

fn unexpected(response: HttpResponse) -> CrowdError {
    CrowdError::UnexpectedStatus {
        status: response.status,
        body: response.body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "http://localhost:8095/crowd/rest/usermanagement/latest";

    const USER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<user name="jdoe"><first-name>Jane</first-name><last-name>Doe</last-name>
<display-name>Jane Doe</display-name><email>jdoe@example.com</email><active>true</active>
<attributes><attribute name="passwordLastChanged"><values><value>1316486633000</value></values></attribute></attributes>
</user>"#;

    const SESSION_XML: &str = r#"<session expand="user"><token>tok-123</token>
<user name="jdoe"><email>jdoe@example.com</email><active>true</active></user>
<created-date>1316486633000</created-date><expiry-date>1316490233000</expiry-date></session>"#;

    fn protocol() -> CrowdProtocol {
        CrowdProtocol::new(ClientConfig::new("http://localhost:8095", "app", "secret").unwrap())
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn error_body(reason: &str, message: &str) -> String {
        format!("<error><reason>{reason}</reason><message>{message}</message></error>")
    }

    #[test]
    fn every_request_carries_auth_and_xml_headers() {
        let req = protocol().build_retrieve_user_groups("jdoe");
        assert_eq!(
            req.headers,
            vec![
                ("Authorization".to_string(), "Basic YXBwOnNlY3JldA==".to_string()),
                ("Content-Type".to_string(), "application/xml".to_string()),
                ("Accept".to_string(), "application/xml".to_string()),
            ]
        );
    }

    #[test]
    fn build_authenticate_produces_correct_request() {
        let req = protocol().build_authenticate("jdoe", "s3cret").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE}/authentication?username=jdoe"));
        assert_eq!(
            req.body.as_deref(),
            Some(r#"<?xml version="1.0" encoding="UTF-8"?><password><value>s3cret</value></password>"#)
        );
    }

    #[test]
    fn user_supplied_segments_are_escaped() {
        let p = protocol();
        let req = p.build_authenticate("jane doe&admin=1", "x").unwrap();
        assert_eq!(req.url, format!("{BASE}/authentication?username=jane%20doe%26admin%3D1"));

        let req = p.build_invalidate_session_token("a/b?c");
        assert_eq!(req.url, format!("{BASE}/session/a%2Fb%3Fc"));

        let req = p.build_retrieve_user("j.doe_1-x~", false);
        assert_eq!(req.url, format!("{BASE}/user?username=j.doe_1-x~"));
    }

    #[test]
    fn build_session_requests() {
        let p = protocol();
        let req = p.build_create_session_token("jdoe", "pw", "10.1.2.3").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE}/session"));
        let body = req.body.unwrap();
        assert!(body.contains("<username>jdoe</username>"));
        assert!(body.contains("<value>10.1.2.3</value>"));

        let req = p.build_retrieve_token("tok-123");
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, format!("{BASE}/session/tok-123"));
        assert!(req.body.is_none());

        let req = p.build_validate_session_token("tok-123", "127.0.0.1").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{BASE}/session/tok-123"));
        assert!(req
            .body
            .unwrap()
            .ends_with("<validation-factors><validation-factor><name>remote_address</name><value>127.0.0.1</value></validation-factor></validation-factors>"));

        let req = p.build_invalidate_session_token("tok-123");
        assert_eq!(req.method, HttpMethod::Delete);
        assert!(req.body.is_none());
    }

    #[test]
    fn build_retrieve_user_with_and_without_expansion() {
        let p = protocol();
        assert_eq!(p.build_retrieve_user("jdoe", false).url, format!("{BASE}/user?username=jdoe"));
        assert_eq!(
            p.build_retrieve_user("jdoe", true).url,
            format!("{BASE}/user?username=jdoe&expand=attributes")
        );
        assert_eq!(
            p.build_retrieve_user_groups("jdoe").url,
            format!("{BASE}/user/group/direct?username=jdoe")
        );
    }

    #[test]
    fn parse_authenticate_success() {
        let user = protocol().parse_authenticate(response(200, USER_XML)).unwrap();
        assert_eq!(user.username, "jdoe");
        assert_eq!(user.email, "jdoe@example.com");
        assert_eq!(user.active, "true");
        assert!(user.attributes.is_empty());
    }

    #[test]
    fn parse_authenticate_maps_reason_code() {
        let body = error_body("USER_NOT_FOUND", "User &lt;nobody&gt; does not exist");
        let err = protocol().parse_authenticate(response(400, &body)).unwrap_err();
        match err {
            CrowdError::Reason { reason, message } => {
                assert_eq!(reason, Reason::UserNotFound);
                assert_eq!(message.as_deref(), Some("User <nobody> does not exist"));
            }
            other => panic!("expected reason error, got {other:?}"),
        }
    }

    #[test]
    fn parse_authenticate_unknown_reason_is_not_silent() {
        let body = error_body("PASSWORD_ROTTED", "");
        let err = protocol().parse_authenticate(response(400, &body)).unwrap_err();
        assert!(
            matches!(&err, CrowdError::UnknownReason { code, message: None } if code == "PASSWORD_ROTTED")
        );
    }

    #[test]
    fn parse_authenticate_other_status() {
        let err = protocol().parse_authenticate(response(401, "denied")).unwrap_err();
        assert!(matches!(err, CrowdError::UnexpectedStatus { status: 401, ref body } if body == "denied"));
    }

    #[test]
    fn malformed_body_is_invalid_response_for_any_status() {
        let p = protocol();
        let bad = "<html><body>proxy error";
        assert!(matches!(p.parse_authenticate(response(200, bad)), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_authenticate(response(400, bad)), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_retrieve_token(response(200, bad)), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_retrieve_token(response(400, bad)), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(
            p.parse_validate_session_token(response(200, bad)),
            Err(CrowdError::InvalidResponse(_))
        ));
        assert!(matches!(p.parse_retrieve_user(response(200, bad), true), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_retrieve_user(response(404, bad), false), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_retrieve_user_groups(response(200, "")), Err(CrowdError::InvalidResponse(_))));
        assert!(matches!(p.parse_session(response(200, "null")), Err(CrowdError::InvalidResponse(_))));
    }

    #[test]
    fn parse_create_session_follows_location() {
        let p = protocol();
        let mut created = response(201, "");
        created.headers.push((
            "location".to_string(),
            format!("{BASE}/session/tok-123"),
        ));
        assert_eq!(p.parse_create_session_token(created).unwrap(), format!("{BASE}/session/tok-123"));

        let mut relative = response(201, "");
        relative
            .headers
            .push(("Location".to_string(), "/crowd/rest/usermanagement/latest/session/t".to_string()));
        assert_eq!(p.parse_create_session_token(relative).unwrap(), format!("{BASE}/session/t"));
    }

    #[test]
    fn parse_create_session_without_location() {
        let err = protocol().parse_create_session_token(response(201, "")).unwrap_err();
        assert!(matches!(err, CrowdError::InvalidResponse(_)));
    }

    #[test]
    fn parse_create_session_reason_code() {
        let body = error_body("INACTIVE_ACCOUNT", "");
        let err = protocol().parse_create_session_token(response(400, &body)).unwrap_err();
        assert!(matches!(err, CrowdError::Reason { reason: Reason::InactiveAccount, message: None }));
    }

    #[test]
    fn parse_session_success_and_failure() {
        let p = protocol();
        let token = p.parse_session(response(200, SESSION_XML)).unwrap();
        assert_eq!(token.token, "tok-123");
        assert_eq!(token.user.username, "jdoe");
        assert_eq!(token.user.email, "jdoe@example.com");

        let err = p.parse_session(response(404, "")).unwrap_err();
        assert!(matches!(err, CrowdError::UnexpectedStatus { status: 404, .. }));
    }

    #[test]
    fn parse_retrieve_token_400_keeps_message_only() {
        let body = error_body("INVALID_SSO_TOKEN", "Token does not exist");
        let err = protocol().parse_retrieve_token(response(400, &body)).unwrap_err();
        assert!(matches!(&err, CrowdError::Server { message } if message == "Token does not exist"));
        assert_eq!(err.reason(), None);
    }

    #[test]
    fn parse_validate_dispositions() {
        let p = protocol();
        assert!(p.parse_validate_session_token(response(200, SESSION_XML)).is_ok());
        assert!(matches!(
            p.parse_validate_session_token(response(404, "")),
            Err(CrowdError::InvalidSsoToken)
        ));
        let body = error_body("INVALID_SSO_TOKEN", "factors do not match");
        let err = p.parse_validate_session_token(response(400, &body)).unwrap_err();
        assert!(err.is_invalid_sso_token());
        assert!(matches!(
            p.parse_validate_session_token(response(500, "boom")),
            Err(CrowdError::UnexpectedStatus { status: 500, .. })
        ));
    }

    #[test]
    fn parse_invalidate_dispositions() {
        let p = protocol();
        assert!(p.parse_invalidate_session_token(response(204, "")).is_ok());
        assert!(matches!(
            p.parse_invalidate_session_token(response(200, "")),
            Err(CrowdError::UnexpectedStatus { status: 200, .. })
        ));
    }

    #[test]
    fn parse_retrieve_user_with_attributes() {
        let user = protocol().parse_retrieve_user(response(200, USER_XML), true).unwrap();
        assert_eq!(user.display_name, "Jane Doe");
        assert_eq!(user.get("passwordLastChanged"), Some("1316486633000"));
    }

    #[test]
    fn parse_retrieve_user_not_found() {
        let p = protocol();
        let body = error_body("USER_NOT_FOUND", "User &lt;ghost&gt; does not exist");
        for status in [400, 404] {
            let err = p.parse_retrieve_user(response(status, &body), false).unwrap_err();
            assert!(matches!(&err, CrowdError::Server { message } if message == "User <ghost> does not exist"));
        }
        assert!(matches!(
            p.parse_retrieve_user(response(403, "forbidden"), false),
            Err(CrowdError::UnexpectedStatus { status: 403, .. })
        ));
    }

    #[test]
    fn parse_retrieve_user_groups_dispositions() {
        let p = protocol();
        let groups = p
            .parse_retrieve_user_groups(response(200, r#"<groups><group name="b"/><group name="a"/></groups>"#))
            .unwrap();
        assert_eq!(groups, vec!["b", "a"]);

        assert!(p.parse_retrieve_user_groups(response(200, "<groups/>")).unwrap().is_empty());

        let body = error_body("USER_NOT_FOUND", "no such user");
        assert!(matches!(
            p.parse_retrieve_user_groups(response(404, &body)),
            Err(CrowdError::Server { .. })
        ));
        assert!(matches!(
            p.parse_retrieve_user_groups(response(400, &body)),
            Err(CrowdError::UnexpectedStatus { status: 400, .. })
        ));
    }
}
