//! In-memory stand-in for a Crowd server's usermanagement REST API.
//!
//! Serves the XML documents and status codes the client expects for
//! authentication, SSO sessions, user lookup and direct group membership.
//! Wire types are defined here independently of `crowd-core`, so the
//! integration tests catch schema drift between the two.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const REST_BASE_PATH: &str = "/crowd/rest/usermanagement/latest";

pub const FIXTURE_APP_NAME: &str = "crowd-client";
pub const FIXTURE_APP_PASSWORD: &str = "app-secret";

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct DirectoryUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub email: String,
    pub active: bool,
    /// Custom attributes in server order; each may hold several values.
    pub attributes: Vec<(String, Vec<String>)>,
    /// Direct group memberships in server order.
    pub groups: Vec<String>,
}

impl DirectoryUser {
    pub fn new(username: &str, password: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            display_name: format!("{first_name} {last_name}"),
            email: format!("{username}@example.com"),
            active: true,
            attributes: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes.push((
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }
}

/// Application credentials plus the users the server knows about.
#[derive(Clone, Debug)]
pub struct Directory {
    app_name: String,
    app_password: String,
    users: HashMap<String, DirectoryUser>,
}

impl Directory {
    pub fn new(app_name: &str, app_password: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            app_password: app_password.to_string(),
            users: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user: DirectoryUser) -> Self {
        self.users.insert(user.username.clone(), user);
        self
    }

    pub fn with_application(mut self, app_name: &str, app_password: &str) -> Self {
        self.app_name = app_name.to_string();
        self.app_password = app_password.to_string();
        self
    }

    /// `jdoe` (active, attributes, three groups), `ghost` (inactive) and
    /// `loner` (active, no groups).
    pub fn fixture() -> Self {
        Self::new(FIXTURE_APP_NAME, FIXTURE_APP_PASSWORD)
            .with_user(
                DirectoryUser::new("jdoe", "correct horse", "Jane", "Doe")
                    .with_attribute("passwordLastChanged", &["1316486633000"])
                    .with_attribute("invalidPasswordAttempts", &["0"])
                    .with_groups(&["jira-users", "confluence-users", "crowd-administrators"]),
            )
            .with_user(DirectoryUser::new("ghost", "boo", "Casper", "Ghost").inactive())
            .with_user(DirectoryUser::new("loner", "solo", "Lone", "Ranger"))
    }

    fn user(&self, username: &str) -> Option<&DirectoryUser> {
        self.users.get(username)
    }
}

#[derive(Clone, Debug)]
struct Session {
    username: String,
    remote_address: String,
}

#[derive(Clone)]
pub struct AppState {
    directory: Arc<Directory>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

// ---------------------------------------------------------------------------
// Wire documents
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename = "user")]
struct UserXml<'a> {
    #[serde(rename = "@name")]
    name: &'a str,
    #[serde(rename = "first-name")]
    first_name: &'a str,
    #[serde(rename = "last-name")]
    last_name: &'a str,
    #[serde(rename = "display-name")]
    display_name: &'a str,
    email: &'a str,
    active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes: Option<AttributesXml<'a>>,
}

#[derive(Serialize)]
struct AttributesXml<'a> {
    attribute: Vec<AttributeXml<'a>>,
}

#[derive(Serialize)]
struct AttributeXml<'a> {
    #[serde(rename = "@name")]
    name: &'a str,
    values: ValuesXml<'a>,
}

#[derive(Serialize)]
struct ValuesXml<'a> {
    value: &'a [String],
}

impl<'a> UserXml<'a> {
    fn new(user: &'a DirectoryUser, with_attributes: bool) -> Self {
        let attributes = with_attributes.then(|| AttributesXml {
            attribute: user
                .attributes
                .iter()
                .map(|(name, values)| AttributeXml {
                    name,
                    values: ValuesXml { value: values },
                })
                .collect(),
        });
        Self {
            name: &user.username,
            first_name: &user.first_name,
            last_name: &user.last_name,
            display_name: &user.display_name,
            email: &user.email,
            active: user.active,
            attributes,
        }
    }
}

#[derive(Serialize)]
#[serde(rename = "session")]
struct SessionXml<'a> {
    token: &'a str,
    user: UserXml<'a>,
}

#[derive(Serialize)]
#[serde(rename = "groups")]
struct GroupsXml<'a> {
    group: Vec<GroupXml<'a>>,
}

#[derive(Serialize)]
struct GroupXml<'a> {
    #[serde(rename = "@name")]
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename = "error")]
struct ErrorXml<'a> {
    reason: &'a str,
    message: &'a str,
}

#[derive(Deserialize)]
struct PasswordXml {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct AuthenticationContextXml {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "validation-factors", default)]
    validation_factors: ValidationFactorsXml,
}

#[derive(Deserialize, Default)]
struct ValidationFactorsXml {
    #[serde(rename = "validation-factor", default)]
    factors: Vec<ValidationFactorXml>,
}

#[derive(Deserialize)]
struct ValidationFactorXml {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

impl ValidationFactorsXml {
    fn remote_address(&self) -> String {
        self.factors
            .iter()
            .find(|f| f.name == "remote_address")
            .map(|f| f.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub username: String,
    #[serde(default)]
    pub expand: Option<String>,
}

fn xml_response<T: Serialize>(status: StatusCode, document: &T) -> Response {
    match quick_xml::se::to_string(document) {
        Ok(xml) => (
            status,
            [(header::CONTENT_TYPE, "application/xml")],
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>{xml}"#),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render XML response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error_response(status: StatusCode, reason: &str, message: &str) -> Response {
    xml_response(status, &ErrorXml { reason, message })
}

fn user_not_found(username: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "USER_NOT_FOUND",
        &format!("User <{username}> does not exist"),
    )
}

/// Checks shared by `/authentication` and `/session` creation; 400s carry
/// a reason code.
fn check_credentials<'a>(
    directory: &'a Directory,
    username: &str,
    password: &str,
) -> Result<&'a DirectoryUser, Response> {
    let Some(user) = directory.user(username) else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "USER_NOT_FOUND",
            &format!("User <{username}> does not exist"),
        ));
    };
    if user.password != password {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_USER_AUTHENTICATION",
            &format!("Failed to authenticate principal, password was invalid for <{username}>"),
        ));
    }
    if !user.active {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "INACTIVE_ACCOUNT",
            &format!("Account with name <{username}> is inactive"),
        ));
    }
    Ok(user)
}

fn malformed_body(err: quick_xml::DeError) -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "ILLEGAL_ARGUMENT",
        &format!("Malformed request body: {err}"),
    )
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn app() -> Router {
    app_with(Directory::fixture())
}

pub fn app_with(directory: Directory) -> Router {
    let state = AppState {
        directory: Arc::new(directory),
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };
    let routes = Router::new()
        .route("/authentication", post(authenticate))
        .route("/session", post(create_session))
        .route(
            "/session/{token}",
            get(get_session).post(validate_session).delete(delete_session),
        )
        .route("/user", get(get_user))
        .route("/user/group/direct", get(get_user_groups))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_application,
        ));
    Router::new().nest(REST_BASE_PATH, routes).with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, directory: Directory) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(directory)).await
}

/// Rejects requests whose Basic credentials are not the application's.
async fn require_application(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!(
        "{}:{}",
        state.directory.app_name, state.directory.app_password
    );
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());
    if presented.as_deref() != Some(expected.as_str()) {
        tracing::debug!(uri = %request.uri(), "rejected application credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"Crowd REST Service\"")],
            "Application failed to authenticate",
        )
            .into_response();
    }
    next.run(request).await
}

async fn authenticate(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    body: String,
) -> Response {
    tracing::debug!(username = %query.username, "authentication request");
    let password: PasswordXml = match quick_xml::de::from_str(&body) {
        Ok(password) => password,
        Err(err) => return malformed_body(err),
    };
    match check_credentials(&state.directory, &query.username, &password.value) {
        Ok(user) => xml_response(StatusCode::OK, &UserXml::new(user, false)),
        Err(response) => response,
    }
}

async fn create_session(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    let context: AuthenticationContextXml = match quick_xml::de::from_str(&body) {
        Ok(context) => context,
        Err(err) => return malformed_body(err),
    };
    tracing::debug!(username = %context.username, "session creation request");
    let user = match check_credentials(&state.directory, &context.username, &context.password) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let token = Uuid::new_v4().simple().to_string();
    state.sessions.write().await.insert(
        token.clone(),
        Session {
            username: user.username.clone(),
            remote_address: context.validation_factors.remote_address(),
        },
    );

    let path = format!("{REST_BASE_PATH}/session/{token}");
    let location = match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("http://{host}{path}"),
        None => path,
    };
    let mut response = xml_response(
        StatusCode::CREATED,
        &SessionXml {
            token: &token,
            user: UserXml::new(user, false),
        },
    );
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

async fn get_session(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    let sessions = state.sessions.read().await;
    let session = sessions.get(&token);
    match session.and_then(|s| state.directory.user(&s.username)) {
        Some(user) => xml_response(
            StatusCode::OK,
            &SessionXml {
                token: &token,
                user: UserXml::new(user, false),
            },
        ),
        None => error_response(
            StatusCode::NOT_FOUND,
            "INVALID_SSO_TOKEN",
            &format!("Token <{token}> does not exist"),
        ),
    }
}

async fn validate_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: String,
) -> Response {
    let factors: ValidationFactorsXml = match quick_xml::de::from_str(&body) {
        Ok(factors) => factors,
        Err(err) => return malformed_body(err),
    };
    let sessions = state.sessions.read().await;
    let Some(session) = sessions.get(&token) else {
        tracing::debug!(%token, "validation of unknown token");
        return error_response(
            StatusCode::NOT_FOUND,
            "INVALID_SSO_TOKEN",
            &format!("Token <{token}> does not exist"),
        );
    };
    if session.remote_address != factors.remote_address() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_SSO_TOKEN",
            "Validation factors do not match the session",
        );
    }
    match state.directory.user(&session.username) {
        Some(user) => xml_response(
            StatusCode::OK,
            &SessionXml {
                token: &token,
                user: UserXml::new(user, false),
            },
        ),
        None => user_not_found(&session.username),
    }
}

/// Crowd answers 204 whether or not the token existed.
async fn delete_session(State(state): State<AppState>, Path(token): Path<String>) -> StatusCode {
    let removed = state.sessions.write().await.remove(&token).is_some();
    tracing::debug!(%token, removed, "session invalidated");
    StatusCode::NO_CONTENT
}

async fn get_user(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    let with_attributes = query
        .expand
        .as_deref()
        .is_some_and(|expand| expand.split(',').any(|e| e.trim() == "attributes"));
    match state.directory.user(&query.username) {
        Some(user) => xml_response(StatusCode::OK, &UserXml::new(user, with_attributes)),
        None => user_not_found(&query.username),
    }
}

async fn get_user_groups(State(state): State<AppState>, Query(query): Query<UserQuery>) -> Response {
    match state.directory.user(&query.username) {
        Some(user) => xml_response(
            StatusCode::OK,
            &GroupsXml {
                group: user.groups.iter().map(|name| GroupXml { name }).collect(),
            },
        ),
        None => user_not_found(&query.username),
    }
}
