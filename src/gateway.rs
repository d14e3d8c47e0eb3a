//! REST gateway
//!
//! Maps each route onto one `MailReader`, `MailSender` or
//! `ContactStore` call. Every route is its own failure boundary: errors
//! are logged with their detail and answered with the route's fixed
//! plain-text message. The status code carries the error kind unless
//! legacy mode asks for 200 everywhere; the `X-Error-Kind` header
//! carries it in both modes.

use crate::config::ServerConfig;
use crate::contacts::{Contact, ContactStore, NewContact};
use crate::error::Error;
use crate::mailbox::Mailbox;
use crate::message::MessageSummary;
use crate::reader::MailReader;
use crate::sender::{MailSender, OutgoingMessage};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

const X_ERROR_KIND: &str = "x-error-kind";

const ALLOWED_METHODS: &str = "GET,POST,DELETE,OPTIONS";
const ALLOWED_HEADERS: &str = "Origin,X-Requested-With,Content-type,Accept";

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    contacts: ContactStore,
    legacy_status: bool,
    static_dir: Option<PathBuf>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig, contacts: ContactStore) -> Self {
        Self {
            config: Arc::new(config),
            contacts,
            legacy_status: false,
            static_dir: None,
        }
    }

    /// Answer every request with 200, errors included.
    #[must_use]
    pub fn with_legacy_status(mut self, legacy: bool) -> Self {
        self.legacy_status = legacy;
        self
    }

    /// Serve the client application from `dir` for unmatched paths.
    #[must_use]
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    fn reader(&self) -> MailReader {
        MailReader::new(self.config.imap.clone(), self.config.timeout())
    }

    fn sender(&self) -> MailSender {
        MailSender::new(self.config.smtp.clone(), self.config.timeout())
    }

    fn fail(&self, message: &'static str, error: Error) -> ApiError {
        ApiError {
            message,
            error,
            legacy_status: self.legacy_status,
        }
    }
}

/// A failed request: the route's fixed message plus the cause.
#[derive(Debug)]
pub struct ApiError {
    message: &'static str,
    error: Error,
    legacy_status: bool,
}

const fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::MailboxNotFound(_) | Error::MessageNotFound { .. } | Error::ContactNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        Error::Connection(_) | Error::Send(_) => StatusCode::BAD_GATEWAY,
        Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        Error::Imap(_) | Error::Parse(_) | Error::Config(_) | Error::Storage(_) | Error::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(kind = self.error.kind(), "{}: {}", self.message, self.error);
        let status = if self.legacy_status {
            StatusCode::OK
        } else {
            status_for(&self.error)
        };
        (
            status,
            [(
                HeaderName::from_static(X_ERROR_KIND),
                HeaderValue::from_static(self.error.kind()),
            )],
            self.message,
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the full application: API routes, CORS, request tracing and,
/// when configured, static file serving.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]));

    let static_dir = state.static_dir.clone();
    let api = Router::new()
        .route("/mailboxes", get(list_mailboxes))
        .route("/mailboxes/{mailbox}", get(list_messages))
        .route("/messages", post(send_message))
        .route(
            "/messages/{mailbox}/{id}",
            get(get_message).delete(delete_message),
        )
        .route("/contacts", get(list_contacts).post(add_contact))
        .route("/contacts/{id}", delete(delete_contact))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    app.layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(TraceLayer::new_for_http())
}

fn parse_uid(raw: &str) -> Result<u32, Error> {
    raw.parse::<u32>()
        .ok()
        .filter(|uid| *uid > 0)
        .ok_or_else(|| Error::Validation(format!("Invalid message id {raw:?}")))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("Invalid JSON body: {e}")))
}

async fn list_mailboxes(State(state): State<AppState>) -> ApiResult<Json<Vec<Mailbox>>> {
    state
        .reader()
        .list_mailboxes()
        .await
        .map(Json)
        .map_err(|e| state.fail("error getting mailboxes", e))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(mailbox): Path<String>,
) -> ApiResult<Json<Vec<MessageSummary>>> {
    state
        .reader()
        .list_messages(&mailbox)
        .await
        .map(Json)
        .map_err(|e| state.fail("error getting messages", e))
}

async fn get_message(
    State(state): State<AppState>,
    Path((mailbox, id)): Path<(String, String)>,
) -> ApiResult<String> {
    const FAILURE: &str = "error getting message";
    let uid = parse_uid(&id).map_err(|e| state.fail(FAILURE, e))?;
    state
        .reader()
        .get_message_body(&mailbox, uid)
        .await
        .map_err(|e| state.fail(FAILURE, e))
}

async fn delete_message(
    State(state): State<AppState>,
    Path((mailbox, id)): Path<(String, String)>,
) -> ApiResult<&'static str> {
    const FAILURE: &str = "error deleting message";
    let uid = parse_uid(&id).map_err(|e| state.fail(FAILURE, e))?;
    state
        .reader()
        .delete_message(&mailbox, uid)
        .await
        .map(|()| "ok")
        .map_err(|e| state.fail(FAILURE, e))
}

async fn send_message(State(state): State<AppState>, body: Bytes) -> ApiResult<&'static str> {
    const FAILURE: &str = "error sending message";
    let message: OutgoingMessage = parse_json(&body).map_err(|e| state.fail(FAILURE, e))?;
    state
        .sender()
        .send_message(&message)
        .await
        .map(|()| "ok")
        .map_err(|e| state.fail(FAILURE, e))
}

async fn list_contacts(State(state): State<AppState>) -> ApiResult<Json<Vec<Contact>>> {
    state
        .contacts
        .list_contacts()
        .await
        .map(Json)
        .map_err(|e| state.fail("error listing contacts", e))
}

async fn add_contact(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Contact>> {
    const FAILURE: &str = "error adding contact";
    let fields: NewContact = parse_json(&body).map_err(|e| state.fail(FAILURE, e))?;
    state
        .contacts
        .add_contact(fields)
        .await
        .map(Json)
        .map_err(|e| state.fail(FAILURE, e))
}

async fn delete_contact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    state
        .contacts
        .delete_contact(&id)
        .await
        .map(|()| "ok")
        .map_err(|e| state.fail("error deleting contact", e))
}
