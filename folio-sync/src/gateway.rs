use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use folio_fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::Error;
use crate::types::{ProgressRecord, WriteOutcome};
use crate::AppState;

const INFO_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>folio sync</title></head>
<body>
<h1>folio reading-progress sync</h1>
<p>Point your e-reader's progress sync server setting at this address.</p>
<ul>
<li><code>GET /sync/users/auth</code> checks your credentials</li>
<li><code>GET /sync/progress/&lt;document&gt;</code> reads progress</li>
<li><code>PUT /sync/progress</code> stores progress</li>
</ul>
<p>All calls except this page require HTTP Basic authentication.</p>
</body>
</html>
"#;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", get(info_handler))
        .route("/sync/users/auth", get(auth_handler))
        .route("/sync/progress/:fingerprint", get(get_progress_handler))
        .route("/sync/progress", put(put_progress_handler))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                info_span!(
                    "sync_request",
                    request_id = %Uuid::new_v4(),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Body of `GET /sync/progress/<fingerprint>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub document: Fingerprint,
    pub percentage: f64,
    pub position: String,
    pub device: String,
    pub device_id: Option<String>,
    pub updated: i64,
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            document: record.fingerprint,
            percentage: record.percentage,
            position: record.position,
            device: record.device,
            device_id: record.device_id,
            updated: record.updated,
        }
    }
}

/// Body of `PUT /sync/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutProgressRequest {
    pub document: Fingerprint,
    pub percentage: f64,
    pub progress: String,
    pub device: String,
    #[serde(default)]
    pub device_id: Option<String>,
    /// Unix seconds. Server time is used when absent.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutProgressResponse {
    pub document: Fingerprint,
    pub timestamp: i64,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    NotFound(&'static str),
    Internal(Error),
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        if error.is_invalid_input() {
            ApiError::BadRequest(error.to_string())
        } else {
            ApiError::Internal(error)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_owned()),
            ApiError::Internal(e) => {
                error!(error = %e, "Sync request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_owned(),
                )
            }
        };

        let mut response = (status, Json(json!({ "message": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Basic realm="folio""#),
            );
        }
        response
    }
}

pub async fn info_handler() -> Html<&'static str> {
    Html(INFO_PAGE)
}

pub async fn auth_handler(AuthenticatedUser(username): AuthenticatedUser) -> impl IntoResponse {
    debug!(%username, "Credentials accepted");
    Json(json!({ "authorized": "OK" }))
}

pub async fn get_progress_handler(
    AuthenticatedUser(username): AuthenticatedUser,
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let fingerprint = Fingerprint::parse(fingerprint).map_err(Error::from)?;

    if state.require_known_document && state.ledger.resolve(&fingerprint).await?.is_none() {
        return Err(ApiError::NotFound("Unknown document"));
    }

    match state.progress.get(&fingerprint).await? {
        Some(record) => {
            debug!(%username, %fingerprint, updated = record.updated, "Serving progress");
            Ok(Json(record.into()))
        }
        None => Err(ApiError::NotFound("No progress recorded for this document")),
    }
}

pub async fn put_progress_handler(
    AuthenticatedUser(username): AuthenticatedUser,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PutProgressResponse>, ApiError> {
    let request: PutProgressRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed progress body: {e}")))?;
    let timestamp = request
        .timestamp
        .unwrap_or_else(|| Utc::now().timestamp());

    let record = ProgressRecord {
        fingerprint: request.document.clone(),
        device: request.device,
        device_id: request.device_id,
        percentage: request.percentage,
        position: request.progress,
        updated: timestamp,
    };
    record.validate()?;

    match state.progress.put(record).await? {
        WriteOutcome::Applied => {
            info!(%username, fingerprint = %request.document, timestamp, "Progress updated")
        }
        WriteOutcome::Stale => debug!(
            %username,
            fingerprint = %request.document,
            timestamp,
            "Ignored progress older than the stored record"
        ),
    }

    Ok(Json(PutProgressResponse {
        document: request.document,
        timestamp,
    }))
}
