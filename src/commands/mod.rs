//! HTTP command surface.
//!
//! JSON in, JSON out. Everything except `/health` and the login/setup
//! endpoints requires `Authorization: Bearer <session token>`. Store and
//! bcrypt work runs on Tokio's blocking pool.

pub mod auth;
pub mod orders;
pub mod receipts;
pub mod reports;

use axum::extract::{FromRequest, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::diagnostics;
use crate::error::{CrmError, CrmResult, StoreError};
use crate::AppState;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    timestamp: String,
}

impl CrmError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CrmError::NotFound(_) => StatusCode::NOT_FOUND,
            CrmError::Validation(_) => StatusCode::BAD_REQUEST,
            CrmError::Conflict(_) => StatusCode::CONFLICT,
            CrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CrmError::Locked(_) => StatusCode::LOCKED,
            CrmError::Store(StoreError::Http(_)) => StatusCode::BAD_GATEWAY,
            CrmError::Store(_)
            | CrmError::Credential(_)
            | CrmError::Receipt(_)
            | CrmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run synchronous store / hashing work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> CrmResult<T>
where
    F: FnOnce() -> CrmResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CrmError::Internal(format!("worker task failed: {e}")))?
}

/// `Json` extractor whose rejections (bad syntax, wrong types, missing
/// content type) come back as the usual error body with 400.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CrmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| JsonBody(value))
            .map_err(|rejection| CrmError::Validation(rejection.body_text()))
    }
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Rejects requests without a live session; stores the session as a
/// request extension for handlers that need it.
async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, CrmError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| CrmError::Unauthorized("Missing bearer token".into()))?;
    let session = state.auth.validate(&token)?;
    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "backend": state.orders.backend_name(),
        "uptimeSecs": diagnostics::uptime_secs(),
        "activeSessions": state.auth.active_sessions(),
        "build": diagnostics::build_info(),
    }))
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/session", get(auth::session))
        .route("/api/orders", get(orders::list).post(orders::create))
        .route("/api/orders/next-id", get(orders::next_id))
        .route("/api/orders/:order_id", get(orders::fetch).put(orders::update))
        .route("/api/orders/:order_id/status", post(orders::set_status))
        .route("/api/orders/:order_id/receipt/:kind", get(receipts::render))
        .route("/api/orders/:order_id/receipt/:kind/save", post(receipts::save))
        .route("/api/reports/summary", get(reports::summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/health", get(health))
        .route("/api/auth/status", get(auth::status))
        .route("/api/auth/setup", post(auth::setup))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::AuthState;
    use crate::print::ReceiptPrinter;
    use crate::receipt_renderer::LayoutConfig;
    use crate::service::OrderService;
    use crate::storage::MemoryCredentials;
    use crate::store::MemoryStore;
    use crate::AppState;

    pub const PASSWORD: &str = "service123";

    pub fn state() -> AppState {
        let auth = AuthState::new(Arc::new(MemoryCredentials::new())).with_bcrypt_cost(4);
        let receipts_dir =
            std::env::temp_dir().join(format!("printer-crm-http-{}", uuid::Uuid::new_v4()));
        AppState::new(
            OrderService::new(Arc::new(MemoryStore::new())),
            auth,
            ReceiptPrinter::new(LayoutConfig::default(), receipts_dir),
        )
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, bytes.to_vec())
    }

    /// Send a raw (possibly malformed) JSON body.
    pub async fn send_raw(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::from(body.to_string())).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, bytes.to_vec())
    }

    pub async fn send_json(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = send(app, method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    /// Router plus a logged-in token.
    pub async fn logged_in() -> (Router, String) {
        let app = super::router(state());
        let (status, _) = send_json(
            &app,
            "POST",
            "/api/auth/setup",
            None,
            Some(serde_json::json!({ "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send_json(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token").to_string();
        (app, token)
    }
}
