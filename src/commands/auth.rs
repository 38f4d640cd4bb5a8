use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use super::{bearer_token, blocking, JsonBody};
use crate::auth::SessionInfo;
use crate::error::CrmResult;
use crate::AppState;

#[derive(Deserialize)]
pub struct PasswordPayload {
    password: String,
}

impl PasswordPayload {
    fn into_secret(self) -> Zeroizing<String> {
        Zeroizing::new(self.password)
    }
}

pub async fn status(State(state): State<AppState>) -> CrmResult<Json<Value>> {
    let auth = state.auth.clone();
    let configured = blocking(move || Ok(auth.is_configured())).await?;
    Ok(Json(json!({ "configured": configured })))
}

pub async fn setup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<PasswordPayload>,
) -> CrmResult<Json<Value>> {
    let auth = state.auth.clone();
    let password = payload.into_secret();
    blocking(move || auth.setup_password(password)).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<PasswordPayload>,
) -> CrmResult<Json<SessionInfo>> {
    let auth = state.auth.clone();
    let password = payload.into_secret();
    let session = blocking(move || auth.login(password)).await?;
    Ok(Json(session))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> CrmResult<Json<Value>> {
    let removed = match bearer_token(&headers) {
        Some(token) => state.auth.logout(&token)?,
        None => false,
    };
    Ok(Json(json!({ "success": removed })))
}

pub async fn session(Extension(session): Extension<SessionInfo>) -> Json<SessionInfo> {
    Json(session)
}
