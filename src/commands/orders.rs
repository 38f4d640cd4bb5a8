use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{blocking, JsonBody};
use crate::error::CrmResult;
use crate::orders::{NewOrder, OrderStatus, OrderUpdate};
use crate::service::{OrderFilter, VersionedOrder};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    /// Version returned by the last fetch; also accepted as `If-Match`.
    #[serde(default)]
    expected_version: Option<String>,
    #[serde(flatten)]
    changes: OrderUpdate,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    status: OrderStatus,
}

fn if_match(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::IF_MATCH)?
        .to_str()
        .ok()
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> CrmResult<Json<Vec<VersionedOrder>>> {
    let service = state.orders.clone();
    let orders = blocking(move || service.list_orders(&filter)).await?;
    Ok(Json(orders.into_iter().map(VersionedOrder::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    JsonBody(new_order): JsonBody<NewOrder>,
) -> CrmResult<(StatusCode, Json<VersionedOrder>)> {
    let service = state.orders.clone();
    let order = blocking(move || service.create_order(new_order)).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

pub async fn next_id(State(state): State<AppState>) -> CrmResult<Json<Value>> {
    let service = state.orders.clone();
    let next = blocking(move || service.preview_next_id()).await?;
    Ok(Json(json!({ "order_id": next })))
}

pub async fn fetch(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> CrmResult<Json<VersionedOrder>> {
    let service = state.orders.clone();
    let order = blocking(move || service.get_order(&order_id)).await?;
    Ok(Json(order.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    JsonBody(request): JsonBody<UpdateRequest>,
) -> CrmResult<Json<VersionedOrder>> {
    let expected = request.expected_version.or_else(|| if_match(&headers));
    let service = state.orders.clone();
    let order = blocking(move || {
        service.update_order(&order_id, request.changes, expected.as_deref())
    })
    .await?;
    Ok(Json(order.into()))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    JsonBody(request): JsonBody<StatusRequest>,
) -> CrmResult<Json<VersionedOrder>> {
    let service = state.orders.clone();
    let order = blocking(move || service.set_status(&order_id, request.status)).await?;
    Ok(Json(order.into()))
}
