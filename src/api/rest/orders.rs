use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{Identity, Role};
use crate::engine::lifecycle::{self, CreateOrder, OrderFilters};
use crate::error::AppError;
use crate::idempotency::IdempotencyRecord;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/:id", get(get_order).delete(delete_order))
        .route("/orders/:id/assign", post(assign_order))
        .route("/orders/:id/claim", post(claim_order))
        .route("/orders/:id/decline", post(decline_order))
        .route("/orders/:id/status", post(update_status))
        .route("/orders/:id/cancel", post(cancel_order))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub courier_id: i64,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("idempotency-key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn replay(rec: IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(rec.status_code).unwrap_or(StatusCode::OK);
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        rec.response_body,
    )
        .into_response()
}

/// Read-only ledger consult; `Some` means the caller must return the stored
/// response instead of executing the mutation again.
fn check_replay(
    state: &AppState,
    key: Option<&str>,
    method: &str,
    path: &str,
) -> Result<Option<Response>, AppError> {
    match key {
        Some(key) => Ok(state.idempotency.lookup(key, method, path)?.map(replay)),
        None => Ok(None),
    }
}

/// Records the response under the key (after the mutation and its side
/// effects) and hands it back.
fn record_and_respond(
    state: &AppState,
    key: Option<String>,
    method: &str,
    path: &str,
    order: &Order,
) -> Result<Response, AppError> {
    let body = serde_json::to_value(order)?;
    if let Some(key) = key {
        state.idempotency.save(&key, method, path, 200, &body);
    }
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    headers: HeaderMap,
    Json(payload): Json<CreateOrder>,
) -> Result<Response, AppError> {
    identity.require_any_role(&[Role::Admin, Role::Store])?;

    let key = idempotency_key(&headers);
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", "/orders")? {
        return Ok(replayed);
    }

    let order = lifecycle::create(&state, &identity, payload)?;
    record_and_respond(&state, key, "POST", "/orders", &order)
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(filters): Query<OrderFilters>,
) -> Json<Vec<Order>> {
    Json(lifecycle::list(&state, &identity, &filters))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(lifecycle::get(&state, &identity, id)?))
}

async fn assign_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<AssignRequest>,
) -> Result<Response, AppError> {
    identity.require_role(Role::Admin)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}/assign");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", &path)? {
        return Ok(replayed);
    }

    let order = lifecycle::assign(&state, id, payload.courier_id)?;
    record_and_respond(&state, key, "POST", &path, &order)
}

async fn claim_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    identity.require_role(Role::Courier)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}/claim");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", &path)? {
        return Ok(replayed);
    }

    let start = Instant::now();
    let result = lifecycle::claim(&state, id, identity.subject);
    state
        .metrics
        .claim_latency_seconds
        .observe(start.elapsed().as_secs_f64());

    let order = result?;
    record_and_respond(&state, key, "POST", &path, &order)
}

async fn decline_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    identity.require_role(Role::Courier)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}/decline");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", &path)? {
        return Ok(replayed);
    }

    let order = lifecycle::decline(&state, id, identity.subject)?;
    record_and_respond(&state, key, "POST", &path, &order)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<StatusRequest>,
) -> Result<Response, AppError> {
    identity.require_role(Role::Courier)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}/status");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", &path)? {
        return Ok(replayed);
    }

    let order = lifecycle::advance(&state, id, identity.subject, payload.status)?;
    record_and_respond(&state, key, "POST", &path, &order)
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    identity.require_role(Role::Admin)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}/cancel");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "POST", &path)? {
        return Ok(replayed);
    }

    let order = lifecycle::cancel(&state, id)?;
    record_and_respond(&state, key, "POST", &path, &order)
}

async fn delete_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    identity.require_role(Role::Admin)?;

    let key = idempotency_key(&headers);
    let path = format!("/orders/{id}");
    if let Some(replayed) = check_replay(&state, key.as_deref(), "DELETE", &path)? {
        return Ok(replayed);
    }

    lifecycle::delete(&state, id)?;
    if let Some(key) = key {
        state.idempotency.save(&key, "DELETE", &path, 204, &Value::Null);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}
