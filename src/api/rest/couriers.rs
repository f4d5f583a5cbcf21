use std::cmp::Reverse;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::{Identity, Role};
use crate::engine::capacity;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/couriers", get(list_couriers))
}

#[derive(Deserialize)]
pub struct CourierQuery {
    #[serde(default)]
    pub available_only: bool,
}

#[derive(Serialize)]
pub struct CourierLoadReport {
    pub id: i64,
    pub name: String,
    pub capacity_boxes: u32,
    pub load_boxes: u32,
    pub available_boxes: u32,
}

/// Admin view of courier utilization: capacity, in-flight boxes, and what
/// is left. Sorted most-available first.
async fn list_couriers(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<CourierQuery>,
) -> Result<Json<Vec<CourierLoadReport>>, AppError> {
    identity.require_role(Role::Admin)?;

    let mut report: Vec<CourierLoadReport> = state
        .couriers
        .iter()
        .map(|entry| {
            let courier = entry.value();
            let load_boxes = capacity::current_load(&state, courier.id);
            CourierLoadReport {
                id: courier.id,
                name: courier.name.clone(),
                capacity_boxes: courier.capacity_boxes,
                load_boxes,
                available_boxes: courier.capacity_boxes.saturating_sub(load_boxes),
            }
        })
        .filter(|row| !query.available_only || row.available_boxes > 0)
        .collect();

    report.sort_by_key(|row| (Reverse(row.available_boxes), row.id));
    Ok(Json(report))
}
