use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{Identity, Role};
use crate::engine::{capacity, scope};
use crate::error::AppError;
use crate::models::courier::Courier;
use crate::models::event::{EventType, OrderEvent};
use crate::models::order::{price_tier, Order, OrderStatus, MAX_BOXES};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    pub recipient_first_name: String,
    pub recipient_last_name: String,
    pub phone: String,
    pub street: String,
    pub building_no: String,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub apartment: Option<String>,
    pub boxes_count: u32,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub store_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilters {
    #[serde(default)]
    pub store_id: Option<i64>,
    #[serde(default)]
    pub courier_id: Option<i64>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

pub fn create(state: &AppState, identity: &Identity, payload: CreateOrder) -> Result<Order, AppError> {
    if payload.boxes_count == 0 || payload.boxes_count > MAX_BOXES {
        return Err(AppError::Validation(format!(
            "boxes_count must be between 1 and {MAX_BOXES}"
        )));
    }

    let store_id = scope::resolve_store_id(identity, payload.store_id)?;
    let (boxes_multiplier, price_total) = price_tier(payload.boxes_count);
    let now = Utc::now();

    let delivery_address = payload
        .delivery_address
        .unwrap_or_else(|| format!("{} {}", payload.street, payload.building_no));

    let order = Order {
        id: state.next_order_id(),
        store_id,
        courier_id: None,
        status: OrderStatus::New,
        pickup_address: payload.pickup_address.unwrap_or_default(),
        delivery_address,
        recipient_first_name: payload.recipient_first_name,
        recipient_last_name: payload.recipient_last_name,
        phone: payload.phone,
        street: payload.street,
        building_no: payload.building_no,
        floor: payload.floor,
        apartment: payload.apartment,
        boxes_count: payload.boxes_count,
        boxes_multiplier,
        price_total,
        created_at: now,
        updated_at: now,
    };

    state.orders.insert(order.id, order.clone());
    append_event(state, order.id, EventType::Created);
    state.metrics.orders_created_total.inc();
    publish_order(state, "order.created", &order);

    info!(order_id = order.id, store_id, boxes = order.boxes_count, "order created");
    Ok(order)
}

/// Admin designation of a courier, pending the courier's acceptance.
pub fn assign(state: &AppState, order_id: i64, courier_id: i64) -> Result<Order, AppError> {
    let updated = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "order is {}",
                order.status.as_str()
            )));
        }
        if !matches!(order.status, OrderStatus::New | OrderStatus::Assigned) {
            return Err(AppError::Conflict("order already claimed".to_string()));
        }

        order.courier_id = Some(courier_id);
        order.status = OrderStatus::Assigned;
        order.updated_at = Utc::now();
        order.clone()
    };

    append_event(state, order_id, EventType::Assigned);
    publish_order(state, "order.assigned", &updated);

    info!(order_id, courier_id, "order assigned");
    Ok(updated)
}

/// Courier takes ownership. The conditional update under the order's entry
/// lock is what makes concurrent claims race-safe: only one claimant can
/// match the predicate, everyone else observes a conflict.
pub fn claim(state: &AppState, order_id: i64, courier_id: i64) -> Result<Order, AppError> {
    let boxes_count = state
        .orders
        .get(&order_id)
        .map(|order| order.boxes_count)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    let updated = {
        // The courier entry lock is held across the load read and the
        // conditional write, so two claims by the same courier cannot both
        // pass the capacity check on the same stale load.
        let courier = state
            .couriers
            .entry(courier_id)
            .or_insert_with(|| Courier::with_default_capacity(courier_id));

        let load = capacity::current_load(state, courier_id);
        if !capacity::can_accept(courier.capacity_boxes, load, boxes_count) {
            state
                .metrics
                .claims_total
                .with_label_values(&["capacity_exceeded"])
                .inc();
            return Err(AppError::Conflict(format!(
                "capacity exceeded: load {load} + {boxes_count} > {}",
                courier.capacity_boxes
            )));
        }

        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let claimable = order.status == OrderStatus::New
            || (order.status == OrderStatus::Assigned && order.courier_id == Some(courier_id));
        if !claimable {
            state
                .metrics
                .claims_total
                .with_label_values(&["lost_race"])
                .inc();
            return Err(AppError::Conflict("order already taken".to_string()));
        }

        order.status = OrderStatus::Claimed;
        order.courier_id = Some(courier_id);
        order.updated_at = Utc::now();
        order.clone()
    };

    state.metrics.claims_total.with_label_values(&["won"]).inc();
    append_event(state, order_id, EventType::Claimed);
    publish_order(state, "order.claimed", &updated);

    info!(order_id, courier_id, "order claimed");
    Ok(updated)
}

/// Courier rejects an admin assignment; the order returns to the pool.
pub fn decline(state: &AppState, order_id: i64, courier_id: i64) -> Result<Order, AppError> {
    let updated = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.status != OrderStatus::Assigned {
            return Err(AppError::Conflict(
                "only assigned orders can be declined".to_string(),
            ));
        }
        if let Some(current) = order.courier_id {
            if current != courier_id {
                return Err(AppError::Forbidden(
                    "order is assigned to another courier".to_string(),
                ));
            }
        }

        order.status = OrderStatus::New;
        order.courier_id = None;
        order.updated_at = Utc::now();
        order.clone()
    };

    append_event(state, order_id, EventType::AssignedDeclined);
    publish_order(state, "order.declined", &updated);

    info!(order_id, courier_id, "assignment declined");
    Ok(updated)
}

pub fn advance(
    state: &AppState,
    order_id: i64,
    courier_id: i64,
    next: OrderStatus,
) -> Result<Order, AppError> {
    if !matches!(
        next,
        OrderStatus::PickedUp | OrderStatus::Delivered | OrderStatus::Canceled
    ) {
        return Err(AppError::Validation(format!(
            "{} is not a requestable status",
            next.as_str()
        )));
    }

    let updated = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        match order.courier_id {
            Some(owner) if owner == courier_id => {}
            Some(_) => {
                return Err(AppError::Forbidden(
                    "order belongs to another courier".to_string(),
                ))
            }
            None => return Err(AppError::Conflict("order must be claimed first".to_string())),
        }

        if !order.status.can_advance_to(next) {
            return Err(AppError::Conflict(format!(
                "cannot move from {} to {}",
                order.status.as_str(),
                next.as_str()
            )));
        }

        order.status = next;
        order.updated_at = Utc::now();
        order.clone()
    };

    if let Some(event_type) = EventType::for_status(next) {
        append_event(state, order_id, event_type);
    }
    publish_order(state, "order.status_changed", &updated);

    info!(order_id, courier_id, status = next.as_str(), "order status advanced");
    Ok(updated)
}

/// Admin override. Canceling an already-canceled order is a no-op success.
pub fn cancel(state: &AppState, order_id: i64) -> Result<Order, AppError> {
    let (updated, changed) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        match order.status {
            OrderStatus::Canceled => (order.clone(), false),
            OrderStatus::Delivered => {
                return Err(AppError::Conflict(
                    "delivered orders cannot be canceled".to_string(),
                ))
            }
            _ => {
                order.status = OrderStatus::Canceled;
                order.updated_at = Utc::now();
                (order.clone(), true)
            }
        }
    };

    if changed {
        append_event(state, order_id, EventType::Canceled);
        publish_order(state, "order.canceled", &updated);
        info!(order_id, "order canceled");
    }
    Ok(updated)
}

/// Hard removal, outside the lifecycle. Audit events go first so the order
/// never outlives a dangling trail.
pub fn delete(state: &AppState, order_id: i64) -> Result<(), AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }

    state.order_events.remove(&order_id);
    state
        .orders
        .remove(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    publish_value(state, json!({ "type": "order.deleted", "order_id": order_id }));

    info!(order_id, "order deleted");
    Ok(())
}

pub fn list(state: &AppState, identity: &Identity, filters: &OrderFilters) -> Vec<Order> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| scope::can_view(identity, entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    if identity.role == Role::Admin {
        orders.retain(|order| {
            filters.store_id.is_none_or(|id| order.store_id == id)
                && filters.courier_id.is_none_or(|id| order.courier_id == Some(id))
                && filters.status.is_none_or(|status| order.status == status)
                && filters.date_from.is_none_or(|from| order.created_at >= from)
                && filters.date_to.is_none_or(|to| order.created_at <= to)
        });
    }

    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

pub fn get(state: &AppState, identity: &Identity, order_id: i64) -> Result<Order, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if !scope::can_view(identity, &order) {
        return Err(AppError::Forbidden("forbidden".to_string()));
    }
    Ok(order)
}

pub fn events_for(state: &AppState, order_id: i64) -> Vec<OrderEvent> {
    state
        .order_events
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .unwrap_or_default()
}

fn append_event(state: &AppState, order_id: i64, event_type: EventType) {
    let event = OrderEvent {
        id: state.next_event_id(),
        order_id,
        event_type,
        created_at: Utc::now(),
    };
    state.order_events.entry(order_id).or_default().push(event);
    state
        .metrics
        .order_transitions_total
        .with_label_values(&[event_type.as_str()])
        .inc();
}

/// Fan-out happens strictly after the mutation committed; bus and push
/// failures are logged inside their own layers and never bubble up.
fn publish_order(state: &AppState, kind: &str, order: &Order) {
    publish_value(state, json!({ "type": kind, "order": order }));
}

fn publish_value(state: &AppState, payload: serde_json::Value) {
    state.bus.publish(&payload);
    state.metrics.events_published_total.inc();
    state
        .notifier
        .send_silent(payload["type"].as_str().unwrap_or("order"), &payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;

    fn store_identity(subject: i64, store_ids: Option<Vec<i64>>) -> Identity {
        Identity {
            subject,
            role: Role::Store,
            store_ids,
        }
    }

    fn courier_identity(subject: i64) -> Identity {
        Identity {
            subject,
            role: Role::Courier,
            store_ids: None,
        }
    }

    fn create_payload(boxes_count: u32) -> CreateOrder {
        CreateOrder {
            recipient_first_name: "John".to_string(),
            recipient_last_name: "Doe".to_string(),
            phone: "+972500000000".to_string(),
            street: "Main".to_string(),
            building_no: "10".to_string(),
            floor: Some("2".to_string()),
            apartment: Some("5".to_string()),
            boxes_count,
            pickup_address: Some("Warehouse A".to_string()),
            delivery_address: None,
            store_id: None,
        }
    }

    fn state() -> AppState {
        AppState::new(&Config::default())
    }

    #[test]
    fn create_prices_and_audits() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(5)).unwrap();

        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.store_id, 1);
        assert_eq!(order.boxes_multiplier, 1);
        assert_eq!(order.price_total, 35);
        assert_eq!(order.delivery_address, "Main 10");

        let events = events_for(&state, order.id);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Created);
    }

    #[test]
    fn create_rejects_out_of_range_boxes() {
        let state = state();
        let identity = store_identity(1, None);

        let err = create(&state, &identity, create_payload(0)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = create(&state, &identity, create_payload(201)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(state.orders.is_empty());
    }

    #[test]
    fn claim_then_advance_to_delivered() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(5)).unwrap();

        let claimed = claim(&state, order.id, 7).unwrap();
        assert_eq!(claimed.status, OrderStatus::Claimed);
        assert_eq!(claimed.courier_id, Some(7));

        // A different courier cannot touch it.
        let err = advance(&state, order.id, 8, OrderStatus::PickedUp).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        advance(&state, order.id, 7, OrderStatus::PickedUp).unwrap();
        let delivered = advance(&state, order.id, 7, OrderStatus::Delivered).unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        // Terminal: nothing moves it again.
        let err = advance(&state, order.id, 7, OrderStatus::Canceled).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn advance_from_new_always_fails() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(1)).unwrap();

        let err = advance(&state, order.id, 7, OrderStatus::PickedUp).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(
            state.orders.get(&order.id).unwrap().status,
            OrderStatus::New
        );
    }

    #[test]
    fn second_claim_loses() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(2)).unwrap();

        claim(&state, order.id, 7).unwrap();
        let err = claim(&state, order.id, 8).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.orders.get(&order.id).unwrap().courier_id, Some(7));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let state = Arc::new(state());
        let order = create(&state, &store_identity(1, None), create_payload(1)).unwrap();

        let handles: Vec<_> = (1..=8)
            .map(|courier_id| {
                let state = state.clone();
                std::thread::spawn(move || claim(&state, order.id, courier_id).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);

        let stored = state.orders.get(&order.id).unwrap();
        assert_eq!(stored.status, OrderStatus::Claimed);
        assert!(stored.courier_id.is_some());
    }

    #[test]
    fn capacity_is_enforced_at_claim_time() {
        let state = state();
        let store = store_identity(1, None);

        let first = create(&state, &store, create_payload(6)).unwrap();
        let big = create(&state, &store, create_payload(4)).unwrap();
        let small = create(&state, &store, create_payload(2)).unwrap();

        claim(&state, first.id, 7).unwrap();

        // Default capacity 8, load 6: a 4-box order does not fit.
        let err = claim(&state, big.id, 7).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(state.orders.get(&big.id).unwrap().status, OrderStatus::New);

        claim(&state, small.id, 7).unwrap();
    }

    #[test]
    fn assign_decline_then_other_courier_claims() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(3)).unwrap();

        let assigned = assign(&state, order.id, 7).unwrap();
        assert_eq!(assigned.status, OrderStatus::Assigned);
        assert_eq!(assigned.courier_id, Some(7));

        // Another courier can neither claim nor decline it.
        assert!(matches!(
            claim(&state, order.id, 8),
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            decline(&state, order.id, 8),
            Err(AppError::Forbidden(_))
        ));

        let declined = decline(&state, order.id, 7).unwrap();
        assert_eq!(declined.status, OrderStatus::New);
        assert_eq!(declined.courier_id, None);

        let claimed = claim(&state, order.id, 8).unwrap();
        assert_eq!(claimed.courier_id, Some(8));
    }

    #[test]
    fn assigned_courier_can_claim_its_own_assignment() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(3)).unwrap();

        assign(&state, order.id, 7).unwrap();
        let claimed = claim(&state, order.id, 7).unwrap();
        assert_eq!(claimed.status, OrderStatus::Claimed);
    }

    #[test]
    fn cancel_is_idempotent_and_refuses_delivered() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(1)).unwrap();

        claim(&state, order.id, 7).unwrap();
        cancel(&state, order.id).unwrap();
        // Second cancel: no-op success, no duplicate audit event.
        cancel(&state, order.id).unwrap();
        let canceled_events = events_for(&state, order.id)
            .iter()
            .filter(|event| event.event_type == EventType::Canceled)
            .count();
        assert_eq!(canceled_events, 1);

        let delivered = create(&state, &store_identity(1, None), create_payload(1)).unwrap();
        claim(&state, delivered.id, 7).unwrap();
        advance(&state, delivered.id, 7, OrderStatus::PickedUp).unwrap();
        advance(&state, delivered.id, 7, OrderStatus::Delivered).unwrap();
        assert!(matches!(
            cancel(&state, delivered.id),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn delete_removes_order_and_trail() {
        let state = state();
        let order = create(&state, &store_identity(1, None), create_payload(1)).unwrap();

        delete(&state, order.id).unwrap();
        assert!(!state.orders.contains_key(&order.id));
        assert!(events_for(&state, order.id).is_empty());
        assert!(matches!(
            delete(&state, order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn list_is_scoped_per_identity() {
        let state = state();
        let store_a = store_identity(1, None);
        let store_b = store_identity(2, None);

        let a1 = create(&state, &store_a, create_payload(1)).unwrap();
        let b1 = create(&state, &store_b, create_payload(1)).unwrap();
        claim(&state, b1.id, 7).unwrap();

        let seen_by_a = list(&state, &store_a, &OrderFilters::default());
        assert!(seen_by_a.iter().all(|order| order.store_id == 1));

        // Courier 7 sees its claimed order plus the unclaimed pool.
        let courier = courier_identity(7);
        let seen: Vec<i64> = list(&state, &courier, &OrderFilters::default())
            .iter()
            .map(|order| order.id)
            .collect();
        assert!(seen.contains(&a1.id));
        assert!(seen.contains(&b1.id));

        // Courier 8 only sees the pool.
        let other = courier_identity(8);
        let seen: Vec<i64> = list(&state, &other, &OrderFilters::default())
            .iter()
            .map(|order| order.id)
            .collect();
        assert!(seen.contains(&a1.id));
        assert!(!seen.contains(&b1.id));

        assert!(matches!(
            get(&state, &store_a, b1.id),
            Err(AppError::Forbidden(_))
        ));
    }
}
