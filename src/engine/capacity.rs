use crate::models::order::OrderStatus;
use crate::state::AppState;

/// Sum of boxes across the courier's active orders, read from the latest
/// committed state. Never cached: concurrent claims can change it between
/// any two calls, so callers that need a stable value must hold the
/// courier's entry lock while calling this.
pub fn current_load(state: &AppState, courier_id: i64) -> u32 {
    state
        .orders
        .iter()
        .filter(|entry| {
            let order = entry.value();
            order.courier_id == Some(courier_id)
                && matches!(order.status, OrderStatus::Claimed | OrderStatus::PickedUp)
        })
        .map(|entry| entry.value().boxes_count)
        .sum()
}

pub fn can_accept(capacity_boxes: u32, current_load: u32, additional_boxes: u32) -> bool {
    current_load + additional_boxes <= capacity_boxes
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::Config;
    use crate::models::order::{price_tier, Order};

    fn seed_order(state: &AppState, courier_id: Option<i64>, status: OrderStatus, boxes: u32) {
        let id = state.next_order_id();
        let (boxes_multiplier, price_total) = price_tier(boxes);
        let now = Utc::now();
        state.orders.insert(
            id,
            Order {
                id,
                store_id: 1,
                courier_id,
                status,
                pickup_address: "Warehouse A".to_string(),
                delivery_address: "Main 10".to_string(),
                recipient_first_name: "John".to_string(),
                recipient_last_name: "Doe".to_string(),
                phone: "+972500000000".to_string(),
                street: "Main".to_string(),
                building_no: "10".to_string(),
                floor: None,
                apartment: None,
                boxes_count: boxes,
                boxes_multiplier,
                price_total,
                created_at: now,
                updated_at: now,
            },
        );
    }

    #[test]
    fn load_counts_only_active_statuses() {
        let state = AppState::new(&Config::default());
        seed_order(&state, Some(5), OrderStatus::Claimed, 3);
        seed_order(&state, Some(5), OrderStatus::PickedUp, 2);
        seed_order(&state, Some(5), OrderStatus::Delivered, 7);
        seed_order(&state, Some(5), OrderStatus::Canceled, 7);
        seed_order(&state, Some(6), OrderStatus::Claimed, 4);
        seed_order(&state, None, OrderStatus::New, 4);

        assert_eq!(current_load(&state, 5), 5);
        assert_eq!(current_load(&state, 6), 4);
        assert_eq!(current_load(&state, 7), 0);
    }

    #[test]
    fn fit_decision_is_inclusive_of_capacity() {
        assert!(can_accept(8, 6, 2));
        assert!(!can_accept(8, 6, 4));
        assert!(can_accept(8, 0, 8));
        assert!(!can_accept(8, 8, 1));
    }
}
