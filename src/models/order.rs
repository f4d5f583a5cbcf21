use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_BOXES: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Assigned,
    Claimed,
    PickedUp,
    Delivered,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Claimed => "claimed",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Courier-driven transitions. Everything starts from a claimed order;
    /// `new` orders must be claimed first.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Claimed, OrderStatus::PickedUp)
                | (OrderStatus::Claimed, OrderStatus::Canceled)
                | (OrderStatus::PickedUp, OrderStatus::Delivered)
                | (OrderStatus::PickedUp, OrderStatus::Canceled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub store_id: i64,
    pub courier_id: Option<i64>,
    pub status: OrderStatus,
    pub pickup_address: String,
    pub delivery_address: String,
    pub recipient_first_name: String,
    pub recipient_last_name: String,
    pub phone: String,
    pub street: String,
    pub building_no: String,
    pub floor: Option<String>,
    pub apartment: Option<String>,
    pub boxes_count: u32,
    pub boxes_multiplier: u32,
    pub price_total: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pricing is a step function of box count: (multiplier, total price).
pub fn price_tier(boxes_count: u32) -> (u32, u32) {
    if boxes_count <= 8 {
        (1, 35)
    } else if boxes_count <= 16 {
        (2, 70)
    } else {
        (3, 105)
    }
}
