use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Assigned,
    Claimed,
    AssignedDeclined,
    PickedUp,
    Delivered,
    Canceled,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Assigned => "assigned",
            EventType::Claimed => "claimed",
            EventType::AssignedDeclined => "assigned_declined",
            EventType::PickedUp => "picked_up",
            EventType::Delivered => "delivered",
            EventType::Canceled => "canceled",
        }
    }

    /// Audit event recorded for a courier-driven status advance.
    pub fn for_status(status: OrderStatus) -> Option<Self> {
        match status {
            OrderStatus::PickedUp => Some(EventType::PickedUp),
            OrderStatus::Delivered => Some(EventType::Delivered),
            OrderStatus::Canceled => Some(EventType::Canceled),
            _ => None,
        }
    }
}

/// Append-only audit trail entry. Never updated; removed only when its
/// order is hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    pub order_id: i64,
    pub event_type: EventType,
    pub created_at: DateTime<Utc>,
}
