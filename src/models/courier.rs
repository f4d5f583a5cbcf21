use serde::{Deserialize, Serialize};

/// Maximum total boxes a courier carries across active orders unless the
/// courier record says otherwise.
pub const DEFAULT_CAPACITY_BOXES: u32 = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: i64,
    pub name: String,
    pub capacity_boxes: u32,
}

impl Courier {
    /// Couriers authenticate against an external directory; the first claim
    /// from an unknown id registers it here with the default capacity.
    pub fn with_default_capacity(id: i64) -> Self {
        Self {
            id,
            name: format!("courier-{id}"),
            capacity_boxes: DEFAULT_CAPACITY_BOXES,
        }
    }
}
