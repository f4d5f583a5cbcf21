use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::auth::JwtService;
use crate::bus::EventBus;
use crate::config::Config;
use crate::idempotency::IdempotencyLedger;
use crate::models::courier::Courier;
use crate::models::event::OrderEvent;
use crate::models::order::Order;
use crate::notify::{LogNotifier, PushNotifier};
use crate::observability::metrics::Metrics;

/// Shared service state. The sharded maps are the storage collaborator:
/// their per-entry write locks give the lifecycle engine its row-level
/// atomic conditional updates.
pub struct AppState {
    pub couriers: DashMap<i64, Courier>,
    pub orders: DashMap<i64, Order>,
    pub order_events: DashMap<i64, Vec<OrderEvent>>,
    pub idempotency: IdempotencyLedger,
    pub bus: EventBus,
    pub jwt: JwtService,
    pub notifier: Arc<dyn PushNotifier>,
    pub metrics: Metrics,
    pub heartbeat: Duration,
    order_seq: AtomicI64,
    event_seq: AtomicI64,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            couriers: DashMap::new(),
            orders: DashMap::new(),
            order_events: DashMap::new(),
            idempotency: IdempotencyLedger::new(),
            bus: EventBus::new(config.event_inbox_size),
            jwt: JwtService::new(&config.jwt_secret, &config.jwt_issuer),
            notifier: Arc::new(LogNotifier),
            metrics: Metrics::new(),
            heartbeat: Duration::from_secs(config.heartbeat_secs),
            order_seq: AtomicI64::new(1),
            event_seq: AtomicI64::new(1),
        }
    }

    pub fn next_order_id(&self) -> i64 {
        self.order_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_event_id(&self) -> i64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }
}
