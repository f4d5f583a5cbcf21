use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::stream::{self, BoxStream, StreamExt};
use prometheus::IntGauge;
use serde::Deserialize;
use tracing::info;

use crate::bus::BusMessage;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SseQuery {
    #[serde(default)]
    pub once: Option<String>,
}

/// Decrements the live-subscriber gauge when the stream is dropped, which
/// covers client disconnects and server shutdown alike.
struct SubscriberGuard(IntGauge);

impl SubscriberGuard {
    fn new(gauge: IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Long-lived notification stream. Opens with an `:ok` comment, then emits
/// published events as they arrive; idle intervals produce `:hb` comments
/// so proxies keep the connection open. `?once=1` closes right after the
/// opening comment, which keeps tests deterministic.
pub async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let opening = stream::once(async { Ok(Event::default().comment("ok")) });

    if matches!(query.once.as_deref(), Some("1") | Some("true")) {
        return Sse::new(opening.boxed());
    }

    let subscription = state.bus.subscribe();
    let guard = SubscriberGuard::new(state.metrics.event_subscribers.clone());
    let heartbeat = state.heartbeat;

    info!(subscriber = %subscription.id(), "event subscriber connected");

    let live = stream::unfold(
        (subscription, guard),
        move |(mut subscription, guard)| async move {
            let event = match subscription.next(heartbeat).await? {
                BusMessage::Event(data) => Event::default().data(data),
                BusMessage::Heartbeat => Event::default().comment("hb"),
            };
            Some((Ok(event), (subscription, guard)))
        },
    );

    Sse::new(opening.chain(live).boxed())
}
