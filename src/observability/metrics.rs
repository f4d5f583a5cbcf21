use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub claims_total: IntCounterVec,
    pub order_transitions_total: IntCounterVec,
    pub events_published_total: IntCounter,
    pub event_subscribers: IntGauge,
    pub claim_latency_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total orders created")
                .expect("valid orders_created_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order lifecycle events by type"),
            &["event"],
        )
        .expect("valid order_transitions_total metric");

        let events_published_total = IntCounter::new(
            "events_published_total",
            "Notifications published to the event bus",
        )
        .expect("valid events_published_total metric");

        let event_subscribers =
            IntGauge::new("event_subscribers", "Currently connected event subscribers")
                .expect("valid event_subscribers metric");

        let claim_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "claim_latency_seconds",
            "Latency of claim processing in seconds",
        ))
        .expect("valid claim_latency_seconds metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(event_subscribers.clone()))
            .expect("register event_subscribers");
        registry
            .register(Box::new(claim_latency_seconds.clone()))
            .expect("register claim_latency_seconds");

        // Label children only show up in the text exposition once they
        // exist; create them so scrapes see every outcome from the start.
        for outcome in ["won", "lost_race", "capacity_exceeded"] {
            claims_total.with_label_values(&[outcome]);
        }

        Self {
            registry,
            orders_created_total,
            claims_total,
            order_transitions_total,
            events_published_total,
            event_subscribers,
            claim_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
