use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub push_events_total: IntCounterVec,
    pub stream_reconnects: IntCounter,
    pub actions_total: IntCounterVec,
    pub pending_offers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let push_events_total = IntCounterVec::new(
            Opts::new("push_events_total", "Inbound push events by outcome"),
            &["outcome"],
        )
        .expect("valid push_events_total metric");

        let stream_reconnects = IntCounter::new(
            "stream_reconnects_total",
            "Order stream reconnect attempts",
        )
        .expect("valid stream_reconnects_total metric");

        let actions_total = IntCounterVec::new(
            Opts::new("actions_total", "Rider actions by action and outcome"),
            &["action", "outcome"],
        )
        .expect("valid actions_total metric");

        let pending_offers = IntGauge::new("pending_offers", "Current number of pending offers")
            .expect("valid pending_offers metric");

        registry
            .register(Box::new(push_events_total.clone()))
            .expect("register push_events_total");
        registry
            .register(Box::new(stream_reconnects.clone()))
            .expect("register stream_reconnects_total");
        registry
            .register(Box::new(actions_total.clone()))
            .expect("register actions_total");
        registry
            .register(Box::new(pending_offers.clone()))
            .expect("register pending_offers");

        Self {
            registry,
            push_events_total,
            stream_reconnects,
            actions_total,
            pending_offers,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
