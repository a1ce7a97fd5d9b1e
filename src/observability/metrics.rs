use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub pickup_transitions_total: IntCounterVec,
    pub pickups_open: IntGauge,
    pub pickup_completion_seconds: HistogramVec,
    pub invoice_refresh_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let pickup_transitions_total = IntCounterVec::new(
            Opts::new(
                "pickup_transitions_total",
                "Committed pickup lifecycle transitions",
            ),
            &["transition"],
        )
        .expect("valid pickup_transitions_total metric");

        let pickups_open = IntGauge::new("pickups_open", "Pickups currently in scheduled state")
            .expect("valid pickups_open metric");

        let pickup_completion_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "pickup_completion_seconds",
                "Latency of pickup completion including signature upload",
            ),
            &["outcome"],
        )
        .expect("valid pickup_completion_seconds metric");

        let invoice_refresh_total = IntCounterVec::new(
            Opts::new("invoice_refresh_total", "Invoice status refreshes by outcome"),
            &["outcome"],
        )
        .expect("valid invoice_refresh_total metric");

        registry
            .register(Box::new(pickup_transitions_total.clone()))
            .expect("register pickup_transitions_total");
        registry
            .register(Box::new(pickups_open.clone()))
            .expect("register pickups_open");
        registry
            .register(Box::new(pickup_completion_seconds.clone()))
            .expect("register pickup_completion_seconds");
        registry
            .register(Box::new(invoice_refresh_total.clone()))
            .expect("register invoice_refresh_total");

        Self {
            registry,
            pickup_transitions_total,
            pickups_open,
            pickup_completion_seconds,
            invoice_refresh_total,
        }
    }

    pub fn record_transition(&self, transition: &str) {
        self.pickup_transitions_total
            .with_label_values(&[transition])
            .inc();
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
