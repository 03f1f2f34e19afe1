use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub tracking_sessions_active: IntGauge,
    pub location_reports_total: IntCounterVec,
    pub poll_ticks_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Lifecycle transitions by event and outcome"),
            &["event", "outcome"],
        )
        .expect("valid transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transition_latency_seconds",
                "Time from transition request to applied effects in seconds",
            ),
            &["event"],
        )
        .expect("valid transition_latency_seconds metric");

        let tracking_sessions_active = IntGauge::new(
            "tracking_sessions_active",
            "Number of active location tracking sessions (0 or 1)",
        )
        .expect("valid tracking_sessions_active metric");

        let location_reports_total = IntCounterVec::new(
            Opts::new("location_reports_total", "Rider location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        let poll_ticks_total = IntCounterVec::new(
            Opts::new("poll_ticks_total", "Live location poll ticks by outcome"),
            &["outcome"],
        )
        .expect("valid poll_ticks_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");
        registry
            .register(Box::new(tracking_sessions_active.clone()))
            .expect("register tracking_sessions_active");
        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");
        registry
            .register(Box::new(poll_ticks_total.clone()))
            .expect("register poll_ticks_total");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            tracking_sessions_active,
            location_reports_total,
            poll_ticks_total,
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
