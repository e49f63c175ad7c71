use prometheus::{
    opts, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Registry, TextEncoder,
};

pub struct ObservabilityRepository {
    registry: Registry,
    instances_provisioned_total: Counter,
    instances_failed_total: Counter,
    remote_calls_total: CounterVec,
    readiness_wait_seconds: Histogram,
}

impl ObservabilityRepository {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();

        let instances_provisioned_total = Counter::with_opts(opts!(
            "mockhost_instances_provisioned_total",
            "Managed instances that reached fully configured"
        ))
        .map_err(|e| e.to_string())?;
        let instances_failed_total = Counter::with_opts(opts!(
            "mockhost_instances_failed_total",
            "Managed instances whose provisioning sequence failed"
        ))
        .map_err(|e| e.to_string())?;
        let remote_calls_total = CounterVec::new(
            opts!(
                "mockhost_remote_calls_total",
                "Remote import and secret calls issued"
            ),
            &["operation", "status"],
        )
        .map_err(|e| e.to_string())?;
        let readiness_wait_seconds = Histogram::with_opts(HistogramOpts::new(
            "mockhost_readiness_wait_seconds",
            "Time spent waiting for a managed instance to become healthy (seconds)",
        ))
        .map_err(|e| e.to_string())?;

        registry
            .register(Box::new(instances_provisioned_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(instances_failed_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(remote_calls_total.clone()))
            .map_err(|e| e.to_string())?;
        registry
            .register(Box::new(readiness_wait_seconds.clone()))
            .map_err(|e| e.to_string())?;

        Ok(Self {
            registry,
            instances_provisioned_total,
            instances_failed_total,
            remote_calls_total,
            readiness_wait_seconds,
        })
    }

    pub fn inc_instances_provisioned(&self) {
        self.instances_provisioned_total.inc();
    }

    pub fn inc_instances_failed(&self) {
        self.instances_failed_total.inc();
    }

    pub fn observe_remote_call(&self, operation: &str, status: &str) {
        self.remote_calls_total
            .with_label_values(&[operation, status])
            .inc();
    }

    pub fn observe_readiness_wait(&self, seconds: f64) {
        self.readiness_wait_seconds.observe(seconds);
    }

    pub fn remote_call_count(&self, operation: &str, status: &str) -> f64 {
        self.remote_calls_total
            .with_label_values(&[operation, status])
            .get()
    }

    pub fn instances_provisioned(&self) -> f64 {
        self.instances_provisioned_total.get()
    }

    pub fn instances_failed(&self) -> f64 {
        self.instances_failed_total.get()
    }

    pub fn render_metrics(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buffer).map_err(|e| e.to_string())
    }
}
