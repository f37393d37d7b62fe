use crate::snapshot::{ProbeSource, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus view of the most recent snapshot, served on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub sysdash_cpu_usage_percent: Gauge,
    pub sysdash_cpu_cores: Gauge,
    pub sysdash_load_average: GaugeVec,
    pub sysdash_memory_total_bytes: Gauge,
    pub sysdash_memory_available_bytes: Gauge,
    pub sysdash_swap_total_bytes: Gauge,
    pub sysdash_swap_free_bytes: Gauge,
    pub sysdash_uptime_seconds: Gauge,
    pub sysdash_net_rx_bytes_total: GaugeVec,
    pub sysdash_net_tx_bytes_total: GaugeVec,
    pub sysdash_net_rx_packets_total: GaugeVec,
    pub sysdash_net_tx_packets_total: GaugeVec,
    pub sysdash_net_rx_bytes_per_sec: GaugeVec,
    pub sysdash_net_tx_bytes_per_sec: GaugeVec,
    pub sysdash_net_oper_up: GaugeVec,
    pub sysdash_net_iface_count: Gauge,
    pub sysdash_temperature_celsius: GaugeVec,
    pub sysdash_temperature_sensor_count: Gauge,
    pub sysdash_history_len: Gauge,
    pub sysdash_last_collect_timestamp_seconds: Gauge,
    pub sysdash_probe_errors_total: CounterVec,
    pub sysdash_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let sysdash_cpu_usage_percent = Gauge::with_opts(opts!(
            "sysdash_cpu_usage_percent",
            "CPU busy share since the previous sample in percent (0..100)"
        ))?;
        let sysdash_cpu_cores =
            Gauge::with_opts(opts!("sysdash_cpu_cores", "Number of logical CPUs"))?;
        let sysdash_load_average = GaugeVec::new(
            opts!("sysdash_load_average", "Load average by window"),
            &["window"],
        )?;
        let sysdash_memory_total_bytes =
            Gauge::with_opts(opts!("sysdash_memory_total_bytes", "Total memory in bytes"))?;
        let sysdash_memory_available_bytes = Gauge::with_opts(opts!(
            "sysdash_memory_available_bytes",
            "Available memory in bytes"
        ))?;
        let sysdash_swap_total_bytes =
            Gauge::with_opts(opts!("sysdash_swap_total_bytes", "Total swap in bytes"))?;
        let sysdash_swap_free_bytes =
            Gauge::with_opts(opts!("sysdash_swap_free_bytes", "Free swap in bytes"))?;
        let sysdash_uptime_seconds =
            Gauge::with_opts(opts!("sysdash_uptime_seconds", "Host uptime in seconds"))?;
        let sysdash_net_rx_bytes_total = GaugeVec::new(
            opts!(
                "sysdash_net_rx_bytes_total",
                "Cumulative received bytes per interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_tx_bytes_total = GaugeVec::new(
            opts!(
                "sysdash_net_tx_bytes_total",
                "Cumulative transmitted bytes per interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_rx_packets_total = GaugeVec::new(
            opts!(
                "sysdash_net_rx_packets_total",
                "Cumulative received packets per interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_tx_packets_total = GaugeVec::new(
            opts!(
                "sysdash_net_tx_packets_total",
                "Cumulative transmitted packets per interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_rx_bytes_per_sec = GaugeVec::new(
            opts!(
                "sysdash_net_rx_bytes_per_sec",
                "Receive speed in bytes per second by interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_tx_bytes_per_sec = GaugeVec::new(
            opts!(
                "sysdash_net_tx_bytes_per_sec",
                "Transmit speed in bytes per second by interface"
            ),
            &["iface"],
        )?;
        let sysdash_net_oper_up = GaugeVec::new(
            opts!(
                "sysdash_net_oper_up",
                "1 if the interface is operationally up"
            ),
            &["iface"],
        )?;
        let sysdash_net_iface_count = Gauge::with_opts(opts!(
            "sysdash_net_iface_count",
            "Number of network interfaces"
        ))?;
        let sysdash_temperature_celsius = GaugeVec::new(
            opts!(
                "sysdash_temperature_celsius",
                "Thermal zone temperature in Celsius"
            ),
            &["sensor"],
        )?;
        let sysdash_temperature_sensor_count = Gauge::with_opts(opts!(
            "sysdash_temperature_sensor_count",
            "Number of thermal zones reported"
        ))?;
        let sysdash_history_len = Gauge::with_opts(opts!(
            "sysdash_history_len",
            "Snapshots currently kept in history"
        ))?;
        let sysdash_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "sysdash_last_collect_timestamp_seconds",
            "Unix time of the last published snapshot"
        ))?;
        let sysdash_probe_errors_total = CounterVec::new(
            opts!(
                "sysdash_probe_errors_total",
                "Probe failures by source since start"
            ),
            &["source"],
        )?;
        let sysdash_scrape_count_total = Counter::with_opts(opts!(
            "sysdash_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &sysdash_cpu_usage_percent)?;
        register(&registry, &sysdash_cpu_cores)?;
        register(&registry, &sysdash_load_average)?;
        register(&registry, &sysdash_memory_total_bytes)?;
        register(&registry, &sysdash_memory_available_bytes)?;
        register(&registry, &sysdash_swap_total_bytes)?;
        register(&registry, &sysdash_swap_free_bytes)?;
        register(&registry, &sysdash_uptime_seconds)?;
        register(&registry, &sysdash_net_rx_bytes_total)?;
        register(&registry, &sysdash_net_tx_bytes_total)?;
        register(&registry, &sysdash_net_rx_packets_total)?;
        register(&registry, &sysdash_net_tx_packets_total)?;
        register(&registry, &sysdash_net_rx_bytes_per_sec)?;
        register(&registry, &sysdash_net_tx_bytes_per_sec)?;
        register(&registry, &sysdash_net_oper_up)?;
        register(&registry, &sysdash_net_iface_count)?;
        register(&registry, &sysdash_temperature_celsius)?;
        register(&registry, &sysdash_temperature_sensor_count)?;
        register(&registry, &sysdash_history_len)?;
        register(&registry, &sysdash_last_collect_timestamp_seconds)?;
        register(&registry, &sysdash_probe_errors_total)?;
        register(&registry, &sysdash_scrape_count_total)?;

        // export every source at zero so rate() works before the first failure
        for source in ProbeSource::ALL {
            sysdash_probe_errors_total
                .with_label_values(&[source.as_str()])
                .inc_by(0.0);
        }

        Ok(Arc::new(Self {
            registry,
            sysdash_cpu_usage_percent,
            sysdash_cpu_cores,
            sysdash_load_average,
            sysdash_memory_total_bytes,
            sysdash_memory_available_bytes,
            sysdash_swap_total_bytes,
            sysdash_swap_free_bytes,
            sysdash_uptime_seconds,
            sysdash_net_rx_bytes_total,
            sysdash_net_tx_bytes_total,
            sysdash_net_rx_packets_total,
            sysdash_net_tx_packets_total,
            sysdash_net_rx_bytes_per_sec,
            sysdash_net_tx_bytes_per_sec,
            sysdash_net_oper_up,
            sysdash_net_iface_count,
            sysdash_temperature_celsius,
            sysdash_temperature_sensor_count,
            sysdash_history_len,
            sysdash_last_collect_timestamp_seconds,
            sysdash_probe_errors_total,
            sysdash_scrape_count_total,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot, history_len: usize) {
        self.sysdash_cpu_usage_percent.set(snapshot.cpu_percent);
        self.sysdash_cpu_cores.set(snapshot.cpu_cores as f64);
        self.sysdash_load_average
            .with_label_values(&["1m"])
            .set(snapshot.load1);
        self.sysdash_load_average
            .with_label_values(&["5m"])
            .set(snapshot.load5);
        self.sysdash_load_average
            .with_label_values(&["15m"])
            .set(snapshot.load15);
        self.sysdash_memory_total_bytes
            .set(snapshot.mem_total_bytes as f64);
        self.sysdash_memory_available_bytes
            .set(snapshot.mem_available_bytes as f64);
        self.sysdash_swap_total_bytes
            .set(snapshot.swap_total_bytes as f64);
        self.sysdash_swap_free_bytes
            .set(snapshot.swap_free_bytes as f64);
        self.sysdash_uptime_seconds.set(snapshot.uptime_sec as f64);
        self.sysdash_history_len.set(history_len as f64);
        self.sysdash_last_collect_timestamp_seconds
            .set(snapshot.timestamp.timestamp() as f64);

        // interfaces and zones come and go between ticks
        self.sysdash_net_rx_bytes_total.reset();
        self.sysdash_net_tx_bytes_total.reset();
        self.sysdash_net_rx_packets_total.reset();
        self.sysdash_net_tx_packets_total.reset();
        self.sysdash_net_rx_bytes_per_sec.reset();
        self.sysdash_net_tx_bytes_per_sec.reset();
        self.sysdash_net_oper_up.reset();
        self.sysdash_temperature_celsius.reset();

        for n in &snapshot.net {
            let labels = [n.name.as_str()];
            self.sysdash_net_rx_bytes_total
                .with_label_values(&labels)
                .set(n.rx_bytes as f64);
            self.sysdash_net_tx_bytes_total
                .with_label_values(&labels)
                .set(n.tx_bytes as f64);
            self.sysdash_net_rx_packets_total
                .with_label_values(&labels)
                .set(n.rx_packets as f64);
            self.sysdash_net_tx_packets_total
                .with_label_values(&labels)
                .set(n.tx_packets as f64);
            self.sysdash_net_rx_bytes_per_sec
                .with_label_values(&labels)
                .set(n.rx_bytes_per_sec as f64);
            self.sysdash_net_tx_bytes_per_sec
                .with_label_values(&labels)
                .set(n.tx_bytes_per_sec as f64);
            self.sysdash_net_oper_up
                .with_label_values(&labels)
                .set(if n.oper_up { 1.0 } else { 0.0 });
        }
        self.sysdash_net_iface_count.set(snapshot.net.len() as f64);

        for t in &snapshot.temps {
            self.sysdash_temperature_celsius
                .with_label_values(&[&t.sensor])
                .set(t.celsius);
        }
        self.sysdash_temperature_sensor_count
            .set(snapshot.temps.len() as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.sysdash_scrape_count_total.inc();
    }

    pub fn inc_probe_error(&self, source: &str) {
        self.sysdash_probe_errors_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
