use crate::snapshot::Snapshot;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::{Arc, Mutex, PoisonError};

/// Prometheus view of the latest snapshot plus transport counters.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    scrape_lock: Arc<Mutex<()>>,
    pub healthd_cpu_usage_percent: Gauge,
    pub healthd_ram_total_bytes: Gauge,
    pub healthd_ram_used_bytes: Gauge,
    pub healthd_ram_usage_percent: Gauge,
    pub healthd_uptime_seconds: Gauge,
    pub healthd_load_average: GaugeVec,
    pub healthd_disk_total_bytes: GaugeVec,
    pub healthd_disk_used_bytes: GaugeVec,
    pub healthd_disk_free_bytes: GaugeVec,
    pub healthd_disk_usage_percent: GaugeVec,
    pub healthd_disk_count: Gauge,
    pub healthd_net_bytes: GaugeVec,
    pub healthd_net_packets: GaugeVec,
    pub healthd_net_errors: GaugeVec,
    pub healthd_net_drops: GaugeVec,
    pub healthd_last_collect_timestamp_seconds: Gauge,
    pub healthd_scrape_count_total: Counter,
    pub healthd_ws_connections_active: Gauge,
    pub healthd_ws_messages_sent_total: Counter,
    pub healthd_ws_disconnects_total: CounterVec,
    pub healthd_ws_rejected_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let healthd_cpu_usage_percent = Gauge::with_opts(opts!(
            "healthd_cpu_usage_percent",
            "Global CPU usage since the previous sample in percent (0..100)"
        ))?;
        let healthd_ram_total_bytes =
            Gauge::with_opts(opts!("healthd_ram_total_bytes", "Total RAM in bytes"))?;
        let healthd_ram_used_bytes =
            Gauge::with_opts(opts!("healthd_ram_used_bytes", "Used RAM in bytes"))?;
        let healthd_ram_usage_percent =
            Gauge::with_opts(opts!("healthd_ram_usage_percent", "RAM usage in percent"))?;
        let healthd_uptime_seconds =
            Gauge::with_opts(opts!("healthd_uptime_seconds", "Seconds since host boot"))?;
        let healthd_load_average = GaugeVec::new(
            opts!(
                "healthd_load_average",
                "Load average by window in minutes"
            ),
            &["window"],
        )?;
        let healthd_disk_total_bytes = GaugeVec::new(
            opts!("healthd_disk_total_bytes", "Disk total bytes by mount"),
            &["mount"],
        )?;
        let healthd_disk_used_bytes = GaugeVec::new(
            opts!("healthd_disk_used_bytes", "Disk used bytes by mount"),
            &["mount"],
        )?;
        let healthd_disk_free_bytes = GaugeVec::new(
            opts!("healthd_disk_free_bytes", "Disk free bytes by mount"),
            &["mount"],
        )?;
        let healthd_disk_usage_percent = GaugeVec::new(
            opts!(
                "healthd_disk_usage_percent",
                "Disk usage in percent by mount"
            ),
            &["mount"],
        )?;
        let healthd_disk_count =
            Gauge::with_opts(opts!("healthd_disk_count", "Number of reported mounts"))?;
        let healthd_net_bytes = GaugeVec::new(
            opts!(
                "healthd_net_bytes",
                "Bytes since boot summed over interfaces"
            ),
            &["direction"],
        )?;
        let healthd_net_packets = GaugeVec::new(
            opts!(
                "healthd_net_packets",
                "Packets since boot summed over interfaces"
            ),
            &["direction"],
        )?;
        let healthd_net_errors = GaugeVec::new(
            opts!(
                "healthd_net_errors",
                "Interface errors since boot summed over interfaces"
            ),
            &["direction"],
        )?;
        let healthd_net_drops = GaugeVec::new(
            opts!(
                "healthd_net_drops",
                "Dropped packets since boot summed over interfaces"
            ),
            &["direction"],
        )?;
        let healthd_last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "healthd_last_collect_timestamp_seconds",
            "Unix timestamp of the snapshot behind this scrape"
        ))?;
        let healthd_scrape_count_total = Counter::with_opts(opts!(
            "healthd_scrape_count_total",
            "Number of Prometheus scrapes served"
        ))?;
        let healthd_ws_connections_active = Gauge::with_opts(opts!(
            "healthd_ws_connections_active",
            "Currently open streaming connections"
        ))?;
        let healthd_ws_messages_sent_total = Counter::with_opts(opts!(
            "healthd_ws_messages_sent_total",
            "Snapshots pushed over streaming connections"
        ))?;
        let healthd_ws_disconnects_total = CounterVec::new(
            opts!(
                "healthd_ws_disconnects_total",
                "Closed streaming connections by reason"
            ),
            &["reason"],
        )?;
        let healthd_ws_rejected_total = Counter::with_opts(opts!(
            "healthd_ws_rejected_total",
            "Streaming handshakes refused because of invalid configuration"
        ))?;

        register(&registry, &healthd_cpu_usage_percent)?;
        register(&registry, &healthd_ram_total_bytes)?;
        register(&registry, &healthd_ram_used_bytes)?;
        register(&registry, &healthd_ram_usage_percent)?;
        register(&registry, &healthd_uptime_seconds)?;
        register(&registry, &healthd_load_average)?;
        register(&registry, &healthd_disk_total_bytes)?;
        register(&registry, &healthd_disk_used_bytes)?;
        register(&registry, &healthd_disk_free_bytes)?;
        register(&registry, &healthd_disk_usage_percent)?;
        register(&registry, &healthd_disk_count)?;
        register(&registry, &healthd_net_bytes)?;
        register(&registry, &healthd_net_packets)?;
        register(&registry, &healthd_net_errors)?;
        register(&registry, &healthd_net_drops)?;
        register(&registry, &healthd_last_collect_timestamp_seconds)?;
        register(&registry, &healthd_scrape_count_total)?;
        register(&registry, &healthd_ws_connections_active)?;
        register(&registry, &healthd_ws_messages_sent_total)?;
        register(&registry, &healthd_ws_disconnects_total)?;
        register(&registry, &healthd_ws_rejected_total)?;

        Ok(Arc::new(Self {
            registry,
            scrape_lock: Arc::new(Mutex::new(())),
            healthd_cpu_usage_percent,
            healthd_ram_total_bytes,
            healthd_ram_used_bytes,
            healthd_ram_usage_percent,
            healthd_uptime_seconds,
            healthd_load_average,
            healthd_disk_total_bytes,
            healthd_disk_used_bytes,
            healthd_disk_free_bytes,
            healthd_disk_usage_percent,
            healthd_disk_count,
            healthd_net_bytes,
            healthd_net_packets,
            healthd_net_errors,
            healthd_net_drops,
            healthd_last_collect_timestamp_seconds,
            healthd_scrape_count_total,
            healthd_ws_connections_active,
            healthd_ws_messages_sent_total,
            healthd_ws_disconnects_total,
            healthd_ws_rejected_total,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot) {
        self.healthd_cpu_usage_percent.set(snapshot.cpu_percent);
        self.healthd_ram_total_bytes.set(snapshot.ram.total as f64);
        self.healthd_ram_used_bytes.set(snapshot.ram.used as f64);
        self.healthd_ram_usage_percent.set(snapshot.ram.percent);
        self.healthd_uptime_seconds.set(snapshot.uptime_sec as f64);
        self.healthd_last_collect_timestamp_seconds
            .set(snapshot.timestamp);

        self.healthd_load_average
            .with_label_values(&["1"])
            .set(snapshot.loadavg.one);
        self.healthd_load_average
            .with_label_values(&["5"])
            .set(snapshot.loadavg.five);
        self.healthd_load_average
            .with_label_values(&["15"])
            .set(snapshot.loadavg.fifteen);

        // Mounts may disappear between scrapes.
        self.healthd_disk_total_bytes.reset();
        self.healthd_disk_used_bytes.reset();
        self.healthd_disk_free_bytes.reset();
        self.healthd_disk_usage_percent.reset();
        for (mount, d) in &snapshot.disks {
            self.healthd_disk_total_bytes
                .with_label_values(&[mount.as_str()])
                .set(d.total as f64);
            self.healthd_disk_used_bytes
                .with_label_values(&[mount.as_str()])
                .set(d.used as f64);
            self.healthd_disk_free_bytes
                .with_label_values(&[mount.as_str()])
                .set(d.free as f64);
            self.healthd_disk_usage_percent
                .with_label_values(&[mount.as_str()])
                .set(d.percent);
        }
        self.healthd_disk_count.set(snapshot.disks.len() as f64);

        let net = &snapshot.net;
        set_directional(&self.healthd_net_bytes, net.bytes_recv, net.bytes_sent);
        set_directional(&self.healthd_net_packets, net.packets_recv, net.packets_sent);
        set_directional(&self.healthd_net_errors, net.errin, net.errout);
        set_directional(&self.healthd_net_drops, net.dropin, net.dropout);
    }

    pub fn inc_scrape_count(&self) {
        self.healthd_scrape_count_total.inc();
    }

    pub fn ws_connected(&self) {
        self.healthd_ws_connections_active.inc();
    }

    pub fn ws_disconnected(&self, reason: &str) {
        self.healthd_ws_connections_active.dec();
        self.healthd_ws_disconnects_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn ws_active_connections(&self) -> u64 {
        self.healthd_ws_connections_active.get().max(0.0) as u64
    }

    pub fn inc_ws_message_sent(&self) {
        self.healthd_ws_messages_sent_total.inc();
    }

    pub fn inc_ws_rejected(&self) {
        self.healthd_ws_rejected_total.inc();
    }

    /// Update and encode as one step; the disk gauges are reset inside, so scrapes must not overlap.
    pub fn render_snapshot(&self, snapshot: &Snapshot) -> Result<Vec<u8>, prometheus::Error> {
        let _guard = self.scrape_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.update_from_snapshot(snapshot);
        self.encode_metrics()
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn set_directional(vec: &GaugeVec, rx: u64, tx: u64) {
    vec.with_label_values(&["rx"]).set(rx as f64);
    vec.with_label_values(&["tx"]).set(tx as f64);
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
