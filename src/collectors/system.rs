use crate::collectors::network::collect_network;
use crate::snapshot::{DiskStat, LoadAvgStat, RamStat, Snapshot};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

const UNKNOWN: &str = "unknown";

pub fn collect_system(system: &mut System, boot_time: u64) -> Snapshot {
    system.refresh_cpu();
    system.refresh_memory();
    system.refresh_disks_list();
    system.refresh_networks_list();

    let timestamp = now_unix_f64();
    let host = system.host_name().unwrap_or_else(|| UNKNOWN.to_string());
    let os_label = os_label(system.kernel_version());
    let uptime_sec = (timestamp as u64).saturating_sub(boot_time);
    let cpu_percent = round_percent(system.global_cpu_info().cpu_usage() as f64);

    let total = system.total_memory();
    let used = system.used_memory().min(total);
    let ram = RamStat {
        total,
        used,
        percent: percent_of(used, total),
    };

    let load = system.load_average();
    let loadavg = sanitize_loadavg(load.one, load.five, load.fifteen);

    let disks = collect_disks(system);
    let net = collect_network(system);

    Snapshot {
        timestamp,
        host,
        os_label,
        uptime_sec,
        cpu_percent,
        ram,
        loadavg,
        disks,
        net,
    }
}

fn collect_disks(system: &System) -> BTreeMap<String, DiskStat> {
    let mut out = BTreeMap::new();
    for d in system.disks() {
        let fs_type = String::from_utf8_lossy(d.file_system());
        let mount = d.mount_point().to_string_lossy().to_string();
        if !accepts_filesystem(&fs_type) {
            debug!(mount = %mount, "пропуск раздела без типа файловой системы");
            continue;
        }
        out.entry(mount)
            .or_insert_with(|| disk_usage(d.total_space(), d.available_space()));
    }
    out
}

#[cfg(target_os = "windows")]
fn accepts_filesystem(_fs_type: &str) -> bool {
    true
}

#[cfg(not(target_os = "windows"))]
fn accepts_filesystem(fs_type: &str) -> bool {
    !fs_type.trim().is_empty()
}

fn disk_usage(total: u64, available: u64) -> DiskStat {
    let free = available.min(total);
    let used = total - free;
    DiskStat {
        total,
        used,
        free,
        percent: percent_of(used, total),
    }
}

/// Unsupported platforms report zeros; NaN or negative readings are treated the same.
fn sanitize_loadavg(one: f64, five: f64, fifteen: f64) -> LoadAvgStat {
    if [one, five, fifteen]
        .iter()
        .any(|v| !v.is_finite() || *v < 0.0)
    {
        debug!("средняя загрузка недоступна, используется нулевое значение");
        return LoadAvgStat::default();
    }
    LoadAvgStat { one, five, fifteen }
}

fn os_label(release: Option<String>) -> String {
    let family = os_family(std::env::consts::OS);
    match release.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) {
        Some(release) => format!("{family} {release}"),
        None => family.to_string(),
    }
}

fn os_family(os: &str) -> &str {
    match os {
        "linux" => "Linux",
        "windows" => "Windows",
        "macos" => "Darwin",
        "freebsd" => "FreeBSD",
        "netbsd" => "NetBSD",
        "openbsd" => "OpenBSD",
        other => other,
    }
}

fn percent_of(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_percent((part as f64 / total as f64) * 100.0)
}

fn round_percent(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    ((value * 10.0).round() / 10.0).clamp(0.0, 100.0)
}

fn now_unix_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
