use crate::snapshot::NetStat;
#[cfg(target_os = "linux")]
use std::fs;
use sysinfo::{NetworkExt, NetworksExt, System, SystemExt};

pub fn collect_network(system: &System) -> NetStat {
    let mut net = NetStat::default();
    for (_, data) in system.networks().iter() {
        net.bytes_sent += data.total_transmitted();
        net.bytes_recv += data.total_received();
        net.packets_sent += data.total_packets_transmitted();
        net.packets_recv += data.total_packets_received();
        net.errout += data.total_errors_on_transmitted();
        net.errin += data.total_errors_on_received();
    }

    let (dropin, dropout) = collect_drops();
    net.dropin = dropin;
    net.dropout = dropout;
    net
}

#[cfg(target_os = "linux")]
fn collect_drops() -> (u64, u64) {
    match fs::read_to_string("/proc/net/dev") {
        Ok(text) => parse_proc_net_dev_drops(&text),
        Err(err) => {
            tracing::debug!(error = %err, "не удалось прочитать /proc/net/dev");
            (0, 0)
        }
    }
}

// sysinfo has no drop counters outside Linux procfs.
#[cfg(not(target_os = "linux"))]
fn collect_drops() -> (u64, u64) {
    (0, 0)
}

/// Sums the receive and transmit drop columns over every interface.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_net_dev_drops(text: &str) -> (u64, u64) {
    const RX_DROP: usize = 3;
    const TX_DROP: usize = 11;

    let mut dropin = 0_u64;
    let mut dropout = 0_u64;
    for line in text.lines() {
        let Some((_, counters)) = line.split_once(':') else {
            continue;
        };
        let fields: Vec<u64> = counters
            .split_whitespace()
            .map(|v| v.parse::<u64>().unwrap_or(0))
            .collect();
        if fields.len() <= TX_DROP {
            continue;
        }
        dropin = dropin.saturating_add(fields[RX_DROP]);
        dropout = dropout.saturating_add(fields[TX_DROP]);
    }
    (dropin, dropout)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000      10    0    0    0     0          0         0     1000      10    0    0    0     0       0          0
  eth0: 52000    400    1    7    0     0          0         3    31000     250    2    5    0     0       0          0
  wlan0:  900      9    0    2    0     0          0         0      800       8    0    1    0     0       0          0
";

    #[test]
    fn drops_are_summed_across_interfaces() {
        assert_eq!(parse_proc_net_dev_drops(PROC_NET_DEV), (9, 6));
    }

    #[test]
    fn header_and_short_lines_are_ignored() {
        assert_eq!(parse_proc_net_dev_drops("garbage\n eth0: 1 2 3\n"), (0, 0));
        assert_eq!(parse_proc_net_dev_drops(""), (0, 0));
    }

    #[test]
    fn live_counters_are_cumulative() {
        let mut system = System::new();
        system.refresh_networks_list();
        let first = collect_network(&system);
        system.refresh_networks_list();
        let second = collect_network(&system);
        assert!(second.bytes_recv >= first.bytes_recv);
        assert!(second.packets_sent >= first.packets_sent);
    }
}
