use std::collections::BTreeMap;

/// Point-in-time reading of the host. Field names are the JSON contract.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub host: String,
    pub os_label: String,
    pub uptime_sec: u64,
    pub cpu_percent: f64,
    pub ram: RamStat,
    pub loadavg: LoadAvgStat,
    pub disks: BTreeMap<String, DiskStat>,
    pub net: NetStat,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RamStat {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct LoadAvgStat {
    #[serde(rename = "1")]
    pub one: f64,
    #[serde(rename = "5")]
    pub five: f64,
    #[serde(rename = "15")]
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DiskStat {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

/// Counters summed over all interfaces since boot.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct NetStat {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Snapshot {
        let mut disks = BTreeMap::new();
        disks.insert(
            "/".to_string(),
            DiskStat {
                total: 100,
                used: 40,
                free: 60,
                percent: 40.0,
            },
        );
        Snapshot {
            timestamp: 1_700_000_000.5,
            host: "node-1".to_string(),
            os_label: "Linux 6.8.0".to_string(),
            uptime_sec: 42,
            cpu_percent: 12.5,
            ram: RamStat {
                total: 1024,
                used: 512,
                percent: 50.0,
            },
            loadavg: LoadAvgStat::default(),
            disks,
            net: NetStat::default(),
        }
    }

    #[test]
    fn zeroed_loadavg_uses_window_keys() {
        let value = serde_json::to_value(LoadAvgStat::default()).unwrap();
        assert_eq!(value, json!({"1": 0.0, "5": 0.0, "15": 0.0}));
    }

    #[test]
    fn snapshot_serializes_contract_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "timestamp",
            "host",
            "os_label",
            "uptime_sec",
            "cpu_percent",
            "ram",
            "loadavg",
            "disks",
            "net",
        ] {
            assert!(obj.contains_key(key), "нет поля {key}");
        }
        assert_eq!(obj.len(), 9);
        assert_eq!(value["disks"]["/"]["free"], json!(60));
        assert_eq!(value["net"]["dropout"], json!(0));
    }
}
