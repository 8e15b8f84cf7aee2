pub mod network;
pub mod system;

use crate::snapshot::Snapshot;
use std::sync::{Mutex, PoisonError};
use sysinfo::{System, SystemExt};

/// Process-wide source of snapshots.
///
/// `sysinfo` computes CPU usage as a delta against the previous refresh, so the
/// `System` it keeps is the one piece of state shared between callers. It sits
/// behind a mutex: concurrent requests serialize on the refresh instead of
/// interleaving it.
pub struct Collector {
    system: Mutex<System>,
    boot_time: u64,
}

impl Collector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        let boot_time = system.boot_time();
        Self {
            system: Mutex::new(system),
            boot_time,
        }
    }

    pub fn boot_time(&self) -> u64 {
        self.boot_time
    }

    pub fn snapshot(&self) -> Snapshot {
        // A panic in another caller leaves the sampler usable; the data is only counters.
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system::collect_system(&mut system, self.boot_time)
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}
