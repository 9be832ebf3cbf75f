//! Host metrics probe. The values only feed the scoring policy.

use crate::membership::types::{BatteryInfo, CpuInfo, SystemInfo};

pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> SystemInfo;
}

/// Reports the configured battery flag and the number of available cores.
/// Clock speed and free memory are left unreported, so scoring uses its defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProbe {
    pub on_battery: bool,
}

impl SystemProbe for DefaultProbe {
    fn sample(&self) -> SystemInfo {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        SystemInfo {
            cpu: Some(CpuInfo {
                speed_ghz: None,
                cores,
            }),
            memory: None,
            battery: self.on_battery.then(|| BatteryInfo {
                level: None,
                charging: Some(false),
            }),
        }
    }
}

/// Fixed sample, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub SystemInfo);

impl SystemProbe for StaticProbe {
    fn sample(&self) -> SystemInfo {
        self.0.clone()
    }
}
