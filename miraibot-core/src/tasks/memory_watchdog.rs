//! Periodically samples this process's resident memory and stops the bot
//! once it crosses the configured ceiling, so an external supervisor can
//! restart it with a clean heap.

use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::WatchdogSettings;

/// Source of memory readings.
pub trait ResourceGauge: Send + 'static {
    /// Resident set size in bytes, or `None` when it can't be read.
    fn resident_bytes(&mut self) -> Option<u64>;
}

pub struct ProcessMemoryGauge {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMemoryGauge {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!("Memory watchdog cannot resolve its own pid: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }
}

impl Default for ProcessMemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceGauge for ProcessMemoryGauge {
    fn resident_bytes(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        self.system.process(pid).map(|p| p.memory())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogOutcome {
    Cancelled,
    ThresholdExceeded { resident_bytes: u64 },
}

pub struct MemoryWatchdog<G: ResourceGauge> {
    gauge: G,
    threshold_bytes: u64,
    interval: Duration,
    cancel: CancellationToken,
}

impl MemoryWatchdog<ProcessMemoryGauge> {
    pub fn from_settings(settings: &WatchdogSettings, cancel: CancellationToken) -> Self {
        Self::new(
            ProcessMemoryGauge::new(),
            settings.threshold_bytes(),
            settings.sample_interval(),
            cancel,
        )
    }
}

impl<G: ResourceGauge> MemoryWatchdog<G> {
    pub fn new(gauge: G, threshold_bytes: u64, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            gauge,
            threshold_bytes,
            interval,
            cancel,
        }
    }

    /// Samples until cancelled or until the threshold is crossed. A breach
    /// cancels the shared token so the rest of the bot shuts down too.
    pub async fn run(mut self) -> WatchdogOutcome {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return WatchdogOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let Some(rss) = self.gauge.resident_bytes() else {
                continue;
            };
            debug!("Resident memory: {} MB", rss / (1024 * 1024));

            if rss > self.threshold_bytes {
                error!(
                    "Memory usage {} MB exceeds the {} MB limit; shutting down.",
                    rss / (1024 * 1024),
                    self.threshold_bytes / (1024 * 1024)
                );
                self.cancel.cancel();
                return WatchdogOutcome::ThresholdExceeded { resident_bytes: rss };
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<WatchdogOutcome> {
        tokio::spawn(self.run())
    }
}
