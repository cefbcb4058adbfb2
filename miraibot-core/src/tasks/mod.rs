pub mod memory_watchdog;

pub use memory_watchdog::{MemoryWatchdog, ProcessMemoryGauge, ResourceGauge, WatchdogOutcome};
