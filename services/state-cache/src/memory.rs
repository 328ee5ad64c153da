//! Process memory probe used by the health monitor's memory check.

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::warn;

/// Source of the process's resident memory.
pub trait MemoryProbe: Send + Sync {
    /// Current usage in MiB, or `None` when it cannot be measured.
    fn heap_used_mb(&self) -> Option<f64>;
}

/// Reads the current process's resident set size through `sysinfo`.
pub struct SysinfoProbe {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                warn!(error = err, "Cannot resolve own pid; memory check disabled");
                None
            }
        };
        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn heap_used_mb(&self) -> Option<f64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system
            .process(pid)
            .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
    }
}

/// Fixed reading, for tests and for disabling the check.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub Option<f64>);

impl MemoryProbe for FixedProbe {
    fn heap_used_mb(&self) -> Option<f64> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sysinfo_probe_reads_own_process() {
        let probe = SysinfoProbe::new();
        if let Some(mb) = probe.heap_used_mb() {
            assert!(mb > 0.0);
        }
    }

    #[test]
    fn test_fixed_probe() {
        assert_eq!(FixedProbe(Some(12.5)).heap_used_mb(), Some(12.5));
        assert_eq!(FixedProbe::default().heap_used_mb(), None);
    }
}
