use std::collections::HashMap;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// CPU and memory usage of one process at sampling time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    /// CPU usage in percent since the previous sample of this process
    pub cpu_usage: f32,
    /// Resident memory in bytes
    pub memory_usage: u64,
}

/// Samples resource usage of supervised processes
pub struct ResourceSampler {
    system: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Sample the given PIDs. PIDs that no longer exist are absent from the result.
    pub fn sample(&mut self, pids: &[u32]) -> HashMap<u32, ResourceUsage> {
        if pids.is_empty() {
            return HashMap::new();
        }

        let sys_pids: Vec<Pid> = pids.iter().map(|&pid| Pid::from_u32(pid)).collect();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&sys_pids),
            true,
            ProcessRefreshKind::everything(),
        );

        pids.iter()
            .filter_map(|&pid| {
                self.system.process(Pid::from_u32(pid)).map(|process| {
                    (
                        pid,
                        ResourceUsage {
                            cpu_usage: process.cpu_usage(),
                            memory_usage: process.memory(),
                        },
                    )
                })
            })
            .collect()
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
