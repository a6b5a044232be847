use sysinfo::{ProcessesToUpdate, System};

use crate::daemon::storage::entities::ResourceUsage;

/// Samples CPU and memory usage of all processes whose name contains the focused app's name.
/// CPU figures need two refreshes to be meaningful, so a single sampler lives for the whole
/// tracking run.
pub struct ResourceSampler {
    system: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    pub fn usage_for(&mut self, app_name: &str) -> ResourceUsage {
        self.system.refresh_memory();
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let needle = app_name.to_lowercase();
        if needle.is_empty() {
            return ResourceUsage::default();
        }
        let total_memory = self.system.total_memory();

        self.system
            .processes()
            .values()
            .filter(|process| {
                process
                    .name()
                    .to_string_lossy()
                    .to_lowercase()
                    .contains(&needle)
            })
            .fold(ResourceUsage::default(), |mut usage, process| {
                usage.cpu_percent += process.cpu_usage() as f64;
                if total_memory > 0 {
                    usage.memory_percent += process.memory() as f64 / total_memory as f64 * 100.;
                }
                usage.process_count += 1;
                usage
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_app_uses_nothing() {
        let mut sampler = ResourceSampler::new();
        let usage = sampler.usage_for("surely-no-process-has-this-name-3f9a");
        assert_eq!(usage, ResourceUsage::default());
    }

    #[test]
    fn own_process_is_found() {
        let mut sampler = ResourceSampler::new();
        let own_name = std::env::current_exe()
            .ok()
            .and_then(|v| v.file_stem().map(|v| v.to_string_lossy().into_owned()))
            .unwrap_or_default();
        // Process names are truncated to 15 characters on Linux.
        let prefix: String = own_name.chars().take(15).collect();
        let usage = sampler.usage_for(&prefix);
        assert!(usage.process_count >= 1);
        assert!(usage.memory_percent >= 0.0);
    }
}
