//! Host diagnostics written at the start of every build log.

use crate::util::log::BuildLog;
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// Facts about the build machine.
#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    pub arch: &'static str,
    pub os: &'static str,
    pub logical_cpus: usize,
    pub physical_cpus: Option<usize>,
    pub cpu_mhz: Option<String>,
    pub cpu_model: Option<String>,
    pub path: String,
    /// Problems hit while probing; logged, never fatal.
    pub errors: Vec<String>,
}

impl HostInfo {
    /// Probe the current host.
    pub fn detect(runner: &dyn ProcessRunner) -> Self {
        let mut info = HostInfo {
            arch: std::env::consts::ARCH,
            os: std::env::consts::OS,
            logical_cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            physical_cpus: None,
            cpu_mhz: None,
            cpu_model: None,
            path: std::env::var("PATH").unwrap_or_default(),
            errors: Vec::new(),
        };

        match info.os {
            "linux" => match std::fs::read_to_string("/proc/cpuinfo") {
                Ok(cpuinfo) => info.apply_cpuinfo(&cpuinfo),
                Err(e) => info.errors.push(format!("Error reading /proc/cpuinfo: {}", e)),
            },
            "macos" => info.probe_sysctl(runner),
            _ => {}
        }

        info
    }

    /// Fill in CPU details from the contents of `/proc/cpuinfo`.
    ///
    /// The physical count is the number of `physical id` lines, which
    /// overestimates on multi-core packages; it is only a hint.
    pub fn apply_cpuinfo(&mut self, cpuinfo: &str) {
        let physical = cpuinfo
            .lines()
            .filter(|line| line.starts_with("physical id"))
            .count();
        self.physical_cpus = (physical > 0).then_some(physical);

        self.cpu_mhz = cpuinfo
            .lines()
            .find(|line| line.contains("cpu MHz"))
            .and_then(|line| line.split(':').nth(1))
            .map(|mhz| mhz.trim().to_string());
    }

    fn probe_sysctl(&mut self, runner: &dyn ProcessRunner) {
        let sysctl = |key: &str| -> Option<String> {
            match runner.capture(&ProcessBuilder::new("sysctl").args(["-n", key])) {
                Ok(out) if !out.trim().is_empty() => Some(out.trim().to_string()),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("sysctl {} failed: {:#}", key, e);
                    None
                }
            }
        };

        self.physical_cpus = sysctl("hw.physicalcpu").and_then(|n| n.parse().ok());
        self.cpu_mhz = sysctl("hw.cpufrequency")
            .and_then(|hz| hz.parse::<f64>().ok())
            .map(|hz| format!("{:.2}", hz / 1_000_000.0));
        self.cpu_model = sysctl("machdep.cpu.brand_string");

        if self.physical_cpus.is_none() && self.cpu_model.is_none() {
            self.errors.push("Error getting macOS CPU info".to_string());
        }
    }

    /// Write the diagnostics block to the build log.
    pub fn log(&self, log: &BuildLog<'_>) {
        log.message(format!("Host architecture: {}", self.arch));
        log.message(format!("Logical CPU cores: {}", self.logical_cpus));
        log.message(format!("Operating system: {}", self.os));

        match self.os {
            "linux" | "macos" => {
                let physical = self
                    .physical_cpus
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "Not available".to_string());
                log.message(format!("Estimated physical CPU cores: {}", physical));
                match &self.cpu_mhz {
                    Some(mhz) => log.message(format!("CPU frequency: {} MHz", mhz)),
                    None => log.message("CPU frequency: Not available"),
                }
            }
            _ => {}
        }
        if let Some(model) = &self.cpu_model {
            log.message(format!("CPU model: {}", model));
        }
        for error in &self.errors {
            log.message(error);
        }

        log.message("");
        log.message("active PATH Variable:");
        log.message(&self.path);
        log.message("");
    }
}
