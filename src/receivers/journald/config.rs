// SPDX-License-Identifier: Apache-2.0

use crate::receivers::journald::record::{Facility, Severity};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of entries read between two state file writes
pub const DEFAULT_PERSIST_STATE_INTERVAL: u32 = 10;

/// Default rate limit window (seconds)
pub const DEFAULT_RATELIMIT_INTERVAL_SECS: u64 = 600;

/// Default number of entries admitted per rate limit window
pub const DEFAULT_RATELIMIT_BURST: u32 = 20_000;

/// Directory relative state file paths are resolved against
pub const DEFAULT_WORK_DIR: &str = "/var/lib/journald-relay";

pub const DEFAULT_JOURNALCTL_PATH: &str = "journalctl";

pub const DEFAULT_SEVERITY: Severity = Severity::Notice;

pub const DEFAULT_FACILITY: Facility = Facility::User;

/// Configuration for the journald receiver
#[derive(Debug, Clone)]
pub struct JournaldReceiverConfig {
    /// File holding the journal cursor between runs. Relative paths are
    /// resolved against `work_dir`. No position is persisted when unset.
    pub state_file: Option<PathBuf>,

    pub work_dir: PathBuf,

    /// Number of entries read between two state file writes
    pub persist_state_interval: u32,

    /// Rate limit window, zero disables rate limiting
    pub ratelimit_interval: Duration,

    /// Entries admitted per rate limit window
    pub ratelimit_burst: u32,

    /// Without a usable state file, start at the end of the journal instead
    /// of its oldest entry
    pub ignore_previous_messages: bool,

    /// Severity used when an entry has no valid PRIORITY field
    pub default_severity: Severity,

    /// Facility used when an entry has no valid SYSLOG_FACILITY field
    pub default_facility: Facility,

    /// journalctl binary used by the default journal source
    pub journalctl_path: PathBuf,

    /// Read journal files from this directory instead of the system journal
    pub journal_directory: Option<PathBuf>,
}

impl Default for JournaldReceiverConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            persist_state_interval: DEFAULT_PERSIST_STATE_INTERVAL,
            ratelimit_interval: Duration::from_secs(DEFAULT_RATELIMIT_INTERVAL_SECS),
            ratelimit_burst: DEFAULT_RATELIMIT_BURST,
            ignore_previous_messages: false,
            default_severity: DEFAULT_SEVERITY,
            default_facility: DEFAULT_FACILITY,
            journalctl_path: PathBuf::from(DEFAULT_JOURNALCTL_PATH),
            journal_directory: None,
        }
    }
}

impl JournaldReceiverConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.persist_state_interval == 0 {
            return Err("Persist state interval must be at least 1, got 0".to_string());
        }

        if let Some(state_file) = &self.state_file {
            if state_file.as_os_str().is_empty() {
                return Err("State file path must not be empty".to_string());
            }
            if state_file.is_relative() && self.work_dir.as_os_str().is_empty() {
                return Err(format!(
                    "Relative state file {:?} requires a working directory",
                    state_file
                ));
            }
        }

        Ok(())
    }

    pub fn with_state_file(mut self, state_file: impl Into<PathBuf>) -> Self {
        self.state_file = Some(state_file.into());
        self
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_persist_state_interval(mut self, interval: u32) -> Self {
        self.persist_state_interval = interval;
        self
    }

    pub fn with_ratelimit(mut self, interval: Duration, burst: u32) -> Self {
        self.ratelimit_interval = interval;
        self.ratelimit_burst = burst;
        self
    }

    pub fn with_ignore_previous_messages(mut self, ignore: bool) -> Self {
        self.ignore_previous_messages = ignore;
        self
    }

    pub fn with_default_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    pub fn with_default_facility(mut self, facility: Facility) -> Self {
        self.default_facility = facility;
        self
    }
}

/// Parse a severity given either as a number (0-7) or a name such as `warning`.
pub fn parse_severity(value: &str) -> Result<Severity, String> {
    let value = value.trim();
    if let Ok(code) = value.parse::<u8>() {
        return Severity::from_code(code)
            .ok_or_else(|| format!("Severity {} is out of range 0-7", code));
    }

    let severity = match value.to_ascii_lowercase().as_str() {
        "emerg" | "emergency" | "panic" => Severity::Emergency,
        "alert" => Severity::Alert,
        "crit" | "critical" => Severity::Critical,
        "err" | "error" => Severity::Error,
        "warn" | "warning" => Severity::Warning,
        "notice" => Severity::Notice,
        "info" => Severity::Info,
        "debug" => Severity::Debug,
        _ => return Err(format!("Unknown severity '{}'", value)),
    };
    Ok(severity)
}

/// Parse a facility given either as a number (0-23) or a syslog name such as `local0`.
pub fn parse_facility(value: &str) -> Result<Facility, String> {
    let value = value.trim();
    if let Ok(code) = value.parse::<u8>() {
        return Facility::from_code(code)
            .ok_or_else(|| format!("Facility {} is out of range 0-23", code));
    }

    match value.to_ascii_lowercase().as_str() {
        "security" => Ok(Facility::Auth),
        "cron2" => Ok(Facility::Clock),
        name => Facility::from_name(name).ok_or_else(|| format!("Unknown facility '{}'", value)),
    }
}
