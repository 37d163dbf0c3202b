// SPDX-License-Identifier: Apache-2.0

use crate::receivers::journald::config::{
    DEFAULT_JOURNALCTL_PATH, DEFAULT_WORK_DIR, JournaldReceiverConfig, parse_facility,
    parse_severity,
};
use clap::Args;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Args, Clone, Deserialize)]
#[serde(default)]
pub struct JournaldReceiverArgs {
    /// File holding the journal position between runs, relative paths are
    /// resolved against the working directory
    #[arg(long, env = "JOURNALD_RELAY_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Working directory for relative state file paths
    #[arg(long, env = "JOURNALD_RELAY_WORK_DIR", default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    /// Number of entries read between two state file writes (default: 10)
    #[arg(long, env = "JOURNALD_RELAY_PERSIST_STATE_INTERVAL")]
    pub persist_state_interval: Option<u32>,

    /// Rate limit window in seconds, 0 disables rate limiting (default: 600)
    #[arg(long, env = "JOURNALD_RELAY_RATELIMIT_INTERVAL")]
    pub ratelimit_interval: Option<u64>,

    /// Entries admitted per rate limit window (default: 20000)
    #[arg(long, env = "JOURNALD_RELAY_RATELIMIT_BURST")]
    pub ratelimit_burst: Option<u32>,

    /// Start at the end of the journal when no saved position is available
    #[arg(
        long,
        env = "JOURNALD_RELAY_IGNORE_PREVIOUS_MESSAGES",
        default_value = "false"
    )]
    pub ignore_previous_messages: bool,

    /// Severity for entries without a valid PRIORITY, a number (0-7) or a
    /// name such as `warning` (default: notice)
    #[arg(long, env = "JOURNALD_RELAY_DEFAULT_SEVERITY")]
    pub default_severity: Option<String>,

    /// Facility for entries without a valid SYSLOG_FACILITY, a number (0-23)
    /// or a name such as `local0` (default: user)
    #[arg(long, env = "JOURNALD_RELAY_DEFAULT_FACILITY")]
    pub default_facility: Option<String>,

    /// journalctl binary used to read the journal
    #[arg(
        long,
        env = "JOURNALD_RELAY_JOURNALCTL_PATH",
        default_value = DEFAULT_JOURNALCTL_PATH
    )]
    pub journalctl_path: PathBuf,

    /// Read journal files from this directory instead of the system journal
    #[arg(long, env = "JOURNALD_RELAY_JOURNAL_DIRECTORY")]
    pub journal_directory: Option<PathBuf>,
}

impl Default for JournaldReceiverArgs {
    fn default() -> Self {
        Self {
            state_file: None,
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            persist_state_interval: None,
            ratelimit_interval: None,
            ratelimit_burst: None,
            ignore_previous_messages: false,
            default_severity: None,
            default_facility: None,
            journalctl_path: PathBuf::from(DEFAULT_JOURNALCTL_PATH),
            journal_directory: None,
        }
    }
}

impl JournaldReceiverArgs {
    pub fn build_config(&self) -> Result<JournaldReceiverConfig, String> {
        let mut config = JournaldReceiverConfig::default()
            .with_work_dir(&self.work_dir)
            .with_ignore_previous_messages(self.ignore_previous_messages);

        config.journalctl_path = self.journalctl_path.clone();
        config.journal_directory = self.journal_directory.clone();

        if let Some(state_file) = &self.state_file {
            config = config.with_state_file(state_file);
        }
        if let Some(interval) = self.persist_state_interval {
            config = config.with_persist_state_interval(interval);
        }
        if self.ratelimit_interval.is_some() || self.ratelimit_burst.is_some() {
            let interval = self
                .ratelimit_interval
                .map(Duration::from_secs)
                .unwrap_or(config.ratelimit_interval);
            let burst = self.ratelimit_burst.unwrap_or(config.ratelimit_burst);
            config = config.with_ratelimit(interval, burst);
        }
        if let Some(severity) = &self.default_severity {
            config = config.with_default_severity(parse_severity(severity)?);
        }
        if let Some(facility) = &self.default_facility {
            config = config.with_default_facility(parse_facility(facility)?);
        }

        config.validate()?;
        Ok(config)
    }
}
