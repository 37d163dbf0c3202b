// SPDX-License-Identifier: Apache-2.0

//! systemd journal receiver
//!
//! Reads entries from the local journal, maps them onto syslog-style records
//! and forwards them downstream. The journal position is kept in a state file
//! so that a restarted receiver neither loses nor replays entries.
//!
//! The journal is read through `journalctl --output=export` by default, or
//! directly through libsystemd when built with the `sd_journal` feature.

pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod journalctl;
pub mod mapper;
pub mod rate_limit;
pub mod receiver;
pub mod record;
pub mod sd_journal;
pub mod sink;
pub mod source;

pub use config::JournaldReceiverConfig;
pub use error::{JournaldReceiverError, Result};
pub use receiver::{IngestStats, JournaldReceiver};
