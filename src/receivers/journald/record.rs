// SPDX-License-Identifier: Apache-2.0

//! Records flowing through the journald receiver.
//!
//! A [`RawEntry`] is a snapshot of the fields of the journal entry at the
//! current read position. Every field keeps the journal's `NAME=value` shape,
//! exactly as `sd_journal_get_data` hands it out, so values may contain NUL
//! bytes and are never NUL-terminated.
//!
//! A [`NormalizedRecord`] is what the field mapper produces from it and what
//! the sink receives.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Syslog severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Emergency = 0, // System is unusable
    Alert = 1,     // Action must be taken immediately
    Critical = 2,  // Critical conditions
    Error = 3,     // Error conditions
    Warning = 4,   // Warning conditions
    Notice = 5,    // Normal but significant condition
    Info = 6,      // Informational
    Debug = 7,     // Debug-level messages
}

impl Severity {
    /// Returns `None` for codes outside 0-7.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Severity::Emergency),
            1 => Some(Severity::Alert),
            2 => Some(Severity::Critical),
            3 => Some(Severity::Error),
            4 => Some(Severity::Warning),
            5 => Some(Severity::Notice),
            6 => Some(Severity::Info),
            7 => Some(Severity::Debug),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Convert to OpenTelemetry severity number
    /// See: https://opentelemetry.io/docs/specs/otel/logs/data-model/#field-severitynumber
    pub fn to_otel_severity_number(&self) -> i32 {
        match self {
            Severity::Emergency => 21, // FATAL
            Severity::Alert => 21,     // FATAL
            Severity::Critical => 21,  // FATAL
            Severity::Error => 17,     // ERROR
            Severity::Warning => 13,   // WARN
            Severity::Notice => 10,    // INFO2
            Severity::Info => 9,       // INFO
            Severity::Debug => 5,      // DEBUG
        }
    }
}

/// Syslog facility codes
/// See: https://datatracker.ietf.org/doc/html/rfc5424#section-6.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facility {
    Kern = 0,
    User = 1,
    Mail = 2,
    Daemon = 3,
    Auth = 4,
    Syslog = 5,
    Lpr = 6,
    News = 7,
    Uucp = 8,
    Cron = 9,
    Authpriv = 10,
    Ftp = 11,
    Ntp = 12,
    Audit = 13,
    Alert = 14,
    Clock = 15,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

const FACILITIES: [Facility; 24] = [
    Facility::Kern,
    Facility::User,
    Facility::Mail,
    Facility::Daemon,
    Facility::Auth,
    Facility::Syslog,
    Facility::Lpr,
    Facility::News,
    Facility::Uucp,
    Facility::Cron,
    Facility::Authpriv,
    Facility::Ftp,
    Facility::Ntp,
    Facility::Audit,
    Facility::Alert,
    Facility::Clock,
    Facility::Local0,
    Facility::Local1,
    Facility::Local2,
    Facility::Local3,
    Facility::Local4,
    Facility::Local5,
    Facility::Local6,
    Facility::Local7,
];

impl Facility {
    /// Returns `None` for codes outside 0-23.
    pub fn from_code(code: u8) -> Option<Self> {
        FACILITIES.get(code as usize).copied()
    }

    /// Looks a facility up by its syslog name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        FACILITIES
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(name))
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facility::Kern => "kern",
            Facility::User => "user",
            Facility::Mail => "mail",
            Facility::Daemon => "daemon",
            Facility::Auth => "auth",
            Facility::Syslog => "syslog",
            Facility::Lpr => "lpr",
            Facility::News => "news",
            Facility::Uucp => "uucp",
            Facility::Cron => "cron",
            Facility::Authpriv => "authpriv",
            Facility::Ftp => "ftp",
            Facility::Ntp => "ntp",
            Facility::Audit => "audit",
            Facility::Alert => "alert",
            Facility::Clock => "clock",
            Facility::Local0 => "local0",
            Facility::Local1 => "local1",
            Facility::Local2 => "local2",
            Facility::Local3 => "local3",
            Facility::Local4 => "local4",
            Facility::Local5 => "local5",
            Facility::Local6 => "local6",
            Facility::Local7 => "local7",
        }
    }
}

/// Wall-clock time of a journal entry, split the way the journal reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RealtimeTimestamp {
    pub seconds: u64,
    pub microseconds: u32,
}

impl RealtimeTimestamp {
    pub fn from_micros(usec: u64) -> Self {
        Self {
            seconds: usec / 1_000_000,
            microseconds: (usec % 1_000_000) as u32,
        }
    }

    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self {
            seconds: elapsed.as_secs(),
            microseconds: elapsed.subsec_micros(),
        }
    }

    pub fn as_unix_nanos(&self) -> u64 {
        self.seconds
            .saturating_mul(1_000_000_000)
            .saturating_add(u64::from(self.microseconds) * 1_000)
    }
}

/// All data fields of one journal entry.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    fields: Vec<Bytes>,
    realtime: Option<RealtimeTimestamp>,
}

impl RawEntry {
    pub fn new(fields: Vec<Bytes>) -> Self {
        Self {
            fields,
            realtime: None,
        }
    }

    pub fn with_realtime(mut self, realtime: Option<RealtimeTimestamp>) -> Self {
        self.realtime = realtime;
        self
    }

    /// Returns the first `NAME=value` field for `name`, separator included.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        let name = name.as_bytes();
        self.fields
            .iter()
            .map(|f| f.as_ref())
            .find(|f| f.len() > name.len() && f.starts_with(name) && f[name.len()] == b'=')
    }

    pub fn fields(&self) -> impl Iterator<Item = &[u8]> {
        self.fields.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn realtime(&self) -> Option<RealtimeTimestamp> {
        self.realtime
    }
}

/// A journal entry mapped onto the syslog data model.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub message: String,
    /// `ident[pid]:` or `ident:`
    pub tag: String,
    pub facility: Facility,
    pub severity: Severity,
    /// When absent the receiver stamps the record with its receive time.
    pub timestamp: Option<RealtimeTimestamp>,
    pub metadata: HashMap<String, String>,
}

impl NormalizedRecord {
    /// Syslog PRI value (facility * 8 + severity)
    pub fn priority(&self) -> u8 {
        self.facility.code() * 8 + self.severity.code()
    }
}
