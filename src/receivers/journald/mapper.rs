// SPDX-License-Identifier: Apache-2.0

//! Maps journal entries onto syslog-style records
//!
//! Journal fields arrive as `NAME=value` byte strings. Well-known fields feed
//! the syslog header:
//!
//! - `MESSAGE` becomes the message text
//! - `PRIORITY` (one digit) becomes the severity
//! - `SYSLOG_FACILITY` (one or two digits) becomes the facility
//! - `SYSLOG_IDENTIFIER` and `SYSLOG_PID` become the tag, e.g. `sshd[812]:`
//!
//! Every field is also copied into the record metadata, with trusted fields
//! such as `_PID` or `_COMM` renamed to short keys. Mapping never fails:
//! anything unexpected falls back to a configured default or the original
//! field name.

use crate::receivers::journald::record::{
    Facility, NormalizedRecord, RawEntry, Severity,
};
use std::collections::HashMap;
use tracing::{debug, warn};

const MESSAGE_FIELD: &str = "MESSAGE";
const PRIORITY_FIELD: &str = "PRIORITY";
const FACILITY_FIELD: &str = "SYSLOG_FACILITY";
const IDENTIFIER_FIELD: &str = "SYSLOG_IDENTIFIER";
const PID_FIELD: &str = "SYSLOG_PID";

/// Tag base for entries without a SYSLOG_IDENTIFIER
pub const DEFAULT_IDENTIFIER: &str = "journal";

/// Trusted journal fields and the metadata keys they are stored under.
/// Names must match exactly; `_PIDFD` stays `_PIDFD`.
const FIELD_NAME_TABLE: &[(&str, &str)] = &[
    ("_PID", "pid"),
    ("_GID", "gid"),
    ("_UID", "uid"),
    ("_EXE", "exe"),
    ("_COMM", "appname"),
    ("_CMDLINE", "cmd"),
];

/// Returns the metadata key for a journal field name.
pub fn translate_field_name(name: &str) -> &str {
    // only trusted fields are renamed
    if !name.starts_with('_') {
        return name;
    }

    FIELD_NAME_TABLE
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, key)| *key)
        .unwrap_or(name)
}

/// Replaces embedded NUL bytes with spaces. Nothing else changes, so the
/// output has the same length as the input.
pub fn sanitize_value(value: &[u8]) -> Vec<u8> {
    value
        .iter()
        .map(|&b| if b == 0 { b' ' } else { b })
        .collect()
}

fn sanitize_to_string(value: &[u8]) -> String {
    String::from_utf8_lossy(&sanitize_value(value)).into_owned()
}

/// Value part of a `NAME=value` field returned by `RawEntry::get`.
fn field_value<'a>(entry: &'a RawEntry, name: &str) -> Option<&'a [u8]> {
    entry.get(name).map(|field| &field[name.len() + 1..])
}

/// Parses a run of one or two ASCII digits.
fn parse_digits(value: &[u8]) -> Option<u8> {
    if value.is_empty() || value.len() > 2 || !value.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(value.iter().fold(0u8, |acc, d| acc * 10 + (d - b'0')))
}

/// Maps raw journal entries to [`NormalizedRecord`]s.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapper {
    default_severity: Severity,
    default_facility: Facility,
}

impl FieldMapper {
    pub fn new(default_severity: Severity, default_facility: Facility) -> Self {
        Self {
            default_severity,
            default_facility,
        }
    }

    pub fn map(&self, entry: &RawEntry) -> NormalizedRecord {
        let message = field_value(entry, MESSAGE_FIELD)
            .map(sanitize_to_string)
            .unwrap_or_default();

        NormalizedRecord {
            message,
            tag: self.tag(entry),
            facility: self.facility(entry),
            severity: self.severity(entry),
            timestamp: entry.realtime(),
            metadata: self.metadata(entry),
        }
    }

    fn severity(&self, entry: &RawEntry) -> Severity {
        let Some(value) = field_value(entry, PRIORITY_FIELD) else {
            return self.default_severity;
        };

        if value.len() != 1 {
            debug!(
                length = value.len(),
                "The value of the 'PRIORITY' field has an unexpected length"
            );
            return self.default_severity;
        }

        match parse_digits(value).and_then(Severity::from_code) {
            Some(severity) => severity,
            None => {
                debug!(
                    value = %String::from_utf8_lossy(value),
                    "The value of the 'PRIORITY' field is out of bounds, resetting"
                );
                self.default_severity
            }
        }
    }

    fn facility(&self, entry: &RawEntry) -> Facility {
        let Some(value) = field_value(entry, FACILITY_FIELD) else {
            return self.default_facility;
        };

        if value.is_empty() || value.len() > 2 {
            debug!(
                length = value.len(),
                "The value of the 'SYSLOG_FACILITY' field has an unexpected length"
            );
            return self.default_facility;
        }

        match parse_digits(value).and_then(Facility::from_code) {
            Some(facility) => facility,
            None => {
                debug!(
                    value = %String::from_utf8_lossy(value),
                    "The value of the 'SYSLOG_FACILITY' field is out of bounds, resetting"
                );
                self.default_facility
            }
        }
    }

    fn tag(&self, entry: &RawEntry) -> String {
        let ident = field_value(entry, IDENTIFIER_FIELD)
            .map(sanitize_to_string)
            .unwrap_or_else(|| DEFAULT_IDENTIFIER.to_string());

        match field_value(entry, PID_FIELD) {
            Some(pid) if !pid.is_empty() && pid.iter().all(u8::is_ascii_digit) => {
                format!("{}[{}]:", ident, String::from_utf8_lossy(pid))
            }
            _ => format!("{}:", ident),
        }
    }

    fn metadata(&self, entry: &RawEntry) -> HashMap<String, String> {
        let mut metadata = HashMap::with_capacity(entry.len());

        for field in entry.fields() {
            let Some(separator) = field.iter().position(|&b| b == b'=') else {
                warn!(
                    field = %String::from_utf8_lossy(field),
                    "Journal returned a malformed field (has no '='), skipping it"
                );
                continue;
            };

            let name = String::from_utf8_lossy(&field[..separator]);
            let key = translate_field_name(&name).to_string();
            metadata.insert(key, sanitize_to_string(&field[separator + 1..]));
        }

        metadata
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new(Severity::Notice, Facility::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::journald::record::RealtimeTimestamp;
    use bytes::Bytes;
    use proptest::prelude::*;
    use tracing_test::traced_test;

    fn entry(fields: &[&[u8]]) -> RawEntry {
        RawEntry::new(fields.iter().map(|f| Bytes::copy_from_slice(f)).collect())
    }

    #[test]
    fn test_map_full_entry() {
        let raw = entry(&[
            b"MESSAGE=hello",
            b"PRIORITY=3",
            b"SYSLOG_FACILITY=4",
            b"SYSLOG_PID=1234",
            b"SYSLOG_IDENTIFIER=myapp",
        ])
        .with_realtime(Some(RealtimeTimestamp::from_micros(1_500_000)));

        let record = FieldMapper::default().map(&raw);

        assert_eq!(record.message, "hello");
        assert_eq!(record.severity, Severity::Error);
        assert_eq!(record.facility, Facility::Auth);
        assert_eq!(record.tag, "myapp[1234]:");
        assert_eq!(
            record.timestamp,
            Some(RealtimeTimestamp {
                seconds: 1,
                microseconds: 500_000
            })
        );
    }

    #[test]
    fn test_missing_message_yields_empty_string() {
        let record = FieldMapper::default().map(&entry(&[b"PRIORITY=6"]));
        assert_eq!(record.message, "");
        assert_eq!(record.severity, Severity::Info);
    }

    #[test]
    fn test_empty_entry_uses_defaults() {
        let mapper = FieldMapper::new(Severity::Warning, Facility::Local2);
        let record = mapper.map(&RawEntry::default());

        assert_eq!(record.message, "");
        assert_eq!(record.tag, "journal:");
        assert_eq!(record.severity, Severity::Warning);
        assert_eq!(record.facility, Facility::Local2);
        assert!(record.timestamp.is_none());
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn test_priority_out_of_range_or_wrong_width() {
        let mapper = FieldMapper::new(Severity::Notice, Facility::User);

        assert_eq!(mapper.map(&entry(&[b"PRIORITY=9"])).severity, Severity::Notice);
        assert_eq!(mapper.map(&entry(&[b"PRIORITY=12"])).severity, Severity::Notice);
        assert_eq!(mapper.map(&entry(&[b"PRIORITY="])).severity, Severity::Notice);
        assert_eq!(mapper.map(&entry(&[b"PRIORITY=x"])).severity, Severity::Notice);
        assert_eq!(mapper.map(&entry(&[b"PRIORITY=0"])).severity, Severity::Emergency);
        assert_eq!(mapper.map(&entry(&[b"PRIORITY=7"])).severity, Severity::Debug);
    }

    #[test]
    fn test_facility_one_and_two_digits() {
        let mapper = FieldMapper::new(Severity::Notice, Facility::User);

        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=3"])).facility, Facility::Daemon);
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=10"])).facility, Facility::Authpriv);
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=23"])).facility, Facility::Local7);
        // out of range
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=24"])).facility, Facility::User);
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=99"])).facility, Facility::User);
        // wrong width or not a number
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=100"])).facility, Facility::User);
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY="])).facility, Facility::User);
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_FACILITY=1a"])).facility, Facility::User);
    }

    #[test]
    fn test_tag_variants() {
        let mapper = FieldMapper::default();

        assert_eq!(mapper.map(&entry(&[b"SYSLOG_IDENTIFIER=sshd"])).tag, "sshd:");
        assert_eq!(mapper.map(&entry(&[b"SYSLOG_PID=42"])).tag, "journal[42]:");
        assert_eq!(
            mapper
                .map(&entry(&[b"SYSLOG_IDENTIFIER=cron", b"SYSLOG_PID=abc"]))
                .tag,
            "cron:"
        );
        assert_eq!(
            mapper
                .map(&entry(&[b"SYSLOG_IDENTIFIER=cron", b"SYSLOG_PID="]))
                .tag,
            "cron:"
        );
        assert_eq!(
            mapper
                .map(&entry(&[b"SYSLOG_IDENTIFIER=a\0b", b"SYSLOG_PID=7"]))
                .tag,
            "a b[7]:"
        );
    }

    #[test]
    fn test_message_nul_bytes_replaced() {
        let record = FieldMapper::default().map(&entry(&[b"MESSAGE=a\0b\0\0c"]));
        assert_eq!(record.message, "a b  c");
        assert_eq!(record.metadata.get("MESSAGE").unwrap(), "a b  c");
    }

    #[test]
    fn test_metadata_translates_trusted_fields() {
        let record = FieldMapper::default().map(&entry(&[
            b"_PID=812",
            b"_UID=0",
            b"_GID=0",
            b"_EXE=/usr/sbin/sshd",
            b"_COMM=sshd",
            b"_CMDLINE=sshd: root [priv]",
            b"_PIDFD=9",
            b"_CMD=x",
            b"_BOOT_ID=abc",
            b"CODE_FILE=main.c",
        ]));

        let md = &record.metadata;
        assert_eq!(md.get("pid").unwrap(), "812");
        assert_eq!(md.get("uid").unwrap(), "0");
        assert_eq!(md.get("gid").unwrap(), "0");
        assert_eq!(md.get("exe").unwrap(), "/usr/sbin/sshd");
        assert_eq!(md.get("appname").unwrap(), "sshd");
        assert_eq!(md.get("cmd").unwrap(), "sshd: root [priv]");
        assert_eq!(md.get("_PIDFD").unwrap(), "9");
        assert_eq!(md.get("_CMD").unwrap(), "x");
        assert_eq!(md.get("_BOOT_ID").unwrap(), "abc");
        assert_eq!(md.get("CODE_FILE").unwrap(), "main.c");
        assert_eq!(md.len(), 10);
    }

    #[test]
    fn test_value_may_contain_separator() {
        let record = FieldMapper::default().map(&entry(&[b"MESSAGE=a=b", b"KEY==x"]));
        assert_eq!(record.message, "a=b");
        assert_eq!(record.metadata.get("KEY").unwrap(), "=x");
    }

    #[test]
    fn test_duplicate_keys_later_wins() {
        let record = FieldMapper::default().map(&entry(&[b"TAG=first", b"TAG=second"]));
        assert_eq!(record.metadata.get("TAG").unwrap(), "second");
    }

    #[test]
    #[traced_test]
    fn test_malformed_field_skipped() {
        let record = FieldMapper::default().map(&entry(&[
            b"MESSAGE=still here",
            b"NOSEPARATOR",
            b"SYSLOG_IDENTIFIER=app",
            b"_COMM=app",
        ]));

        assert!(logs_contain("malformed field"));
        assert_eq!(record.message, "still here");
        assert_eq!(record.tag, "app:");
        assert_eq!(record.metadata.get("appname").unwrap(), "app");
        assert_eq!(record.metadata.get("SYSLOG_IDENTIFIER").unwrap(), "app");
        assert!(!record.metadata.contains_key("NOSEPARATOR"));
        assert_eq!(record.metadata.len(), 3);
    }

    #[test]
    fn test_translate_field_name() {
        assert_eq!(translate_field_name("_PID"), "pid");
        assert_eq!(translate_field_name("_COMM"), "appname");
        assert_eq!(translate_field_name("_CMDLINE"), "cmd");
        assert_eq!(translate_field_name("_CMDLINEX"), "_CMDLINEX");
        assert_eq!(translate_field_name("_C"), "_C");
        assert_eq!(translate_field_name("_"), "_");
        assert_eq!(translate_field_name("PID"), "PID");
        assert_eq!(translate_field_name(""), "");
    }

    proptest! {
        #[test]
        fn prop_map_is_total(fields in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..40), 0..12)) {
            let raw = RawEntry::new(fields.into_iter().map(Bytes::from).collect());
            let record = FieldMapper::default().map(&raw);
            prop_assert!(record.facility.code() <= 23);
            prop_assert!(record.severity.code() <= 7);
            prop_assert!(record.tag.ends_with(':'));
        }

        #[test]
        fn prop_known_fields_never_escape_range(priority in any::<u8>(), facility in 0u16..1000) {
            let raw = RawEntry::new(vec![
                Bytes::from(format!("PRIORITY={}", priority)),
                Bytes::from(format!("SYSLOG_FACILITY={}", facility)),
            ]);
            let record = FieldMapper::default().map(&raw);
            if priority <= 7 {
                prop_assert_eq!(record.severity.code(), priority);
            } else {
                prop_assert_eq!(record.severity, Severity::Notice);
            }
            if facility <= 23 {
                prop_assert_eq!(u16::from(record.facility.code()), facility);
            } else {
                prop_assert_eq!(record.facility, Facility::User);
            }
        }

        #[test]
        fn prop_sanitize_only_replaces_nul(value in prop::collection::vec(any::<u8>(), 0..256)) {
            let sanitized = sanitize_value(&value);
            prop_assert_eq!(sanitized.len(), value.len());
            for (before, after) in value.iter().zip(sanitized.iter()) {
                if *before == 0 {
                    prop_assert_eq!(*after, b' ');
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }

        #[test]
        fn prop_translate_is_deterministic(name in "_?[A-Z_]{0,12}") {
            let once = translate_field_name(&name);
            prop_assert_eq!(once, translate_field_name(&name));
            prop_assert_eq!(translate_field_name(once), translate_field_name(translate_field_name(once)));
        }
    }
}
