// SPDX-License-Identifier: Apache-2.0

//! Convert journal records to OTLP log records

use crate::receivers::journald::record::NormalizedRecord;
use gethostname::gethostname;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use std::time::{SystemTime, UNIX_EPOCH};

// Log record attributes
pub const SYSLOG_TAG_KEY: &str = "syslog.tag";
pub const SYSLOG_FACILITY_KEY: &str = "syslog.facility";
pub const SYSLOG_FACILITY_NAME_KEY: &str = "syslog.facility_name";
pub const SYSLOG_SEVERITY_KEY: &str = "syslog.severity";
pub const SYSLOG_PRIORITY_KEY: &str = "syslog.priority";
pub const JOURNALD_FIELD_PREFIX: &str = "journald.";

// Resource attributes
const LOG_SOURCE_KEY: &str = "log.source";
pub const LOG_SOURCE_VALUE: &str = "journald";
const HOST_NAME_KEY: &str = "host.name";
const HOST_IP_KEY: &str = "host.ip";
const HOST_IP_VALUE: &str = "127.0.0.1";
const OS_TYPE_KEY: &str = "os.type";
const OS_TYPE_VALUE: &str = "linux";

fn string_kv(key: impl Into<String>, value: impl Into<String>) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.into())),
        }),
    }
}

fn int_kv(key: &str, value: i64) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::IntValue(value)),
        }),
    }
}

fn resource_attributes() -> Vec<KeyValue> {
    let mut attributes = vec![
        string_kv(LOG_SOURCE_KEY, LOG_SOURCE_VALUE),
        string_kv(OS_TYPE_KEY, OS_TYPE_VALUE),
        string_kv(HOST_IP_KEY, HOST_IP_VALUE),
    ];

    if let Ok(hostname) = gethostname().into_string() {
        attributes.push(string_kv(HOST_NAME_KEY, hostname));
    }

    attributes
}

/// Convert records to a single OTLP ResourceLogs.
pub fn convert_to_otlp_logs(records: Vec<NormalizedRecord>) -> ResourceLogs {
    let log_records = records.into_iter().map(convert_record_to_log_record).collect();

    ResourceLogs {
        resource: Some(Resource {
            attributes: resource_attributes(),
            dropped_attributes_count: 0,
            entity_refs: vec![],
        }),
        scope_logs: vec![ScopeLogs {
            scope: Some(InstrumentationScope {
                name: LOG_SOURCE_VALUE.to_string(),
                version: String::new(),
                attributes: vec![],
                dropped_attributes_count: 0,
            }),
            log_records,
            schema_url: String::new(),
        }],
        schema_url: String::new(),
    }
}

/// Records without a journal timestamp are stamped with the observed time.
pub fn convert_record_to_log_record(record: NormalizedRecord) -> LogRecord {
    let observed_time_unix_nano = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let time_unix_nano = record
        .timestamp
        .map(|ts| ts.as_unix_nanos())
        .unwrap_or(observed_time_unix_nano);

    let mut attributes = Vec::with_capacity(5 + record.metadata.len());
    attributes.push(string_kv(SYSLOG_TAG_KEY, record.tag.clone()));
    attributes.push(int_kv(SYSLOG_FACILITY_KEY, i64::from(record.facility.code())));
    attributes.push(string_kv(SYSLOG_FACILITY_NAME_KEY, record.facility.as_str()));
    attributes.push(int_kv(SYSLOG_SEVERITY_KEY, i64::from(record.severity.code())));
    attributes.push(int_kv(SYSLOG_PRIORITY_KEY, i64::from(record.priority())));

    let mut metadata: Vec<_> = record.metadata.into_iter().collect();
    metadata.sort_by(|a, b| a.0.cmp(&b.0));
    attributes.extend(
        metadata
            .into_iter()
            .map(|(k, v)| string_kv(format!("{}{}", JOURNALD_FIELD_PREFIX, k), v)),
    );

    LogRecord {
        time_unix_nano,
        observed_time_unix_nano,
        severity_number: record.severity.to_otel_severity_number(),
        severity_text: record.severity.as_str().to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(record.message)),
        }),
        attributes,
        dropped_attributes_count: 0,
        flags: 0,
        trace_id: vec![],
        span_id: vec![],
        event_name: String::new(),
    }
}
