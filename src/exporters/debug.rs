// SPDX-License-Identifier: Apache-2.0

//! Writes received logs to the operator log

use crate::bounded_channel::BoundedReceiver;
use clap::ValueEnum;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use serde::Deserialize;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, event};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// One summary line per batch
    #[default]
    Basic,
    /// Every record with its attributes
    Detailed,
}

pub struct DebugExporter {
    rx: BoundedReceiver<ResourceLogs>,
    verbosity: Verbosity,
}

impl DebugExporter {
    pub fn new(rx: BoundedReceiver<ResourceLogs>, verbosity: Verbosity) -> Self {
        Self { rx, verbosity }
    }

    /// Runs until the channel closes or `cancel_token` fires. Logs still
    /// queued at cancellation are written before returning.
    pub async fn start(&mut self, cancel_token: CancellationToken) {
        loop {
            select! {
                m = self.rx.next() => match m {
                    Some(logs) => self.export(&logs),
                    None => break,
                },
                _ = cancel_token.cancelled() => {
                    while let Some(logs) = self.rx.try_recv() {
                        self.export(&logs);
                    }
                    break;
                }
            }
        }
        debug!("exiting debug exporter")
    }

    fn export(&self, logs: &ResourceLogs) {
        let records: usize = logs.scope_logs.iter().map(|s| s.log_records.len()).sum();
        match self.verbosity {
            Verbosity::Basic => event!(
                Level::INFO,
                data_type = "logs",
                logs = records,
                "Received logs."
            ),
            Verbosity::Detailed => {
                for line in format_log_records(logs) {
                    event!(Level::INFO, "{}", line);
                }
            }
        }
    }
}

pub(crate) fn value_to_string(v: Option<&AnyValue>) -> String {
    match v.and_then(|v| v.value.as_ref()) {
        Some(any_value::Value::StringValue(s)) => s.clone(),
        Some(any_value::Value::BoolValue(b)) => b.to_string(),
        Some(any_value::Value::IntValue(i)) => i.to_string(),
        Some(any_value::Value::DoubleValue(d)) => d.to_string(),
        Some(any_value::Value::BytesValue(b)) => format!("{:?}", b),
        Some(any_value::Value::ArrayValue(arr)) => {
            let elements: Vec<String> = arr
                .values
                .iter()
                .map(|v| value_to_string(Some(v)))
                .collect();
            format!("[{}]", elements.join(", "))
        }
        Some(any_value::Value::KvlistValue(kv_list)) => {
            format!("{{{}}}", attributes_to_string(&kv_list.values))
        }
        None => String::new(),
    }
}

fn attributes_to_string(attributes: &[KeyValue]) -> String {
    attributes
        .iter()
        .map(|kv| format!("{}={}", kv.key, value_to_string(kv.value.as_ref())))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One line per record: `<time> <severity> <tag> <body> [attributes]`
pub fn format_log_records(logs: &ResourceLogs) -> Vec<String> {
    let mut lines = Vec::new();
    for scope in &logs.scope_logs {
        for lr in &scope.log_records {
            let tag = lr
                .attributes
                .iter()
                .find(|kv| kv.key == "syslog.tag")
                .map(|kv| value_to_string(kv.value.as_ref()))
                .unwrap_or_default();
            let rest: Vec<KeyValue> = lr
                .attributes
                .iter()
                .filter(|kv| kv.key != "syslog.tag")
                .cloned()
                .collect();

            lines.push(format!(
                "{} {} {} {} [{}]",
                lr.time_unix_nano,
                lr.severity_text,
                tag,
                value_to_string(lr.body.as_ref()),
                attributes_to_string(&rest)
            ));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::bounded;
    use crate::receivers::journald::convert::convert_to_otlp_logs;
    use crate::receivers::journald::record::{
        Facility, NormalizedRecord, RealtimeTimestamp, Severity,
    };
    use std::collections::HashMap;
    use tracing_test::traced_test;

    fn logs(message: &str) -> ResourceLogs {
        let mut metadata = HashMap::new();
        metadata.insert("pid".to_string(), "7".to_string());
        convert_to_otlp_logs(vec![NormalizedRecord {
            message: message.to_string(),
            tag: "cron[7]:".to_string(),
            facility: Facility::Cron,
            severity: Severity::Info,
            timestamp: Some(RealtimeTimestamp {
                seconds: 3,
                microseconds: 0,
            }),
            metadata,
        }])
    }

    #[test]
    fn test_format_log_records() {
        let lines = format_log_records(&logs("job started"));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("3000000000 INFO cron[7]: job started ["));
        assert!(lines[0].contains("syslog.facility_name=cron"));
        assert!(lines[0].contains("journald.pid=7"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_drains_queue_on_cancel() {
        let (tx, rx) = bounded(4);
        tx.send(logs("one")).await.unwrap();
        tx.send(logs("two")).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut exporter = DebugExporter::new(rx, Verbosity::Detailed);
        exporter.start(cancel).await;

        assert!(logs_contain("cron[7]: one"));
        assert!(logs_contain("cron[7]: two"));
    }

    #[tokio::test]
    async fn test_exits_when_senders_drop() {
        let (tx, rx) = bounded::<ResourceLogs>(1);
        drop(tx);
        let mut exporter = DebugExporter::new(rx, Verbosity::Basic);
        exporter.start(CancellationToken::new()).await;
        assert!(exporter.rx.is_empty());
    }
}
