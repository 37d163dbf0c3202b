// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::BoundedSender;
use crate::receivers::journald::convert::convert_to_otlp_logs;
use crate::receivers::journald::error::{JournaldReceiverError, Result};
use crate::receivers::journald::record::NormalizedRecord;
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;

/// Downstream consumer of records.
///
/// The read loop awaits each submission, so a sink that applies backpressure
/// slows ingestion down. Errors are treated as transient: the record is
/// counted as refused and the loop moves on.
pub trait Sink {
    #[allow(async_fn_in_trait)]
    async fn submit(&mut self, record: NormalizedRecord) -> Result<()>;
}

/// Forwards records as OTLP logs over a bounded channel.
#[derive(Clone)]
pub struct OtlpLogsSink {
    tx: BoundedSender<ResourceLogs>,
}

impl OtlpLogsSink {
    pub fn new(tx: BoundedSender<ResourceLogs>) -> Self {
        Self { tx }
    }
}

impl Sink for OtlpLogsSink {
    async fn submit(&mut self, record: NormalizedRecord) -> Result<()> {
        let logs = convert_to_otlp_logs(vec![record]);
        self.tx
            .send(logs)
            .await
            .map_err(|e| JournaldReceiverError::Sink(e.to_string()))
    }
}
