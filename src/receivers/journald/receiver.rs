// SPDX-License-Identifier: Apache-2.0

//! Journald receiver implementation
//!
//! A single task owns the journal source, the rate limiter and the state
//! file. It moves through the journal entry by entry, maps each entry to a
//! record, hands admitted records to the sink and records its position every
//! `persist_state_interval` entries.

use crate::receivers::get_meter;
use crate::receivers::journald::checkpoint::{CheckpointStore, ResumePosition, resume};
use crate::receivers::journald::config::JournaldReceiverConfig;
use crate::receivers::journald::error::{JournaldReceiverError, Result};
use crate::receivers::journald::mapper::FieldMapper;
use crate::receivers::journald::rate_limit::RateLimiter;
use crate::receivers::journald::sink::Sink;
use crate::receivers::journald::source::{Advance, JournalSource, Readiness};
use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Built, `run` not called yet
    Idle,
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Counters for one run of the receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Entries read from the journal
    pub processed: u64,
    /// Records accepted by the sink
    pub submitted: u64,
    /// Records dropped by the rate limiter
    pub rate_limited: u64,
    /// Records the sink failed to accept
    pub refused: u64,
    /// Successful state file writes
    pub checkpoints: u64,
}

/// Metrics counters for the journald receiver
struct ReceiverMetrics {
    accepted: Counter<u64>,
    refused: Counter<u64>,
    rate_limited: Counter<u64>,
    checkpoint_failures: Counter<u64>,
    tags: [KeyValue; 1],
}

impl ReceiverMetrics {
    fn new() -> Self {
        Self {
            accepted: get_meter()
                .u64_counter("journald_relay_receiver_accepted_log_records")
                .with_description(
                    "Number of log records successfully ingested and pushed into the pipeline.",
                )
                .with_unit("log_records")
                .build(),
            refused: get_meter()
                .u64_counter("journald_relay_receiver_refused_log_records")
                .with_description(
                    "Number of log records that could not be pushed into the pipeline.",
                )
                .with_unit("log_records")
                .build(),
            rate_limited: get_meter()
                .u64_counter("journald_relay_receiver_rate_limited_log_records")
                .with_description("Number of log records dropped by the rate limiter.")
                .with_unit("log_records")
                .build(),
            checkpoint_failures: get_meter()
                .u64_counter("journald_relay_receiver_checkpoint_failures")
                .with_description("Number of failed journal position writes.")
                .build(),
            tags: [KeyValue::new("receiver", "journald")],
        }
    }
}

pub struct JournaldReceiver<S, K> {
    config: JournaldReceiverConfig,
    source: S,
    sink: K,
    mapper: FieldMapper,
    limiter: RateLimiter,
    checkpoint: Option<CheckpointStore>,
    state: ReceiverState,
    stats: IngestStats,
    since_checkpoint: u32,
    metrics: ReceiverMetrics,
}

impl<S: JournalSource, K: Sink> JournaldReceiver<S, K> {
    pub fn new(config: JournaldReceiverConfig, source: S, sink: K) -> Result<Self> {
        config
            .validate()
            .map_err(JournaldReceiverError::Configuration)?;

        let checkpoint = config
            .state_file
            .as_ref()
            .map(|path| CheckpointStore::new(path, &config.work_dir));

        info!(
            state_file = ?checkpoint.as_ref().map(|c| c.path().to_path_buf()),
            persist_state_interval = config.persist_state_interval,
            ratelimit_interval_secs = config.ratelimit_interval.as_secs(),
            ratelimit_burst = config.ratelimit_burst,
            ignore_previous_messages = config.ignore_previous_messages,
            "Journald receiver initialized"
        );

        Ok(Self {
            mapper: FieldMapper::new(config.default_severity, config.default_facility),
            limiter: RateLimiter::new(config.ratelimit_interval, config.ratelimit_burst),
            checkpoint,
            config,
            source,
            sink,
            state: ReceiverState::Idle,
            stats: IngestStats::default(),
            since_checkpoint: 0,
            metrics: ReceiverMetrics::new(),
        })
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    fn set_state(&mut self, state: ReceiverState) {
        debug!(from = ?self.state, to = ?state, "Journald receiver state change");
        self.state = state;
    }

    /// Read the journal until `cancel` fires or the source fails.
    ///
    /// The position is written one last time before returning, also after a
    /// fatal source error, and the source is closed.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<IngestStats> {
        self.set_state(ReceiverState::Starting);

        if let Err(e) = self.start() {
            error!(error = %e, "Journald receiver failed to start");
            self.source.close();
            self.set_state(ReceiverState::Stopped);
            return Err(e);
        }

        self.set_state(ReceiverState::Running);
        let result = self.read_loop(cancel).await;

        self.set_state(ReceiverState::Draining);
        if let Err(e) = &result {
            error!(error = %e, "Journal read loop aborted");
        }
        if let Some(lost) = self.limiter.take_all_dropped() {
            warn!(lost, "{} messages lost due to rate-limiting", lost);
        }
        if self.checkpoint.is_some() {
            self.persist_position();
        }
        self.source.close();
        self.set_state(ReceiverState::Stopped);

        info!(
            processed = self.stats.processed,
            submitted = self.stats.submitted,
            rate_limited = self.stats.rate_limited,
            refused = self.stats.refused,
            checkpoints = self.stats.checkpoints,
            "Journald receiver stopped"
        );

        result.map(|_| self.stats)
    }

    fn start(&mut self) -> Result<()> {
        self.source.open()?;
        let position = resume(
            &mut self.source,
            self.checkpoint.as_ref(),
            self.config.ignore_previous_messages,
        )?;

        match &position {
            ResumePosition::Cursor(cursor) => debug!(cursor = %cursor, "Journal positioned"),
            ResumePosition::Tail => debug!("Journal positioned at its tail"),
            ResumePosition::Head => debug!("Journal positioned at its head"),
        }
        Ok(())
    }

    async fn read_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                debug!("Journald receiver cancelled");
                return Ok(());
            }

            match self.source.advance()? {
                Advance::Entry => self.process_entry().await?,
                Advance::NoEntry => match self.source.wait(cancel).await? {
                    Readiness::Ready => {}
                    Readiness::Interrupted => debug!("Journal wait interrupted"),
                    Readiness::Cancelled => {
                        debug!("Journald receiver cancelled while waiting");
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn process_entry(&mut self) -> Result<()> {
        let entry = self.source.entry()?;
        let record = self.mapper.map(&entry);
        self.stats.processed += 1;

        let admitted = self.limiter.admit();
        if let Some(lost) = self.limiter.take_dropped() {
            warn!(lost, "{} messages lost due to rate-limiting", lost);
        }

        if admitted {
            match self.sink.submit(record).await {
                Ok(()) => {
                    self.stats.submitted += 1;
                    self.metrics.accepted.add(1, &self.metrics.tags);
                }
                Err(e) => {
                    self.stats.refused += 1;
                    self.metrics.refused.add(1, &self.metrics.tags);
                    warn!(error = %e, "Failed to submit journal record");
                }
            }
        } else {
            self.stats.rate_limited += 1;
            self.metrics.rate_limited.add(1, &self.metrics.tags);
        }

        self.since_checkpoint += 1;
        if self.since_checkpoint >= self.config.persist_state_interval {
            self.since_checkpoint = 0;
            self.persist_position();
        }
        Ok(())
    }

    /// Write the current cursor. Failures are logged and otherwise ignored.
    fn persist_position(&mut self) {
        let Some(store) = &self.checkpoint else {
            return;
        };

        let result = self.source.cursor().and_then(|cursor| store.save(&cursor));
        match result {
            Ok(()) => {
                self.stats.checkpoints += 1;
                debug!(state_file = ?store.path(), "Journal position saved");
            }
            Err(e) => {
                self.metrics.checkpoint_failures.add(1, &self.metrics.tags);
                warn!(
                    state_file = ?store.path(),
                    error = %e,
                    "Failed to save journal position"
                );
            }
        }
    }
}
