// SPDX-License-Identifier: Apache-2.0

//! The journal as seen by the read loop
//!
//! [`JournalSource`] follows the sd_journal read model: a read pointer that
//! is moved with [`JournalSource::advance`], the fields of the entry under
//! the pointer, a cursor naming that entry, and seeks that reposition the
//! pointer. Sources are owned by exactly one read loop.

use crate::receivers::journald::error::{JournaldReceiverError, Result};
use crate::receivers::journald::record::{RawEntry, RealtimeTimestamp};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Longest cursor accepted from a state file
pub const MAX_CURSOR_LEN: usize = 1024;

/// Opaque journal position token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    /// Validate a cursor. Cursors are single tokens of printable text.
    pub fn parse(value: &str) -> Result<Self> {
        if value.is_empty() {
            return Err(JournaldReceiverError::InvalidCursor(
                "cursor is empty".to_string(),
            ));
        }
        if value.len() > MAX_CURSOR_LEN {
            return Err(JournaldReceiverError::InvalidCursor(format!(
                "cursor is {} bytes long, limit is {}",
                value.len(),
                MAX_CURSOR_LEN
            )));
        }
        if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(JournaldReceiverError::InvalidCursor(
                "cursor contains whitespace or control characters".to_string(),
            ));
        }
        Ok(Cursor(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of moving the read pointer forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Entry,
    NoEntry,
}

/// Outcome of waiting for new journal data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// New data may be available
    Ready,
    /// The wait was interrupted before anything happened
    Interrupted,
    /// The cancellation token fired
    Cancelled,
}

pub trait JournalSource {
    /// Acquire the underlying journal handle.
    fn open(&mut self) -> Result<()>;

    /// Move the read pointer to the next entry.
    fn advance(&mut self) -> Result<Advance>;

    /// All data fields of the current entry, with its realtime stamp.
    fn entry(&mut self) -> Result<RawEntry>;

    /// Wall-clock time of the current entry, if the journal recorded one.
    fn realtime(&mut self) -> Option<RealtimeTimestamp>;

    /// Cursor of the current entry.
    fn cursor(&mut self) -> Result<Cursor>;

    /// Position so that the next advance lands on the entry named by `cursor`.
    fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()>;

    /// Position after the newest entry.
    fn seek_to_tail(&mut self) -> Result<()>;

    /// Move the read pointer back by one entry.
    fn step_back(&mut self) -> Result<()>;

    /// Wait until the journal changes or `cancel` fires.
    #[allow(async_fn_in_trait)]
    async fn wait(&mut self, cancel: &CancellationToken) -> Result<Readiness>;

    /// Release the journal handle. Further calls are not expected.
    fn close(&mut self);
}

#[cfg(test)]
pub mod fake {
    //! In-memory journal with sd_journal positioning rules.

    use super::*;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::io;

    #[derive(Debug, Clone)]
    pub struct FakeEntry {
        pub cursor: String,
        pub fields: Vec<Bytes>,
        pub realtime: Option<RealtimeTimestamp>,
    }

    impl FakeEntry {
        pub fn new(cursor: &str, fields: &[&str]) -> Self {
            Self {
                cursor: cursor.to_string(),
                fields: fields
                    .iter()
                    .map(|f| Bytes::copy_from_slice(f.as_bytes()))
                    .collect(),
                realtime: None,
            }
        }

        pub fn with_realtime(mut self, usec: u64) -> Self {
            self.realtime = Some(RealtimeTimestamp::from_micros(usec));
            self
        }
    }

    /// What a call to `wait` does when no arrival is queued
    #[derive(Debug, Clone)]
    pub enum WaitStep {
        Interrupt,
        Fail,
        /// Fire the cancellation token, like a signal arriving mid-wait
        Shutdown,
    }

    #[derive(Debug, Default)]
    pub struct FakeJournal {
        entries: Vec<FakeEntry>,
        // entries appended one per wait(), simulating live writers
        arrivals: VecDeque<FakeEntry>,
        wait_steps: VecDeque<WaitStep>,
        next: usize,
        current: Option<usize>,
        pub opened: bool,
        pub closed: bool,
        pub fail_open: bool,
        pub fail_advance_after: Option<usize>,
        pub advances: usize,
        pub seeks: Vec<String>,
        pub waits: usize,
    }

    impl FakeJournal {
        pub fn new(entries: Vec<FakeEntry>) -> Self {
            Self {
                entries,
                ..Default::default()
            }
        }

        pub fn with_entries(count: usize) -> Self {
            Self::new(
                (0..count)
                    .map(|i| {
                        FakeEntry::new(&format!("s=fake;i={}", i), &[&format!("MESSAGE=entry {}", i)])
                    })
                    .collect(),
            )
        }

        pub fn queue_arrival(&mut self, entry: FakeEntry) {
            self.arrivals.push_back(entry);
        }

        pub fn queue_wait_step(&mut self, step: WaitStep) {
            self.wait_steps.push_back(step);
        }

        pub fn cursor_at(&self, index: usize) -> Cursor {
            Cursor(self.entries[index].cursor.clone())
        }

        pub fn current_index(&self) -> Option<usize> {
            self.current
        }

        fn current_entry(&self) -> Option<&FakeEntry> {
            self.current.and_then(|i| self.entries.get(i))
        }
    }

    impl JournalSource for FakeJournal {
        fn open(&mut self) -> Result<()> {
            if self.fail_open {
                return Err(JournaldReceiverError::source_error(
                    "sd_journal_open() failed",
                    io::Error::from_raw_os_error(libc::ENOENT),
                ));
            }
            self.opened = true;
            Ok(())
        }

        fn advance(&mut self) -> Result<Advance> {
            if self.fail_advance_after == Some(self.advances) {
                return Err(JournaldReceiverError::source_error(
                    "sd_journal_next() failed",
                    io::Error::from_raw_os_error(libc::EIO),
                ));
            }
            self.advances += 1;

            if self.next < self.entries.len() {
                self.current = Some(self.next);
                self.next += 1;
                Ok(Advance::Entry)
            } else {
                Ok(Advance::NoEntry)
            }
        }

        fn entry(&mut self) -> Result<RawEntry> {
            let entry = self.current_entry().ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "sd_journal_enumerate_data() failed",
                    io::Error::from_raw_os_error(libc::EADDRNOTAVAIL),
                )
            })?;
            Ok(RawEntry::new(entry.fields.clone()).with_realtime(entry.realtime))
        }

        fn realtime(&mut self) -> Option<RealtimeTimestamp> {
            self.current_entry().and_then(|e| e.realtime)
        }

        fn cursor(&mut self) -> Result<Cursor> {
            self.current_entry()
                .map(|e| Cursor(e.cursor.clone()))
                .ok_or_else(|| {
                    JournaldReceiverError::source_error(
                        "sd_journal_get_cursor() failed",
                        io::Error::from_raw_os_error(libc::EADDRNOTAVAIL),
                    )
                })
        }

        fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()> {
            self.seeks.push(format!("cursor:{}", cursor));
            let index = self
                .entries
                .iter()
                .position(|e| e.cursor == cursor.as_str())
                .ok_or_else(|| {
                    JournaldReceiverError::source_error(
                        "sd_journal_seek_cursor() failed",
                        io::Error::from_raw_os_error(libc::EINVAL),
                    )
                })?;
            self.next = index;
            self.current = None;
            Ok(())
        }

        fn seek_to_tail(&mut self) -> Result<()> {
            self.seeks.push("tail".to_string());
            self.next = self.entries.len();
            self.current = None;
            Ok(())
        }

        fn step_back(&mut self) -> Result<()> {
            self.seeks.push("back".to_string());
            match self.current {
                Some(c) if c > 0 => {
                    self.current = Some(c - 1);
                    self.next = c;
                }
                Some(_) => {}
                None if self.next > 0 => self.current = Some(self.next - 1),
                None => {}
            }
            Ok(())
        }

        async fn wait(&mut self, cancel: &CancellationToken) -> Result<Readiness> {
            self.waits += 1;
            if cancel.is_cancelled() {
                return Ok(Readiness::Cancelled);
            }
            if let Some(entry) = self.arrivals.pop_front() {
                self.entries.push(entry);
                return Ok(Readiness::Ready);
            }
            match self.wait_steps.pop_front() {
                Some(WaitStep::Interrupt) => Ok(Readiness::Interrupted),
                Some(WaitStep::Fail) => Err(JournaldReceiverError::source_error(
                    "sd_journal_wait() failed",
                    io::Error::from_raw_os_error(libc::EBADF),
                )),
                Some(WaitStep::Shutdown) => {
                    cancel.cancel();
                    Ok(Readiness::Cancelled)
                }
                None => {
                    cancel.cancelled().await;
                    Ok(Readiness::Cancelled)
                }
            }
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }
}
