// SPDX-License-Identifier: Apache-2.0

//! Journal source backed by a `journalctl --follow --output=export` child
//!
//! The child is started on first use so that seeks performed by the resume
//! policy decide its command line. Any seek afterwards restarts it.

use crate::receivers::journald::error::{JournaldReceiverError, Result};
use crate::receivers::journald::export::{ExportDecoder, ExportEntry};
use crate::receivers::journald::record::{RawEntry, RealtimeTimestamp};
use crate::receivers::journald::source::{Advance, Cursor, JournalSource, Readiness};
use futures::{FutureExt, StreamExt};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, ChildStdout, Command};
use tokio::select;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on frames pulled from the pipe by a single advance
const MAX_READY_FRAMES: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum StartAt {
    Head,
    Tail,
    AfterCursor(Cursor),
}

pub struct JournalctlSource {
    journalctl_path: PathBuf,
    directory: Option<PathBuf>,
    start_at: StartAt,
    opened: bool,
    child: Option<Child>,
    reader: Option<FramedRead<ChildStdout, ExportDecoder>>,
    pending: VecDeque<ExportEntry>,
    current: Option<ExportEntry>,
    // entry named by a seek cursor, reported by the next advance
    landing: Option<Cursor>,
    // stream failure seen while entries were still pending
    failed: Option<JournaldReceiverError>,
}

impl JournalctlSource {
    pub fn new(journalctl_path: impl Into<PathBuf>, directory: Option<PathBuf>) -> Self {
        Self {
            journalctl_path: journalctl_path.into(),
            directory,
            start_at: StartAt::Head,
            opened: false,
            child: None,
            reader: None,
            pending: VecDeque::new(),
            current: None,
            landing: None,
            failed: None,
        }
    }

    fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--output=export".into(),
            "--follow".into(),
            "--no-pager".into(),
            "--quiet".into(),
        ];

        match &self.start_at {
            StartAt::Head => args.push("--no-tail".into()),
            StartAt::Tail => args.push("--lines=0".into()),
            StartAt::AfterCursor(cursor) => {
                args.push("--no-tail".into());
                args.push(format!("--after-cursor={}", cursor).into());
            }
        }

        if let Some(dir) = &self.directory {
            let mut arg = OsString::from("--directory=");
            arg.push(dir);
            args.push(arg);
        }

        args
    }

    fn ensure_running(&mut self) -> Result<()> {
        if !self.opened {
            return Err(JournaldReceiverError::source_error(
                "journal is not open",
                io::Error::from(io::ErrorKind::NotConnected),
            ));
        }
        if self.reader.is_some() {
            return Ok(());
        }

        let args = self.args();
        debug!(journalctl = ?self.journalctl_path, args = ?args, "Starting journalctl");

        let mut child = Command::new(&self.journalctl_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JournaldReceiverError::source_error(
                    format!("failed to spawn {:?}", self.journalctl_path),
                    e,
                )
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            JournaldReceiverError::source_error(
                "journalctl stdout unavailable",
                io::Error::from(io::ErrorKind::BrokenPipe),
            )
        })?;

        self.reader = Some(FramedRead::new(stdout, ExportDecoder::default()));
        self.child = Some(child);
        Ok(())
    }

    fn stop_child(&mut self) {
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Unable to signal journalctl");
            }
        }
    }

    fn reposition(&mut self, start_at: StartAt) {
        self.stop_child();
        self.pending.clear();
        self.current = None;
        self.landing = None;
        self.failed = None;
        self.start_at = start_at;
    }

    fn exited_error(&mut self) -> JournaldReceiverError {
        let status = self
            .child
            .as_mut()
            .and_then(|c| c.try_wait().ok().flatten())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "still running".to_string());
        JournaldReceiverError::source_error(
            format!("journalctl closed its output ({})", status),
            io::Error::from(io::ErrorKind::UnexpectedEof),
        )
    }

    fn on_frame(&mut self, frame: Option<io::Result<ExportEntry>>) -> Result<()> {
        match frame {
            Some(Ok(entry)) => {
                self.pending.push_back(entry);
                Ok(())
            }
            Some(Err(e)) => Err(JournaldReceiverError::source_error(
                "malformed journal export stream",
                e,
            )),
            None => Err(self.exited_error()),
        }
    }

    /// Move frames that are already buffered in the pipe into `pending`.
    fn fill_pending(&mut self) -> Result<()> {
        for _ in 0..MAX_READY_FRAMES {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(());
            };
            let Some(frame) = reader.next().now_or_never() else {
                break;
            };
            if let Err(e) = self.on_frame(frame) {
                if self.pending.is_empty() {
                    return Err(e);
                }
                self.failed = Some(e);
                break;
            }
        }
        Ok(())
    }
}

impl JournalSource for JournalctlSource {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        info!(
            journalctl = ?self.journalctl_path,
            directory = ?self.directory,
            "Journal opened through journalctl"
        );
        Ok(())
    }

    fn advance(&mut self) -> Result<Advance> {
        if let Some(cursor) = self.landing.take() {
            // journalctl starts after the cursor, the entry itself is not streamed
            self.current = Some(ExportEntry {
                cursor: Some(cursor.to_string()),
                ..Default::default()
            });
            return Ok(Advance::Entry);
        }

        if self.pending.is_empty() {
            if let Some(e) = self.failed.take() {
                return Err(e);
            }
            self.ensure_running()?;
            self.fill_pending()?;
        }

        match self.pending.pop_front() {
            Some(entry) => {
                self.current = Some(entry);
                Ok(Advance::Entry)
            }
            None => Ok(Advance::NoEntry),
        }
    }

    fn entry(&mut self) -> Result<RawEntry> {
        self.current
            .as_ref()
            .map(ExportEntry::to_raw_entry)
            .ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "no current journal entry",
                    io::Error::from(io::ErrorKind::NotFound),
                )
            })
    }

    fn realtime(&mut self) -> Option<RealtimeTimestamp> {
        self.current.as_ref().and_then(|e| e.realtime)
    }

    fn cursor(&mut self) -> Result<Cursor> {
        let cursor = self
            .current
            .as_ref()
            .and_then(|e| e.cursor.as_deref())
            .ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "current entry has no cursor",
                    io::Error::from(io::ErrorKind::NotFound),
                )
            })?;
        Cursor::parse(cursor)
    }

    fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()> {
        self.reposition(StartAt::AfterCursor(cursor.clone()));
        self.landing = Some(cursor.clone());
        Ok(())
    }

    fn seek_to_tail(&mut self) -> Result<()> {
        self.reposition(StartAt::Tail);
        Ok(())
    }

    fn step_back(&mut self) -> Result<()> {
        match self.start_at {
            // --lines=0 already starts right after the newest entry
            StartAt::Tail if self.current.is_none() => Ok(()),
            _ => Err(JournaldReceiverError::source_error(
                "journalctl cannot step back",
                io::Error::from(io::ErrorKind::Unsupported),
            )),
        }
    }

    async fn wait(&mut self, cancel: &CancellationToken) -> Result<Readiness> {
        if self.landing.is_some() || !self.pending.is_empty() || self.failed.is_some() {
            return Ok(Readiness::Ready);
        }
        self.ensure_running()?;

        let Some(reader) = self.reader.as_mut() else {
            return Ok(Readiness::Interrupted);
        };

        let frame = select! {
            _ = cancel.cancelled() => return Ok(Readiness::Cancelled),
            frame = reader.next() => frame,
        };

        self.on_frame(frame)?;
        Ok(Readiness::Ready)
    }

    fn close(&mut self) {
        if self.child.is_some() {
            debug!("Stopping journalctl");
        }
        self.stop_child();
        if !self.pending.is_empty() {
            warn!(
                entries = self.pending.len(),
                "Discarding journal entries read past the last checkpoint"
            );
        }
        self.pending.clear();
        self.opened = false;
    }
}

impl Drop for JournalctlSource {
    fn drop(&mut self) {
        self.stop_child();
    }
}
