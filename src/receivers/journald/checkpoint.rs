// SPDX-License-Identifier: Apache-2.0

//! Journal position persistence
//!
//! The state file holds one cursor and nothing else. It is read once at
//! startup to pick the resume position and rewritten every few entries and
//! on shutdown.

use crate::receivers::journald::error::{JournaldReceiverError, Result};
use crate::receivers::journald::source::{Cursor, JournalSource};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Relative `path`s are resolved against `work_dir`.
    pub fn new(path: impl AsRef<Path>, work_dir: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = if path.is_relative() {
            work_dir.as_ref().join(path)
        } else {
            path.to_path_buf()
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored cursor. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<Cursor>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(JournaldReceiverError::checkpoint_error(&self.path, e)),
        };

        // a trailing newline from an editor or an older writer is fine
        let token = content.split_whitespace().next().unwrap_or("");
        if token.len() != content.trim().len() {
            return Err(JournaldReceiverError::InvalidCursor(format!(
                "state file {:?} holds more than one token",
                self.path
            )));
        }

        Cursor::parse(token).map(Some)
    }

    /// Replace the stored cursor.
    ///
    /// The cursor is written to a sibling temp file that is renamed over the
    /// state file, so a failed write leaves the previous cursor in place.
    pub fn save(&self, cursor: &Cursor) -> Result<()> {
        self.write(cursor)
            .map_err(|e| JournaldReceiverError::checkpoint_error(&self.path, e))
    }

    fn write(&self, cursor: &Cursor) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self
            .path
            .with_extension(format!("tmp.{}", std::process::id()));

        let result = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(cursor.as_str().as_bytes())?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp_path, &self.path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }
}

/// Where reading starts after the resume policy ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePosition {
    /// Right after the entry named by the stored cursor
    Cursor(Cursor),
    /// After the newest entry present at startup
    Tail,
    /// The oldest entry the journal retains
    Head,
}

/// Position `source` for the first read.
///
/// A stored cursor wins over `ignore_previous`. A state file that cannot be
/// read or holds a malformed cursor is reported and the start policy is
/// applied instead. A readable cursor that the journal rejects is an error:
/// silently starting over could replay or skip the whole journal.
pub fn resume<S: JournalSource>(
    source: &mut S,
    store: Option<&CheckpointStore>,
    ignore_previous: bool,
) -> Result<ResumePosition> {
    let stored = match store.map(|s| (s, s.load())) {
        Some((_, Ok(cursor))) => cursor,
        Some((store, Err(e))) => {
            warn!(
                state_file = ?store.path(),
                error = %e,
                "Unable to load journal position, applying start policy"
            );
            None
        }
        None => None,
    };

    if let Some(cursor) = stored {
        source.seek_to_cursor(&cursor).map_err(|e| {
            JournaldReceiverError::Configuration(format!(
                "couldn't seek to cursor `{}`: {}",
                cursor, e
            ))
        })?;
        // land on the stored entry so the first read returns its successor
        source.advance()?;
        info!(cursor = %cursor, "Resuming journal after stored cursor");
        return Ok(ResumePosition::Cursor(cursor));
    }

    if ignore_previous {
        source.seek_to_tail()?;
        source.step_back()?;
        debug!("Skipping entries written before startup");
        return Ok(ResumePosition::Tail);
    }

    debug!("Reading journal from its oldest entry");
    Ok(ResumePosition::Head)
}
