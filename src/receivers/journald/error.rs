// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournaldReceiverError {
    /// The journal could not be opened, advanced or polled. Ends the read loop.
    #[error("Journal source error: {context}: {source}")]
    Source {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Reading or writing the state file failed. Ingestion carries on.
    #[error("Checkpoint error on {path:?}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sink error: {0}")]
    Sink(String),
}

impl JournaldReceiverError {
    pub fn source_error(context: impl Into<String>, source: io::Error) -> Self {
        JournaldReceiverError::Source {
            context: context.into(),
            source,
        }
    }

    pub fn checkpoint_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        JournaldReceiverError::Checkpoint {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the ingestion loop.
    pub fn is_fatal(&self) -> bool {
        match self {
            JournaldReceiverError::Source { .. }
            | JournaldReceiverError::Configuration(_) => true,
            JournaldReceiverError::Checkpoint { .. }
            | JournaldReceiverError::InvalidCursor(_)
            | JournaldReceiverError::Sink(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, JournaldReceiverError>;
