// SPDX-License-Identifier: Apache-2.0

//! Decoder for the journal export format
//!
//! This is what `journalctl --output=export` writes. Entries are separated by
//! an empty line. A field is either a text line `NAME=value\n` or, when the
//! value holds control characters, a binary record:
//!
//! ```text
//! NAME\n<u64 little endian length><value bytes>\n
//! ```
//!
//! Fields whose name starts with `__` describe the entry's address in the
//! journal rather than its content. Only the cursor and realtime stamp are
//! kept from those.

use crate::receivers::journald::record::{RawEntry, RealtimeTimestamp};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::Decoder;
use tracing::warn;

/// Largest field value accepted from the stream
pub const MAX_FIELD_SIZE: usize = 16 * 1024 * 1024;

const CURSOR_FIELD: &[u8] = b"__CURSOR";
const REALTIME_FIELD: &[u8] = b"__REALTIME_TIMESTAMP";

/// One entry read from an export stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportEntry {
    pub cursor: Option<String>,
    pub realtime: Option<RealtimeTimestamp>,
    pub fields: Vec<Bytes>,
}

impl ExportEntry {
    pub fn to_raw_entry(&self) -> RawEntry {
        RawEntry::new(self.fields.clone()).with_realtime(self.realtime)
    }

    fn is_empty(&self) -> bool {
        self.cursor.is_none() && self.realtime.is_none() && self.fields.is_empty()
    }

    /// Add one field. A field that is well framed but unusable is dropped and
    /// the reason returned, the rest of the entry is kept.
    fn push(&mut self, name: &[u8], value: &[u8], line: Bytes) -> Option<&'static str> {
        if name.is_empty() {
            return Some("field with an empty name");
        }

        if !name.starts_with(b"__") {
            self.fields.push(line);
            return None;
        }

        if name == CURSOR_FIELD {
            match std::str::from_utf8(value) {
                Ok(cursor) => self.cursor = Some(cursor.to_string()),
                Err(_) => return Some("cursor is not valid UTF-8"),
            }
        } else if name == REALTIME_FIELD {
            match std::str::from_utf8(value)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
            {
                Some(usec) => self.realtime = Some(RealtimeTimestamp::from_micros(usec)),
                None => return Some("realtime timestamp is not a number"),
            }
        }
        None
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

// Entries are decoded again from the start while incomplete, so warnings
// wait until the entry is complete.
fn report_skipped(skipped: &mut Vec<(Bytes, &'static str)>) {
    for (field, reason) in skipped.drain(..) {
        warn!(
            field = %String::from_utf8_lossy(&field),
            reason,
            "Journal returned a malformed field, skipping it"
        );
    }
}

#[derive(Debug)]
pub struct ExportDecoder {
    max_field_size: usize,
}

impl ExportDecoder {
    pub fn new(max_field_size: usize) -> Self {
        Self { max_field_size }
    }
}

impl Default for ExportDecoder {
    fn default() -> Self {
        Self::new(MAX_FIELD_SIZE)
    }
}

impl Decoder for ExportDecoder {
    type Item = ExportEntry;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut entry = ExportEntry::default();
        let mut skipped: Vec<(Bytes, &'static str)> = Vec::new();
        let mut pos = 0;

        // Nothing is consumed until a whole entry is buffered
        loop {
            let Some(nl) = src[pos..].iter().position(|&b| b == b'\n').map(|i| pos + i) else {
                if src.len() - pos > self.max_field_size + 1024 {
                    return Err(invalid_data(format!(
                        "line exceeds maximum field size {}",
                        self.max_field_size
                    )));
                }
                return Ok(None);
            };

            let line = &src[pos..nl];

            if line.is_empty() {
                pos = nl + 1;
                report_skipped(&mut skipped);
                if entry.is_empty() {
                    // stray separator
                    src.advance(pos);
                    pos = 0;
                    continue;
                }
                src.advance(pos);
                return Ok(Some(entry));
            }

            if let Some(eq) = line.iter().position(|&b| b == b'=') {
                if line.len() - eq - 1 > self.max_field_size {
                    return Err(invalid_data(format!(
                        "field of {} bytes exceeds maximum {}",
                        line.len() - eq - 1,
                        self.max_field_size
                    )));
                }
                let field = Bytes::copy_from_slice(line);
                if let Some(reason) = entry.push(&line[..eq], &line[eq + 1..], field.clone()) {
                    skipped.push((field, reason));
                }
                pos = nl + 1;
                continue;
            }

            // binary field: NAME\n, le64 length, data, \n
            let header_end = nl + 1 + 8;
            if src.len() < header_end {
                return Ok(None);
            }
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&src[nl + 1..header_end]);
            let len = u64::from_le_bytes(len_bytes);
            if len > self.max_field_size as u64 {
                return Err(invalid_data(format!(
                    "binary field of {} bytes exceeds maximum {}",
                    len, self.max_field_size
                )));
            }

            let data_end = header_end + len as usize;
            if src.len() < data_end + 1 {
                return Ok(None);
            }
            if src[data_end] != b'\n' {
                return Err(invalid_data("binary field is not terminated by a newline"));
            }

            let name = &src[pos..nl];
            let value = &src[header_end..data_end];
            let mut field = BytesMut::with_capacity(name.len() + 1 + value.len());
            field.put_slice(name);
            field.put_u8(b'=');
            field.put_slice(value);
            let field = field.freeze();
            if let Some(reason) = entry.push(name, value, field.clone()) {
                skipped.push((field, reason));
            }
            pos = data_end + 1;
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(entry) = self.decode(buf)? {
            return Ok(Some(entry));
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            buf.clear();
            return Ok(None);
        }
        Err(invalid_data("journal export stream ended inside an entry"))
    }
}
