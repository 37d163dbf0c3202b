// SPDX-License-Identifier: Apache-2.0

//! Journal source reading through libsystemd
//!
//! Only built with the `sd_journal` feature, which links against
//! `libsystemd`. The return code helper is always available.

use std::io;
use std::os::raw::c_int;

/// Convert an `sd_journal_*` return code.
///
/// libsystemd reports failures as negative errno values. Success is any
/// non-negative value: depending on the systemd version some calls return
/// `0` and others `1` (or a count), so a check for one fixed value would
/// misread success as failure.
pub fn sd_check(ret: c_int) -> io::Result<c_int> {
    if ret < 0 {
        Err(io::Error::from_raw_os_error(-ret))
    } else {
        Ok(ret)
    }
}

#[cfg(feature = "sd_journal")]
pub use imp::SdJournalSource;

#[cfg(feature = "sd_journal")]
mod ffi {
    use std::os::raw::{c_char, c_int, c_void};

    #[repr(C)]
    pub struct SdJournal {
        _private: [u8; 0],
    }

    pub const SD_JOURNAL_LOCAL_ONLY: c_int = 1;

    #[link(name = "systemd")]
    unsafe extern "C" {
        pub fn sd_journal_open(ret: *mut *mut SdJournal, flags: c_int) -> c_int;
        pub fn sd_journal_open_directory(
            ret: *mut *mut SdJournal,
            path: *const c_char,
            flags: c_int,
        ) -> c_int;
        pub fn sd_journal_close(j: *mut SdJournal);
        pub fn sd_journal_next(j: *mut SdJournal) -> c_int;
        pub fn sd_journal_previous(j: *mut SdJournal) -> c_int;
        pub fn sd_journal_seek_tail(j: *mut SdJournal) -> c_int;
        pub fn sd_journal_seek_cursor(j: *mut SdJournal, cursor: *const c_char) -> c_int;
        pub fn sd_journal_get_cursor(j: *mut SdJournal, cursor: *mut *mut c_char) -> c_int;
        pub fn sd_journal_get_realtime_usec(j: *mut SdJournal, ret: *mut u64) -> c_int;
        pub fn sd_journal_restart_data(j: *mut SdJournal);
        pub fn sd_journal_enumerate_data(
            j: *mut SdJournal,
            data: *mut *const c_void,
            length: *mut usize,
        ) -> c_int;
        pub fn sd_journal_get_fd(j: *mut SdJournal) -> c_int;
        pub fn sd_journal_process(j: *mut SdJournal) -> c_int;
    }
}

#[cfg(feature = "sd_journal")]
mod imp {
    use super::{ffi, sd_check};
    use crate::receivers::journald::error::{JournaldReceiverError, Result};
    use crate::receivers::journald::record::{RawEntry, RealtimeTimestamp};
    use crate::receivers::journald::source::{Advance, Cursor, JournalSource, Readiness};
    use bytes::Bytes;
    use std::ffi::{CStr, CString};
    use std::io;
    use std::os::raw::{c_char, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::path::PathBuf;
    use std::ptr::{self, NonNull};
    use tokio::io::Interest;
    use tokio::io::unix::AsyncFd;
    use tokio::select;
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, info, warn};

    struct Handle(NonNull<ffi::SdJournal>);

    // SAFETY: an sd_journal handle may move between threads as long as it is
    // never used from two threads at once. The handle is owned by a single
    // source which is driven by a single task.
    unsafe impl Send for Handle {}

    /// Inotify descriptor owned by the journal handle, never closed here
    struct JournalFd(RawFd);

    impl AsRawFd for JournalFd {
        fn as_raw_fd(&self) -> RawFd {
            self.0
        }
    }

    pub struct SdJournalSource {
        directory: Option<PathBuf>,
        handle: Option<Handle>,
        notify: Option<AsyncFd<JournalFd>>,
    }

    impl SdJournalSource {
        pub fn new(directory: Option<PathBuf>) -> Self {
            Self {
                directory,
                handle: None,
                notify: None,
            }
        }

        fn journal(&self) -> Result<*mut ffi::SdJournal> {
            self.handle.as_ref().map(|h| h.0.as_ptr()).ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "journal is not open",
                    io::Error::from(io::ErrorKind::NotConnected),
                )
            })
        }

        fn call(&self, what: &str, f: impl FnOnce(*mut ffi::SdJournal) -> i32) -> Result<i32> {
            let j = self.journal()?;
            sd_check(f(j)).map_err(|e| JournaldReceiverError::source_error(what, e))
        }
    }

    impl JournalSource for SdJournalSource {
        fn open(&mut self) -> Result<()> {
            let mut j: *mut ffi::SdJournal = ptr::null_mut();
            let ret = match &self.directory {
                Some(dir) => {
                    let path = CString::new(dir.as_os_str().as_bytes()).map_err(|_| {
                        JournaldReceiverError::Configuration(format!(
                            "journal directory {:?} contains a NUL byte",
                            dir
                        ))
                    })?;
                    unsafe { ffi::sd_journal_open_directory(&mut j, path.as_ptr(), 0) }
                }
                None => unsafe { ffi::sd_journal_open(&mut j, ffi::SD_JOURNAL_LOCAL_ONLY) },
            };
            sd_check(ret)
                .map_err(|e| JournaldReceiverError::source_error("sd_journal_open() failed", e))?;

            let handle = NonNull::new(j).map(Handle).ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "sd_journal_open() returned no handle",
                    io::Error::from(io::ErrorKind::InvalidData),
                )
            })?;
            self.handle = Some(handle);

            let fd = self.call("sd_journal_get_fd() failed", |j| unsafe {
                ffi::sd_journal_get_fd(j)
            })?;
            let notify = AsyncFd::with_interest(JournalFd(fd), Interest::READABLE).map_err(|e| {
                JournaldReceiverError::source_error("failed to register journal fd", e)
            })?;
            self.notify = Some(notify);

            info!(directory = ?self.directory, "Journal opened through libsystemd");
            Ok(())
        }

        fn advance(&mut self) -> Result<Advance> {
            let ret = self.call("sd_journal_next() failed", |j| unsafe {
                ffi::sd_journal_next(j)
            })?;
            Ok(if ret > 0 {
                Advance::Entry
            } else {
                Advance::NoEntry
            })
        }

        fn entry(&mut self) -> Result<RawEntry> {
            let j = self.journal()?;
            let mut fields = Vec::new();

            unsafe { ffi::sd_journal_restart_data(j) };
            loop {
                let mut data: *const c_void = ptr::null();
                let mut length: usize = 0;
                let ret = unsafe { ffi::sd_journal_enumerate_data(j, &mut data, &mut length) };
                match sd_check(ret) {
                    Ok(0) => break,
                    Ok(_) if data.is_null() => break,
                    Ok(_) => {
                        // SAFETY: the journal guarantees `length` readable bytes at `data`
                        // until the next call on this handle; they are copied right away.
                        let slice = unsafe { std::slice::from_raw_parts(data as *const u8, length) };
                        fields.push(Bytes::copy_from_slice(slice));
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read journal entry fields, skipping the rest");
                        break;
                    }
                }
            }

            Ok(RawEntry::new(fields).with_realtime(self.realtime()))
        }

        fn realtime(&mut self) -> Option<RealtimeTimestamp> {
            let mut usec: u64 = 0;
            self.call("sd_journal_get_realtime_usec() failed", |j| unsafe {
                ffi::sd_journal_get_realtime_usec(j, &mut usec)
            })
            .ok()
            .map(|_| RealtimeTimestamp::from_micros(usec))
        }

        fn cursor(&mut self) -> Result<Cursor> {
            let mut raw: *mut c_char = ptr::null_mut();
            self.call("sd_journal_get_cursor() failed", |j| unsafe {
                ffi::sd_journal_get_cursor(j, &mut raw)
            })?;
            if raw.is_null() {
                return Err(JournaldReceiverError::InvalidCursor(
                    "journal returned no cursor".to_string(),
                ));
            }

            // SAFETY: on success `raw` is a NUL-terminated string allocated with malloc
            let value = unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned();
            unsafe { libc::free(raw as *mut c_void) };
            Cursor::parse(&value)
        }

        fn seek_to_cursor(&mut self, cursor: &Cursor) -> Result<()> {
            let value = CString::new(cursor.as_str())
                .map_err(|_| JournaldReceiverError::InvalidCursor(cursor.to_string()))?;
            self.call("sd_journal_seek_cursor() failed", |j| unsafe {
                ffi::sd_journal_seek_cursor(j, value.as_ptr())
            })?;
            Ok(())
        }

        fn seek_to_tail(&mut self) -> Result<()> {
            self.call("sd_journal_seek_tail() failed", |j| unsafe {
                ffi::sd_journal_seek_tail(j)
            })?;
            Ok(())
        }

        fn step_back(&mut self) -> Result<()> {
            self.call("sd_journal_previous() failed", |j| unsafe {
                ffi::sd_journal_previous(j)
            })?;
            Ok(())
        }

        async fn wait(&mut self, cancel: &CancellationToken) -> Result<Readiness> {
            let notify = self.notify.as_ref().ok_or_else(|| {
                JournaldReceiverError::source_error(
                    "journal fd is not registered",
                    io::Error::from(io::ErrorKind::NotConnected),
                )
            })?;

            select! {
                _ = cancel.cancelled() => Ok(Readiness::Cancelled),
                guard = notify.readable() => {
                    let mut guard = guard
                        .map_err(|e| JournaldReceiverError::source_error("poll() failed", e))?;
                    let ret = unsafe { ffi::sd_journal_process(self.journal()?) };
                    guard.clear_ready();
                    match sd_check(ret) {
                        Ok(_) => Ok(Readiness::Ready),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                            Ok(Readiness::Interrupted)
                        }
                        Err(e) => Err(JournaldReceiverError::source_error(
                            "sd_journal_process() failed",
                            e,
                        )),
                    }
                }
            }
        }

        fn close(&mut self) {
            self.notify = None;
            if let Some(handle) = self.handle.take() {
                debug!("Closing journal");
                unsafe { ffi::sd_journal_close(handle.0.as_ptr()) };
            }
        }
    }

    impl Drop for SdJournalSource {
        fn drop(&mut self) {
            self.close();
        }
    }
}
