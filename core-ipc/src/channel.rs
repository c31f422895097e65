//! # Named Channels
//!
//! One directional event-bus channel backed by a named pipe (FIFO) in the
//! filesystem namespace. Channels are created lazily by whichever process
//! starts first, with permissive access so either side can open them
//! regardless of start order.
//!
//! Writes are best-effort: the write end is opened non-blocking, so a
//! missing reader never stalls the writing process.

use crate::error::{IpcError, Result};
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A single named channel identified by its FIFO path.
#[derive(Debug, Clone)]
pub struct Channel {
    path: PathBuf,
}

impl Channel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the FIFO if it does not exist yet.
    ///
    /// The pipe is created with mode 0o666 and re-chmodded afterwards so
    /// the process umask cannot restrict it: the scanner, coordinator, and
    /// visualizer run as different users on the appliance.
    pub fn ensure(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }

        let cpath =
            CString::new(self.path.as_os_str().as_bytes()).map_err(|_| IpcError::Create {
                path: self.path.clone(),
                source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
            })?;

        let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o666) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // Lost the creation race with a peer process.
            if err.raw_os_error() == Some(libc::EEXIST) {
                return Ok(());
            }
            return Err(IpcError::Create {
                path: self.path.clone(),
                source: err,
            });
        }

        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o666)).map_err(|source| {
            IpcError::Create {
                path: self.path.clone(),
                source,
            }
        })?;

        debug!(path = %self.path.display(), "created channel");
        Ok(())
    }

    /// Write one newline-terminated line, best-effort.
    ///
    /// Returns `Ok(false)` when no reader currently has the channel open
    /// (the line is dropped) and `Ok(true)` when the line was delivered to
    /// the pipe. Never blocks.
    pub fn write_line(&self, line: &str) -> Result<bool> {
        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path);

        let mut file = match file {
            Ok(f) => f,
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                debug!(path = %self.path.display(), "no reader on channel, dropping line");
                return Ok(false);
            }
            Err(source) => {
                return Err(IpcError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        match file.write_all(&buf) {
            Ok(()) => Ok(true),
            // Reader vanished or pipe full between open and write.
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(source) => Err(IpcError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Fixed filesystem locations of the three event-bus channels.
#[derive(Debug, Clone)]
pub struct ChannelPaths {
    /// Tag-id lines written by the scanner process.
    pub scan: PathBuf,
    /// Readiness tokens written by the playback coordinator.
    pub ready: PathBuf,
    /// `"<percent>,<message>"` lines written during reconciliation.
    pub progress: PathBuf,
}

impl Default for ChannelPaths {
    fn default() -> Self {
        Self {
            scan: PathBuf::from("/tmp/rfid_pipe"),
            ready: PathBuf::from("/tmp/audio_ready_pipe"),
            progress: PathBuf::from("/tmp/sync_progress_pipe"),
        }
    }
}
