//! # Restartable Subscriber
//!
//! Blocking read loop over a named channel, running on a dedicated OS
//! thread (FIFO opens block until a writer appears, which would starve an
//! async worker pool). Lines are forwarded into a tokio mpsc channel.
//!
//! Reaching end-of-stream is not terminal: when the writer closes its end
//! the subscriber reopens the channel and keeps waiting. Open and read
//! errors are retried with bounded backoff; the loop only exits when the
//! receiving side is dropped.

use crate::channel::Channel;
use crate::error::Result;
use std::io::{BufRead, BufReader};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Spawn the blocking read loop for `channel`, creating the FIFO if needed.
///
/// Returns the receiving end of the line stream. Empty lines are dropped
/// and surrounding whitespace is trimmed (scanner lines arrive
/// newline-terminated). Dropping the receiver stops the thread after its
/// next wakeup.
///
/// # Errors
///
/// Only channel creation can fail; callers treat that as fatal at startup.
pub fn subscribe(channel: Channel, buffer: usize) -> Result<mpsc::Receiver<String>> {
    channel.ensure()?;

    let (tx, rx) = mpsc::channel(buffer);
    let path = channel.path().to_path_buf();
    let name = format!(
        "ipc-sub-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "channel".to_string())
    );

    std::thread::Builder::new()
        .name(name)
        .spawn(move || read_loop(channel, tx))
        .map_err(|source| crate::error::IpcError::Create { path, source })?;

    Ok(rx)
}

fn read_loop(channel: Channel, tx: mpsc::Sender<String>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if tx.is_closed() {
            return;
        }

        // Blocks until a writer opens the other end.
        let file = match std::fs::File::open(channel.path()) {
            Ok(f) => {
                backoff = INITIAL_BACKOFF;
                f
            }
            Err(e) => {
                warn!(path = %channel.path().display(), error = %e, "channel open failed, retrying");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for line in BufReader::new(file).lines() {
            match line {
                Ok(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if tx.blocking_send(trimmed.to_string()).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(path = %channel.path().display(), error = %e, "channel read failed");
                    break;
                }
            }
        }

        // Writer closed its end; reopen and keep waiting.
        debug!(path = %channel.path().display(), "channel reached EOF, reopening");
    }
}
