//! # Inter-Process Event Bus
//!
//! Three single-writer, ordered byte-stream channels connect the appliance
//! processes, each backed by a named pipe:
//!
//! - **scan channel**: newline-terminated tag ids, scanner → coordinator
//!   (the visualizer reads the same pipe independently)
//! - **ready channel**: fixed [`READY_TOKEN`] lines, coordinator → visualizer
//! - **progress channel**: `"<percent>,<message>"` lines, sync engine →
//!   visualizer
//!
//! There is no shared memory across process boundaries; these channels are
//! the whole protocol. Writers never block on absent readers
//! ([`Channel::write_line`]); readers run forever, reopening on EOF
//! ([`subscriber::subscribe`]).

pub mod channel;
pub mod error;
pub mod progress;
pub mod subscriber;

pub use channel::{Channel, ChannelPaths};
pub use error::{IpcError, Result};
pub use progress::{ProgressWriter, ReadyWriter, READY_TOKEN};
pub use subscriber::subscribe;

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;
    use std::time::Duration;

    fn fifo_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        dir.path().join(name)
    }

    #[test]
    fn ensure_creates_a_fifo() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Channel::new(fifo_path(&tmp, "scan"));
        channel.ensure().unwrap();

        let meta = std::fs::metadata(channel.path()).unwrap();
        assert!(meta.file_type().is_fifo());

        // Idempotent.
        channel.ensure().unwrap();
    }

    #[test]
    fn write_without_reader_is_dropped_not_blocked() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Channel::new(fifo_path(&tmp, "ready"));
        channel.ensure().unwrap();

        assert!(!channel.write_line(READY_TOKEN).unwrap());
    }

    #[tokio::test]
    async fn subscriber_survives_writer_close_and_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Channel::new(fifo_path(&tmp, "scan"));
        let mut rx = subscribe(channel.clone(), 16).unwrap();

        // Each delivery opens, writes, and closes the pipe, so the second
        // line only arrives if the subscriber reopens after EOF.
        for tag in ["1001", "1002"] {
            let channel = channel.clone();
            let tag = tag.to_string();
            let written = tag.clone();
            tokio::task::spawn_blocking(move || loop {
                if channel.write_line(&written).unwrap() {
                    return;
                }
                std::thread::sleep(Duration::from_millis(10));
            })
            .await
            .unwrap();

            let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("subscriber delivered nothing")
                .unwrap();
            assert_eq!(line, tag);
        }
    }

    #[tokio::test]
    async fn subscriber_trims_and_skips_blank_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = Channel::new(fifo_path(&tmp, "scan"));
        let mut rx = subscribe(channel.clone(), 16).unwrap();

        let writer = channel.clone();
        tokio::task::spawn_blocking(move || loop {
            if writer.write_line("  0008479619 \n\n").unwrap() {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        })
        .await
        .unwrap();

        let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, "0008479619");
    }
}
