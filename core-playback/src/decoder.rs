//! Decoder process management.
//!
//! The decoder is an external `mpg123` bound to a fixed ALSA device. Only
//! that device is ever used; there is no fallback to the system default
//! output. Arguments are passed as a structured vector, never through a
//! shell.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{PlaybackError, Result};

/// Seam between the coordinator and the concrete decoder binary. Tests
/// substitute launchers that spawn stand-in commands.
#[async_trait]
pub trait DecoderLauncher: Send + Sync {
    async fn spawn(&self, audio_path: &Path) -> Result<DecoderProcess>;
}

/// Launches `mpg123` against a fixed ALSA device.
///
/// Older mpg123 builds take the device as `-a <dev>`, newer ones as
/// `--device <dev>`; the alternate form is tried once when the primary
/// spawn fails.
pub struct Mpg123Launcher {
    device: String,
}

impl Mpg123Launcher {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    fn command(&self, device_flag: &str, audio_path: &Path) -> Command {
        let mut cmd = Command::new("mpg123");
        cmd.arg(device_flag)
            .arg(&self.device)
            .arg(audio_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DecoderLauncher for Mpg123Launcher {
    async fn spawn(&self, audio_path: &Path) -> Result<DecoderProcess> {
        match self.command("-a", audio_path).spawn() {
            Ok(child) => Ok(DecoderProcess::new(child)),
            Err(primary) => {
                warn!(error = %primary, "Primary decoder invocation failed, trying --device form");
                self.command("--device", audio_path)
                    .spawn()
                    .map(DecoderProcess::new)
                    .map_err(|source| PlaybackError::Spawn { source })
            }
        }
    }
}

/// A live decoder child. The owner must either `wait` it to completion or
/// `terminate` it; `kill_on_drop` is set as a last resort only.
pub struct DecoderProcess {
    child: Child,
}

impl DecoderProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }

    /// Wait for the decoder to exit on its own.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Stop the decoder and reap it before returning.
    ///
    /// Sends SIGTERM first so the decoder can release the audio device,
    /// waits up to `grace`, then escalates to SIGKILL. When this returns
    /// Ok the process is confirmed gone and the device is free.
    pub async fn terminate(mut self, grace: Duration) -> Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };

        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH means the child exited between id() and kill().
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(PlaybackError::Signal(err));
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                debug!(?status, "Decoder exited within the grace period");
                status.map_err(PlaybackError::Signal)?;
            }
            Err(_) => {
                warn!(pid, "Decoder ignored SIGTERM, escalating to SIGKILL");
                self.child.start_kill().map_err(PlaybackError::Signal)?;
                self.child.wait().await.map_err(PlaybackError::Signal)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn spawn_shell(script: &str) -> DecoderProcess {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        DecoderProcess::new(child)
    }

    #[tokio::test]
    async fn terminate_is_prompt_for_a_cooperative_process() {
        let process = spawn_shell("sleep 30");
        let start = Instant::now();
        process.terminate(Duration::from_secs(1)).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn terminate_escalates_when_sigterm_is_ignored() {
        let process = spawn_shell("trap '' TERM; sleep 30");
        let start = Instant::now();
        process.terminate(Duration::from_millis(200)).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn wait_observes_natural_exit() {
        let mut process = spawn_shell("exit 0");
        let status = process.wait().await.unwrap();
        assert!(status.success());
    }
}
