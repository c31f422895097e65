//! Typed writers for the coordinator-owned output channels.

use crate::channel::Channel;
use crate::error::Result;

/// Fixed literal written to the ready channel on every idle transition.
pub const READY_TOKEN: &str = "READY";

/// Writes the readiness token consumed by the display process.
#[derive(Debug, Clone)]
pub struct ReadyWriter {
    channel: Channel,
}

impl ReadyWriter {
    /// Wrap the ready channel, creating the FIFO if needed.
    pub fn new(channel: Channel) -> Result<Self> {
        channel.ensure()?;
        Ok(Self { channel })
    }

    /// Signal that playback has returned to idle.
    ///
    /// Best-effort: returns `Ok(false)` when no consumer is listening.
    pub fn signal(&self) -> Result<bool> {
        self.channel.write_line(READY_TOKEN)
    }
}

/// Writes `"<percent>,<message>"` progress lines during reconciliation.
#[derive(Debug, Clone)]
pub struct ProgressWriter {
    channel: Channel,
}

impl ProgressWriter {
    /// Wrap the progress channel, creating the FIFO if needed.
    pub fn new(channel: Channel) -> Result<Self> {
        channel.ensure()?;
        Ok(Self { channel })
    }

    /// Emit one progress line. Best-effort like [`ReadyWriter::signal`].
    pub fn emit(&self, percent: u8, message: &str) -> Result<bool> {
        self.channel.write_line(&format!("{percent},{message}"))
    }
}
