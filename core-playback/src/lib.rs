//! # Playback Coordination
//!
//! Turns scanned tag ids into decoder processes. One coordinator task owns
//! the decoder slot: a scan resolves against the library index, spawns
//! mpg123 on the configured ALSA device, and any newer scan preempts the
//! running decoder after confirming it has released the device.

pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod state;

pub use coordinator::{CoordinatorConfig, PlaybackCoordinator};
pub use decoder::{DecoderLauncher, DecoderProcess, Mpg123Launcher};
pub use error::{PlaybackError, Result};
pub use state::{PlaybackJob, PlaybackState, ReadinessEvent};
