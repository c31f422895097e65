//! Playback coordination.
//!
//! A single task owns the playback state and the only live decoder
//! process, so device exclusivity falls out of the ownership model rather
//! than a lock. Scan lines arrive over a channel; newer scans preempt
//! whatever is playing, and bursts collapse to the newest scan.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use core_ipc::ReadyWriter;
use core_library::{LibraryIndex, TagId};
use core_sync::SyncEngine;

use crate::decoder::{DecoderLauncher, DecoderProcess};
use crate::state::{PlaybackJob, PlaybackState, ReadinessEvent};

const EVENT_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a preempted decoder gets to exit after SIGTERM before it
    /// is killed.
    pub termination_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            termination_grace: Duration::from_secs(1),
        }
    }
}

/// Resolves scans against the library and supervises the decoder.
pub struct PlaybackCoordinator {
    library: Arc<LibraryIndex>,
    sync: Arc<SyncEngine>,
    launcher: Arc<dyn DecoderLauncher>,
    ready: Option<ReadyWriter>,
    events: broadcast::Sender<ReadinessEvent>,
    state: watch::Sender<PlaybackState>,
    config: CoordinatorConfig,
}

impl PlaybackCoordinator {
    pub fn new(
        library: Arc<LibraryIndex>,
        sync: Arc<SyncEngine>,
        launcher: Arc<dyn DecoderLauncher>,
        ready: Option<ReadyWriter>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            library,
            sync,
            launcher,
            ready,
            events,
            state,
            config,
        }
    }

    /// Subscribe to readiness events. Mirrors what the ready channel
    /// carries, with the cause attached.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ReadinessEvent> {
        self.events.subscribe()
    }

    /// Observe coordinator state transitions.
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.send_replace(state);
    }

    fn emit(&self, event: ReadinessEvent) {
        debug!(?event, "Playback slot freed");
        if let Some(ready) = &self.ready {
            if let Err(e) = ready.signal() {
                warn!(error = %e, "Ready channel write failed");
            }
        }
        let _ = self.events.send(event);
    }

    /// Drive playback until the scan channel closes or shutdown fires.
    pub async fn run(self, mut scan_rx: mpsc::Receiver<String>, shutdown: CancellationToken) {
        let mut current: Option<(PlaybackJob, DecoderProcess)> = None;

        loop {
            match current.take() {
                Some((job, mut process)) => {
                    tokio::select! {
                        status = process.wait() => {
                            match status {
                                Ok(status) => {
                                    debug!(tag = %job.tag_id, %status, "Decoder finished");
                                }
                                Err(e) => {
                                    warn!(tag = %job.tag_id, error = %e, "Decoder wait failed");
                                }
                            }
                            self.set_state(PlaybackState::Idle);
                            self.emit(ReadinessEvent::NaturalFinish(job.tag_id));
                        }
                        line = scan_rx.recv() => {
                            let preempted = job.tag_id.clone();
                            self.set_state(PlaybackState::Preempting(preempted.clone()));
                            if let Err(e) = process.terminate(self.config.termination_grace).await {
                                warn!(tag = %preempted, error = %e, "Failed to stop preempted decoder");
                            }
                            let Some(line) = line else { break };
                            self.emit(ReadinessEvent::Preempted(preempted));
                            let latest = Self::drain_to_latest(&mut scan_rx, line);
                            current = self.handle_scan(&latest).await;
                        }
                        _ = shutdown.cancelled() => {
                            if let Err(e) = process.terminate(self.config.termination_grace).await {
                                warn!(tag = %job.tag_id, error = %e, "Failed to stop decoder on shutdown");
                            }
                            break;
                        }
                    }
                }
                None => {
                    tokio::select! {
                        line = scan_rx.recv() => {
                            let Some(line) = line else { break };
                            let latest = Self::drain_to_latest(&mut scan_rx, line);
                            current = self.handle_scan(&latest).await;
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        self.set_state(PlaybackState::Idle);
        info!("Playback coordinator stopped");
    }

    /// Collapse a burst of queued scans to the newest one.
    fn drain_to_latest(scan_rx: &mut mpsc::Receiver<String>, first: String) -> String {
        let mut latest = first;
        while let Ok(next) = scan_rx.try_recv() {
            debug!(superseded = %latest, "Scan superseded by a newer one");
            latest = next;
        }
        latest
    }

    /// Resolve one scan line and, when it resolves, start the decoder.
    #[instrument(skip(self))]
    async fn handle_scan(&self, raw: &str) -> Option<(PlaybackJob, DecoderProcess)> {
        let tag = match TagId::new(raw.trim()) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(line = raw, error = %e, "Ignoring malformed scan line");
                return None;
            }
        };

        self.set_state(PlaybackState::Resolving(tag.clone()));

        let mut item = self.library.lookup(&tag).await;
        if item.is_none() && !self.sync.has_completed_pass() {
            // Cache may simply not be warm yet. Pull this one item before
            // giving up on the scan.
            debug!(tag = %tag, "Cache miss before first sync, fetching on demand");
            match self.sync.fetch_item(&tag).await {
                Ok(()) => item = self.library.lookup(&tag).await,
                Err(e) => {
                    warn!(tag = %tag, error = %e, "On-demand fetch failed");
                }
            }
        }

        let Some(item) = item else {
            // Unknown tag: no playback, no readiness event. The slot was
            // never taken, so consumers have nothing to wait on.
            debug!(tag = %tag, "No content for scanned tag");
            self.set_state(PlaybackState::Idle);
            return None;
        };

        let job = PlaybackJob::new(tag.clone(), item);
        match self.launcher.spawn(&job.item.audio_path).await {
            Ok(process) => {
                info!(tag = %tag, path = %job.item.audio_path.display(), "Playing");
                self.set_state(PlaybackState::Playing(tag));
                Some((job, process))
            }
            Err(e) => {
                warn!(tag = %tag, error = %e, "Decoder spawn failed");
                self.set_state(PlaybackState::Idle);
                self.emit(ReadinessEvent::Failed(tag));
                None
            }
        }
    }
}
