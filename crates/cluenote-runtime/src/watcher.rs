//! Room watching - polling behind a swappable interface.
//!
//! The backing store has no push primitive, so every client re-fetches the
//! room on a fixed interval and recomputes readiness itself; there is no
//! central coordinator. The loop is an interface so a store with native
//! change subscriptions can replace polling without touching the
//! orchestrator's state machine.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, warn};

use cluenote_core::store::{RoomStore, StoreError};
use cluenote_core::types::Room;
use cluenote_core::RoomCode;

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Polling cadence and failure surfacing.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub interval: Duration,
    /// Consecutive fetch failures before an Unreachable event is emitted.
    pub fail_threshold: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(3_000),
            fail_threshold: 5,
        }
    }
}

/// Events fanned out to watch subscribers.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Fresh snapshot; the room is still being authored.
    Snapshot(Room),
    /// The ready barrier is satisfied. Watching stops after this.
    Ready(Room),
    /// Fetch failures crossed the threshold. Polling continues.
    Unreachable { consecutive_failures: u32 },
}

/// A running watch. Dropping the handle stops it.
pub struct WatchHandle {
    sender: broadcast::Sender<RoomEvent>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn subscribe(&self) -> RoomEvents {
        RoomEvents {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Subscriber side of a watch.
pub struct RoomEvents {
    receiver: broadcast::Receiver<RoomEvent>,
}

impl RoomEvents {
    /// Next event, `None` once the watch is gone. Lagged subscribers skip
    /// to the newest events; snapshots are self-contained so nothing is
    /// lost by missing one.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "watch subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Interface between the orchestrator and whatever change-detection the
/// store offers.
#[async_trait]
pub trait RoomWatcher: Send + Sync {
    async fn watch(&self, code: RoomCode) -> Result<WatchHandle, StoreError>;
}

/// Fixed-interval polling watcher.
pub struct PollingRoomWatcher {
    store: Arc<dyn RoomStore>,
    config: PollingConfig,
}

impl PollingRoomWatcher {
    pub fn new(store: Arc<dyn RoomStore>, config: PollingConfig) -> Self {
        Self { store, config }
    }
}

#[async_trait]
impl RoomWatcher for PollingRoomWatcher {
    async fn watch(&self, code: RoomCode) -> Result<WatchHandle, StoreError> {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let task_sender = sender.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failures = 0u32;
            loop {
                ticker.tick().await;
                match store.fetch_room(&code).await {
                    Ok(Some(room)) => {
                        failures = 0;
                        if room.is_collectively_ready() {
                            let mut room = room;
                            room.refresh_status();
                            let _ = task_sender.send(RoomEvent::Ready(room));
                            // Terminal rooms are read-only; stop polling to
                            // bound resource use.
                            break;
                        }
                        let _ = task_sender.send(RoomEvent::Snapshot(room));
                    }
                    Ok(None) => {
                        failures = failures.saturating_add(1);
                        warn!(room = %code, "watched room missing from store");
                        if failures == config.fail_threshold {
                            let _ = task_sender.send(RoomEvent::Unreachable {
                                consecutive_failures: failures,
                            });
                        }
                    }
                    Err(err) => {
                        failures = failures.saturating_add(1);
                        debug!(room = %code, error = %err, failures, "room fetch failed");
                        if failures == config.fail_threshold {
                            warn!(room = %code, failures, "room store unreachable");
                            let _ = task_sender.send(RoomEvent::Unreachable {
                                consecutive_failures: failures,
                            });
                        }
                    }
                }
            }
        });
        Ok(WatchHandle { sender, task })
    }
}
