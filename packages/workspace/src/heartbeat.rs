//! Presence heartbeat task.
//!
//! Re-broadcasts the local actor's latest presence every interval so
//! peers keep seeing it even while the caret does not move. A fresh
//! update pushes the next heartbeat one full interval out.

use crate::bus::CollabBus;
use crate::clock::WallClock;
use crate::events::{CollabMessage, PresenceKind, PresenceUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Aborts the heartbeat task when dropped
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    pub fn stop(self) {}

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn the heartbeat loop. It ends when the sender side of `latest` is
/// dropped.
pub fn spawn_heartbeat(
    bus: CollabBus,
    mut latest: watch::Receiver<Option<PresenceUpdate>>,
    period: Duration,
    wall: Arc<dyn WallClock>,
) -> HeartbeatHandle {
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let beat = latest.borrow().clone().filter(|u| u.kind != PresenceKind::Leave);
                    if let Some(mut beat) = beat {
                        beat.kind = PresenceKind::Heartbeat;
                        beat.timestamp_ms = wall.now_ms();
                        trace!(actor = %beat.actor, "Heartbeat");
                        bus.publish(CollabMessage::Presence(beat));
                    }
                }
                changed = latest.changed() => {
                    if changed.is_err() {
                        debug!("Presence source closed, stopping heartbeat");
                        break;
                    }
                    ticker.reset();
                }
            }
        }
    });
    HeartbeatHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use folio_model::{ActorId, PageId};

    fn presence(kind: PresenceKind) -> PresenceUpdate {
        PresenceUpdate {
            actor: ActorId::from("ana"),
            display_name: "Ana".into(),
            page_id: PageId::from("p"),
            block_id: None,
            position: 0,
            timestamp_ms: 0,
            kind,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_repeats_latest_presence() {
        let bus = CollabBus::new(16);
        let mut rx = bus.subscribe();
        let wall = ManualClock::new(5_000);
        let (tx, latest) = watch::channel(Some(presence(PresenceKind::Join)));

        let _handle = spawn_heartbeat(bus.clone(), latest, Duration::from_secs(2), Arc::new(wall.clone()));

        let start = Instant::now();
        let CollabMessage::Presence(first) = rx.recv().await.unwrap() else {
            panic!("expected presence");
        };
        assert_eq!(first.kind, PresenceKind::Heartbeat);
        assert_eq!(first.timestamp_ms, 5_000);
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        wall.advance(2_000);
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));

        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_postpones_heartbeat_and_leave_silences_it() {
        let bus = CollabBus::new(16);
        let mut rx = bus.subscribe();
        let (tx, latest) = watch::channel(Some(presence(PresenceKind::Join)));
        let _handle = spawn_heartbeat(bus.clone(), latest, Duration::from_secs(2), Arc::new(ManualClock::new(0)));

        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        tx.send_replace(Some(presence(PresenceKind::Update)));

        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(3_500));

        tx.send_replace(Some(presence(PresenceKind::Leave)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_source_dropped() {
        let bus = CollabBus::new(4);
        let (tx, latest) = watch::channel(None);
        let handle = spawn_heartbeat(bus, latest, Duration::from_secs(2), Arc::new(ManualClock::new(0)));
        drop(tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
