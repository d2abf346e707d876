//! Hybrid logical clock.
//!
//! Every replicated write carries a [`Stamp`]. Stamps are totally ordered
//! by `(wall_ms, counter, actor)`, so two actors never produce equal stamps
//! and every replica picks the same winner for a register.

use folio_model::ActorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds
pub trait WallClock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock advanced by hand, shared between clones
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Timestamp of a replicated write
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub wall_ms: u64,
    pub counter: u32,
    pub actor: ActorId,
}

impl Stamp {
    pub fn new(wall_ms: u64, counter: u32, actor: impl Into<ActorId>) -> Self {
        Self {
            wall_ms,
            counter,
            actor: actor.into(),
        }
    }

    /// Stamp of state loaded from storage; loses to every live write
    pub fn genesis() -> Self {
        Self::new(0, 0, "")
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}@{}", self.wall_ms, self.counter, self.actor)
    }
}

/// Per-actor hybrid logical clock
#[derive(Debug, Clone)]
pub struct HybridClock {
    actor: ActorId,
    wall_ms: u64,
    counter: u32,
    source: Arc<dyn WallClock>,
}

impl HybridClock {
    pub fn new(actor: ActorId, source: Arc<dyn WallClock>) -> Self {
        Self {
            actor,
            wall_ms: source.now_ms(),
            counter: 0,
            source,
        }
    }

    pub fn system(actor: ActorId) -> Self {
        Self::new(actor, Arc::new(SystemClock))
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    /// Next stamp; strictly greater than every stamp this clock issued or
    /// observed, even if the wall clock moved backwards
    pub fn tick(&mut self) -> Stamp {
        let now = self.source.now_ms();
        if now > self.wall_ms {
            self.wall_ms = now;
            self.counter = 0;
        } else {
            self.counter += 1;
        }
        Stamp::new(self.wall_ms, self.counter, self.actor.clone())
    }

    /// Fold in a remote stamp so the next tick sorts after it
    pub fn observe(&mut self, remote: &Stamp) {
        if remote.wall_ms > self.wall_ms {
            self.wall_ms = remote.wall_ms;
            self.counter = remote.counter;
        } else if remote.wall_ms == self.wall_ms && remote.counter > self.counter {
            self.counter = remote.counter;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(actor: &str, wall: &ManualClock) -> HybridClock {
        HybridClock::new(ActorId::from(actor), Arc::new(wall.clone()))
    }

    #[test]
    fn test_tick_is_monotonic_when_wall_stalls_or_rewinds() {
        let wall = ManualClock::new(1_000);
        let mut clock = clock("ana", &wall);
        let a = clock.tick();
        let b = clock.tick();
        wall.set(500);
        let c = clock.tick();
        wall.set(2_000);
        let d = clock.tick();

        assert!(a < b && b < c && c < d);
        assert_eq!(d, Stamp::new(2_000, 0, "ana"));
    }

    #[test]
    fn test_observe_moves_past_remote() {
        let wall = ManualClock::new(1_000);
        let mut clock = clock("ana", &wall);
        let remote = Stamp::new(9_000, 4, "ben");
        clock.observe(&remote);
        assert!(clock.tick() > remote);

        // An older remote stamp changes nothing
        let before = clock.tick();
        clock.observe(&Stamp::new(10, 0, "ben"));
        assert!(clock.tick() > before);
    }

    #[test]
    fn test_actor_breaks_ties() {
        let a = Stamp::new(5, 1, "ana");
        let b = Stamp::new(5, 1, "ben");
        assert!(a < b);
        assert!(Stamp::genesis() < a);
    }
}
