//! # Presence
//!
//! Who else is on a page and where their caret is.
//!
//! ## States
//!
//! ```text
//! Disconnected ──join──▶ Connected ──cursor──▶ Active(cursor)
//!      ▲                    │    ▲                 │
//!      └──leave / stale─────┘    └────blur─────────┘
//! ```
//!
//! Remote updates merge per actor: the update with the latest timestamp
//! wins and older ones are ignored. A peer that sends nothing (not even a
//! heartbeat) for longer than the staleness window is dropped by
//! [`PresenceTracker::prune`].

use crate::events::{Cursor, PresenceKind, PresenceUpdate};
use folio_model::{ActorContext, ActorId, BlockId, PageId};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    Disconnected,
    Connected,
    Active(Cursor),
}

impl PeerState {
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            PeerState::Active(cursor) => Some(cursor),
            _ => None,
        }
    }

    fn from_cursor(block_id: Option<BlockId>, position: i64, timestamp_ms: u64) -> Self {
        match block_id {
            Some(block_id) => PeerState::Active(Cursor {
                block_id: Some(block_id),
                position: position.max(0) as usize,
                timestamp_ms,
            }),
            None => PeerState::Connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub actor: ActorId,
    pub display_name: String,
    pub state: PeerState,
    pub last_seen_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PresenceTracker {
    context: ActorContext,
    page_id: PageId,
    staleness_window_ms: u64,
    local: PeerState,
    peers: BTreeMap<ActorId, Peer>,
}

impl PresenceTracker {
    pub fn new(context: ActorContext, page_id: PageId, staleness_window_ms: u64) -> Self {
        Self {
            context,
            page_id,
            staleness_window_ms,
            local: PeerState::Disconnected,
            peers: BTreeMap::new(),
        }
    }

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    pub fn local_state(&self) -> &PeerState {
        &self.local
    }

    fn local_update(&self, kind: PresenceKind, now_ms: u64) -> PresenceUpdate {
        let cursor = self.local.cursor();
        PresenceUpdate {
            actor: self.context.actor.clone(),
            display_name: self.context.display_name.clone(),
            page_id: self.page_id.clone(),
            block_id: cursor.and_then(|c| c.block_id.clone()),
            position: cursor.map(|c| c.position as i64).unwrap_or(0),
            timestamp_ms: now_ms,
            kind,
        }
    }

    pub fn join(&mut self, now_ms: u64) -> PresenceUpdate {
        if self.local == PeerState::Disconnected {
            self.local = PeerState::Connected;
        }
        self.local_update(PresenceKind::Join, now_ms)
    }

    /// Move the local caret. `None` blurs the page; negative positions
    /// clamp to 0.
    pub fn set_local_cursor(&mut self, block_id: Option<BlockId>, position: i64, now_ms: u64) -> PresenceUpdate {
        self.local = PeerState::from_cursor(block_id, position, now_ms);
        self.local_update(PresenceKind::Update, now_ms)
    }

    /// Re-announce the current cursor; nothing while disconnected
    pub fn heartbeat(&self, now_ms: u64) -> Option<PresenceUpdate> {
        (self.local != PeerState::Disconnected).then(|| self.local_update(PresenceKind::Heartbeat, now_ms))
    }

    pub fn leave(&mut self, now_ms: u64) -> Option<PresenceUpdate> {
        if self.local == PeerState::Disconnected {
            return None;
        }
        self.local = PeerState::Disconnected;
        Some(self.local_update(PresenceKind::Leave, now_ms))
    }

    /// Merge a remote update. Returns whether anything changed.
    pub fn apply(&mut self, update: &PresenceUpdate) -> bool {
        if update.actor == self.context.actor || update.page_id != self.page_id {
            return false;
        }
        if let Some(peer) = self.peers.get(&update.actor) {
            if update.timestamp_ms < peer.last_seen_ms {
                debug!(actor = %update.actor, "Ignoring stale presence update");
                return false;
            }
        }

        if update.kind == PresenceKind::Leave {
            debug!(actor = %update.actor, "Peer left");
            return self.peers.remove(&update.actor).is_some();
        }

        let peer = Peer {
            actor: update.actor.clone(),
            display_name: update.display_name.clone(),
            state: PeerState::from_cursor(update.block_id.clone(), update.position, update.timestamp_ms),
            last_seen_ms: update.timestamp_ms,
        };
        let changed = self.peers.get(&update.actor) != Some(&peer);
        self.peers.insert(update.actor.clone(), peer);
        changed
    }

    /// Drop peers unseen for longer than the staleness window
    pub fn prune(&mut self, now_ms: u64) -> Vec<ActorId> {
        let window = self.staleness_window_ms;
        let stale: Vec<ActorId> = self
            .peers
            .values()
            .filter(|p| now_ms.saturating_sub(p.last_seen_ms) > window)
            .map(|p| p.actor.clone())
            .collect();
        for actor in &stale {
            debug!(actor = %actor, "Dropping stale peer");
            self.peers.remove(actor);
        }
        stale
    }

    pub fn state_of(&self, actor: &ActorId) -> PeerState {
        self.peers
            .get(actor)
            .map(|p| p.state.clone())
            .unwrap_or_default()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn cursors_for_block(&self, block_id: &BlockId) -> Vec<(&Peer, &Cursor)> {
        self.peers
            .values()
            .filter_map(|peer| peer.state.cursor().map(|cursor| (peer, cursor)))
            .filter(|(_, cursor)| cursor.block_id.as_ref() == Some(block_id))
            .collect()
    }

    /// Forget cursors pointing at blocks that no longer exist
    pub fn retain_blocks(&mut self, exists: impl Fn(&BlockId) -> bool) {
        for peer in self.peers.values_mut() {
            let gone = matches!(
                peer.state.cursor().and_then(|c| c.block_id.as_ref()),
                Some(block_id) if !exists(block_id)
            );
            if gone {
                peer.state = PeerState::Connected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(ActorContext::new("ana", "ws"), PageId::from("p"), 10_000)
    }

    fn update(actor: &str, block: Option<&str>, position: i64, at: u64, kind: PresenceKind) -> PresenceUpdate {
        PresenceUpdate {
            actor: ActorId::from(actor),
            display_name: actor.to_string(),
            page_id: PageId::from("p"),
            block_id: block.map(BlockId::from),
            position,
            timestamp_ms: at,
            kind,
        }
    }

    #[test]
    fn test_local_lifecycle() {
        let mut presence = tracker();
        assert!(presence.heartbeat(0).is_none());

        let join = presence.join(10);
        assert_eq!(join.kind, PresenceKind::Join);
        assert_eq!(presence.local_state(), &PeerState::Connected);

        let moved = presence.set_local_cursor(Some(BlockId::from("b1")), -4, 20);
        assert_eq!(moved.position, 0);
        assert_eq!(presence.local_state().cursor().unwrap().position, 0);

        let beat = presence.heartbeat(2_020).unwrap();
        assert_eq!(beat.kind, PresenceKind::Heartbeat);
        assert_eq!(beat.block_id, Some(BlockId::from("b1")));
        assert_eq!(beat.timestamp_ms, 2_020);

        assert!(presence.leave(3_000).is_some());
        assert!(presence.leave(3_001).is_none());
    }

    #[test]
    fn test_latest_timestamp_wins() {
        let mut presence = tracker();
        assert!(presence.apply(&update("ben", Some("b2"), 5, 200, PresenceKind::Update)));
        assert!(!presence.apply(&update("ben", Some("b1"), 1, 100, PresenceKind::Update)));

        let cursor = presence.state_of(&ActorId::from("ben"));
        assert_eq!(cursor.cursor().unwrap().block_id, Some(BlockId::from("b2")));
        assert_eq!(presence.cursors_for_block(&BlockId::from("b2")).len(), 1);
        assert!(presence.cursors_for_block(&BlockId::from("b1")).is_empty());
    }

    #[test]
    fn test_ignores_self_and_other_pages() {
        let mut presence = tracker();
        assert!(!presence.apply(&update("ana", Some("b1"), 0, 1, PresenceKind::Update)));
        let mut elsewhere = update("ben", Some("b1"), 0, 1, PresenceKind::Update);
        elsewhere.page_id = PageId::from("other");
        assert!(!presence.apply(&elsewhere));
        assert_eq!(presence.peers().count(), 0);
    }

    #[test]
    fn test_leave_and_staleness() {
        let mut presence = tracker();
        presence.apply(&update("ben", None, 0, 1_000, PresenceKind::Join));
        presence.apply(&update("cy", Some("b1"), 3, 1_000, PresenceKind::Update));
        assert_eq!(presence.state_of(&ActorId::from("ben")), PeerState::Connected);

        presence.apply(&update("ben", None, 0, 2_000, PresenceKind::Leave));
        assert_eq!(presence.state_of(&ActorId::from("ben")), PeerState::Disconnected);

        // cy keeps beating, dy goes quiet
        presence.apply(&update("dy", None, 0, 2_000, PresenceKind::Join));
        presence.apply(&update("cy", Some("b1"), 3, 9_000, PresenceKind::Heartbeat));
        assert_eq!(presence.prune(12_500), vec![ActorId::from("dy")]);
        assert!(matches!(presence.state_of(&ActorId::from("cy")), PeerState::Active(_)));
    }

    #[test]
    fn test_cursor_on_deleted_block_is_cleared() {
        let mut presence = tracker();
        presence.apply(&update("ben", Some("gone"), 2, 1, PresenceKind::Update));
        presence.retain_blocks(|id| id.as_str() != "gone");
        assert_eq!(presence.state_of(&ActorId::from("ben")), PeerState::Connected);
    }
}
