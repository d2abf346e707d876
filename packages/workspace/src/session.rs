//! # Collaboration sessions
//!
//! A session is one actor's live view of a document. It owns the local
//! editor state, the replica used for merging, presence, and optionally a
//! heartbeat task and an auto-saver.
//!
//! ## Flow
//!
//! ```text
//!  intent ──▶ PageDocument ──take_changes──▶ ReplicatedPage::localize
//!                 ▲                                │
//!                 │ replace_blocks(render)         ├──▶ bus (MutationEvent)
//!                 │                                └──▶ auto-saver (Snapshot)
//!  bus ──▶ apply_remote ──▶ ReplicatedPage::apply_event
//! ```
//!
//! Local edits apply synchronously. The rendered replica is always what
//! the editor shows, so local and remote edits go through the same
//! ordering rules.

use crate::autosave::{AutoSaver, SaveStatus, Snapshot};
use crate::bus::CollabBus;
use crate::clock::{HybridClock, WallClock};
use crate::config::CollabConfig;
use crate::error::{CollabError, CollabResult};
use crate::events::{CollabMessage, EventId, MutationEvent, MutationPayload, PresenceUpdate};
use crate::heartbeat::{spawn_heartbeat, HeartbeatHandle};
use crate::merge::{ReplicatedDatabase, ReplicatedPage};
use crate::persistence::DocumentStore;
use crate::presence::PresenceTracker;
use folio_editor::{DatabaseEngine, EditorIntent, EditorState, PageDocument};
use folio_model::{ActorContext, ActorId, BlockId, BlockType, Database, DatabaseId, EngineResult, Page, PageId};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Next queued message, skipping over lag
fn try_next(inbox: &mut broadcast::Receiver<CollabMessage>) -> CollabResult<Option<CollabMessage>> {
    loop {
        match inbox.try_recv() {
            Ok(message) => return Ok(Some(message)),
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Lagged(skipped)) => warn!(skipped, "Session fell behind the bus"),
            Err(TryRecvError::Closed) => return Err(CollabError::BusClosed),
        }
    }
}

async fn recv_next(inbox: &mut broadcast::Receiver<CollabMessage>) -> CollabResult<CollabMessage> {
    loop {
        match inbox.recv().await {
            Ok(message) => return Ok(message),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Session fell behind the bus"),
            Err(RecvError::Closed) => return Err(CollabError::BusClosed),
        }
    }
}

/// One actor editing one page
pub struct PageSession {
    document: PageDocument,
    replica: ReplicatedPage,
    presence: PresenceTracker,
    clock: HybridClock,
    wall: Arc<dyn WallClock>,
    bus: CollabBus,
    inbox: broadcast::Receiver<CollabMessage>,
    presence_tx: watch::Sender<Option<PresenceUpdate>>,
    heartbeat: Option<HeartbeatHandle>,
    saver: Option<AutoSaver>,
    config: CollabConfig,
    seq: u64,
}

impl std::fmt::Debug for PageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSession")
            .field("page_id", self.document.id())
            .field("actor", &self.document.context().actor)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl PageSession {
    /// Open `page` for `context` and announce the actor on the bus
    pub fn new(
        page: Page,
        context: ActorContext,
        bus: CollabBus,
        config: CollabConfig,
        wall: Arc<dyn WallClock>,
    ) -> CollabResult<Self> {
        let replica = ReplicatedPage::from_blocks(page.id.clone(), &page.content);
        let presence = PresenceTracker::new(context.clone(), page.id.clone(), config.staleness_window_ms);
        let clock = HybridClock::new(context.actor.clone(), wall.clone());
        let document = PageDocument::open(page, context)?;
        let (presence_tx, _) = watch::channel(None);

        let mut session = Self {
            document,
            replica,
            presence,
            clock,
            wall,
            inbox: bus.subscribe(),
            bus,
            presence_tx,
            heartbeat: None,
            saver: None,
            config,
            seq: 0,
        };

        // An empty page gets a paragraph on open; peers need to hear about it
        session.commit()?;
        let joined = session.presence.join(session.wall.now_ms());
        session.broadcast_presence(joined);
        info!(page_id = %session.page_id(), actor = %session.actor(), "Joined page");
        Ok(session)
    }

    /// Load the page from `store` and save edits back to it
    pub async fn load(
        store: Arc<dyn DocumentStore>,
        page_id: &PageId,
        context: ActorContext,
        bus: CollabBus,
        config: CollabConfig,
        wall: Arc<dyn WallClock>,
    ) -> CollabResult<Self> {
        let page = store.load_page(page_id).await?;
        Ok(Self::new(page, context, bus, config, wall)?.with_autosave(store))
    }

    /// Save after every edit, debounced. Needs a Tokio runtime.
    pub fn with_autosave(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.saver = Some(AutoSaver::spawn(
            store,
            self.config.autosave_debounce(),
            self.config.retry.clone(),
        ));
        self
    }

    /// Re-broadcast presence every heartbeat interval. Needs a Tokio runtime.
    pub fn start_heartbeat(&mut self) {
        if self.heartbeat.is_none() {
            self.heartbeat = Some(spawn_heartbeat(
                self.bus.clone(),
                self.presence_tx.subscribe(),
                self.config.heartbeat_interval(),
                self.wall.clone(),
            ));
        }
    }

    pub fn page_id(&self) -> &PageId {
        self.document.id()
    }

    pub fn actor(&self) -> &ActorId {
        &self.document.context().actor
    }

    pub fn document(&self) -> &PageDocument {
        &self.document
    }

    pub fn replica(&self) -> &ReplicatedPage {
        &self.replica
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.saver.as_ref().map(AutoSaver::status)
    }

    pub fn retry_save(&self) {
        if let Some(saver) = &self.saver {
            saver.retry_now();
        }
    }

    /// Drive the editor with a user intent and broadcast what it changed
    #[instrument(skip(self), fields(page_id = %self.document.id(), actor = %self.document.context().actor))]
    pub fn handle(&mut self, intent: EditorIntent) -> CollabResult<&EditorState> {
        self.document.handle(intent)?;
        self.commit()?;
        self.announce_cursor();
        Ok(self.document.editor().state())
    }

    /// Run a direct document operation and broadcast what it changed
    pub fn edit<T>(&mut self, op: impl FnOnce(&mut PageDocument) -> EngineResult<T>) -> CollabResult<T> {
        let result = op(&mut self.document)?;
        self.commit()?;
        self.announce_cursor();
        Ok(result)
    }

    /// Report a caret move that did not change content
    pub fn move_cursor(&mut self, block_id: Option<BlockId>, position: i64) {
        let update = self.presence.set_local_cursor(block_id, position, self.wall.now_ms());
        self.broadcast_presence(update);
    }

    fn commit(&mut self) -> CollabResult<()> {
        self.publish_local()?;
        if self.document.blocks().is_empty() && self.document.permissions().allow_editing {
            debug!(page_id = %self.page_id(), "Page emptied, adding a paragraph");
            self.document.insert(0, BlockType::Paragraph, "")?;
            self.publish_local()?;
        }
        Ok(())
    }

    fn publish_local(&mut self) -> CollabResult<()> {
        let changes = self.document.take_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let stamp = self.clock.tick();
        let mut ops = Vec::with_capacity(changes.len());
        for change in &changes {
            ops.extend(self.replica.localize(change, &stamp)?);
        }

        self.seq += 1;
        let event = MutationEvent {
            id: EventId {
                actor: self.actor().clone(),
                seq: self.seq,
            },
            stamp,
            payload: MutationPayload::Page {
                page_id: self.page_id().clone(),
                ops,
            },
        };
        self.replica.mark_seen(event.id.clone());
        self.sync_from_replica();

        debug!(event = %event.id, changes = changes.len(), "Publishing local edit");
        self.bus.publish(CollabMessage::Mutation(event));
        self.queue_save();
        Ok(())
    }

    /// Show the converged blocks and drop cursors on vanished blocks
    fn sync_from_replica(&mut self) {
        self.document.replace_blocks(self.replica.render());
        let store = self.document.store();
        self.presence.retain_blocks(|id| store.get(id).is_some());
    }

    fn announce_cursor(&mut self) {
        let focused = self.document.editor().focused().cloned();
        let position = focused
            .as_ref()
            .and_then(|id| self.document.store().get(id))
            .map(|block| block.content.chars().count() as i64)
            .unwrap_or(0);
        let update = self.presence.set_local_cursor(focused, position, self.wall.now_ms());
        self.broadcast_presence(update);
    }

    fn broadcast_presence(&mut self, update: PresenceUpdate) {
        self.presence_tx.send_replace(Some(update.clone()));
        self.bus.publish(CollabMessage::Presence(update));
    }

    fn queue_save(&self) {
        if let Some(saver) = &self.saver {
            saver.notify(Snapshot::Page(self.document.to_page()));
        }
    }

    /// Merge one message from another actor. Returns whether local state
    /// changed.
    pub fn apply_remote(&mut self, message: &CollabMessage) -> CollabResult<bool> {
        match message {
            CollabMessage::Mutation(event) => {
                if event.page_id() != Some(self.page_id()) {
                    return Ok(false);
                }
                self.clock.observe(&event.stamp);
                if !self.replica.apply_event(event) {
                    return Ok(false);
                }
                self.sync_from_replica();
                self.queue_save();
                self.commit()?;
                Ok(true)
            }
            CollabMessage::Presence(update) => {
                let changed = self.presence.apply(update);
                let dropped = self.presence.prune(self.wall.now_ms());
                Ok(changed || !dropped.is_empty())
            }
        }
    }

    /// Apply every message already waiting on the bus
    pub fn drain_remote(&mut self) -> CollabResult<usize> {
        let mut applied = 0;
        while let Some(message) = try_next(&mut self.inbox)? {
            if self.apply_remote(&message)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Wait for the next message and apply it
    pub async fn next_remote(&mut self) -> CollabResult<bool> {
        let message = recv_next(&mut self.inbox).await?;
        self.apply_remote(&message)
    }

    /// Announce departure and stop the heartbeat
    pub fn leave(&mut self) {
        self.heartbeat = None;
        if let Some(update) = self.presence.leave(self.wall.now_ms()) {
            self.broadcast_presence(update);
        }
    }

    /// Save anything pending now
    pub async fn flush(&self) -> Option<SaveStatus> {
        match &self.saver {
            Some(saver) => Some(saver.flush().await),
            None => None,
        }
    }

    /// Leave the page and wait for the final save
    pub async fn close(mut self) -> Option<SaveStatus> {
        self.leave();
        match self.saver.take() {
            Some(saver) => Some(saver.shutdown().await),
            None => None,
        }
    }
}

/// One actor editing one database
pub struct DatabaseSession {
    engine: DatabaseEngine,
    replica: ReplicatedDatabase,
    clock: HybridClock,
    bus: CollabBus,
    inbox: broadcast::Receiver<CollabMessage>,
    saver: Option<AutoSaver>,
    config: CollabConfig,
    seq: u64,
}

impl std::fmt::Debug for DatabaseSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSession")
            .field("database_id", &self.engine.database().id)
            .field("actor", &self.engine.context().actor)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl DatabaseSession {
    pub fn new(
        database: Database,
        context: ActorContext,
        bus: CollabBus,
        config: CollabConfig,
        wall: Arc<dyn WallClock>,
    ) -> CollabResult<Self> {
        let replica = ReplicatedDatabase::from_database(&database);
        let clock = HybridClock::new(context.actor.clone(), wall);
        let mut engine = DatabaseEngine::open(database, context)?;
        engine.replace_database(replica.render());
        info!(database_id = %replica.database_id(), actor = %engine.context().actor, "Opened database session");

        Ok(Self {
            engine,
            replica,
            clock,
            inbox: bus.subscribe(),
            bus,
            saver: None,
            config,
            seq: 0,
        })
    }

    pub async fn load(
        store: Arc<dyn DocumentStore>,
        database_id: &DatabaseId,
        context: ActorContext,
        bus: CollabBus,
        config: CollabConfig,
        wall: Arc<dyn WallClock>,
    ) -> CollabResult<Self> {
        let database = store.load_database(database_id).await?;
        Ok(Self::new(database, context, bus, config, wall)?.with_autosave(store))
    }

    pub fn with_autosave(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.saver = Some(AutoSaver::spawn(
            store,
            self.config.autosave_debounce(),
            self.config.retry.clone(),
        ));
        self
    }

    pub fn database_id(&self) -> &DatabaseId {
        self.replica.database_id()
    }

    pub fn engine(&self) -> &DatabaseEngine {
        &self.engine
    }

    pub fn database(&self) -> &Database {
        self.engine.database()
    }

    pub fn save_status(&self) -> Option<SaveStatus> {
        self.saver.as_ref().map(AutoSaver::status)
    }

    /// Run engine operations and broadcast what they changed
    #[instrument(skip_all, fields(database_id = %self.replica.database_id()))]
    pub fn edit<T>(&mut self, op: impl FnOnce(&mut DatabaseEngine) -> EngineResult<T>) -> CollabResult<T> {
        let result = op(&mut self.engine)?;
        self.publish_local()?;
        Ok(result)
    }

    fn publish_local(&mut self) -> CollabResult<()> {
        let changes = self.engine.take_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let stamp = self.clock.tick();
        let mut ops = Vec::with_capacity(changes.len());
        for change in &changes {
            ops.extend(self.replica.localize(change, self.engine.database(), &stamp)?);
        }

        self.seq += 1;
        let event = MutationEvent {
            id: EventId {
                actor: self.engine.context().actor.clone(),
                seq: self.seq,
            },
            stamp,
            payload: MutationPayload::Database {
                database_id: self.replica.database_id().clone(),
                ops,
            },
        };
        self.replica.mark_seen(event.id.clone());
        self.engine.replace_database(self.replica.render());

        debug!(event = %event.id, changes = changes.len(), "Publishing local edit");
        self.bus.publish(CollabMessage::Mutation(event));
        self.queue_save();
        Ok(())
    }

    fn queue_save(&self) {
        if let Some(saver) = &self.saver {
            saver.notify(Snapshot::Database(self.engine.database().clone()));
        }
    }

    pub fn apply_remote(&mut self, message: &CollabMessage) -> CollabResult<bool> {
        let CollabMessage::Mutation(event) = message else {
            return Ok(false);
        };
        if event.database_id() != Some(self.replica.database_id()) {
            return Ok(false);
        }
        self.clock.observe(&event.stamp);
        if !self.replica.apply_event(event) {
            return Ok(false);
        }
        self.engine.replace_database(self.replica.render());
        self.queue_save();
        Ok(true)
    }

    pub fn drain_remote(&mut self) -> CollabResult<usize> {
        let mut applied = 0;
        while let Some(message) = try_next(&mut self.inbox)? {
            if self.apply_remote(&message)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    pub async fn next_remote(&mut self) -> CollabResult<bool> {
        let message = recv_next(&mut self.inbox).await?;
        self.apply_remote(&message)
    }

    pub async fn flush(&self) -> Option<SaveStatus> {
        match &self.saver {
            Some(saver) => Some(saver.flush().await),
            None => None,
        }
    }

    pub async fn close(mut self) -> Option<SaveStatus> {
        match self.saver.take() {
            Some(saver) => Some(saver.shutdown().await),
            None => None,
        }
    }
}
