//! # Folio Workspace
//!
//! Multi-actor collaboration for Folio documents: merging concurrent
//! edits, presence, and saving.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   MutationEvent / PresenceUpdate   ┌──────────────┐
//! │ PageSession  │ ─────────────▶ CollabBus ────────▶ │ PageSession  │
//! │  (actor A)   │ ◀───────────────────────────────── │  (actor B)   │
//! └──────┬───────┘                                    └──────────────┘
//!        │ Snapshot (debounced)
//!        ▼
//! ┌──────────────┐
//! │  AutoSaver   │ ──▶ DocumentStore (memory / files)
//! └──────────────┘
//! ```
//!
//! Every replica that has seen the same set of events renders the same
//! document, whatever order the events arrived in.

pub mod autosave;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fractional;
pub mod heartbeat;
pub mod merge;
pub mod persistence;
pub mod presence;
pub mod session;

pub use autosave::{AutoSaver, SaveStatus, Snapshot};
pub use bus::CollabBus;
pub use clock::{HybridClock, ManualClock, Stamp, SystemClock, WallClock};
pub use config::{CollabConfig, RetryPolicy};
pub use error::{CollabError, CollabResult, StoreError, StoreResult};
pub use events::{
    CollabMessage, Cursor, DatabaseOp, EventId, MutationEvent, MutationPayload, PageOp, PresenceKind,
    PresenceUpdate,
};
pub use heartbeat::{spawn_heartbeat, HeartbeatHandle};
pub use merge::{Lww, ReplicatedDatabase, ReplicatedPage};
pub use persistence::{DocumentStore, FileStore, InMemoryStore};
pub use presence::{Peer, PeerState, PresenceTracker};
pub use session::{DatabaseSession, PageSession};
