//! # Folio Editor
//!
//! Local, synchronous editing engine for Folio pages and databases.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: pages, blocks, databases, views      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor                                      │
//! │  - BlockStore: ordered blocks of a page     │
//! │  - EditorStateMachine: intents → operations │
//! │  - PageDocument: permissions + comments     │
//! │  - DatabaseEngine: schema, rows, views      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ workspace: merge, presence, persistence     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Every operation validates before mutating and records a
//! [`BlockMutation`] / [`DatabaseMutation`] for the collaboration layer.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_editor::{EditorIntent, Key, PageDocument};
//!
//! let mut doc = PageDocument::open(page, context)?;
//! doc.handle(EditorIntent::Focus(block_id))?;
//! doc.handle(EditorIntent::Input("/".into()))?;
//! doc.handle(EditorIntent::key(Key::Enter))?;
//!
//! for mutation in doc.take_changes() {
//!     broadcast(mutation);
//! }
//! ```

mod block_store;
pub mod command_menu;
mod comments;
mod database;
mod document;
mod mutations;
mod state_machine;
mod views;

pub use block_store::BlockStore;
pub use command_menu::{Command, CATALOG};
pub use comments::{Comment, CommentThreads, Reply};
pub use database::{DatabaseEngine, RowValues};
pub use document::PageDocument;
pub use mutations::{BlockMutation, DatabaseMutation};
pub use state_machine::{EditorIntent, EditorState, EditorStateMachine, Key};
pub use views::{resolve_row, rows_for_view, KanbanColumn, ResolvedRow, ViewRows};
