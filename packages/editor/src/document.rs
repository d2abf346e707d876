//! # Page Document
//!
//! One actor's editable copy of a page: the page metadata, its
//! [`BlockStore`], the [`EditorStateMachine`] driving it and the page's
//! comment threads.
//!
//! ## Lifecycle
//!
//! ```text
//! Page ──▶ PageDocument ──▶ intents / mutations ──▶ to_page() ──▶ save
//!                 ▲
//!                 └──── replace_blocks() (converged remote state)
//! ```
//!
//! Every mutating entry point checks `permissions.allow_editing` first and
//! fails with `PermissionDenied` without touching anything.

use crate::block_store::BlockStore;
use crate::comments::{Comment, CommentThreads};
use crate::mutations::BlockMutation;
use crate::state_machine::{EditorIntent, EditorState, EditorStateMachine};
use chrono::Utc;
use folio_model::{
    ActorContext, Block, BlockId, BlockProperties, BlockType, CommentId, EngineError, EngineResult,
    IdGenerator, Page, PageId, Permissions,
};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct PageDocument {
    /// Page metadata; `content` lives in `store`
    meta: Page,
    store: BlockStore,
    editor: EditorStateMachine,
    comments: CommentThreads,
    comment_ids: IdGenerator,
    context: ActorContext,

    /// Increments on every local or remote change
    pub version: u64,
    dirty: bool,
}

impl PageDocument {
    pub fn open(mut page: Page, context: ActorContext) -> EngineResult<Self> {
        page.validate()?;
        let blocks = std::mem::take(&mut page.content);
        let store = BlockStore::new(
            page.id.clone(),
            blocks,
            IdGenerator::new(page.id.as_str(), &context.actor),
        );
        let comment_ids = IdGenerator::new(&format!("{}/comments", page.id), &context.actor);
        debug!(page_id = %page.id, actor = %context.actor, blocks = store.len(), "Opened page");

        Ok(Self {
            meta: page,
            store,
            editor: EditorStateMachine::new(),
            comments: CommentThreads::new(),
            comment_ids,
            context,
            version: 0,
            dirty: false,
        })
    }

    pub fn id(&self) -> &PageId {
        &self.meta.id
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn permissions(&self) -> Permissions {
        self.meta.permissions
    }

    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    pub fn blocks(&self) -> &[Block] {
        self.store.blocks()
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn editor(&self) -> &EditorStateMachine {
        &self.editor
    }

    pub fn comments(&self) -> &CommentThreads {
        &self.comments
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Snapshot in wire form
    pub fn to_page(&self) -> Page {
        let mut page = self.meta.clone();
        page.content = self.store.blocks().to_vec();
        page
    }

    fn ensure_editable(&self) -> EngineResult<()> {
        if !self.meta.permissions.allow_editing {
            return Err(EngineError::PermissionDenied(format!(
                "page '{}' does not allow editing",
                self.meta.id
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.dirty = true;
        self.meta.updated_at = Utc::now();
        let store = &self.store;
        let dropped = self.comments.retain_blocks(|id| store.get(id).is_some());
        if dropped > 0 {
            debug!(page_id = %self.meta.id, dropped, "Dropped comments of deleted blocks");
        }
    }

    /// Run a block store operation behind the permission check
    fn edit<T>(&mut self, op: impl FnOnce(&mut BlockStore) -> EngineResult<T>) -> EngineResult<T> {
        self.ensure_editable()?;
        let before = self.store.pending_changes().len();
        let result = op(&mut self.store)?;
        if self.store.pending_changes().len() != before {
            self.touch();
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(page_id = %self.meta.id))]
    pub fn handle(&mut self, intent: EditorIntent) -> EngineResult<&EditorState> {
        if intent.may_mutate() {
            self.ensure_editable()?;
        }
        let before = self.store.pending_changes().len();
        self.editor.handle(intent, &mut self.store)?;
        if self.store.pending_changes().len() != before {
            self.touch();
        }
        Ok(self.editor.state())
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> EngineResult<()> {
        self.ensure_editable()?;
        self.meta.title = title.into();
        self.touch();
        Ok(())
    }

    pub fn set_icon(&mut self, icon: impl Into<String>) -> EngineResult<()> {
        self.ensure_editable()?;
        self.meta.icon = icon.into();
        self.touch();
        Ok(())
    }

    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.meta.permissions = permissions;
        self.touch();
    }

    pub fn insert(&mut self, index: usize, block_type: BlockType, content: &str) -> EngineResult<Block> {
        self.edit(|store| store.insert(index, block_type, content))
    }

    pub fn delete(&mut self, id: &BlockId) -> EngineResult<Option<Block>> {
        self.edit(|store| store.delete(id))
    }

    pub fn update_content(&mut self, id: &BlockId, content: &str, patch: &BlockProperties) -> EngineResult<()> {
        self.edit(|store| store.update_content(id, content, patch))
    }

    pub fn change_type(&mut self, id: &BlockId, block_type: BlockType) -> EngineResult<()> {
        self.edit(|store| store.change_type(id, block_type))
    }

    pub fn move_block(&mut self, id: &BlockId, to_index: usize) -> EngineResult<()> {
        self.edit(|store| store.move_block(id, to_index))
    }

    pub fn duplicate(&mut self, id: &BlockId) -> EngineResult<Block> {
        self.edit(|store| store.duplicate(id))
    }

    /// Apply a recorded mutation (validated first)
    pub fn apply(&mut self, mutation: &BlockMutation) -> EngineResult<()> {
        self.edit(|store| mutation.apply(store))
    }

    /// Drain the block mutations performed since the last call
    pub fn take_changes(&mut self) -> Vec<BlockMutation> {
        self.store.take_changes()
    }

    /// Install converged blocks from the merge layer. Local focus is dropped
    /// if its block is gone.
    pub fn replace_blocks(&mut self, blocks: Vec<Block>) {
        self.store.replace_blocks(blocks);
        self.editor.reconcile(&self.store);
        self.version += 1;
        let store = &self.store;
        self.comments.retain_blocks(|id| store.get(id).is_some());
    }

    pub fn add_comment(&mut self, block_id: &BlockId, content: &str) -> EngineResult<&Comment> {
        self.require_comments()?;
        self.store.index_of(block_id)?;
        let id = self.comment_ids.next_comment_id();
        self.comments
            .add(id, block_id.clone(), self.context.actor.clone(), content, Utc::now())
    }

    pub fn reply_to_comment(&mut self, comment_id: &CommentId, content: &str) -> EngineResult<&Comment> {
        self.require_comments()?;
        let id = self.comment_ids.next_comment_id();
        self.comments
            .reply(comment_id, id, self.context.actor.clone(), content, Utc::now())
    }

    pub fn resolve_comment(&mut self, comment_id: &CommentId, resolved: bool) -> EngineResult<()> {
        self.require_comments()?;
        self.comments.set_resolved(comment_id, resolved)
    }

    fn require_comments(&self) -> EngineResult<()> {
        if self.meta.permissions.allow_comments {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(format!(
                "page '{}' does not allow comments",
                self.meta.id
            )))
        }
    }

    pub fn comments_for_block(&self, block_id: &BlockId) -> Vec<&Comment> {
        self.comments.for_block(block_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Key;
    use folio_model::WorkspaceId;

    fn page(blocks: Vec<Block>) -> Page {
        let mut page = Page::new(
            PageId::from("page-1"),
            "Notes",
            WorkspaceId::from("ws"),
            "ana",
            Utc::now(),
        );
        page.content = blocks;
        page
    }

    fn open(blocks: Vec<Block>) -> PageDocument {
        PageDocument::open(page(blocks), ActorContext::new("ana", "ws")).unwrap()
    }

    #[test]
    fn test_open_rejects_duplicate_block_ids() {
        let blocks = vec![
            Block::new(BlockId::from("a"), BlockType::Paragraph, ""),
            Block::new(BlockId::from("a"), BlockType::Paragraph, ""),
        ];
        let result = PageDocument::open(page(blocks), ActorContext::new("ana", "ws"));
        assert!(matches!(result, Err(EngineError::DuplicateId { .. })));
    }

    #[test]
    fn test_read_only_page_rejects_edits() {
        let mut doc = open(vec![Block::new(BlockId::from("a"), BlockType::Paragraph, "hi")]);
        doc.set_permissions(Permissions {
            allow_editing: false,
            ..Permissions::default()
        });
        doc.mark_saved();
        let version = doc.version;

        let id = BlockId::from("a");
        assert!(matches!(
            doc.insert(0, BlockType::Quote, "x"),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(matches!(doc.delete(&id), Err(EngineError::PermissionDenied(_))));
        assert!(matches!(doc.set_title("New"), Err(EngineError::PermissionDenied(_))));

        // Focus and navigation still work
        doc.handle(EditorIntent::Focus(id.clone())).unwrap();
        assert!(matches!(
            doc.handle(EditorIntent::Input("changed".into())),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(matches!(
            doc.handle(EditorIntent::key(Key::Enter)),
            Err(EngineError::PermissionDenied(_))
        ));

        assert_eq!(doc.version, version);
        assert!(!doc.is_dirty());
        assert_eq!(doc.blocks()[0].content, "hi");
    }

    #[test]
    fn test_comments_follow_their_block() {
        let mut doc = open(vec![
            Block::new(BlockId::from("a"), BlockType::Paragraph, "one"),
            Block::new(BlockId::from("b"), BlockType::Paragraph, "two"),
        ]);
        doc.add_comment(&BlockId::from("a"), "first").unwrap();
        doc.add_comment(&BlockId::from("b"), "second").unwrap();
        assert!(doc.add_comment(&BlockId::from("zz"), "lost").is_err());

        doc.delete(&BlockId::from("a")).unwrap();
        assert_eq!(doc.comments().len(), 1);
        assert!(doc.comments_for_block(&BlockId::from("a")).is_empty());
    }

    #[test]
    fn test_comments_disabled() {
        let mut doc = open(vec![Block::new(BlockId::from("a"), BlockType::Paragraph, "")]);
        doc.set_permissions(Permissions {
            allow_comments: false,
            ..Permissions::default()
        });
        assert!(matches!(
            doc.add_comment(&BlockId::from("a"), "hello"),
            Err(EngineError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_resolving_needs_comment_permission() {
        let mut doc = open(vec![Block::new(BlockId::from("a"), BlockType::Paragraph, "")]);
        let id = doc.add_comment(&BlockId::from("a"), "typo here").unwrap().id.clone();
        doc.set_permissions(Permissions {
            allow_comments: false,
            ..Permissions::default()
        });

        assert!(matches!(
            doc.resolve_comment(&id, true),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(!doc.comments().get(&id).unwrap().resolved);

        doc.set_permissions(Permissions::default());
        doc.resolve_comment(&id, true).unwrap();
        assert!(doc.comments().get(&id).unwrap().resolved);
    }

    #[test]
    fn test_noop_move_does_not_bump_version() {
        let mut doc = open(vec![
            Block::new(BlockId::from("a"), BlockType::Paragraph, ""),
            Block::new(BlockId::from("b"), BlockType::Paragraph, ""),
        ]);
        doc.move_block(&BlockId::from("a"), 0).unwrap();
        assert_eq!(doc.version, 0);

        doc.move_block(&BlockId::from("a"), 1).unwrap();
        assert_eq!(doc.version, 1);
        assert!(doc.is_dirty());
    }

    #[test]
    fn test_to_page_round_trip() {
        let mut doc = open(vec![]);
        doc.set_title("Renamed").unwrap();
        let page = doc.to_page();
        assert_eq!(page.title, "Renamed");
        assert_eq!(page.content.len(), 1);

        let reopened = PageDocument::open(page.clone(), ActorContext::new("ben", "ws")).unwrap();
        assert_eq!(reopened.to_page(), page);
    }
}
