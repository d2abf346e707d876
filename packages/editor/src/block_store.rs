//! # Block Store
//!
//! Owns the ordered block array of one page.
//!
//! ## Invariants
//!
//! - Block ids are unique within the page and never reused
//! - The page always holds at least one block: deleting the last one leaves
//!   an empty paragraph in its place
//! - Every block's properties are valid for its type
//!
//! Operations validate before mutating, so a failed call leaves the array
//! untouched.

use crate::mutations::BlockMutation;
use folio_model::{
    Block, BlockId, BlockProperties, BlockType, EngineError, EngineResult, EntityKind, IdGenerator,
    PageId,
};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BlockStore {
    page_id: PageId,
    blocks: Vec<Block>,
    ids: IdGenerator,
    /// Every id ever seen on this page, so deleted ids are not minted again
    issued: HashSet<BlockId>,
    changes: Vec<BlockMutation>,
}

impl BlockStore {
    /// Take ownership of a page's blocks; an empty page gets one empty paragraph
    pub fn new(page_id: PageId, blocks: Vec<Block>, ids: IdGenerator) -> Self {
        let issued = blocks.iter().map(|b| b.id.clone()).collect();
        let mut store = Self {
            page_id,
            blocks,
            ids,
            issued,
            changes: Vec::new(),
        };
        if store.blocks.is_empty() {
            let block = Block::paragraph(store.fresh_id());
            store.record_insert(0, block);
        }
        store
    }

    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn index_of(&self, id: &BlockId) -> EngineResult<usize> {
        self.blocks
            .iter()
            .position(|b| &b.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Block, id))
    }

    pub(crate) fn require(&self, id: &BlockId) -> EngineResult<&Block> {
        self.get(id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Block, id))
    }

    pub(crate) fn ensure_absent(&self, id: &BlockId) -> EngineResult<()> {
        if self.get(id).is_some() {
            return Err(EngineError::duplicate(EntityKind::Block, id));
        }
        Ok(())
    }

    pub fn pending_changes(&self) -> &[BlockMutation] {
        &self.changes
    }

    /// Drain the mutations performed since the last call
    pub fn take_changes(&mut self) -> Vec<BlockMutation> {
        std::mem::take(&mut self.changes)
    }

    /// Insert a new block; `index` is clamped to `[0, len]`
    pub fn insert(&mut self, index: usize, block_type: BlockType, content: impl Into<String>) -> EngineResult<Block> {
        let block = Block::new(self.fresh_id(), block_type, content);
        let index = index.min(self.blocks.len());
        debug!(page_id = %self.page_id, block_id = %block.id, index, "Inserting block");
        self.record_insert(index, block.clone());
        Ok(block)
    }

    /// Insert an existing block (keeping its id)
    pub fn insert_block(&mut self, index: usize, block: Block) -> EngineResult<()> {
        self.ensure_absent(&block.id)?;
        block.validate()?;
        let index = index.min(self.blocks.len());
        self.record_insert(index, block);
        Ok(())
    }

    /// Remove a block. Returns the empty paragraph that replaced it when it
    /// was the last block of the page.
    pub fn delete(&mut self, id: &BlockId) -> EngineResult<Option<Block>> {
        let index = self.index_of(id)?;
        self.blocks.remove(index);
        self.changes.push(BlockMutation::Delete { block_id: id.clone() });
        debug!(page_id = %self.page_id, block_id = %id, "Deleted block");

        if self.blocks.is_empty() {
            let replacement = Block::paragraph(self.fresh_id());
            self.record_insert(0, replacement.clone());
            return Ok(Some(replacement));
        }
        Ok(None)
    }

    /// Replace content and merge `patch` into the block's properties
    pub fn update_content(&mut self, id: &BlockId, content: impl Into<String>, patch: &BlockProperties) -> EngineResult<()> {
        let index = self.index_of(id)?;
        let block = &self.blocks[index];

        let mut properties = block.properties.clone();
        properties.merge(patch);
        properties.validate_for(block.block_type)?;

        let content = content.into();
        let block = &mut self.blocks[index];
        block.content = content.clone();
        block.properties = properties;

        self.changes.push(BlockMutation::UpdateContent {
            block_id: id.clone(),
            content,
            properties: patch.clone(),
        });
        Ok(())
    }

    /// Change a block's type, clearing incompatible properties
    pub fn change_type(&mut self, id: &BlockId, block_type: BlockType) -> EngineResult<()> {
        let index = self.index_of(id)?;
        let block = &mut self.blocks[index];
        if block.block_type == block_type {
            return Ok(());
        }

        debug!(block_id = %id, from = %block.block_type, to = %block_type, "Changing block type");
        block.properties = block.properties.for_type_change(block_type);
        block.block_type = block_type;

        self.changes.push(BlockMutation::ChangeType {
            block_id: id.clone(),
            block_type,
        });
        Ok(())
    }

    /// Move a block to `to_index` (clamped), preserving its identity
    pub fn move_block(&mut self, id: &BlockId, to_index: usize) -> EngineResult<()> {
        let from = self.index_of(id)?;
        let to_index = to_index.min(self.blocks.len() - 1);
        if from == to_index {
            return Ok(());
        }

        let block = self.blocks.remove(from);
        self.blocks.insert(to_index, block);
        self.changes.push(BlockMutation::Move {
            block_id: id.clone(),
            to_index,
        });
        Ok(())
    }

    /// Copy a block (fresh id) immediately after the source
    pub fn duplicate(&mut self, id: &BlockId) -> EngineResult<Block> {
        let index = self.index_of(id)?;
        let mut copy = self.blocks[index].clone();
        copy.id = self.fresh_id();
        self.record_insert(index + 1, copy.clone());
        Ok(copy)
    }

    /// Replace the whole array, e.g. with the converged state of a
    /// replicated page. Not recorded as a change.
    pub fn replace_blocks(&mut self, blocks: Vec<Block>) {
        for block in &blocks {
            self.issued.insert(block.id.clone());
        }
        self.blocks = blocks;
    }

    fn record_insert(&mut self, index: usize, block: Block) {
        self.issued.insert(block.id.clone());
        self.blocks.insert(index, block.clone());
        self.changes.push(BlockMutation::Insert { index, block });
    }

    fn fresh_id(&mut self) -> BlockId {
        loop {
            let id = self.ids.next_block_id();
            if !self.issued.contains(&id) {
                return id;
            }
        }
    }
}
