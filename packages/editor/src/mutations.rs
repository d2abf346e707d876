//! # Block Mutations
//!
//! Intent-level operations on a page's block array.
//!
//! Every successful [`BlockStore`] operation records the mutations it
//! performed, so the collaboration layer can replicate them. Replaying a
//! recorded mutation on a store with the same blocks reproduces the same
//! state, including block ids.
//!
//! ## Semantics
//!
//! - `UpdateContent` replaces the content atomically and merges the
//!   property patch (patch keys overwrite)
//! - `ChangeType` clears properties the new type does not allow
//! - `Move` is a no-op when the block is already at `to_index`
//!
//! [`DatabaseMutation`] is the equivalent journal for a [`DatabaseEngine`].

use crate::block_store::BlockStore;
use crate::database::{DatabaseEngine, RowValues};
use folio_model::{
    Block, BlockId, BlockProperties, BlockType, EngineResult, PropertyDefinition, PropertyId,
    PropertyPatch, Row, RowId, View, ViewId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BlockMutation {
    /// Insert a block (with its id) at index
    Insert { index: usize, block: Block },

    Delete { block_id: BlockId },

    UpdateContent {
        block_id: BlockId,
        content: String,
        #[serde(default)]
        properties: BlockProperties,
    },

    ChangeType {
        block_id: BlockId,
        block_type: BlockType,
    },

    Move { block_id: BlockId, to_index: usize },
}

impl BlockMutation {
    /// Block the mutation targets
    pub fn block_id(&self) -> &BlockId {
        match self {
            BlockMutation::Insert { block, .. } => &block.id,
            BlockMutation::Delete { block_id }
            | BlockMutation::UpdateContent { block_id, .. }
            | BlockMutation::ChangeType { block_id, .. }
            | BlockMutation::Move { block_id, .. } => block_id,
        }
    }

    /// Check the mutation can be applied without changing anything
    pub fn validate(&self, store: &BlockStore) -> EngineResult<()> {
        match self {
            BlockMutation::Insert { block, .. } => {
                store.ensure_absent(&block.id)?;
                block.validate()
            }
            BlockMutation::Delete { block_id } | BlockMutation::Move { block_id, .. } => {
                store.index_of(block_id).map(|_| ())
            }
            BlockMutation::UpdateContent {
                block_id, properties, ..
            } => {
                let block = store.require(block_id)?;
                let mut merged = block.properties.clone();
                merged.merge(properties);
                merged.validate_for(block.block_type)
            }
            BlockMutation::ChangeType { block_id, .. } => store.index_of(block_id).map(|_| ()),
        }
    }

    /// Apply with validation
    pub fn apply(&self, store: &mut BlockStore) -> EngineResult<()> {
        self.validate(store)?;

        match self {
            BlockMutation::Insert { index, block } => store.insert_block(*index, block.clone()),
            BlockMutation::Delete { block_id } => store.delete(block_id).map(|_| ()),
            BlockMutation::UpdateContent {
                block_id,
                content,
                properties,
            } => store.update_content(block_id, content.clone(), properties),
            BlockMutation::ChangeType {
                block_id,
                block_type,
            } => store.change_type(block_id, *block_type),
            BlockMutation::Move { block_id, to_index } => store.move_block(block_id, *to_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DatabaseMutation {
    AddProperty {
        definition: PropertyDefinition,
    },
    UpdateProperty {
        property_id: PropertyId,
        patch: PropertyPatch,
    },
    RemoveProperty {
        property_id: PropertyId,
    },
    /// Row with all of its initial values
    AddRow {
        row: Row,
    },
    UpdateRow {
        row_id: RowId,
        values: RowValues,
    },
    DeleteRow {
        row_id: RowId,
    },
    /// Add or replace a view
    PutView {
        view: View,
    },
    RemoveView {
        view_id: ViewId,
    },
    Rename {
        name: String,
    },
}

impl DatabaseMutation {
    /// Replay on another engine with the same schema and rows
    pub fn apply(&self, engine: &mut DatabaseEngine) -> EngineResult<()> {
        match self {
            DatabaseMutation::AddProperty { definition } => engine.add_property(definition.clone()),
            DatabaseMutation::UpdateProperty { property_id, patch } => {
                engine.update_property(property_id, patch)
            }
            DatabaseMutation::RemoveProperty { property_id } => engine.remove_property(property_id),
            DatabaseMutation::AddRow { row } => engine.insert_row(row.clone()),
            DatabaseMutation::UpdateRow { row_id, values } => engine.update_row(row_id, values.clone()),
            DatabaseMutation::DeleteRow { row_id } => {
                engine.delete_row(row_id);
                Ok(())
            }
            DatabaseMutation::PutView { view } => {
                if engine.database().view(&view.id).is_some() {
                    engine.update_view(view.clone())
                } else {
                    engine.add_view(view.clone())
                }
            }
            DatabaseMutation::RemoveView { view_id } => engine.remove_view(view_id),
            DatabaseMutation::Rename { name } => engine.rename(name.clone()),
        }
    }
}
