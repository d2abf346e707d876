//! Messages exchanged between collaborating actors.
//!
//! ## Wire format
//!
//! Every message is JSON. Mutation events are addressed to one document
//! and carry the replicated operations derived from local edits:
//!
//! ```json
//! {
//!   "type": "mutation",
//!   "id": { "actor": "ana", "seq": 7 },
//!   "stamp": { "wall_ms": 1717000000000, "counter": 0, "actor": "ana" },
//!   "payload": {
//!     "document": "page",
//!     "page_id": "page-1",
//!     "ops": [{ "op": "set_body", "block_id": "b1", "content": "Hi", "properties": {} }]
//!   }
//! }
//! ```
//!
//! Delivery is at-least-once; receivers deduplicate on [`EventId`].

use crate::clock::Stamp;
use folio_model::{
    ActorId, Block, BlockId, BlockProperties, BlockType, DatabaseId, PageId, PropertyDefinition,
    PropertyId, PropertyValue, RowId, View, ViewId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique per event: the issuing actor and its local sequence number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    pub actor: ActorId,
    pub seq: u64,
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.actor, self.seq)
    }
}

/// Replicated operation on a page's blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageOp {
    Insert { block: Block, order_key: String },

    /// Content and properties, written together
    SetBody {
        block_id: BlockId,
        content: String,
        #[serde(default)]
        properties: BlockProperties,
    },

    SetType { block_id: BlockId, block_type: BlockType },

    Move { block_id: BlockId, order_key: String },

    Delete { block_id: BlockId },
}

impl PageOp {
    pub fn block_id(&self) -> &BlockId {
        match self {
            PageOp::Insert { block, .. } => &block.id,
            PageOp::SetBody { block_id, .. }
            | PageOp::SetType { block_id, .. }
            | PageOp::Move { block_id, .. }
            | PageOp::Delete { block_id } => block_id,
        }
    }
}

/// Replicated operation on a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DatabaseOp {
    /// Add or replace a property definition
    PutProperty { definition: PropertyDefinition },

    RemoveProperty { property_id: PropertyId },

    AddRow {
        row_id: RowId,
        cells: Vec<(PropertyId, PropertyValue)>,
    },

    SetCell {
        row_id: RowId,
        property_id: PropertyId,
        value: PropertyValue,
    },

    DeleteRow { row_id: RowId },

    PutView { view: View },

    RemoveView { view_id: ViewId },

    Rename { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document", rename_all = "snake_case")]
pub enum MutationPayload {
    Page { page_id: PageId, ops: Vec<PageOp> },
    Database { database_id: DatabaseId, ops: Vec<DatabaseOp> },
}

/// One local edit, replicated. All ops share the event's stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub id: EventId,
    pub stamp: Stamp,
    pub payload: MutationPayload,
}

impl MutationEvent {
    pub fn page_id(&self) -> Option<&PageId> {
        match &self.payload {
            MutationPayload::Page { page_id, .. } => Some(page_id),
            MutationPayload::Database { .. } => None,
        }
    }

    pub fn database_id(&self) -> Option<&DatabaseId> {
        match &self.payload {
            MutationPayload::Database { database_id, .. } => Some(database_id),
            MutationPayload::Page { .. } => None,
        }
    }
}

/// A collaborator's caret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub block_id: Option<BlockId>,
    pub position: usize,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Join,
    Update,
    Heartbeat,
    Leave,
}

/// Presence broadcast for one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub actor: ActorId,
    #[serde(default)]
    pub display_name: String,
    pub page_id: PageId,
    pub block_id: Option<BlockId>,
    /// Caret offset as reported by the client; negative values clamp to 0
    pub position: i64,
    pub timestamp_ms: u64,
    pub kind: PresenceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CollabMessage {
    Mutation(MutationEvent),
    Presence(PresenceUpdate),
}

impl CollabMessage {
    /// Actor that sent the message
    pub fn origin(&self) -> &ActorId {
        match self {
            CollabMessage::Mutation(event) => &event.id.actor,
            CollabMessage::Presence(update) => &update.actor,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_message_shape() {
        let message = CollabMessage::Mutation(MutationEvent {
            id: EventId {
                actor: ActorId::from("ana"),
                seq: 7,
            },
            stamp: Stamp::new(1_000, 0, "ana"),
            payload: MutationPayload::Page {
                page_id: PageId::from("page-1"),
                ops: vec![PageOp::Delete {
                    block_id: BlockId::from("b1"),
                }],
            },
        });

        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "mutation");
        assert_eq!(json["id"]["seq"], 7);
        assert_eq!(json["payload"]["document"], "page");
        assert_eq!(json["payload"]["ops"][0]["op"], "delete");

        let decoded = CollabMessage::from_json(&message.to_json().unwrap()).unwrap();
        assert_eq!(decoded.origin(), &ActorId::from("ana"));
    }

    #[test]
    fn test_presence_message_shape() {
        let json = r#"{
            "type": "presence",
            "actor": "ben",
            "displayName": "Ben",
            "pageId": "page-1",
            "blockId": "b2",
            "position": -3,
            "timestampMs": 42,
            "kind": "heartbeat"
        }"#;
        let CollabMessage::Presence(update) = CollabMessage::from_json(json).unwrap() else {
            panic!("expected presence");
        };
        assert_eq!(update.kind, PresenceKind::Heartbeat);
        assert_eq!(update.position, -3);
        assert_eq!(update.block_id, Some(BlockId::from("b2")));
    }
}
