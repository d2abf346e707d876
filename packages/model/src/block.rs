//! # Blocks
//!
//! A block is the atomic content unit of a page. Its `properties` are a typed
//! attribute set: each key is only valid for some block types, and the set is
//! validated against the block's current type at every boundary.

use crate::error::{EngineError, EngineResult};
use crate::ids::{BlockId, DatabaseId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content a block holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedList,
    NumberedList,
    Checkbox,
    Code,
    Quote,
    Image,
    Table,
    #[serde(rename = "database", alias = "database_embed")]
    DatabaseEmbed,
    Embed,
    Mention,
}

impl BlockType {
    pub const ALL: [BlockType; 14] = [
        BlockType::Paragraph,
        BlockType::Heading1,
        BlockType::Heading2,
        BlockType::Heading3,
        BlockType::BulletedList,
        BlockType::NumberedList,
        BlockType::Checkbox,
        BlockType::Code,
        BlockType::Quote,
        BlockType::Image,
        BlockType::Table,
        BlockType::DatabaseEmbed,
        BlockType::Embed,
        BlockType::Mention,
    ];

    /// Attribute keys valid for this block type
    pub fn allowed_keys(self) -> &'static [PropertyKey] {
        match self {
            BlockType::Checkbox => &[PropertyKey::Checked],
            BlockType::Code => &[PropertyKey::Language],
            BlockType::Image => &[PropertyKey::Url, PropertyKey::Caption],
            BlockType::Embed => &[PropertyKey::Url],
            BlockType::Table => &[PropertyKey::Table],
            BlockType::DatabaseEmbed => &[PropertyKey::DatabaseId],
            BlockType::Mention => &[PropertyKey::Mention],
            BlockType::Paragraph
            | BlockType::Heading1
            | BlockType::Heading2
            | BlockType::Heading3
            | BlockType::BulletedList
            | BlockType::NumberedList
            | BlockType::Quote => &[],
        }
    }

    pub fn allows(self, key: PropertyKey) -> bool {
        self.allowed_keys().contains(&key)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading1",
            BlockType::Heading2 => "heading2",
            BlockType::Heading3 => "heading3",
            BlockType::BulletedList => "bulleted_list",
            BlockType::NumberedList => "numbered_list",
            BlockType::Checkbox => "checkbox",
            BlockType::Code => "code",
            BlockType::Quote => "quote",
            BlockType::Image => "image",
            BlockType::Table => "table",
            BlockType::DatabaseEmbed => "database",
            BlockType::Embed => "embed",
            BlockType::Mention => "mention",
        }
    }

    /// Attributes a freshly created block of this type starts with
    pub fn initial_properties(self) -> BlockProperties {
        match self {
            BlockType::Checkbox => BlockProperties {
                checked: Some(false),
                ..Default::default()
            },
            BlockType::Table => BlockProperties {
                table: Some(TableData::default()),
                ..Default::default()
            },
            _ => BlockProperties::default(),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names of block attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Checked,
    Language,
    Url,
    Caption,
    Table,
    DatabaseId,
    Mention,
}

impl PropertyKey {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyKey::Checked => "checked",
            PropertyKey::Language => "language",
            PropertyKey::Url => "url",
            PropertyKey::Caption => "caption",
            PropertyKey::Table => "table",
            PropertyKey::DatabaseId => "databaseId",
            PropertyKey::Mention => "mention",
        }
    }
}

/// Grid content of a table block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableData {
    pub columns: usize,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub id: String,
    pub cells: Vec<String>,
    #[serde(default)]
    pub is_header: bool,
}

impl Default for TableData {
    /// 3x3 grid with a header row
    fn default() -> Self {
        let mut rows = vec![TableRow {
            id: "header".to_string(),
            cells: (1..=3).map(|i| format!("Column {}", i)).collect(),
            is_header: true,
        }];
        for i in 1..=2 {
            rows.push(TableRow {
                id: format!("row{}", i),
                cells: vec![String::new(); 3],
                is_header: false,
            });
        }
        Self { columns: 3, rows }
    }
}

impl TableData {
    pub fn validate(&self) -> EngineResult<()> {
        if self.columns == 0 {
            return Err(EngineError::invalid("table must have at least one column"));
        }
        for row in &self.rows {
            if row.cells.len() != self.columns {
                return Err(EngineError::invalid(format!(
                    "table row '{}' has {} cells, expected {}",
                    row.id,
                    row.cells.len(),
                    self.columns
                )));
            }
        }
        Ok(())
    }
}

/// Target of a mention block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MentionTarget {
    Page(crate::ids::PageId),
    User(String),
}

/// Typed attribute set of a block.
///
/// Unknown keys are rejected when deserializing; keys that do not belong to
/// the block's type are rejected by [`BlockProperties::validate_for`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlockProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<DatabaseId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<MentionTarget>,
}

impl BlockProperties {
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// Keys currently set
    pub fn keys(&self) -> Vec<PropertyKey> {
        let mut keys = Vec::new();
        if self.checked.is_some() {
            keys.push(PropertyKey::Checked);
        }
        if self.language.is_some() {
            keys.push(PropertyKey::Language);
        }
        if self.url.is_some() {
            keys.push(PropertyKey::Url);
        }
        if self.caption.is_some() {
            keys.push(PropertyKey::Caption);
        }
        if self.table.is_some() {
            keys.push(PropertyKey::Table);
        }
        if self.database_id.is_some() {
            keys.push(PropertyKey::DatabaseId);
        }
        if self.mention.is_some() {
            keys.push(PropertyKey::Mention);
        }
        keys
    }

    pub fn contains(&self, key: PropertyKey) -> bool {
        self.keys().contains(&key)
    }

    /// Check every set key is valid for `block_type`
    pub fn validate_for(&self, block_type: BlockType) -> EngineResult<()> {
        if let Some(key) = self.keys().into_iter().find(|k| !block_type.allows(*k)) {
            return Err(EngineError::invalid(format!(
                "property '{}' is not valid for {} blocks",
                key.as_str(),
                block_type
            )));
        }
        if let Some(table) = &self.table {
            table.validate()?;
        }
        Ok(())
    }

    /// Shallow merge: every key set in `patch` overwrites ours
    pub fn merge(&mut self, patch: &BlockProperties) {
        if let Some(v) = patch.checked {
            self.checked = Some(v);
        }
        if let Some(v) = &patch.language {
            self.language = Some(v.clone());
        }
        if let Some(v) = &patch.url {
            self.url = Some(v.clone());
        }
        if let Some(v) = &patch.caption {
            self.caption = Some(v.clone());
        }
        if let Some(v) = &patch.table {
            self.table = Some(v.clone());
        }
        if let Some(v) = &patch.database_id {
            self.database_id = Some(v.clone());
        }
        if let Some(v) = &patch.mention {
            self.mention = Some(v.clone());
        }
    }

    /// Drop every key that is not valid for `block_type`
    pub fn retain_compatible(&mut self, block_type: BlockType) {
        if !block_type.allows(PropertyKey::Checked) {
            self.checked = None;
        }
        if !block_type.allows(PropertyKey::Language) {
            self.language = None;
        }
        if !block_type.allows(PropertyKey::Url) {
            self.url = None;
        }
        if !block_type.allows(PropertyKey::Caption) {
            self.caption = None;
        }
        if !block_type.allows(PropertyKey::Table) {
            self.table = None;
        }
        if !block_type.allows(PropertyKey::DatabaseId) {
            self.database_id = None;
        }
        if !block_type.allows(PropertyKey::Mention) {
            self.mention = None;
        }
    }

    /// Attributes a block keeps when its type changes to `block_type`:
    /// the new type's initial attributes, overridden by the compatible
    /// ones already set
    pub fn for_type_change(&self, block_type: BlockType) -> BlockProperties {
        let mut kept = self.clone();
        kept.retain_compatible(block_type);
        let mut properties = block_type.initial_properties();
        properties.merge(&kept);
        properties
    }
}

/// Content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub properties: BlockProperties,
}

impl Block {
    pub fn new(id: BlockId, block_type: BlockType, content: impl Into<String>) -> Self {
        Self {
            id,
            block_type,
            content: content.into(),
            properties: block_type.initial_properties(),
        }
    }

    pub fn paragraph(id: BlockId) -> Self {
        Self::new(id, BlockType::Paragraph, "")
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.properties.validate_for(self.block_type)
    }
}
