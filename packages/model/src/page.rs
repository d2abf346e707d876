use crate::block::Block;
use crate::error::{EngineError, EngineResult, EntityKind};
use crate::ids::{PageId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Sharing flags of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub public: bool,
    pub allow_comments: bool,
    pub allow_editing: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            public: false,
            allow_comments: true,
            allow_editing: true,
        }
    }
}

/// A titled document made of an ordered list of blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    pub parent_id: Option<PageId>,
    pub workspace_id: WorkspaceId,
    /// Blocks in rendering order
    pub content: Vec<Block>,
    #[serde(default)]
    pub permissions: Permissions,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(
        id: PageId,
        title: impl Into<String>,
        workspace_id: WorkspaceId,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            icon: String::new(),
            parent_id: None,
            workspace_id,
            content: Vec::new(),
            permissions: Permissions::default(),
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check block ids are unique and every block's attributes fit its type
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for block in &self.content {
            if !seen.insert(&block.id) {
                return Err(EngineError::duplicate(EntityKind::Block, &block.id));
            }
            block.validate()?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone)]
struct PageNode {
    title: String,
    parent: Option<PageId>,
    children: Vec<PageId>,
}

/// Index of the page hierarchy of a workspace.
///
/// Keeps the `parent_id` chains acyclic: re-parenting a page under itself or
/// one of its descendants is rejected.
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    nodes: HashMap<PageId, PageNode>,
    roots: Vec<PageId>,
}

impl PageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a set of pages (parents may come in any order)
    pub fn from_pages<'a>(pages: impl IntoIterator<Item = &'a Page>) -> EngineResult<Self> {
        let mut tree = Self::new();
        let pages: Vec<&Page> = pages.into_iter().collect();

        for page in &pages {
            if tree.nodes.contains_key(&page.id) {
                return Err(EngineError::duplicate(EntityKind::Page, &page.id));
            }
            tree.nodes.insert(
                page.id.clone(),
                PageNode {
                    title: page.title.clone(),
                    parent: None,
                    children: Vec::new(),
                },
            );
            tree.roots.push(page.id.clone());
        }

        for page in &pages {
            if let Some(parent) = &page.parent_id {
                tree.reparent(&page.id, Some(parent.clone()))?;
            }
        }

        Ok(tree)
    }

    pub fn insert(&mut self, id: PageId, title: impl Into<String>, parent: Option<PageId>) -> EngineResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(EngineError::duplicate(EntityKind::Page, &id));
        }
        if let Some(parent) = &parent {
            if !self.nodes.contains_key(parent) {
                return Err(EngineError::not_found(EntityKind::Page, parent));
            }
        }

        self.nodes.insert(
            id.clone(),
            PageNode {
                title: title.into(),
                parent: None,
                children: Vec::new(),
            },
        );
        self.roots.push(id.clone());
        self.reparent(&id, parent)
    }

    /// Move a page under a new parent (or to the top level)
    pub fn reparent(&mut self, id: &PageId, parent: Option<PageId>) -> EngineResult<()> {
        if !self.nodes.contains_key(id) {
            return Err(EngineError::not_found(EntityKind::Page, id));
        }
        if let Some(parent) = &parent {
            if !self.nodes.contains_key(parent) {
                return Err(EngineError::not_found(EntityKind::Page, parent));
            }
            if parent == id || self.ancestors(parent).contains(id) {
                return Err(EngineError::invalid(format!(
                    "moving page '{}' under '{}' would create a cycle",
                    id, parent
                )));
            }
        }

        self.detach(id);
        match &parent {
            Some(parent_id) => {
                if let Some(node) = self.nodes.get_mut(parent_id) {
                    node.children.push(id.clone());
                }
            }
            None => self.roots.push(id.clone()),
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Remove a page; its children move up to its parent
    pub fn remove(&mut self, id: &PageId) -> EngineResult<()> {
        let node = self
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(EntityKind::Page, id))?;

        for child in &node.children {
            self.reparent(child, node.parent.clone())?;
        }
        self.detach(id);
        self.nodes.remove(id);
        Ok(())
    }

    fn detach(&mut self, id: &PageId) {
        let old_parent = self.nodes.get(id).and_then(|n| n.parent.clone());
        match old_parent {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(&parent_id) {
                    parent.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }
    }

    pub fn contains(&self, id: &PageId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn parent(&self, id: &PageId) -> Option<&PageId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    pub fn children(&self, id: &PageId) -> &[PageId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[PageId] {
        &self.roots
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: &PageId) -> Vec<PageId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if result.contains(parent) {
                break;
            }
            result.push(parent.clone());
            current = self.parent(parent);
        }
        result
    }

    /// Titles from the root down to the page
    pub fn breadcrumb(&self, id: &PageId) -> Vec<String> {
        let mut chain: Vec<PageId> = self.ancestors(id);
        chain.reverse();
        chain.push(id.clone());
        chain
            .iter()
            .filter_map(|p| self.nodes.get(p).map(|n| n.title.clone()))
            .collect()
    }
}
