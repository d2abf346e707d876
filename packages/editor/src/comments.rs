//! Comment threads attached to blocks

use chrono::{DateTime, Utc};
use folio_model::{ActorId, BlockId, CommentId, EngineError, EngineResult, EntityKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: CommentId,
    pub author: ActorId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub block_id: BlockId,
    pub author: ActorId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// All comments of one page, in creation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentThreads {
    comments: Vec<Comment>,
}

fn trimmed(content: &str) -> EngineResult<String> {
    let content = content.trim();
    if content.is_empty() {
        return Err(EngineError::invalid("comment content is empty"));
    }
    Ok(content.to_string())
}

impl CommentThreads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn all(&self) -> &[Comment] {
        &self.comments
    }

    pub fn get(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    fn get_mut(&mut self, id: &CommentId) -> EngineResult<&mut Comment> {
        self.comments
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| EngineError::not_found(EntityKind::Comment, id))
    }

    /// Start a thread on `block_id`. Content is trimmed and must not be empty.
    pub fn add(
        &mut self,
        id: CommentId,
        block_id: BlockId,
        author: ActorId,
        content: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<&Comment> {
        if self.get(&id).is_some() {
            return Err(EngineError::duplicate(EntityKind::Comment, &id));
        }
        let content = trimmed(content)?;
        self.comments.push(Comment {
            id,
            block_id,
            author,
            content,
            created_at: at,
            resolved: false,
            replies: Vec::new(),
        });
        let index = self.comments.len() - 1;
        Ok(&self.comments[index])
    }

    pub fn reply(
        &mut self,
        comment_id: &CommentId,
        id: CommentId,
        author: ActorId,
        content: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<&Comment> {
        let content = trimmed(content)?;
        let comment = self.get_mut(comment_id)?;
        comment.replies.push(Reply {
            id,
            author,
            content,
            created_at: at,
        });
        Ok(comment)
    }

    /// Resolve or reopen a thread
    pub fn set_resolved(&mut self, comment_id: &CommentId, resolved: bool) -> EngineResult<()> {
        self.get_mut(comment_id)?.resolved = resolved;
        Ok(())
    }

    pub fn for_block(&self, block_id: &BlockId) -> Vec<&Comment> {
        self.comments.iter().filter(|c| &c.block_id == block_id).collect()
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|c| !c.resolved)
    }

    /// Drop threads whose block no longer exists; returns how many were dropped
    pub fn retain_blocks(&mut self, exists: impl Fn(&BlockId) -> bool) -> usize {
        let before = self.comments.len();
        self.comments.retain(|c| exists(&c.block_id));
        before - self.comments.len()
    }
}
