use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Page identifier
    PageId
);
define_id!(
    /// Block identifier (unique within its page)
    BlockId
);
define_id!(
    /// Database identifier
    DatabaseId
);
define_id!(
    /// Property (column) identifier
    PropertyId
);
define_id!(
    /// Row identifier
    RowId
);
define_id!(
    /// View identifier
    ViewId
);
define_id!(
    /// Select option identifier
    OptionId
);
define_id!(
    /// A collaborating actor (user + client)
    ActorId
);
define_id!(
    /// Workspace identifier
    WorkspaceId
);
define_id!(
    /// Comment identifier
    CommentId
);

/// Generate a document seed from a document key using CRC32
pub fn get_document_seed(key: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential ID generator for entities created within one editing session.
///
/// The seed mixes the document key, the actor and a per-session nonce, so two
/// actors (or two sessions of the same actor) never mint the same id, and the
/// counter never goes backwards, so ids are never reused within a session.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    count: u64,
}

impl IdGenerator {
    pub fn new(document: &str, actor: &ActorId) -> Self {
        let nonce = uuid::Uuid::new_v4();
        Self::from_seed(get_document_seed(&format!("{}/{}/{}", document, actor, nonce)))
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential ID
    pub fn next_id(&mut self) -> String {
        self.count += 1;
        format!("{}-{}", self.seed, self.count)
    }

    pub fn next_block_id(&mut self) -> BlockId {
        BlockId(format!("block_{}", self.next_id()))
    }

    pub fn next_row_id(&mut self) -> RowId {
        RowId(format!("row_{}", self.next_id()))
    }

    pub fn next_comment_id(&mut self) -> CommentId {
        CommentId(format!("comment_{}", self.next_id()))
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_seed_is_stable() {
        let a = get_document_seed("page-1");
        let b = get_document_seed("page-1");
        assert_eq!(a, b);
        assert_ne!(a, get_document_seed("page-2"));
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdGenerator::from_seed("abc".to_string());

        let id1 = gen.next_block_id();
        let id2 = gen.next_block_id();
        let id3 = gen.next_row_id();

        assert_eq!(id1.as_str(), "block_abc-1");
        assert_eq!(id2.as_str(), "block_abc-2");
        assert_eq!(id3.as_str(), "row_abc-3");
    }

    #[test]
    fn test_sessions_do_not_collide() {
        let actor = ActorId::from("alice");
        let mut first = IdGenerator::new("page-1", &actor);
        let mut second = IdGenerator::new("page-1", &actor);

        assert_ne!(first.next_block_id(), second.next_block_id());
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = PageId::from("page-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"page-1\"");
    }
}
