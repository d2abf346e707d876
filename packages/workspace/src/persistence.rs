//! Persistence boundary.
//!
//! The collaboration layer reads and writes whole documents through a
//! [`DocumentStore`]. Two implementations ship here: [`InMemoryStore`] for
//! tests and demos (it can be told to fail) and [`FileStore`], which keeps
//! one JSON file per document:
//!
//! ```text
//! <root>/
//!   pages/<page id>.json
//!   databases/<database id>.json
//! ```

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use folio_model::{Database, DatabaseId, EntityKind, Page, PageId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_page(&self, id: &PageId) -> StoreResult<Page>;

    async fn save_page(&self, page: &Page) -> StoreResult<()>;

    async fn load_database(&self, id: &DatabaseId) -> StoreResult<Database>;

    async fn save_database(&self, database: &Database) -> StoreResult<()>;
}

/// Shared in-memory store; clones see the same documents
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pages: Arc<RwLock<HashMap<PageId, Page>>>,
    databases: Arc<RwLock<HashMap<DatabaseId, Database>>>,
    failures: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` saves fail with a network error
    pub fn fail_next_saves(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Successful saves so far
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> StoreResult<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Network("connection reset".into()));
        }
        Ok(())
    }

    pub async fn insert_page(&self, page: Page) {
        self.pages.write().await.insert(page.id.clone(), page);
    }

    pub async fn insert_database(&self, database: Database) {
        self.databases.write().await.insert(database.id.clone(), database);
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn load_page(&self, id: &PageId) -> StoreResult<Page> {
        self.pages
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Page, id))
    }

    async fn save_page(&self, page: &Page) -> StoreResult<()> {
        self.take_failure()?;
        self.pages.write().await.insert(page.id.clone(), page.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_database(&self, id: &DatabaseId) -> StoreResult<Database> {
        self.databases
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(EntityKind::Database, id))
    }

    async fn save_database(&self, database: &Database) -> StoreResult<()> {
        self.take_failure()?;
        self.databases
            .write()
            .await
            .insert(database.id.clone(), database.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One JSON file per document under a root directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, folder: &str, kind: EntityKind, id: &str) -> StoreResult<PathBuf> {
        let safe = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\', '\0']);
        if !safe {
            return Err(StoreError::PermissionDenied(format!("invalid {} id '{}'", kind, id)));
        }
        Ok(self.root.join(folder).join(format!("{}.json", id)))
    }

    async fn read(&self, path: &Path, kind: EntityKind, id: &str) -> StoreResult<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => Ok(json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::not_found(kind, id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Write through a temporary file so readers never see half a document
    async fn write(&self, path: &Path, json: String) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    #[instrument(skip(self))]
    async fn load_page(&self, id: &PageId) -> StoreResult<Page> {
        let path = self.path_for("pages", EntityKind::Page, id.as_str())?;
        let json = self.read(&path, EntityKind::Page, id.as_str()).await?;
        Ok(Page::from_json(&json)?)
    }

    #[instrument(skip(self, page), fields(page_id = %page.id))]
    async fn save_page(&self, page: &Page) -> StoreResult<()> {
        let path = self.path_for("pages", EntityKind::Page, page.id.as_str())?;
        self.write(&path, page.to_json()?).await?;
        debug!(path = %path.display(), "Saved page");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_database(&self, id: &DatabaseId) -> StoreResult<Database> {
        let path = self.path_for("databases", EntityKind::Database, id.as_str())?;
        let json = self.read(&path, EntityKind::Database, id.as_str()).await?;
        Ok(Database::from_json(&json)?)
    }

    #[instrument(skip(self, database), fields(database_id = %database.id))]
    async fn save_database(&self, database: &Database) -> StoreResult<()> {
        let path = self.path_for("databases", EntityKind::Database, database.id.as_str())?;
        self.write(&path, database.to_json()?).await?;
        debug!(path = %path.display(), "Saved database");
        Ok(())
    }
}
