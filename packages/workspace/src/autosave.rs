//! # Auto-save
//!
//! Debounced, retrying persistence of document snapshots.
//!
//! ## Semantics
//!
//! - Each edit hands the saver a full snapshot; a snapshot arriving while
//!   another is waiting replaces it and restarts the debounce window
//! - A failed save keeps the snapshot and retries with exponential backoff,
//!   up to `max_attempts`; after that it waits for the next edit or
//!   [`AutoSaver::retry_now`]
//! - Local state is never rolled back; failures only show up in
//!   [`SaveStatus`]
//! - Dropping every handle flushes the last pending snapshot once
//!
//! ```text
//! Saved ──edit──▶ Pending ──debounce──▶ Saving ──ok──▶ Saved
//!                    ▲                    │
//!                    └──edit / backoff── Unsaved { attempts, last_error }
//! ```

use crate::config::RetryPolicy;
use crate::error::StoreResult;
use crate::persistence::DocumentStore;
use folio_model::{Database, Page};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Document state to persist
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Page(Page),
    Database(Database),
}

impl Snapshot {
    async fn save_to(&self, store: &dyn DocumentStore) -> StoreResult<()> {
        match self {
            Snapshot::Page(page) => store.save_page(page).await,
            Snapshot::Database(database) => store.save_database(database).await,
        }
    }

    fn id(&self) -> &str {
        match self {
            Snapshot::Page(page) => page.id.as_str(),
            Snapshot::Database(database) => database.id.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SaveStatus {
    #[default]
    Saved,
    /// Waiting out the debounce window
    Pending,
    Saving,
    /// Last save failed; the snapshot is still queued
    Unsaved { attempts: u32, last_error: String },
}

impl SaveStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveStatus::Saved)
    }
}

enum Command {
    Snapshot(Snapshot),
    RetryNow,
    Flush(oneshot::Sender<SaveStatus>),
}

/// Handle to a background save task
#[derive(Debug)]
pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Snapshot(snapshot) => write!(f, "Snapshot({})", snapshot.id()),
            Command::RetryNow => f.write_str("RetryNow"),
            Command::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl AutoSaver {
    pub fn spawn(store: Arc<dyn DocumentStore>, debounce: Duration, retry: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SaveStatus::Saved);
        let worker = SaveWorker {
            store,
            status: status_tx,
            debounce,
            retry,
            pending: None,
            due: None,
            failures: 0,
            retries: 0,
        };
        let task = tokio::spawn(worker.run(rx));
        Self { tx, status, task }
    }

    /// Queue the latest state; saved once edits pause for the debounce window
    pub fn notify(&self, snapshot: Snapshot) {
        if self.tx.send(Command::Snapshot(snapshot)).is_err() {
            warn!("Auto-saver stopped, snapshot dropped");
        }
    }

    /// Retry a failed save right away
    pub fn retry_now(&self) {
        let _ = self.tx.send(Command::RetryNow);
    }

    /// Save anything pending now and report the resulting status
    pub async fn flush(&self) -> SaveStatus {
        let (reply, response) = oneshot::channel();
        if self.tx.send(Command::Flush(reply)).is_err() {
            return self.status();
        }
        response.await.unwrap_or_else(|_| self.status())
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Stop the task after a final save attempt
    pub async fn shutdown(self) -> SaveStatus {
        let AutoSaver { tx, status, task } = self;
        drop(tx);
        if let Err(error) = task.await {
            warn!(error = %error, "Auto-save task ended abnormally");
        }
        let last = status.borrow().clone();
        last
    }
}

struct SaveWorker {
    store: Arc<dyn DocumentStore>,
    status: watch::Sender<SaveStatus>,
    debounce: Duration,
    retry: RetryPolicy,
    pending: Option<Snapshot>,
    /// When the pending snapshot is due; `None` while idle or parked
    due: Option<Instant>,
    /// Consecutive failed saves
    failures: u32,
    /// Backoff retries used since the last edit or manual retry
    retries: u32,
}

impl SaveWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            let command = match self.due {
                Some(deadline) => {
                    tokio::select! {
                        command = rx.recv() => command,
                        _ = sleep_until(deadline) => {
                            self.save().await;
                            continue;
                        }
                    }
                }
                None => rx.recv().await,
            };

            match command {
                Some(Command::Snapshot(snapshot)) => {
                    self.pending = Some(snapshot);
                    self.due = Some(Instant::now() + self.debounce);
                    self.retries = 0;
                    self.status.send_replace(SaveStatus::Pending);
                }
                Some(Command::RetryNow) => {
                    if self.pending.is_some() {
                        self.retries = 0;
                        self.due = Some(Instant::now());
                    }
                }
                Some(Command::Flush(reply)) => {
                    if self.pending.is_some() {
                        self.save().await;
                    }
                    let _ = reply.send(self.status.borrow().clone());
                }
                None => {
                    if self.pending.is_some() {
                        debug!("Final save before shutdown");
                        self.save().await;
                    }
                    break;
                }
            }
        }
    }

    async fn save(&mut self) {
        let Some(snapshot) = self.pending.take() else {
            self.due = None;
            return;
        };
        self.status.send_replace(SaveStatus::Saving);

        match snapshot.save_to(self.store.as_ref()).await {
            Ok(()) => {
                info!(id = snapshot.id(), "Saved");
                self.failures = 0;
                self.due = None;
                self.status.send_replace(SaveStatus::Saved);
            }
            Err(error) => {
                self.failures += 1;
                self.retries += 1;
                let retry = error.is_transient() && self.retries < self.retry.max_attempts;
                self.due = retry.then(|| Instant::now() + self.retry.backoff(self.retries));
                warn!(
                    id = snapshot.id(),
                    attempts = self.failures,
                    retry,
                    error = %error,
                    "Save failed, changes kept locally"
                );
                self.status.send_replace(SaveStatus::Unsaved {
                    attempts: self.failures,
                    last_error: error.to_string(),
                });
                self.pending = Some(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStore;
    use chrono::Utc;
    use folio_model::{PageId, WorkspaceId};
    use tokio::time::sleep;

    fn page(title: &str) -> Snapshot {
        Snapshot::Page(Page::new(
            PageId::from("p1"),
            title,
            WorkspaceId::from("ws"),
            "ana",
            Utc::now(),
        ))
    }

    fn saver(store: &InMemoryStore, retry: RetryPolicy) -> AutoSaver {
        AutoSaver::spawn(Arc::new(store.clone()), Duration::from_secs(2), retry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_within_window_coalesce() {
        let store = InMemoryStore::new();
        let saver = saver(&store, RetryPolicy::default());

        for title in ["a", "ab", "abc"] {
            saver.notify(page(title));
            sleep(Duration::from_millis(500)).await;
        }
        assert_eq!(saver.status(), SaveStatus::Pending);

        // Two seconds after the last edit
        sleep(Duration::from_millis(1_400)).await;
        assert_eq!(store.saves(), 0);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(store.saves(), 1);
        assert_eq!(store.load_page(&PageId::from("p1")).await.unwrap().title, "abc");
        assert_eq!(saver.status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_retries_with_backoff() {
        let store = InMemoryStore::new();
        store.fail_next_saves(2);
        let saver = saver(&store, RetryPolicy::default());

        saver.notify(page("draft"));
        sleep(Duration::from_millis(2_100)).await;
        assert!(matches!(saver.status(), SaveStatus::Unsaved { attempts: 1, .. }));

        // 200ms then 400ms of backoff
        sleep(Duration::from_millis(200)).await;
        assert!(matches!(saver.status(), SaveStatus::Unsaved { attempts: 2, .. }));
        sleep(Duration::from_millis(400)).await;
        assert_eq!(saver.status(), SaveStatus::Saved);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parks_after_max_attempts_until_retry() {
        let store = InMemoryStore::new();
        store.fail_next_saves(100);
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        let saver = saver(&store, policy);

        saver.notify(page("draft"));
        sleep(Duration::from_secs(60)).await;
        assert!(matches!(saver.status(), SaveStatus::Unsaved { attempts: 2, .. }));
        assert_eq!(store.saves(), 0);

        store.fail_next_saves(0);
        saver.retry_now();
        assert_eq!(saver.flush().await, SaveStatus::Saved);
        assert_eq!(store.saves(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending_snapshot() {
        let store = InMemoryStore::new();
        let saver = saver(&store, RetryPolicy::default());
        saver.notify(page("last words"));

        assert_eq!(saver.shutdown().await, SaveStatus::Saved);
        assert_eq!(store.load_page(&PageId::from("p1")).await.unwrap().title, "last words");
    }
}
