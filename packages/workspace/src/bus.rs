//! In-process pub/sub for collaboration messages.
//!
//! Every actor publishes its [`CollabMessage`]s on a shared
//! [`CollabBus`] and reads everyone else's. Sends are fire-and-forget: a
//! message published while nobody listens is dropped, and a subscriber
//! that falls more than `capacity` messages behind skips ahead.

use crate::events::CollabMessage;
use folio_model::ActorId;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CollabBus {
    tx: broadcast::Sender<CollabMessage>,
}

impl CollabBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Send to every subscriber; returns how many received it
    pub fn publish(&self, message: CollabMessage) -> usize {
        match self.tx.send(message) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No subscribers, message dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollabMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Messages from every actor except `actor`
    pub fn remote_stream(&self, actor: ActorId) -> BoxStream<'static, CollabMessage> {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| match item {
            Ok(message) if message.origin() != &actor => Some(message),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(actor = %actor, skipped, "Subscriber lagged, messages skipped");
                None
            }
        });
        Box::pin(stream)
    }

    /// Run `handler` on every remote message until the bus closes
    pub fn on_remote_event<F>(&self, actor: ActorId, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(CollabMessage) + Send + 'static,
    {
        let mut stream = self.remote_stream(actor);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                handler(message);
            }
        })
    }
}

impl Default for CollabBus {
    fn default() -> Self {
        Self::new(256)
    }
}
