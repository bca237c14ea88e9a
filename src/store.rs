//! Collaborator interfaces around the engine: the message store, the network
//! fetch layer, and the media remover.
//!
//! The engine never reaches into these ambiently — they are injected, which
//! keeps the core runnable against the in-memory reference store below.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{MediaKind, MessageId};

/// A cheap snapshot of a stored message. Holding one confers no ownership;
/// the resolver re-validates against the store before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: MessageId,

    /// Short human-readable summary used as a link label: the message's text
    /// snippet, or a media-type label when it carries no text.
    pub summary: String,
}

impl MessageRef {
    pub fn new(id: MessageId, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
        }
    }
}

/// The history container owning and indexing messages by id.
pub trait MessageStore: Send + Sync {
    /// Look up a message by id. `None` while it is absent or after eviction.
    fn lookup(&self, id: MessageId) -> Option<MessageRef>;

    /// Fire-and-forget request to retrieve a missing message. Must not block;
    /// the result re-enters the engine later as an availability event.
    fn request_fetch(&self, id: MessageId);
}

/// Network side of [`MessageStore::request_fetch`].
#[async_trait]
pub trait MessageFetcher: Send + Sync {
    /// Retrieve a message by id, or `None` if the remote side has nothing.
    async fn fetch(&self, id: MessageId) -> Option<MessageRef>;
}

/// Removes the media payload of an entity whose self-destruct countdown
/// reached zero.
pub trait MediaRemover: Send + Sync {
    fn remove_media(&self, id: MessageId, media: MediaKind);
}

/// Remover that does nothing, for embeddings without media storage.
#[derive(Debug, Default)]
pub struct NoMediaRemover;

impl MediaRemover for NoMediaRemover {
    fn remove_media(&self, _id: MessageId, _media: MediaKind) {
        // Do nothing
    }
}

/// In-memory reference implementation of [`MessageStore`], shared between the
/// model thread and the fetch task. Fetch requests are queued on an unbounded
/// channel whose receiver feeds [`run_fetch_loop`].
#[derive(Debug)]
pub struct InMemoryStore {
    messages: DashMap<MessageId, MessageRef>,
    fetch_tx: mpsc::UnboundedSender<MessageId>,
}

impl InMemoryStore {
    /// Creates the store together with the receiving end of its fetch queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageId>) {
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        (
            Self {
                messages: DashMap::new(),
                fetch_tx,
            },
            fetch_rx,
        )
    }

    /// Inserts or replaces a message, making it visible to `lookup`.
    pub fn insert(&self, message: MessageRef) {
        self.messages.insert(message.id, message);
    }

    /// Drops a message from the store. Returns whether it was present.
    pub fn evict(&self, id: MessageId) -> bool {
        self.messages.remove(&id).is_some()
    }
}

impl MessageStore for InMemoryStore {
    fn lookup(&self, id: MessageId) -> Option<MessageRef> {
        self.messages.get(&id).map(|entry| entry.value().clone())
    }

    fn request_fetch(&self, id: MessageId) {
        // The receiver may be gone during shutdown; the request is then
        // simply abandoned, matching the no-cancellation contract.
        if self.fetch_tx.send(id).is_err() {
            tracing::debug!(
                target: "undertone::store",
                "fetch queue closed, dropping request for message {}",
                id
            );
        }
    }
}

/// Drains a store's fetch queue: asks the fetcher for each requested id,
/// publishes successful results back into the store, and reports each
/// now-available id on `available_tx` so the owning history can re-drive its
/// waiting entities. Runs until the queue closes.
pub async fn run_fetch_loop(
    mut fetch_rx: mpsc::UnboundedReceiver<MessageId>,
    store: Arc<InMemoryStore>,
    fetcher: Arc<dyn MessageFetcher>,
    available_tx: mpsc::UnboundedSender<MessageId>,
) {
    while let Some(id) = fetch_rx.recv().await {
        match fetcher.fetch(id).await {
            Some(message) => {
                store.insert(message);
                if available_tx.send(id).is_err() {
                    // Nobody listens for availability anymore; stop fetching.
                    break;
                }
            }
            None => {
                tracing::warn!(
                    target: "undertone::store",
                    "fetch for message {} returned nothing",
                    id
                );
            }
        }
    }
}
