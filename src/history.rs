//! The owning side of the engine: entity ownership, the waiting-on-id index,
//! and the event entry points that drive resolution and self-destruction.
//!
//! All mutation happens on one logical thread; events (insertion, edition,
//! availability, eviction, ticks) are applied one at a time, so an entity is
//! never observable with half-regenerated text.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::entity::ServiceMessage;
use crate::error::{Result, UndertoneError};
use crate::prepared_text::PreparedText;
use crate::store::{MediaRemover, MessageStore, NoMediaRemover};
use crate::types::{MessageId, ServicePayload, UserRef};

/// Configuration for the service-message engine.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EngineConfig {
    /// Whether to enable detailed logging of resolution steps
    pub enable_debug_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_debug_logging: false,
        }
    }
}

/// Owns the service-message entities of one conversation and reacts to the
/// discrete events that mutate them.
///
/// Dependencies are indexed by id: when the store reports a message as newly
/// available (or evicted), only the entities actually waiting on that id are
/// re-driven, instead of polling every entity.
pub struct ServiceHistory {
    config: EngineConfig,
    store: Arc<dyn MessageStore>,
    media_remover: Arc<dyn MediaRemover>,
    entities: HashMap<MessageId, ServiceMessage>,

    /// Dependency id -> ids of entities whose text depends on it.
    waiting: HashMap<MessageId, HashSet<MessageId>>,
}

impl ServiceHistory {
    /// Creates a history with the default configuration and no media remover.
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_config(store, Arc::new(NoMediaRemover), EngineConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn MessageStore>,
        media_remover: Arc<dyn MediaRemover>,
        config: EngineConfig,
    ) -> Self {
        Self {
            config,
            store,
            media_remover,
            entities: HashMap::new(),
            waiting: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: MessageId) -> Option<&ServiceMessage> {
        self.entities.get(&id)
    }

    /// Creates an entity from a decoded payload, runs the resolver once (so
    /// it is immediately renderable, resolved or not), and indexes any
    /// pending dependency. Re-delivery of an existing id replaces the entity.
    pub fn insert(
        &mut self,
        id: MessageId,
        from: UserRef,
        date: DateTime<Utc>,
        payload: &ServicePayload,
    ) -> bool {
        if let Some(previous) = self.entities.remove(&id) {
            tracing::warn!(
                target: "undertone::history",
                "service message {} re-delivered, replacing",
                id
            );
            self.deindex_dependency(&previous);
        }

        let mut entity = ServiceMessage::new(id, from, date, payload);
        let resolved_now = entity.update_dependent(true, self.store.as_ref());
        self.index_dependency(&entity);

        if self.config.enable_debug_logging {
            tracing::debug!(
                target: "undertone::history",
                "inserted service message {} (dependency: {:?}, ready: {})",
                id,
                entity.dependency_msg_id(),
                entity.notification_ready()
            );
        }

        self.entities.insert(id, entity);
        resolved_now
    }

    /// Re-derives an entity's attachments from an updated payload and re-runs
    /// the resolver, rewiring the dependency index to the new reference.
    pub fn apply_edition(&mut self, id: MessageId, payload: &ServicePayload) -> Result<()> {
        let mut entity = self
            .entities
            .remove(&id)
            .ok_or(UndertoneError::UnknownMessage(id))?;
        self.deindex_dependency(&entity);
        entity.apply_edition(payload, self.store.as_ref());
        self.index_dependency(&entity);
        self.entities.insert(id, entity);
        Ok(())
    }

    /// The "message now available" event from the store. Re-drives exactly
    /// the entities waiting on `id`; returns how many regenerated their
    /// text. An id nobody waits on — including one whose waiters were
    /// destroyed in the meantime — is a guarded no-op.
    pub fn dependency_available(&mut self, id: MessageId) -> usize {
        self.redrive_waiters(id)
    }

    /// The store eviction notice: weak references to `id` must be cleared
    /// before the next read, and neutral text regenerated.
    pub fn dependency_evicted(&mut self, id: MessageId) -> usize {
        self.redrive_waiters(id)
    }

    fn redrive_waiters(&mut self, id: MessageId) -> usize {
        let Some(waiters) = self.waiting.get(&id).cloned() else {
            if self.config.enable_debug_logging {
                tracing::debug!(
                    target: "undertone::history",
                    "no entity waits on message {}, ignoring event",
                    id
                );
            }
            return 0;
        };

        let mut regenerated = 0;
        for entity_id in waiters {
            // The index can momentarily name entities that were removed in
            // the same batch of events; those are skipped, not faults.
            if let Some(entity) = self.entities.get_mut(&entity_id)
                && entity.update_dependent(false, self.store.as_ref())
            {
                regenerated += 1;
            }
        }
        regenerated
    }

    /// Destroys an entity. Its indexed dependency is dropped, which abandons
    /// (not cancels) any outstanding fetch: a later availability event for
    /// the id simply finds no waiter.
    pub fn remove(&mut self, id: MessageId) -> Option<ServiceMessage> {
        let entity = self.entities.remove(&id)?;
        self.deindex_dependency(&entity);
        Some(entity)
    }

    /// Periodic self-destruct tick. Queries every entity carrying a timer
    /// (which starts countdowns not yet running), hands each newly expired
    /// media payload to the remover exactly once, and returns the ids that
    /// expired on this tick.
    pub fn check_self_destruct(&mut self, now: DateTime<Utc>) -> Vec<MessageId> {
        let mut expired = Vec::new();
        for (id, entity) in self.entities.iter_mut() {
            let Some(slot) = entity.attachments.self_destruct_mut() else {
                continue;
            };
            if slot.remaining(now) == TimeDelta::zero() && !slot.media_removed {
                slot.media_removed = true;
                self.media_remover.remove_media(*id, slot.media());
                expired.push(*id);
                tracing::debug!(
                    target: "undertone::history",
                    "media of service message {} self-destructed",
                    id
                );
            }
        }
        expired
    }

    /// Manually re-drives one entity's resolver, e.g. after a forced redraw.
    pub fn update_dependent(&mut self, id: MessageId, force: bool) -> Result<bool> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(UndertoneError::UnknownMessage(id))?;
        Ok(entity.update_dependent(force, self.store.as_ref()))
    }

    pub fn notification_ready(&self, id: MessageId) -> Result<bool> {
        self.entities
            .get(&id)
            .map(ServiceMessage::notification_ready)
            .ok_or(UndertoneError::UnknownMessage(id))
    }

    pub fn prepared_text(&self, id: MessageId) -> Result<&PreparedText> {
        self.entities
            .get(&id)
            .map(ServiceMessage::prepared_text)
            .ok_or(UndertoneError::UnknownMessage(id))
    }

    /// Remaining self-destruct time for one entity, starting its countdown
    /// if needed.
    pub fn get_self_destruct_in(&mut self, id: MessageId, now: DateTime<Utc>) -> Result<TimeDelta> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(UndertoneError::UnknownMessage(id))?;
        entity
            .get_self_destruct_in(now)
            .ok_or(UndertoneError::NoSelfDestruct(id))
    }

    fn index_dependency(&mut self, entity: &ServiceMessage) {
        if let Some(dependency) = entity.dependency_msg_id() {
            self.waiting.entry(dependency).or_default().insert(entity.id());
        }
    }

    fn deindex_dependency(&mut self, entity: &ServiceMessage) {
        if let Some(dependency) = entity.dependency_msg_id()
            && let Some(waiters) = self.waiting.get_mut(&dependency)
        {
            waiters.remove(&entity.id());
            if waiters.is_empty() {
                self.waiting.remove(&dependency);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, MessageRef};
    use crate::types::MediaKind;
    use std::sync::Mutex;

    struct RecordingRemover {
        removed: Mutex<Vec<(MessageId, MediaKind)>>,
    }

    impl RecordingRemover {
        fn new() -> Self {
            Self {
                removed: Mutex::new(Vec::new()),
            }
        }
    }

    impl MediaRemover for RecordingRemover {
        fn remove_media(&self, id: MessageId, media: MediaKind) {
            self.removed.lock().unwrap().push((id, media));
        }
    }

    fn setup() -> (Arc<InMemoryStore>, ServiceHistory) {
        let (store, _fetch_rx) = InMemoryStore::new();
        let store = Arc::new(store);
        let history = ServiceHistory::new(store.clone());
        (store, history)
    }

    fn alice() -> UserRef {
        UserRef::new(1, "Alice")
    }

    #[test]
    fn test_payment_scenario_end_to_end() {
        let (store, mut history) = setup();

        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::PaymentSent {
                target: Some(MessageId(42)),
                amount: "$5.00".into(),
            },
        );
        assert_eq!(
            history.prepared_text(MessageId(100)).unwrap().text,
            "Alice sent a payment of $5.00"
        );
        assert!(!history.notification_ready(MessageId(100)).unwrap());

        // The referenced message arrives; the availability event re-drives
        // exactly the waiting entity.
        store.insert(MessageRef::new(MessageId(42), "Invoice #7"));
        assert_eq!(history.dependency_available(MessageId(42)), 1);

        let prepared = history.prepared_text(MessageId(100)).unwrap();
        assert_eq!(prepared.text, "Alice sent a payment of $5.00 for Invoice #7");
        assert_eq!(prepared.links.len(), 1);
        assert!(history.notification_ready(MessageId(100)).unwrap());

        // Replaying the event changes nothing.
        assert_eq!(history.dependency_available(MessageId(42)), 0);
    }

    #[test]
    fn test_insert_resolves_immediately_when_present() {
        let (store, mut history) = setup();
        store.insert(MessageRef::new(MessageId(9), "release notes"));

        let resolved = history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Pinned {
                target: Some(MessageId(9)),
            },
        );
        assert!(resolved);
        assert_eq!(
            history.prepared_text(MessageId(100)).unwrap().text,
            "Alice pinned \u{201c}release notes\u{201d}"
        );
        assert!(history.notification_ready(MessageId(100)).unwrap());
    }

    #[test]
    fn test_stale_availability_event_after_remove() {
        let (store, mut history) = setup();

        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Pinned {
                target: Some(MessageId(9)),
            },
        );
        assert!(history.remove(MessageId(100)).is_some());

        // The fetch completes after the entity was destroyed: guarded no-op.
        store.insert(MessageRef::new(MessageId(9), "release notes"));
        assert_eq!(history.dependency_available(MessageId(9)), 0);
        assert!(history.remove(MessageId(100)).is_none());
    }

    #[test]
    fn test_eviction_event_clears_weak_references() {
        let (store, mut history) = setup();
        store.insert(MessageRef::new(MessageId(9), "release notes"));

        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Pinned {
                target: Some(MessageId(9)),
            },
        );
        assert!(history.notification_ready(MessageId(100)).unwrap());

        store.evict(MessageId(9));
        assert_eq!(history.dependency_evicted(MessageId(9)), 1);
        assert_eq!(
            history.prepared_text(MessageId(100)).unwrap().text,
            "Alice pinned a message"
        );
        assert!(!history.notification_ready(MessageId(100)).unwrap());
    }

    #[test]
    fn test_edition_rewires_waiting_index() {
        let (store, mut history) = setup();

        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Pinned {
                target: Some(MessageId(9)),
            },
        );

        // Edit changes the message into a payment referencing another id.
        history
            .apply_edition(
                MessageId(100),
                &ServicePayload::PaymentSent {
                    target: Some(MessageId(10)),
                    amount: "$1.00".into(),
                },
            )
            .unwrap();

        // The old dependency no longer drives this entity.
        store.insert(MessageRef::new(MessageId(9), "release notes"));
        assert_eq!(history.dependency_available(MessageId(9)), 0);

        store.insert(MessageRef::new(MessageId(10), "Invoice"));
        assert_eq!(history.dependency_available(MessageId(10)), 1);
        assert_eq!(
            history.prepared_text(MessageId(100)).unwrap().text,
            "Alice sent a payment of $1.00 for Invoice"
        );
    }

    #[test]
    fn test_apply_edition_unknown_message() {
        let (_store, mut history) = setup();
        let err = history
            .apply_edition(MessageId(1), &ServicePayload::Plain { text: "x".into() })
            .unwrap_err();
        assert!(matches!(err, UndertoneError::UnknownMessage(MessageId(1))));
    }

    #[test]
    fn test_self_destruct_tick_fires_remover_once() {
        let (store, _fetch_rx) = InMemoryStore::new();
        let remover = Arc::new(RecordingRemover::new());
        let mut history = ServiceHistory::with_config(
            Arc::new(store),
            remover.clone(),
            EngineConfig::default(),
        );

        let t0 = Utc::now();
        history.insert(
            MessageId(100),
            alice(),
            t0,
            &ServicePayload::ExpiringMedia {
                media: MediaKind::Photo,
                ttl_ms: 1_000,
            },
        );

        // First tick starts the countdown; nothing expires yet.
        assert!(history.check_self_destruct(t0).is_empty());
        assert_eq!(
            history.get_self_destruct_in(MessageId(100), t0).unwrap(),
            TimeDelta::milliseconds(1_000)
        );

        // Past the window: removed exactly once, then stays expired.
        let later = t0 + TimeDelta::milliseconds(1_500);
        assert_eq!(history.check_self_destruct(later), vec![MessageId(100)]);
        assert!(history.check_self_destruct(later).is_empty());
        assert_eq!(
            history.get_self_destruct_in(MessageId(100), later).unwrap(),
            TimeDelta::zero()
        );

        let removed = remover.removed.lock().unwrap();
        assert_eq!(removed.as_slice(), &[(MessageId(100), MediaKind::Photo)]);
    }

    #[test]
    fn test_get_self_destruct_in_errors() {
        let (_store, mut history) = setup();
        let now = Utc::now();

        assert!(matches!(
            history.get_self_destruct_in(MessageId(1), now),
            Err(UndertoneError::UnknownMessage(MessageId(1)))
        ));

        history.insert(
            MessageId(1),
            alice(),
            now,
            &ServicePayload::Plain { text: "hi".into() },
        );
        assert!(matches!(
            history.get_self_destruct_in(MessageId(1), now),
            Err(UndertoneError::NoSelfDestruct(MessageId(1)))
        ));
    }

    #[test]
    fn test_redelivery_replaces_entity() {
        let (_store, mut history) = setup();

        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Plain {
                text: "first".into(),
            },
        );
        history.insert(
            MessageId(100),
            alice(),
            Utc::now(),
            &ServicePayload::Plain {
                text: "second".into(),
            },
        );

        assert_eq!(history.len(), 1);
        assert_eq!(
            history.prepared_text(MessageId(100)).unwrap().text,
            "second"
        );
    }
}
