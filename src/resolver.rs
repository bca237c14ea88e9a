//! Dependency resolution for service messages.
//!
//! A dependent attachment sits in one of four states: no dependency at all,
//! self-contained (no referenced id), unresolved (id known, snapshot
//! missing), or resolved. [`ServiceMessage::update_dependent`] drives the
//! transitions against the injected store; the prepared text is regenerated
//! exactly when a transition occurs (or on `force`), so repeated calls with
//! no external change are complete no-ops.

use crate::entity::ServiceMessage;
use crate::prepared_text::Link;
use crate::store::MessageStore;
use crate::types::MessageId;

/// What a resolution step did to the attachment, decided before any text
/// regeneration happens.
enum Step {
    /// Nothing to resolve, or nothing changed.
    Noop,
    /// The referenced message became (or was re-read as) resolved.
    Resolved,
    /// A previously resolved reference disappeared from the store.
    Evicted,
    /// Still unresolved; regenerate placeholder text only under `force`
    /// when no text was ever generated.
    StillMissing,
}

impl ServiceMessage {
    /// Drives the dependency state machine one step against the store.
    /// Returns whether the prepared text was regenerated.
    ///
    /// The resolved snapshot is re-validated on every call: if the store
    /// evicted the referenced message, the attachment falls back to
    /// unresolved, its link is cleared, and neutral text is regenerated.
    /// A missing reference triggers at most one fire-and-forget fetch
    /// request per unresolved episode.
    pub fn update_dependent(&mut self, force: bool, store: &dyn MessageStore) -> bool {
        let step = self.step_dependent(force, store);
        match step {
            Step::Noop => false,
            Step::Resolved | Step::Evicted => {
                self.regenerate_dependent_text();
                true
            }
            Step::StillMissing => {
                if force && self.prepared_text().is_empty() {
                    self.regenerate_dependent_text();
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Mutates the attachment's resolution state; text regeneration is left
    /// to the caller so the attachment borrow ends first.
    fn step_dependent(&mut self, force: bool, store: &dyn MessageStore) -> Step {
        let Some(dependent) = self.attachments.dependent_mut() else {
            return Step::Noop;
        };
        let Some(msg_id) = dependent.data.msg_id else {
            // Self-contained: text was generated once at attach time.
            return Step::Noop;
        };

        let was_resolved = dependent.data.resolved.is_some();
        match store.lookup(msg_id) {
            Some(target) => {
                if was_resolved && !force {
                    return Step::Noop;
                }
                dependent.data.link = Some(Link::JumpToMessage { id: target.id });
                dependent.data.resolved = Some(target);
                dependent.data.fetch_requested = false;
                Step::Resolved
            }
            None => {
                if was_resolved {
                    tracing::debug!(
                        target: "undertone::resolver",
                        "dependency {} evicted from store, reverting to unresolved",
                        msg_id
                    );
                    dependent.data.resolved = None;
                    dependent.data.link = None;
                    dependent.data.fetch_requested = false;
                }
                if !dependent.data.fetch_requested {
                    store.request_fetch(msg_id);
                    dependent.data.fetch_requested = true;
                }
                if was_resolved {
                    Step::Evicted
                } else {
                    Step::StillMissing
                }
            }
        }
    }

    /// Id of the message this entity's text depends on. `None` when there is
    /// no dependent attachment or it is self-contained. The owning history
    /// uses this to index entities waiting on a given id instead of polling.
    pub fn dependency_msg_id(&self) -> Option<MessageId> {
        self.attachments
            .dependent()
            .and_then(|dependent| dependent.data.msg_id)
    }

    /// Whether a user-facing notification can name this message's content
    /// correctly. False only while genuinely unresolved with a pending id.
    pub fn notification_ready(&self) -> bool {
        match self.attachments.dependent() {
            Some(dependent) => {
                dependent.data.resolved.is_some() || dependent.data.msg_id.is_none()
            }
            None => true,
        }
    }
}
