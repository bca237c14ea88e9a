//! The service-message entity: a history entry with no user-authored
//! content, describing an event (pin, score, payment, join, expiring media).
//!
//! An entity owns its attachment table and a prepared text derived from it.
//! Construction and edition derive the slots from a decoded payload and
//! generate an initial text immediately, so the entity is renderable before
//! any dependency resolves; the resolver in [`crate::resolver`] regenerates
//! the text whenever resolution state changes.

use chrono::{DateTime, TimeDelta, Utc};

use crate::attachments::{
    Attachments, DependentAttachment, DependentData, DependentPayload, SelfDestruct,
};
use crate::prepared_text::{Link, PreparedText};
use crate::store::MessageStore;
use crate::types::{MessageId, ServicePayload, TextSelection, UserRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMessage {
    id: MessageId,
    from: UserRef,
    date: DateTime<Utc>,
    text: PreparedText,
    pub(crate) attachments: Attachments,
}

impl ServiceMessage {
    /// Builds an entity from a decoded payload and generates its initial
    /// prepared text. For payloads referencing another message the text is a
    /// neutral placeholder until [`update_dependent`] resolves the reference.
    ///
    /// [`update_dependent`]: ServiceMessage::update_dependent
    pub fn new(
        id: MessageId,
        from: UserRef,
        date: DateTime<Utc>,
        payload: &ServicePayload,
    ) -> Self {
        let mut entity = Self {
            id,
            from,
            date,
            text: PreparedText::default(),
            attachments: Attachments::default(),
        };
        entity.apply_payload(payload);
        entity
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn author(&self) -> &UserRef {
        &self.from
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// The current prepared text. Always fully built before the entity is
    /// observable; callers never see a half-regenerated state.
    pub fn prepared_text(&self) -> &PreparedText {
        &self.text
    }

    /// Re-derives the attachment slots from an updated payload and re-runs
    /// the resolver. Attaching a different dependent variant silently
    /// replaces the previous one; a still-present self-destruct timer keeps
    /// its already-fixed destruction time.
    pub fn apply_edition(&mut self, payload: &ServicePayload, store: &dyn MessageStore) {
        self.apply_payload(payload);
        self.update_dependent(false, store);
    }

    /// Remaining time until the attached media self-destructs, or `None`
    /// when the message carries no self-destruct timer. The first query
    /// starts the countdown; zero means the media payload must be removed.
    pub fn get_self_destruct_in(&mut self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.attachments
            .self_destruct_mut()
            .map(|slot| slot.remaining(now))
    }

    // Read-only projections consumed by the render / hit-test layer.

    pub fn selected_text(&self, selection: TextSelection) -> &str {
        self.text.selected(selection)
    }

    pub fn in_dialogs_text(&self) -> &str {
        &self.text.text
    }

    pub fn in_reply_text(&self) -> &str {
        &self.text.text
    }

    /// Derives the attachment slots from a payload and generates the
    /// matching text. Shared by construction and edition.
    fn apply_payload(&mut self, payload: &ServicePayload) {
        self.attachments.detach_dependent();
        let previous_self_destruct = self.attachments.detach_self_destruct();

        match payload {
            ServicePayload::Plain { text } => {
                self.set_service_text(PreparedText::plain(text.clone()));
            }
            ServicePayload::Pinned { target } => {
                self.attachments
                    .attach_dependent(DependentAttachment::pinned(*target));
                self.regenerate_dependent_text();
            }
            ServicePayload::GameScore { target, score } => {
                self.attachments
                    .attach_dependent(DependentAttachment::game_score(*target, *score));
                self.regenerate_dependent_text();
            }
            ServicePayload::PaymentSent { target, amount } => {
                self.attachments
                    .attach_dependent(DependentAttachment::payment(*target, amount.clone()));
                self.regenerate_dependent_text();
            }
            ServicePayload::JoinedByLink { inviter } => {
                self.set_service_text(prepare_joined_text(&self.from, inviter));
            }
            ServicePayload::ExpiringMedia { media, ttl_ms } => {
                // A timer whose destruct_at is already fixed survives the
                // edition unchanged; only the slot's presence is re-derived.
                let slot = match previous_self_destruct {
                    Some(existing) if existing.media() == *media => existing,
                    _ => SelfDestruct::new(*media, *ttl_ms),
                };
                self.attachments.attach_self_destruct(slot);
                self.set_service_text(PreparedText::plain(media.label()));
            }
        }
    }

    pub(crate) fn set_service_text(&mut self, prepared: PreparedText) {
        self.text = prepared;
    }

    /// Rebuilds the prepared text from the dependent attachment's current
    /// resolution state. Links are built fresh on every regeneration.
    pub(crate) fn regenerate_dependent_text(&mut self) {
        let Some(dependent) = self.attachments.dependent() else {
            return;
        };
        let prepared = match &dependent.payload {
            DependentPayload::Pinned => prepare_pinned_text(&self.from, &dependent.data),
            DependentPayload::GameScore { score } => {
                prepare_game_score_text(&self.from, &dependent.data, *score)
            }
            DependentPayload::PaymentSent { amount } => {
                prepare_payment_text(&self.from, &dependent.data, amount)
            }
        };
        self.set_service_text(prepared);
    }
}

fn prepare_pinned_text(from: &UserRef, data: &DependentData) -> PreparedText {
    match &data.resolved {
        Some(target) => PreparedText::builder()
            .push_plain(&format!("{} pinned \u{201c}", from.name))
            .push_link(&target.summary, Link::JumpToMessage { id: target.id })
            .push_plain("\u{201d}")
            .build(),
        None => PreparedText::plain(format!("{} pinned a message", from.name)),
    }
}

fn prepare_game_score_text(from: &UserRef, data: &DependentData, score: i32) -> PreparedText {
    match &data.resolved {
        Some(target) => PreparedText::builder()
            .push_plain(&format!("{} scored {} in ", from.name, score))
            .push_link(&target.summary, Link::JumpToMessage { id: target.id })
            .build(),
        None => PreparedText::plain(format!("{} scored {}", from.name, score)),
    }
}

fn prepare_payment_text(from: &UserRef, data: &DependentData, amount: &str) -> PreparedText {
    match &data.resolved {
        Some(target) => PreparedText::builder()
            .push_plain(&format!("{} sent a payment of {} for ", from.name, amount))
            .push_link(&target.summary, Link::JumpToMessage { id: target.id })
            .build(),
        None => PreparedText::plain(format!("{} sent a payment of {}", from.name, amount)),
    }
}

/// Joined-via-invite text. The inviter is resolved synchronously at
/// construction; this never goes through the dependency resolver.
fn prepare_joined_text(from: &UserRef, inviter: &UserRef) -> PreparedText {
    if inviter.id == from.id {
        return PreparedText::plain(format!("{} joined via invite link", from.name));
    }
    PreparedText::builder()
        .push_plain(&format!("{} joined via ", from.name))
        .push_link(&inviter.name, Link::OpenProfile { user: inviter.id })
        .push_plain("'s invite link")
        .build()
}
