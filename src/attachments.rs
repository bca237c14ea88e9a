//! Optional typed attachments of a service message.
//!
//! A service message's kind is determined entirely by which slots are
//! populated: at most one dependent-data variant (pinned reference, game
//! score, payment confirmation) plus, independently, at most one
//! self-destruct timer. The original system modeled this with a runtime
//! component table; here the same contract is a pair of options.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::prepared_text::Link;
use crate::store::MessageRef;
use crate::types::{MediaKind, MessageId};

/// State shared by every dependent-data variant: the reference by id to
/// another message, the resolved snapshot once available, and the click
/// handler derived from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DependentData {
    /// Referenced message. `None` for self-contained variants such as a game
    /// score without a forwarded original.
    pub msg_id: Option<MessageId>,

    /// Snapshot of the referenced message, present only while the store still
    /// contains it. Cleared on eviction before the next read.
    pub resolved: Option<MessageRef>,

    /// Jump link to the referenced message; rebuilt, never mutated, whenever
    /// `resolved` changes.
    pub link: Option<Link>,

    /// Whether a fetch request already went out for the current unresolved
    /// episode. Resets on resolution and on eviction.
    #[serde(skip)]
    pub(crate) fetch_requested: bool,
}

impl DependentData {
    pub fn new(msg_id: Option<MessageId>) -> Self {
        Self {
            msg_id,
            ..Self::default()
        }
    }

    /// True when there is nothing to resolve (no referenced id at all).
    pub fn is_self_contained(&self) -> bool {
        self.msg_id.is_none()
    }
}

/// The mutually exclusive dependent-data variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DependentPayload {
    /// "Pinned a message" — text derives purely from resolution state.
    Pinned,

    /// Game score posted.
    GameScore { score: i32 },

    /// Payment confirmation with a pre-formatted amount.
    PaymentSent { amount: String },
}

/// One dependent-data attachment: shared resolution state plus the variant
/// payload it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentAttachment {
    pub data: DependentData,
    pub payload: DependentPayload,
}

impl DependentAttachment {
    pub fn pinned(target: Option<MessageId>) -> Self {
        Self {
            data: DependentData::new(target),
            payload: DependentPayload::Pinned,
        }
    }

    pub fn game_score(target: Option<MessageId>, score: i32) -> Self {
        Self {
            data: DependentData::new(target),
            payload: DependentPayload::GameScore { score },
        }
    }

    pub fn payment(target: Option<MessageId>, amount: impl Into<String>) -> Self {
        Self {
            data: DependentData::new(target),
            payload: DependentPayload::PaymentSent {
                amount: amount.into(),
            },
        }
    }
}

/// Self-destruct timer for an attached media payload.
///
/// `destruct_at` is fixed on the first countdown query and never changes
/// afterwards; the slot outlives expiry so repeated queries keep returning
/// zero instead of opening a new window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfDestruct {
    media: MediaKind,
    time_to_live_ms: i64,
    destruct_at: Option<DateTime<Utc>>,

    /// Latched once the expired media payload has been handed to the remover.
    #[serde(skip)]
    pub(crate) media_removed: bool,
}

impl SelfDestruct {
    pub fn new(media: MediaKind, ttl_ms: i64) -> Self {
        Self {
            media,
            time_to_live_ms: ttl_ms,
            destruct_at: None,
            media_removed: false,
        }
    }

    pub fn media(&self) -> MediaKind {
        self.media
    }

    /// The absolute destruction time, once the countdown has started.
    pub fn destruct_at(&self) -> Option<DateTime<Utc>> {
        self.destruct_at
    }

    /// Remaining time until destruction. The first call starts the countdown
    /// by fixing `destruct_at = now + time_to_live`; later calls measure
    /// against that fixed point. Zero means the media has expired.
    pub fn remaining(&mut self, now: DateTime<Utc>) -> TimeDelta {
        let destruct_at = *self
            .destruct_at
            .get_or_insert(now + TimeDelta::milliseconds(self.time_to_live_ms));
        (destruct_at - now).max(TimeDelta::zero())
    }
}

/// Per-message sparse attachment table: the exclusive dependent-data group
/// and the independent self-destruct group, each with typed get / attach /
/// detach access. Purely structural — no side effects beyond storage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachments {
    dependent: Option<DependentAttachment>,
    self_destruct: Option<SelfDestruct>,
}

impl Attachments {
    pub fn dependent(&self) -> Option<&DependentAttachment> {
        self.dependent.as_ref()
    }

    pub fn dependent_mut(&mut self) -> Option<&mut DependentAttachment> {
        self.dependent.as_mut()
    }

    /// Attaches a dependent-data variant, silently replacing any existing one
    /// (last-write-wins: inbound edits legitimately change a service
    /// message's kind). Returns the replaced attachment, if any.
    pub fn attach_dependent(
        &mut self,
        attachment: DependentAttachment,
    ) -> Option<DependentAttachment> {
        self.dependent.replace(attachment)
    }

    pub fn detach_dependent(&mut self) -> Option<DependentAttachment> {
        self.dependent.take()
    }

    pub fn self_destruct(&self) -> Option<&SelfDestruct> {
        self.self_destruct.as_ref()
    }

    pub fn self_destruct_mut(&mut self) -> Option<&mut SelfDestruct> {
        self.self_destruct.as_mut()
    }

    pub fn attach_self_destruct(&mut self, slot: SelfDestruct) -> Option<SelfDestruct> {
        self.self_destruct.replace(slot)
    }

    pub fn detach_self_destruct(&mut self) -> Option<SelfDestruct> {
        self.self_destruct.take()
    }
}
