use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a message within its owning history.
///
/// Ids are assigned by the surrounding system (the wire layer for inbound
/// messages, the history for locally synthesized ones); this crate only
/// compares and indexes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A display-ready reference to a participant: id plus the name the text
/// generators render. Participants of the same conversation are always
/// resolvable synchronously, so this carries the name by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}

impl UserRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
        }
    }
}

/// Media kinds that can carry a self-destruct timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Short label used when the media stands in for message text.
    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Photo => "Photo",
            MediaKind::Video => "Video",
        }
    }
}

/// A decoded inbound service payload.
///
/// Wire parsing happens upstream; by the time a payload reaches this crate it
/// is already structured. Each variant maps to one service-message kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServicePayload {
    /// Pre-rendered service text with no dependent data.
    Plain { text: String },

    /// "Pinned a message", referencing the pinned message when known.
    Pinned { target: Option<MessageId> },

    /// Game score posted, optionally referencing the originating game message.
    GameScore { target: Option<MessageId>, score: i32 },

    /// Payment confirmation with a pre-formatted amount, optionally
    /// referencing the invoice message it settles.
    PaymentSent { target: Option<MessageId>, amount: String },

    /// Locally synthesized "joined via invite link" event. The inviter is a
    /// participant of the same conversation and resolves synchronously.
    JoinedByLink { inviter: UserRef },

    /// Content message whose media self-destructs `ttl_ms` milliseconds after
    /// the countdown is first started.
    ExpiringMedia { media: MediaKind, ttl_ms: i64 },
}

/// Half-open byte range selected inside rendered text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelection {
    pub start: usize,
    pub end: usize,
}

impl TextSelection {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}
