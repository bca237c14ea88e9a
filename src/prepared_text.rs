//! Prepared service text: rendered plain text plus an ordered list of
//! clickable spans.
//!
//! Text generators build a [`PreparedText`] through [`PreparedTextBuilder`];
//! the render and hit-test layers consume it unchanged. Link targets are pure
//! data — activation is interpreted by the embedding application, never here.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::{MessageId, TextSelection, UserId};

/// Navigation target carried by a clickable span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Link {
    /// Scroll the viewer to the referenced message.
    JumpToMessage { id: MessageId },

    /// Open a participant's profile.
    OpenProfile { user: UserId },
}

/// A clickable span: a byte range into [`PreparedText::text`] plus its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLink {
    pub range: Range<usize>,
    pub link: Link,
}

/// The rendered text of a service message together with its clickable spans,
/// ordered by position in the text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreparedText {
    pub text: String,
    pub links: Vec<TextLink>,
}

impl PreparedText {
    /// Plain text with no clickable spans.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            links: Vec::new(),
        }
    }

    pub fn builder() -> PreparedTextBuilder {
        PreparedTextBuilder::default()
    }

    /// True until a generator has produced any text for the entity.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.links.is_empty()
    }

    /// The selected slice of the text, clamped to valid bounds. Selections
    /// that cut a character in half yield the empty string rather than
    /// panicking; the selection layer owns boundary snapping.
    pub fn selected(&self, selection: TextSelection) -> &str {
        let end = selection.end.min(self.text.len());
        let start = selection.start.min(end);
        self.text.get(start..end).unwrap_or("")
    }

    /// Link target covering the given byte offset, for hit-testing.
    pub fn link_at(&self, offset: usize) -> Option<&Link> {
        self.links
            .iter()
            .find(|span| span.range.contains(&offset))
            .map(|span| &span.link)
    }
}

/// Incremental builder keeping link ranges in sync with the growing text.
#[derive(Debug, Default)]
pub struct PreparedTextBuilder {
    text: String,
    links: Vec<TextLink>,
}

impl PreparedTextBuilder {
    pub fn push_plain(mut self, text: &str) -> Self {
        self.text.push_str(text);
        self
    }

    /// Appends `label` and records it as a clickable span targeting `link`.
    pub fn push_link(mut self, label: &str, link: Link) -> Self {
        let start = self.text.len();
        self.text.push_str(label);
        self.links.push(TextLink {
            range: start..self.text.len(),
            link,
        });
        self
    }

    pub fn build(self) -> PreparedText {
        PreparedText {
            text: self.text,
            links: self.links,
        }
    }
}
