//! Display-side view of a conversation.
//!
//! Orders resolved messages by sender timestamp (arrival order breaks
//! ties) and drops re-deliveries of the same envelope, which happen when a
//! message arrives both through the live stream and a history fetch.
//! Messages that could not be opened stay in the view as `Unreadable`.

use std::collections::HashSet;

/// What to show for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Plaintext(String),
    /// Failed verification, decryption, or decoding.
    Unreadable,
    /// Sent by us, but no local copy of the plaintext exists.
    Unavailable,
}

/// One resolved message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    pub sender_id: String,
    /// Unix milliseconds as stamped by the sender.
    pub created_at: i64,
    pub body: MessageBody,
    /// Whether this client's user sent it.
    pub outgoing: bool,
    /// [`Envelope::id`](sealchat_crypto::Envelope::id) of the source envelope.
    pub envelope_id: String,
}

#[derive(Debug, Default)]
pub struct ConversationView {
    messages: Vec<(u64, DisplayMessage)>,
    seen: HashSet<String>,
    next_seq: u64,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message in display order. Returns `false` for duplicates.
    pub fn insert(&mut self, message: DisplayMessage) -> bool {
        if !self.seen.insert(message.envelope_id.clone()) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = (message.created_at, seq);
        let pos = self
            .messages
            .partition_point(|(s, m)| (m.created_at, *s) <= key);
        self.messages.insert(pos, (seq, message));
        true
    }

    pub fn messages(&self) -> impl Iterator<Item = &DisplayMessage> {
        self.messages.iter().map(|(_, m)| m)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages that could not be opened.
    pub fn unreadable_count(&self) -> usize {
        self.messages()
            .filter(|m| m.body == MessageBody::Unreadable)
            .count()
    }
}

impl FromIterator<DisplayMessage> for ConversationView {
    fn from_iter<I: IntoIterator<Item = DisplayMessage>>(iter: I) -> Self {
        let mut view = Self::new();
        for message in iter {
            view.insert(message);
        }
        view
    }
}
