//! Host event seam — what the chat platform hands the guard.

/// Where a message was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Group,
    Private,
}

/// A message event delivered by the host pipeline.
///
/// Ids are opaque strings. Hosts stringify whatever the platform gives
/// them, including absent ids; the guard treats every value as a key.
pub trait HostEvent: Send + Sync {
    fn group_id(&self) -> &str;
    fn sender_id(&self) -> &str;
    /// The bot's own sender id on this platform.
    fn self_id(&self) -> &str;
    fn kind(&self) -> MessageKind;

    /// Drop any response already produced for this event.
    fn clear_result(&mut self);
    /// Stop further handling of this event.
    fn stop_event(&mut self);
}

/// Plain-data event used by the CLI host and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMessage {
    pub group_id: String,
    pub sender_id: String,
    pub self_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub cleared: bool,
    pub stopped: bool,
}

impl GroupMessage {
    /// A human message in a group.
    pub fn new(group_id: &str, sender_id: &str, self_id: &str, content: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            sender_id: sender_id.to_string(),
            self_id: self_id.to_string(),
            kind: MessageKind::Group,
            content: content.to_string(),
            cleared: false,
            stopped: false,
        }
    }

    /// A direct message; the group id is empty.
    pub fn private(sender_id: &str, self_id: &str, content: &str) -> Self {
        Self {
            kind: MessageKind::Private,
            ..Self::new("", sender_id, self_id, content)
        }
    }

    /// The after-send notification for the bot's own message in a group.
    pub fn sent_by_self(group_id: &str, self_id: &str, content: &str) -> Self {
        Self::new(group_id, self_id, self_id, content)
    }

    /// Whether the host was told to drop its response.
    pub fn is_suppressed(&self) -> bool {
        self.cleared && self.stopped
    }
}

impl HostEvent for GroupMessage {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn sender_id(&self) -> &str {
        &self.sender_id
    }

    fn self_id(&self) -> &str {
        &self.self_id
    }

    fn kind(&self) -> MessageKind {
        self.kind
    }

    fn clear_result(&mut self) {
        self.cleared = true;
    }

    fn stop_event(&mut self) {
        self.stopped = true;
    }
}
