use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Assistant placeholder waiting for the first token.
    Pending,
    /// Tokens are being appended.
    Streaming,
    Complete,
    Errored,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub content: String,
    #[allow(dead_code)]
    pub created_at: i64,
    pub status: MessageStatus,
    /// Failure reason, set only on Errored messages.
    pub error: Option<String>,
}

impl ChatMessage {
    pub fn is_settled(&self) -> bool {
        matches!(self.status, MessageStatus::Complete | MessageStatus::Errored)
    }
}

/// Why a submission was refused. Both cases are local no-ops, never
/// shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Empty,
    Busy,
}

/// Accepted submission: the caller launches a stream for `prompt` and
/// feeds events back tagged with `stream_id`.
#[derive(Debug, Clone)]
pub struct Submission {
    pub stream_id: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, Copy)]
struct ActiveExchange {
    stream_id: u64,
    message_id: u64,
}

/// One conversation against the agent. Messages are append-only; a
/// settled message is never touched again. Exactly one exchange may be
/// in flight at a time.
#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    is_open: bool,
    active: Option<ActiveExchange>,
    next_id: u64,
    next_stream_id: u64,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl ChatSession {
    pub fn new() -> Self {
        ChatSession {
            messages: Vec::new(),
            is_open: false,
            active: None,
            next_id: 0,
            next_stream_id: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn is_loading(&self) -> bool {
        self.active.is_some()
    }

    pub fn toggle_open(&mut self) {
        self.is_open = !self.is_open;
    }

    pub fn set_open(&mut self, open: bool) {
        self.is_open = open;
    }

    /// Accept one prompt: appends the user message plus an empty
    /// assistant placeholder and marks the exchange active. Callers are
    /// expected to be disabled while loading; the guard here is the
    /// final word either way.
    pub fn submit(&mut self, text: &str) -> Result<Submission, Rejection> {
        if self.active.is_some() {
            return Err(Rejection::Busy);
        }
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(Rejection::Empty);
        }

        self.push_message(Role::User, prompt.to_string(), MessageStatus::Complete);
        let message_id = self.push_message(Role::Assistant, String::new(), MessageStatus::Pending);

        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;
        self.active = Some(ActiveExchange {
            stream_id,
            message_id,
        });

        Ok(Submission {
            stream_id,
            prompt: prompt.to_string(),
        })
    }

    /// Append one token to the active assistant message. Events tagged
    /// with a stale stream id are dropped.
    pub fn push_token(&mut self, stream_id: u64, token: &str) {
        let Some(active) = self.active else { return };
        if active.stream_id != stream_id {
            return;
        }
        if let Some(message) = self.message_mut(active.message_id) {
            if message.status == MessageStatus::Pending {
                message.status = MessageStatus::Streaming;
            }
            message.content.push_str(token);
        }
    }

    /// Clean end of stream: freeze the assistant message as Complete.
    pub fn finish_stream(&mut self, stream_id: u64) {
        self.settle(stream_id, MessageStatus::Complete, None);
    }

    /// Stream failure: freeze the assistant message as Errored, keeping
    /// whatever partial content already arrived.
    pub fn fail_stream(&mut self, stream_id: u64, reason: &str) {
        self.settle(stream_id, MessageStatus::Errored, Some(reason.to_string()));
    }

    /// Re-submit the user prompt that preceded an errored assistant
    /// message. The errored message itself is left untouched.
    pub fn retry(&mut self, message_id: u64) -> Result<Submission, Rejection> {
        if self.active.is_some() {
            return Err(Rejection::Busy);
        }
        let Some(index) = self.messages.iter().position(|m| {
            m.id == message_id && m.role == Role::Assistant && m.status == MessageStatus::Errored
        }) else {
            return Err(Rejection::Empty);
        };
        let Some(prompt) = self.messages[..index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
        else {
            return Err(Rejection::Empty);
        };
        self.submit(&prompt)
    }

    fn settle(&mut self, stream_id: u64, status: MessageStatus, error: Option<String>) {
        let Some(active) = self.active else { return };
        if active.stream_id != stream_id {
            return;
        }
        if let Some(message) = self.message_mut(active.message_id) {
            message.status = status;
            message.error = error;
        }
        self.active = None;
    }

    fn message_mut(&mut self, id: u64) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    fn push_message(&mut self, role: Role, content: String, status: MessageStatus) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id,
            role,
            content,
            created_at: now_secs(),
            status,
            error: None,
        });
        id
    }
}
