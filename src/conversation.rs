//! Conversation state machine.
//!
//! Owns the ordered message list and the pending flag. `idle -> pending` on an
//! accepted [`Conversation::submit`], `pending -> idle` on
//! [`Conversation::resolve`], whatever the outcome.

use crate::api::{Answer, ApiError};

pub const FALLBACK_ERROR: &str = "Failed to get response. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One turn in the conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub sources: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
        }
    }

    pub fn assistant(content: impl Into<String>, sources: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: Some(sources.into()),
        }
    }

    /// Sources worth showing: present and non-blank.
    pub fn visible_sources(&self) -> Option<&str> {
        self.sources
            .as_deref()
            .filter(|sources| !sources.trim().is_empty())
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    pending: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Accept a question. Returns the trimmed text to dispatch, or `None` when
    /// the input is blank or a request is already in flight.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        let question = text.trim();
        if question.is_empty() || self.pending {
            tracing::debug!(pending = self.pending, "submit rejected");
            return None;
        }

        self.messages.push(Message::user(question));
        self.pending = true;
        tracing::debug!("conversation: idle -> pending");

        Some(question.to_string())
    }

    /// Record the outcome of the in-flight request. Failures become an
    /// assistant turn and are not propagated further.
    pub fn resolve(&mut self, outcome: Result<Answer, ApiError>) {
        let message = match outcome {
            Ok(answer) => Message::assistant(answer.answer, answer.sources),
            Err(err) => {
                tracing::warn!("question failed: {}", err);
                Message::assistant(error_text(&err), "")
            }
        };

        self.messages.push(message);
        self.pending = false;
        tracing::debug!("conversation: pending -> idle");
    }

    /// Clear every message. An in-flight request keeps `pending` set and
    /// still appends its result when it resolves.
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

fn error_text(err: &ApiError) -> String {
    let reason = err.to_string();
    if reason.trim().is_empty() {
        format!("⚠️ Error: {}", FALLBACK_ERROR)
    } else {
        format!("⚠️ Error: {}", reason)
    }
}
