use serde::{Deserialize, Serialize};

use crate::model::SearchResult;
use crate::relay::ChatTurn;

pub const GREETING: &str = "Hello! I'm your healthcare assistant. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResult>>,
    #[serde(default)]
    pub is_done: bool,
}

/// Append-only chat log for one session.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    counter: u64,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: vec![Message {
                id: "system-init".to_string(),
                text: GREETING.to_string(),
                sender: Sender::System,
                search_results: None,
                is_done: false,
            }],
            counter: 0,
        }
    }

    fn push(
        &mut self,
        text: String,
        sender: Sender,
        search_results: Option<Vec<SearchResult>>,
    ) -> &Message {
        self.counter += 1;
        self.messages.push(Message {
            id: format!("msg-{}", self.counter),
            text,
            sender,
            search_results,
            is_done: false,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.push(text.into(), Sender::User, None)
    }

    pub fn push_ai(&mut self, text: impl Into<String>, results: Vec<SearchResult>) -> &Message {
        self.push(text.into(), Sender::Ai, Some(results))
    }

    pub fn push_system(&mut self, text: impl Into<String>) -> &Message {
        self.push(text.into(), Sender::System, None)
    }

    /// Returns false when no message has that id.
    pub fn mark_done(&mut self, id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(m) => {
                m.is_done = true;
                true
            }
            None => false,
        }
    }

    pub fn last_ai_id(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Ai)
            .map(|m| m.id.as_str())
    }

    /// The turn sent to the relay: only the most recent user message, as the
    /// web chat does.
    pub fn latest_user_turn(&self) -> Option<ChatTurn> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .map(|m| ChatTurn {
                role: "user".to_string(),
                content: m.text.clone(),
            })
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
