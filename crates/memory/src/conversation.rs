//! Bounded conversation log and the memory store that owns all of them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use shellwright_core::ConversationId;

/// Role of a message in a conversation, spec.md §3 "Message".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            persona_id: None,
            channel_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            persona_id: None,
            channel_id: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// A single conversation's bounded message log, spec.md §3 "Conversation".
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    fn new(id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity_at: now,
            messages: Vec::new(),
        }
    }
}

/// Telemetry-only view of memory state, spec.md §4.C `summary()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub conversation_count: usize,
    pub total_messages: usize,
    pub oldest_activity: Option<DateTime<Utc>>,
    pub newest_activity: Option<DateTime<Utc>>,
}

/// Owns every conversation, enforcing both per-conversation and global
/// retention bounds (spec.md §4.C, §3 "Lifecycle").
pub struct ConversationMemory {
    max_conversations: usize,
    max_messages_per_conversation: usize,
    conversations: RwLock<HashMap<ConversationId, Conversation>>,
}

impl ConversationMemory {
    pub fn new(max_conversations: usize, max_messages_per_conversation: usize) -> Self {
        Self {
            max_conversations,
            max_messages_per_conversation,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Create the conversation lazily, append `message`, bump
    /// `lastActivityAt`, then enforce both caps (spec.md §4.C `append`).
    pub fn append(&self, id: ConversationId, message: Message) {
        let mut conversations = self.conversations.write();

        let needs_eviction = !conversations.contains_key(&id) && conversations.len() >= self.max_conversations;
        if needs_eviction {
            if let Some(lru_id) = conversations
                .values()
                .min_by_key(|c| c.last_activity_at)
                .map(|c| c.id)
            {
                conversations.remove(&lru_id);
            }
        }

        let conversation = conversations.entry(id).or_insert_with(|| Conversation::new(id));
        conversation.messages.push(message);
        conversation.last_activity_at = Utc::now();

        while conversation.messages.len() > self.max_messages_per_conversation {
            conversation.messages.remove(0);
        }
    }

    /// Last `n` messages, in order (spec.md §4.C `recent`).
    pub fn recent(&self, id: ConversationId, n: usize) -> Vec<Message> {
        self.conversations
            .read()
            .get(&id)
            .map(|c| {
                let start = c.messages.len().saturating_sub(n);
                c.messages[start..].to_vec()
            })
            .unwrap_or_default()
    }

    /// Messages trimmed from the front until both `max_messages` and
    /// `max_chars` hold; a message is never split (spec.md §4.C
    /// `contextFor`).
    pub fn context_for(&self, id: ConversationId, max_messages: usize, max_chars: usize) -> Vec<Message> {
        let conversations = self.conversations.read();
        let Some(conversation) = conversations.get(&id) else {
            return Vec::new();
        };

        let start = conversation.messages.len().saturating_sub(max_messages);
        let mut window: Vec<Message> = conversation.messages[start..].to_vec();

        let mut total_chars: usize = window.iter().map(|m| m.content.chars().count()).sum();
        while total_chars > max_chars && !window.is_empty() {
            let dropped = window.remove(0);
            total_chars -= dropped.content.chars().count();
        }

        window
    }

    pub fn get(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.read().get(&id).cloned()
    }

    pub fn summary(&self) -> Summary {
        let conversations = self.conversations.read();
        let total_messages = conversations.values().map(|c| c.messages.len()).sum();
        let oldest_activity = conversations.values().map(|c| c.last_activity_at).min();
        let newest_activity = conversations.values().map(|c| c.last_activity_at).max();

        Summary {
            conversation_count: conversations.len(),
            total_messages,
            oldest_activity,
            newest_activity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_conversation_lazily_and_orders_messages() {
        let memory = ConversationMemory::new(10, 10);
        let id = ConversationId::new();

        memory.append(id, Message::user("hello"));
        memory.append(id, Message::assistant("hi there"));

        let recent = memory.recent(id, 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[1].role, Role::Assistant);
    }

    #[test]
    fn per_conversation_cap_drops_oldest_message_fifo() {
        let memory = ConversationMemory::new(10, 3);
        let id = ConversationId::new();

        for i in 0..5 {
            memory.append(id, Message::user(format!("msg-{i}")));
        }

        let recent = memory.recent(id, 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg-2");
        assert_eq!(recent[2].content, "msg-4");
    }

    #[test]
    fn global_cap_evicts_least_recently_active_conversation() {
        let memory = ConversationMemory::new(2, 10);
        let a = ConversationId::new();
        let b = ConversationId::new();
        let c = ConversationId::new();

        memory.append(a, Message::user("a1"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        memory.append(b, Message::user("b1"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        memory.append(c, Message::user("c1"));

        assert!(memory.get(a).is_none());
        assert!(memory.get(b).is_some());
        assert!(memory.get(c).is_some());
    }

    #[test]
    fn context_for_never_splits_a_message_and_respects_char_budget() {
        let memory = ConversationMemory::new(10, 10);
        let id = ConversationId::new();

        memory.append(id, Message::user("a".repeat(50)));
        memory.append(id, Message::user("b".repeat(50)));
        memory.append(id, Message::user("c".repeat(10)));

        let context = memory.context_for(id, 10, 60);
        // Only the last message (10 chars) plus the previous (50 chars) = 60
        // fits; the oldest 50-char message must be dropped whole.
        assert_eq!(context.len(), 2);
        assert_eq!(context[0].content.len(), 50);
        assert_eq!(context[1].content.len(), 10);
    }
}
