use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{AgentId, ConversationId, MessageId};

/// An inter-agent message.
///
/// Immutable after creation except for the `delivered` flag, which is set once
/// the message has been placed in the receiver's mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: AgentId,
    pub receiver: AgentId,
    pub performative: Performative,
    /// Opaque structured payload.
    #[serde(default)]
    pub content: Value,
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<MessageId>,
    #[serde(default)]
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// The speech-act tag on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performative {
    Request,
    Inform,
    Query,
    Propose,
    AcceptProposal,
    RejectProposal,
    Agree,
    Refuse,
    Failure,
    Cfp,
    Subscribe,
    Cancel,
}

impl Performative {
    /// Negotiation-style performatives that leave a conversation unresolved.
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            Performative::Propose
                | Performative::Cfp
                | Performative::RejectProposal
                | Performative::Query
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Performative::Request => "request",
            Performative::Inform => "inform",
            Performative::Query => "query",
            Performative::Propose => "propose",
            Performative::AcceptProposal => "accept_proposal",
            Performative::RejectProposal => "reject_proposal",
            Performative::Agree => "agree",
            Performative::Refuse => "refuse",
            Performative::Failure => "failure",
            Performative::Cfp => "cfp",
            Performative::Subscribe => "subscribe",
            Performative::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Performative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Performative {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.trim().to_lowercase()))
            .map_err(|_| format!("unknown performative '{s}'"))
    }
}

impl Message {
    /// Start a new conversation.
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        performative: Performative,
        content: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: receiver.into(),
            performative,
            content,
            conversation_id: Uuid::new_v4(),
            in_reply_to: None,
            delivered: false,
            created_at: Utc::now(),
        }
    }

    /// Build a reply that stays in this message's conversation.
    pub fn reply(&self, performative: Performative, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            performative,
            content,
            conversation_id: self.conversation_id,
            in_reply_to: Some(self.id),
            delivered: false,
            created_at: Utc::now(),
        }
    }

    /// The message as a rule-engine stimulus: the content coerced to a record,
    /// with the envelope fields layered on top.
    pub fn to_stimulus(&self) -> serde_json::Map<String, Value> {
        let mut stimulus = crate::payload::coerce_record(self.content.clone());
        stimulus.insert("id".into(), Value::String(self.id.to_string()));
        stimulus.insert("sender".into(), Value::String(self.sender.clone()));
        stimulus.insert(
            "performative".into(),
            Value::String(self.performative.as_str().into()),
        );
        stimulus.insert(
            "conversation_id".into(),
            Value::String(self.conversation_id.to_string()),
        );
        stimulus
    }
}
