//! Wire types for the inference backend
//!
//! Request bodies are serialized as-is. Response bodies are deserialized into
//! loose `*Wire` structs and then validated into the tagged outcomes that the
//! rest of the crate works with, so a malformed or error-carrying response
//! never reaches the session store as a regular reply.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Mood, Persona};

/// Reply text used when the backend returns an empty group response
pub const COLLECTIVE_SILENT: &str = "The collective failed to initialize a response pattern.";

/// Inference API key, redacted from debug output
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key for the authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Body of `POST /api/chat/send`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub persona_id: String,
    pub message: String,
    pub api_key: ApiKey,
}

/// Body of `POST /api/chat/group/send`
#[derive(Debug, Clone, Serialize)]
pub struct GroupChatRequest {
    pub user_id: String,
    pub group_id: String,
    pub message: String,
    pub api_key: ApiKey,
}

/// Body of `POST /api/persona/synthesize`
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub api_key: ApiKey,
}

/// Body of `POST /api/life/reflect`
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionRequest {
    pub persona: Persona,
    pub user_id: String,
    pub api_key: ApiKey,
}

/// A validated one-on-one reply
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaReply {
    pub response: String,
    pub mood: Option<Mood>,
    pub safety_blocked: bool,
    pub retrieved: bool,
}

/// Result of a one-on-one send that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Reply(PersonaReply),
    Failed { message: String },
}

/// One persona's contribution to a group reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupReply {
    pub persona_id: String,
    #[serde(default)]
    pub persona_name: Option<String>,
    pub response: String,
    #[serde(default)]
    pub mood: Option<Mood>,
}

/// Result of a group send that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// Non-empty, in server order
    Replies(Vec<GroupReply>),
    Failed { message: String },
}

/// A generated reflection post
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reflection {
    pub content: String,
    #[serde(default)]
    pub mood_code: Mood,
}

/// Error body returned by the backend on failure
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponseWire {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    mood: Option<Mood>,
    #[serde(default)]
    safety_blocked: Option<bool>,
    #[serde(default)]
    retrieved: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatResponseWire {
    pub(crate) fn validate(self) -> ChatOutcome {
        if let Some(error) = self.error.filter(|e| !e.trim().is_empty()) {
            return ChatOutcome::Failed { message: error };
        }
        match self.response {
            Some(response) => ChatOutcome::Reply(PersonaReply {
                response,
                mood: self.mood,
                safety_blocked: self.safety_blocked.unwrap_or(false),
                retrieved: self.retrieved.unwrap_or(false),
            }),
            None => ChatOutcome::Failed {
                message: "Backend returned no response text".to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupResponseWire {
    #[serde(default)]
    responses: Option<Vec<GroupReply>>,
    #[serde(default)]
    error: Option<String>,
}

impl GroupResponseWire {
    pub(crate) fn validate(self) -> GroupOutcome {
        if let Some(error) = self.error.filter(|e| !e.trim().is_empty()) {
            return GroupOutcome::Failed { message: error };
        }
        match self.responses {
            Some(replies) if !replies.is_empty() => GroupOutcome::Replies(replies),
            _ => GroupOutcome::Failed {
                message: COLLECTIVE_SILENT.to_string(),
            },
        }
    }
}
