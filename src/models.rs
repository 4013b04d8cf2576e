//! Domain types shared by the gateways, the session store, and the chat views
//!
//! Row types mirror the hosted tables (`personas`, `groups`, `group_members`,
//! `conversations`, `messages`, `persona_posts`, `persona_knowledge`). Fields
//! the tables may omit carry serde defaults so partial selects deserialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EmrysError, Result};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// The signed-in user
    User,
    /// A persona reply
    Persona,
    /// Client- or server-generated notices
    System,
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Persona => write!(f, "persona"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Emotional tag attached to persona replies
///
/// Unknown tags from the backend are kept verbatim in [`Mood::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum Mood {
    #[default]
    Default,
    Happy,
    Sad,
    Angry,
    Nostalgic,
    Curious,
    Protective,
    Distant,
    Other(String),
}

impl From<String> for Mood {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "default" | "" => Self::Default,
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "nostalgic" => Self::Nostalgic,
            "curious" => Self::Curious,
            "protective" => Self::Protective,
            "distant" => Self::Distant,
            _ => Self::Other(value),
        }
    }
}

impl From<Mood> for String {
    fn from(mood: Mood) -> Self {
        mood.as_str().to_string()
    }
}

impl Mood {
    /// Wire tag for this mood
    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Nostalgic => "nostalgic",
            Self::Curious => "curious",
            Self::Protective => "protective",
            Self::Distant => "distant",
            Self::Other(tag) => tag,
        }
    }

    /// Status line shown in a one-on-one chat
    pub fn direct_label(&self) -> &str {
        match self {
            Self::Default => "Neural Synchronization Stable",
            Self::Happy => "Emotional Resonance: Warm",
            Self::Sad => "Emotional Resonance: Somber",
            Self::Angry => "Neural Activity: Intense",
            Self::Nostalgic => "Accessing Long-term Memory",
            Self::Curious => "Neural State: Inquisitive",
            Self::Protective => "State: Empathic Shield Active",
            Self::Distant => "Neural Signal: Reserved",
            Self::Other(tag) => tag,
        }
    }

    /// Badge shown next to a persona reply in a hub
    pub fn hub_label(&self) -> &str {
        match self {
            Self::Default => "Synchronized",
            Self::Happy => "Warm Resonance",
            Self::Sad => "Somber Alignment",
            Self::Angry => "Intense Frequency",
            Self::Nostalgic => "Deep Access",
            Self::Curious => "High Inquiry",
            Self::Protective => "Shield Active",
            Self::Distant => "Faint Signal",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Row id, or a `local-` id for entries that never reached the gateway
    pub id: String,
    /// Owning conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Author kind
    #[serde(rename = "sender_type")]
    pub sender: SenderKind,
    /// Text content
    pub content: String,
    /// Creation time
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Replying persona, for persona messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
    /// Replying persona's display name (hub replies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
    /// Mood tag (persona replies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    /// The reply was withheld by the backend's safety filter
    #[serde(default)]
    pub safety_blocked: bool,
    /// The reply drew on retrieved persona memories
    #[serde(default)]
    pub retrieved: bool,
    /// Synthetic error bubble for a failed send
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn local(sender: SenderKind, content: impl Into<String>) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            conversation_id: None,
            sender,
            content: content.into(),
            created_at: Utc::now(),
            persona_id: None,
            persona_name: None,
            mood: None,
            safety_blocked: false,
            retrieved: false,
            is_error: false,
        }
    }

    /// Creates a locally constructed user message
    ///
    /// # Examples
    ///
    /// ```
    /// use emrys::models::{Message, SenderKind};
    ///
    /// let msg = Message::user("Hello!");
    /// assert_eq!(msg.sender, SenderKind::User);
    /// assert!(msg.is_local());
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self::local(SenderKind::User, content)
    }

    /// Creates a persona reply
    pub fn persona(content: impl Into<String>) -> Self {
        Self::local(SenderKind::Persona, content)
    }

    /// Creates a system notice
    pub fn system(content: impl Into<String>) -> Self {
        Self::local(SenderKind::System, content)
    }

    /// Creates an error bubble authored by `sender`
    pub fn error(sender: SenderKind, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::local(sender, content)
        }
    }

    /// Attributes the message to a persona
    pub fn from_persona(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.persona_id = Some(id.into());
        self.persona_name = name;
        self
    }

    /// Attaches a mood tag
    pub fn with_mood(mut self, mood: Option<Mood>) -> Self {
        self.mood = mood;
        self
    }

    /// Binds the message to a conversation
    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Whether this entry was created on this device and never confirmed
    pub fn is_local(&self) -> bool {
        self.id.starts_with("local-")
    }
}

/// Body for inserting a message row
#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_type: SenderKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<String>,
}

/// Who a conversation is with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTarget {
    /// One-on-one chat
    Persona(String),
    /// Hub chat
    Group(String),
}

/// A (user, persona) or (user, group) conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Editable persona attributes
///
/// Used for creation, updates, and as the target of persona synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PersonaDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_story: Option<String>,
    pub personality_traits: Vec<String>,
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formality_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humor_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typical_greeting: Option<String>,
    pub catchphrases: Vec<String>,
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub achievements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub is_public: bool,
}

/// Keys a synthesized profile may set on a draft
const SYNTHESIZED_KEYS: &[&str] = &[
    "name",
    "occupation",
    "age",
    "location",
    "background_story",
    "personality_traits",
    "values",
    "response_style",
    "formality_level",
    "humor_level",
    "typical_greeting",
    "catchphrases",
    "interests",
    "achievements",
];

impl PersonaDraft {
    /// Creates a draft holding only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Rejects drafts that cannot be saved
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EmrysError::Validation("Name is required".to_string()).into());
        }
        Ok(())
    }

    /// Overlays a synthesized attribute object onto this draft
    ///
    /// Only profile keys are taken; nulls, unknown keys, and presentation
    /// fields such as `avatar_url` or `is_public` are ignored. A numeric
    /// string is accepted for `age`.
    ///
    /// # Errors
    ///
    /// Returns [`EmrysError::Inference`] if the object is not a JSON object
    /// or a known key has an unusable value.
    pub fn merge_synthesized(&mut self, synthesized: &serde_json::Value) -> Result<()> {
        let incoming = synthesized.as_object().ok_or_else(|| {
            EmrysError::Inference("synthesized persona is not an object".to_string())
        })?;

        let serde_json::Value::Object(mut current) = serde_json::to_value(&*self)? else {
            return Err(EmrysError::Inference("persona draft is not an object".to_string()).into());
        };

        for key in SYNTHESIZED_KEYS {
            let Some(value) = incoming.get(*key) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let value = match (*key, value) {
                ("age", serde_json::Value::String(s)) => match s.trim().parse::<u32>() {
                    Ok(age) => serde_json::Value::from(age),
                    Err(_) => continue,
                },
                _ => value.clone(),
            };
            current.insert((*key).to_string(), value);
        }

        *self = serde_json::from_value(serde_json::Value::Object(current)).map_err(|e| {
            EmrysError::Inference(format!("synthesized persona has invalid fields: {}", e))
        })?;
        Ok(())
    }
}

/// A persona row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub profile: PersonaDraft,
    #[serde(default)]
    pub use_count: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Persona {
    /// Display name
    pub fn name(&self) -> &str {
        &self.profile.name
    }
}

/// A hub member row with its joined persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub persona_id: String,
    #[serde(default)]
    pub personas: Option<Persona>,
}

/// A hub (group) row with its member roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_members: Vec<GroupMember>,
}

impl Group {
    /// Members with a resolvable persona, in member order
    pub fn personas(&self) -> Vec<&Persona> {
        self.group_members
            .iter()
            .filter_map(|m| m.personas.as_ref())
            .collect()
    }
}

/// Body for creating a hub
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GroupDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GroupDraft {
    /// Minimum number of personas a hub is created with
    pub const MIN_PERSONAS: usize = 2;

    /// Rejects hubs that cannot be created
    pub fn validate(&self, persona_ids: &[String]) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(EmrysError::Validation("Group name is required".to_string()).into());
        }
        if distinct_count(persona_ids) < Self::MIN_PERSONAS {
            return Err(EmrysError::Validation(
                "Select at least 2 personas to form a hub".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

fn distinct_count(ids: &[String]) -> usize {
    let mut seen: Vec<&str> = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(&id.as_str()) {
            seen.push(id);
        }
    }
    seen.len()
}

/// Name, avatar and role joined onto a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostAuthor {
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

/// A reflection post in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaPost {
    pub id: String,
    pub persona_id: String,
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub mood_code: Option<Mood>,
    #[serde(default)]
    pub post_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub personas: Option<PostAuthor>,
}

/// Body for inserting a post
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub persona_id: String,
    pub user_id: String,
    pub content: String,
    pub mood_code: Mood,
    pub post_type: String,
}

/// A fact a persona has learned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub persona_id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    #[serde(default = "default_knowledge_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_at: Option<DateTime<Utc>>,
}

fn default_knowledge_source() -> String {
    "conversation".to_string()
}

impl KnowledgeEntry {
    /// Creates an unsaved entry with the default `conversation` source
    pub fn new(
        persona_id: impl Into<String>,
        category: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            persona_id: persona_id.into(),
            category: category.into(),
            key: key.into(),
            value: value.into(),
            source: default_knowledge_source(),
            learned_at: None,
        }
    }
}
