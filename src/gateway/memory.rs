//! In-process persistence gateway
//!
//! Keeps every table in memory behind a single lock. Used by the test suite;
//! behaviour mirrors [`super::RestGateway`] closely enough for the session and
//! chat logic to be exercised end to end.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EmrysError, Result};
use crate::gateway::{PersistenceGateway, FEED_PAGE_SIZE};
use crate::models::{
    Conversation, ConversationTarget, Group, GroupDraft, GroupMember, KnowledgeEntry, Message,
    NewMessage, NewPost, Persona, PersonaDraft, PersonaPost, PostAuthor,
};

#[derive(Default)]
struct Tables {
    personas: Vec<Persona>,
    groups: Vec<Group>,
    members: Vec<(String, String)>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    posts: Vec<PersonaPost>,
    knowledge: Vec<KnowledgeEntry>,
    /// Tables whose next call fails, for exercising error paths
    failing: HashMap<&'static str, String>,
}

impl Tables {
    fn check(&self, table: &'static str) -> Result<()> {
        match self.failing.get(table) {
            Some(reason) => Err(EmrysError::Gateway(format!("{}: {}", table, reason)).into()),
            None => Ok(()),
        }
    }

    fn persona(&self, persona_id: &str) -> Result<&Persona> {
        self.personas
            .iter()
            .find(|p| p.id == persona_id)
            .ok_or_else(|| EmrysError::Gateway(format!("persona {} not found", persona_id)).into())
    }

    fn joined_group(&self, group: &Group) -> Group {
        let group_members = self
            .members
            .iter()
            .filter(|(group_id, _)| *group_id == group.id)
            .map(|(_, persona_id)| GroupMember {
                persona_id: persona_id.clone(),
                personas: self.personas.iter().find(|p| p.id == *persona_id).cloned(),
            })
            .collect();
        Group {
            group_members,
            ..group.clone()
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Gateway backed by in-memory tables
///
/// # Examples
///
/// ```
/// use emrys::gateway::{MemoryGateway, PersistenceGateway};
/// use emrys::models::PersonaDraft;
///
/// # tokio_test::block_on(async {
/// let gateway = MemoryGateway::new();
/// let ada = gateway
///     .create_persona("u1", &PersonaDraft::named("Ada"))
///     .await
///     .unwrap();
/// assert_eq!(gateway.get_persona(&ada.id).await.unwrap().name(), "Ada");
/// # });
/// ```
#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<Tables>,
}

impl MemoryGateway {
    /// Creates an empty gateway
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call touching `table` fail until [`Self::recover`] is called
    pub async fn fail_table(&self, table: &'static str, reason: impl Into<String>) {
        self.tables
            .write()
            .await
            .failing
            .insert(table, reason.into());
    }

    /// Clears all injected failures
    pub async fn recover(&self) {
        self.tables.write().await.failing.clear();
    }

    /// Number of stored message rows across all conversations
    pub async fn message_count(&self) -> usize {
        self.tables.read().await.messages.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn list_personas(&self, user_id: &str) -> Result<Vec<Persona>> {
        let tables = self.tables.read().await;
        tables.check("personas")?;
        Ok(tables
            .personas
            .iter()
            .rev()
            .filter(|p| p.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn list_public_personas(&self) -> Result<Vec<Persona>> {
        let tables = self.tables.read().await;
        tables.check("personas")?;
        let mut public: Vec<Persona> = tables
            .personas
            .iter()
            .filter(|p| p.profile.is_public)
            .cloned()
            .collect();
        public.sort_by(|a, b| b.use_count.cmp(&a.use_count));
        Ok(public)
    }

    async fn get_persona(&self, persona_id: &str) -> Result<Persona> {
        let tables = self.tables.read().await;
        tables.check("personas")?;
        tables.persona(persona_id).cloned()
    }

    async fn create_persona(&self, user_id: &str, draft: &PersonaDraft) -> Result<Persona> {
        let mut tables = self.tables.write().await;
        tables.check("personas")?;
        let persona = Persona {
            id: new_id(),
            user_id: Some(user_id.to_string()),
            profile: draft.clone(),
            use_count: 0,
            created_at: Some(Utc::now()),
        };
        tables.personas.push(persona.clone());
        Ok(persona)
    }

    async fn update_persona(&self, persona_id: &str, draft: &PersonaDraft) -> Result<Persona> {
        let mut tables = self.tables.write().await;
        tables.check("personas")?;
        let persona = tables
            .personas
            .iter_mut()
            .find(|p| p.id == persona_id)
            .ok_or_else(|| EmrysError::Gateway(format!("persona {} not found", persona_id)))?;
        persona.profile = draft.clone();
        Ok(persona.clone())
    }

    async fn delete_persona(&self, persona_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("personas")?;
        tables.personas.retain(|p| p.id != persona_id);
        tables.members.retain(|(_, id)| id != persona_id);
        Ok(())
    }

    async fn increment_use_count(&self, persona_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("personas")?;
        if let Some(persona) = tables.personas.iter_mut().find(|p| p.id == persona_id) {
            persona.use_count += 1;
        }
        Ok(())
    }

    async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        let tables = self.tables.read().await;
        tables.check("groups")?;
        Ok(tables
            .groups
            .iter()
            .rev()
            .filter(|g| g.user_id.as_deref() == Some(user_id))
            .map(|g| tables.joined_group(g))
            .collect())
    }

    async fn get_group(&self, group_id: &str) -> Result<Group> {
        let tables = self.tables.read().await;
        tables.check("groups")?;
        tables
            .groups
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| tables.joined_group(g))
            .ok_or_else(|| EmrysError::Gateway(format!("group {} not found", group_id)).into())
    }

    async fn create_group(
        &self,
        user_id: &str,
        draft: &GroupDraft,
        persona_ids: &[String],
    ) -> Result<Group> {
        let mut tables = self.tables.write().await;
        tables.check("groups")?;
        let group = Group {
            id: new_id(),
            user_id: Some(user_id.to_string()),
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_at: Some(Utc::now()),
            group_members: Vec::new(),
        };
        for persona_id in persona_ids {
            tables.members.push((group.id.clone(), persona_id.clone()));
        }
        tables.groups.push(group.clone());
        Ok(tables.joined_group(&group))
    }

    async fn add_group_members(&self, group_id: &str, persona_ids: &[String]) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("group_members")?;
        for persona_id in persona_ids {
            let link = (group_id.to_string(), persona_id.clone());
            if !tables.members.contains(&link) {
                tables.members.push(link);
            }
        }
        Ok(())
    }

    async fn remove_group_member(&self, group_id: &str, persona_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("group_members")?;
        tables
            .members
            .retain(|(g, p)| !(g == group_id && p == persona_id));
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("groups")?;
        tables.groups.retain(|g| g.id != group_id);
        tables.members.retain(|(g, _)| g != group_id);
        Ok(())
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target: &ConversationTarget,
    ) -> Result<Conversation> {
        let mut tables = self.tables.write().await;
        tables.check("conversations")?;
        let (persona_id, group_id) = match target {
            ConversationTarget::Persona(id) => (Some(id.clone()), None),
            ConversationTarget::Group(id) => (None, Some(id.clone())),
        };

        if let Some(existing) = tables.conversations.iter().find(|c| {
            c.user_id == user_id && c.persona_id == persona_id && c.group_id == group_id
        }) {
            return Ok(existing.clone());
        }

        let conversation = Conversation {
            id: new_id(),
            user_id: user_id.to_string(),
            persona_id,
            group_id,
            created_at: Some(Utc::now()),
        };
        tables.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        tables.check("messages")?;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.conversation_id.as_deref() == Some(conversation_id))
            .cloned()
            .collect();
        // stable: rows sharing a timestamp keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let mut tables = self.tables.write().await;
        tables.check("messages")?;
        let mut row =
            Message::system(message.content.clone()).in_conversation(&message.conversation_id);
        row.id = new_id();
        row.sender = message.sender_type;
        row.persona_id = message.persona_id.clone();
        tables.messages.push(row.clone());
        Ok(row)
    }

    async fn clear_messages(&self, conversation_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check("messages")?;
        tables
            .messages
            .retain(|m| m.conversation_id.as_deref() != Some(conversation_id));
        Ok(())
    }

    async fn list_posts(&self, user_id: &str) -> Result<Vec<PersonaPost>> {
        let tables = self.tables.read().await;
        tables.check("persona_posts")?;
        Ok(tables
            .posts
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .take(FEED_PAGE_SIZE)
            .cloned()
            .collect())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<PersonaPost> {
        let mut tables = self.tables.write().await;
        tables.check("persona_posts")?;
        let author = tables.persona(&post.persona_id).ok().map(|p| PostAuthor {
            name: p.profile.name.clone(),
            avatar_url: p.profile.avatar_url.clone(),
            occupation: p.profile.occupation.clone(),
        });
        let row = PersonaPost {
            id: new_id(),
            persona_id: post.persona_id.clone(),
            user_id: post.user_id.clone(),
            content: post.content.clone(),
            mood_code: Some(post.mood_code.clone()),
            post_type: Some(post.post_type.clone()),
            created_at: Some(Utc::now()),
            personas: author,
        };
        tables.posts.push(row.clone());
        Ok(row)
    }

    async fn add_knowledge(&self, entry: &KnowledgeEntry) -> Result<KnowledgeEntry> {
        let mut tables = self.tables.write().await;
        tables.check("persona_knowledge")?;
        let row = KnowledgeEntry {
            id: Some(new_id()),
            learned_at: Some(Utc::now()),
            ..entry.clone()
        };
        tables.knowledge.push(row.clone());
        Ok(row)
    }

    async fn list_knowledge(&self, persona_id: &str) -> Result<Vec<KnowledgeEntry>> {
        let tables = self.tables.read().await;
        tables.check("persona_knowledge")?;
        Ok(tables
            .knowledge
            .iter()
            .rev()
            .filter(|k| k.persona_id == persona_id)
            .cloned()
            .collect())
    }
}
