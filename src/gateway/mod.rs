//! Persistence gateway abstraction
//!
//! All durable state (personas, hubs, conversations, messages, feed posts,
//! persona knowledge) lives in a hosted table service. The client only ever
//! issues pass-through CRUD calls, described by [`PersistenceGateway`].
//!
//! Two implementations are provided:
//!
//! - [`RestGateway`]: PostgREST-style HTTP API (`/rest/v1/<table>`)
//! - [`MemoryGateway`]: in-process tables for tests and local demos

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Conversation, ConversationTarget, Group, GroupDraft, KnowledgeEntry, Message, NewMessage,
    NewPost, Persona, PersonaDraft, PersonaPost,
};

pub mod memory;
pub mod rest;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

/// Number of posts returned by [`PersistenceGateway::list_posts`]
pub const FEED_PAGE_SIZE: usize = 20;

/// Table operations the client relies on
///
/// Every method maps to one remote call (or a short fixed sequence of them,
/// e.g. get-or-create). Implementations report failures as
/// [`crate::error::EmrysError::Gateway`].
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Personas owned by a user, newest first
    async fn list_personas(&self, user_id: &str) -> Result<Vec<Persona>>;

    /// Public personas, most used first
    async fn list_public_personas(&self) -> Result<Vec<Persona>>;

    /// One persona by id
    async fn get_persona(&self, persona_id: &str) -> Result<Persona>;

    /// Creates a persona owned by `user_id`
    async fn create_persona(&self, user_id: &str, draft: &PersonaDraft) -> Result<Persona>;

    /// Replaces a persona's editable attributes
    async fn update_persona(&self, persona_id: &str, draft: &PersonaDraft) -> Result<Persona>;

    /// Deletes a persona
    async fn delete_persona(&self, persona_id: &str) -> Result<()>;

    /// Bumps a persona's use counter
    async fn increment_use_count(&self, persona_id: &str) -> Result<()>;

    /// Hubs owned by a user with their rosters, newest first
    async fn list_groups(&self, user_id: &str) -> Result<Vec<Group>>;

    /// One hub with its roster
    async fn get_group(&self, group_id: &str) -> Result<Group>;

    /// Creates a hub and links its initial members
    async fn create_group(
        &self,
        user_id: &str,
        draft: &GroupDraft,
        persona_ids: &[String],
    ) -> Result<Group>;

    /// Links more personas to a hub
    async fn add_group_members(&self, group_id: &str, persona_ids: &[String]) -> Result<()>;

    /// Unlinks one persona from a hub
    async fn remove_group_member(&self, group_id: &str, persona_id: &str) -> Result<()>;

    /// Deletes a hub
    async fn delete_group(&self, group_id: &str) -> Result<()>;

    /// Returns the user's conversation with a persona or hub, creating it on first use
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target: &ConversationTarget,
    ) -> Result<Conversation>;

    /// A conversation's messages in ascending creation order
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Inserts one message row
    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;

    /// Deletes every message of a conversation
    async fn clear_messages(&self, conversation_id: &str) -> Result<()>;

    /// The user's most recent feed posts, newest first
    async fn list_posts(&self, user_id: &str) -> Result<Vec<PersonaPost>>;

    /// Inserts a feed post and returns it with its author joined
    async fn insert_post(&self, post: &NewPost) -> Result<PersonaPost>;

    /// Adds a knowledge entry to a persona
    async fn add_knowledge(&self, entry: &KnowledgeEntry) -> Result<KnowledgeEntry>;

    /// A persona's knowledge entries, most recently learned first
    async fn list_knowledge(&self, persona_id: &str) -> Result<Vec<KnowledgeEntry>>;
}
