//! Neural feed: persona reflection posts
//!
//! Personas "reflect" on demand: a random persona from the roster is sent to
//! the inference backend, and the generated post is saved to the
//! `persona_posts` table and put at the top of the feed.

use std::sync::Arc;

use rand::seq::IndexedRandom;

use crate::chat::{credential_gate, load_error};
use crate::credential::SessionContext;
use crate::error::Result;
use crate::gateway::PersistenceGateway;
use crate::inference::{InferenceClient, ReflectionRequest};
use crate::models::{NewPost, Persona, PersonaPost};

/// `post_type` of generated reflections
pub const REFLECTION_POST: &str = "reflection";

/// Result of asking for a new reflection
#[derive(Debug, Clone, PartialEq)]
pub enum ReflectOutcome {
    /// The roster is empty
    NoPersonas,
    /// No credential stored; the backend was not contacted
    CredentialRequired,
    /// The new post, already at the top of the feed
    Posted(PersonaPost),
}

/// The user's feed of reflection posts
pub struct NeuralFeed {
    ctx: SessionContext,
    gateway: Arc<dyn PersistenceGateway>,
    inference: Arc<dyn InferenceClient>,
    posts: Vec<PersonaPost>,
}

impl NeuralFeed {
    pub fn new(
        ctx: SessionContext,
        gateway: Arc<dyn PersistenceGateway>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            ctx,
            gateway,
            inference,
            posts: Vec::new(),
        }
    }

    /// Fetches the most recent posts, newest first
    pub async fn load(&mut self) -> Result<&[PersonaPost]> {
        self.posts = self
            .gateway
            .list_posts(self.ctx.user_id())
            .await
            .map_err(|e| load_error("feed", e))?;
        Ok(&self.posts)
    }

    /// Has a randomly chosen persona write a reflection
    pub async fn reflect(&mut self, personas: &[Persona]) -> Result<ReflectOutcome> {
        let Some(persona) = personas.choose(&mut rand::rng()) else {
            return Ok(ReflectOutcome::NoPersonas);
        };
        self.reflect_as(persona).await
    }

    /// Has `persona` write a reflection
    pub async fn reflect_as(&mut self, persona: &Persona) -> Result<ReflectOutcome> {
        let Some(api_key) = credential_gate(&self.ctx)? else {
            return Ok(ReflectOutcome::CredentialRequired);
        };

        tracing::info!(persona = %persona.name(), "Requesting reflection");
        let reflection = self
            .inference
            .reflect(&ReflectionRequest {
                persona: persona.clone(),
                user_id: self.ctx.user_id().to_string(),
                api_key,
            })
            .await?;

        let post = self
            .gateway
            .insert_post(&NewPost {
                persona_id: persona.id.clone(),
                user_id: self.ctx.user_id().to_string(),
                content: reflection.content,
                mood_code: reflection.mood_code,
                post_type: REFLECTION_POST.to_string(),
            })
            .await?;

        self.posts.insert(0, post.clone());
        Ok(ReflectOutcome::Posted(post))
    }

    /// Loaded posts, newest first
    pub fn posts(&self) -> &[PersonaPost] {
        &self.posts
    }
}
