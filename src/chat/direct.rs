//! One-on-one chat with a persona

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::chat::{credential_gate, load_error, DIRECT_SEND_FAILED};
use crate::config::ChatConfig;
use crate::credential::SessionContext;
use crate::error::Result;
use crate::gateway::PersistenceGateway;
use crate::inference::{ChatOutcome, ChatRequest, InferenceClient};
use crate::models::{Conversation, ConversationTarget, Message, Mood, Persona, SenderKind};
use crate::session::SessionStore;

/// What happened to a submitted message
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// Blank input; nothing happened
    Ignored,
    /// No credential stored; nothing was appended or sent
    CredentialRequired,
    /// The persona replied; the reply is already in the log
    Delivered(Message),
    /// The send failed; this error bubble is already in the log
    Failed(Message),
}

/// Controller for a one-on-one conversation
pub struct DirectChat {
    ctx: SessionContext,
    inference: Arc<dyn InferenceClient>,
    persona: Persona,
    conversation: Conversation,
    store: SessionStore,
    mood: Mood,
    retrieving_delay: Duration,
    retrieving: Arc<watch::Sender<bool>>,
}

impl DirectChat {
    /// Loads the persona and its conversation, creating the conversation on
    /// first use
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EmrysError::Load`] if any fetch fails.
    pub async fn open(
        ctx: SessionContext,
        gateway: Arc<dyn PersistenceGateway>,
        inference: Arc<dyn InferenceClient>,
        persona_id: &str,
        config: &ChatConfig,
    ) -> Result<Self> {
        let persona = gateway
            .get_persona(persona_id)
            .await
            .map_err(|e| load_error("persona", e))?;
        let conversation = gateway
            .get_or_create_conversation(
                ctx.user_id(),
                &ConversationTarget::Persona(persona.id.clone()),
            )
            .await
            .map_err(|e| load_error("conversation", e))?;

        let mut store = SessionStore::new(Arc::clone(&gateway));
        store.initialize(&conversation.id).await?;

        if let Err(e) = gateway.increment_use_count(&persona.id).await {
            tracing::warn!(persona_id = %persona.id, "Failed to bump use count: {:#}", e);
        }

        tracing::info!(
            persona = %persona.name(),
            conversation_id = %conversation.id,
            "Opened direct chat"
        );

        let (retrieving, _) = watch::channel(false);
        let retrieving = Arc::new(retrieving);
        Ok(Self {
            ctx,
            inference,
            persona,
            conversation,
            store,
            mood: Mood::Default,
            retrieving_delay: config.retrieving_delay(),
            retrieving,
        })
    }

    /// Sends one message and waits for the reply
    ///
    /// The user's message is in the log before the backend is contacted.
    /// Backend and transport failures end up as an error bubble in the log,
    /// never as an `Err`.
    pub async fn send(&mut self, text: &str) -> SendResult {
        let text = text.trim();
        if text.is_empty() {
            return SendResult::Ignored;
        }

        let api_key = match credential_gate(&self.ctx) {
            Ok(Some(key)) => key,
            Ok(None) => return SendResult::CredentialRequired,
            Err(e) => {
                tracing::warn!("Failed to read inference credential: {:#}", e);
                let bubble = self.store.append_error(e.to_string(), SenderKind::System);
                return SendResult::Failed(bubble.clone());
            }
        };

        let pending = self.store.append_optimistic(text);
        let request = ChatRequest {
            user_id: self.ctx.user_id().to_string(),
            persona_id: self.persona.id.clone(),
            message: text.to_string(),
            api_key,
        };

        let indicator = self.raise_retrieving_later();
        let outcome = self.inference.send_chat(&request).await;
        drop(indicator);
        self.store.confirm_pending(&pending, None);

        match outcome {
            Ok(ChatOutcome::Reply(reply)) => {
                if let Some(mood) = &reply.mood {
                    self.mood = mood.clone();
                }
                let mut message = Message::persona(reply.response)
                    .from_persona(self.persona.id.clone(), Some(self.persona.name().to_string()))
                    .with_mood(reply.mood)
                    .in_conversation(self.conversation.id.clone());
                message.safety_blocked = reply.safety_blocked;
                message.retrieved = reply.retrieved;

                self.store.append_confirmed(message.clone());
                SendResult::Delivered(message)
            }
            Ok(ChatOutcome::Failed { message }) => {
                tracing::warn!(persona_id = %self.persona.id, "Backend rejected send: {}", message);
                let bubble = self.store.append_error(message, SenderKind::Persona);
                SendResult::Failed(bubble.clone())
            }
            Err(e) => {
                tracing::error!(persona_id = %self.persona.id, "Send failed: {:#}", e);
                let bubble = self
                    .store
                    .append_error(DIRECT_SEND_FAILED, SenderKind::Persona);
                SendResult::Failed(bubble.clone())
            }
        }
    }

    /// Raises the retrieving flag after the configured delay
    ///
    /// Dropping the returned guard cancels the raise and lowers the flag, so
    /// an abandoned send cannot leave the indicator up.
    fn raise_retrieving_later(&self) -> RetrievingGuard {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let flag = Arc::clone(&self.retrieving);
        let delay = self.retrieving_delay;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    flag.send_replace(true);
                }
            }
        });
        RetrievingGuard {
            _cancel: token.drop_guard(),
            flag: Arc::clone(&self.retrieving),
        }
    }

    /// Deletes the conversation history, remotely first
    pub async fn clear_history(&mut self) -> Result<()> {
        self.store.clear().await
    }

    /// Stores a key entered at the credential prompt
    pub fn store_credential(&self, key: &str) -> Result<()> {
        self.ctx.store_key(key)
    }

    /// The persona on the other end
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// The conversation row backing this chat
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The log in display order
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Watches the log, including the user's message while a send is in flight
    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.store.subscribe()
    }

    /// Mood of the latest reply that carried one
    pub fn mood(&self) -> &Mood {
        &self.mood
    }

    /// Whether the "retrieving memories" indicator is up
    pub fn is_retrieving(&self) -> bool {
        *self.retrieving.borrow()
    }

    /// Watches the retrieving indicator
    pub fn subscribe_retrieving(&self) -> watch::Receiver<bool> {
        self.retrieving.subscribe()
    }
}

/// Pending retrieving-indicator raise for one send
struct RetrievingGuard {
    _cancel: DropGuard,
    flag: Arc<watch::Sender<bool>>,
}

impl Drop for RetrievingGuard {
    fn drop(&mut self) {
        self.flag.send_replace(false);
    }
}
