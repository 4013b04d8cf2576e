//! Message log for the open conversation
//!
//! [`SessionStore`] is the single source of truth for what a chat view shows.
//! The log is append-ordered: entries appear in the order they were added,
//! whatever their `created_at` says. User messages go in optimistically,
//! before the backend has seen them, and are reconciled in place once the
//! send resolves. Every change is also published as a snapshot on a `watch`
//! channel, so a view can render the log while a send is still in flight.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{EmrysError, Result};
use crate::gateway::PersistenceGateway;
use crate::models::{Message, SenderKind};

/// Whether the durable log has been fetched
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadState {
    /// `initialize` has not completed yet
    #[default]
    Unloaded,
    /// The log reflects the durable conversation
    Ready,
    /// The last fetch failed; the view must show an error, not an empty chat
    Failed(String),
}

/// Handle to an optimistically appended user message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    local_id: String,
    content: String,
}

impl PendingSend {
    /// The id of the optimistic log entry
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// The trimmed text that was submitted
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered message log for one conversation
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use emrys::gateway::MemoryGateway;
/// use emrys::models::Message;
/// use emrys::session::SessionStore;
///
/// let mut store = SessionStore::new(Arc::new(MemoryGateway::new()));
/// let pending = store.append_optimistic("Hello");
/// store.append_confirmed(Message::persona("Hi there"));
/// store.confirm_pending(&pending, None);
///
/// let contents: Vec<&str> = store.messages().iter().map(|m| m.content.as_str()).collect();
/// assert_eq!(contents, vec!["Hello", "Hi there"]);
/// ```
pub struct SessionStore {
    gateway: Arc<dyn PersistenceGateway>,
    conversation_id: Option<String>,
    messages: Vec<Message>,
    pending: HashSet<String>,
    state: LoadState,
    snapshot: watch::Sender<Vec<Message>>,
}

impl SessionStore {
    /// Creates an empty, unloaded store
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            conversation_id: None,
            messages: Vec::new(),
            pending: HashSet::new(),
            state: LoadState::Unloaded,
            snapshot: watch::channel(Vec::new()).0,
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.messages.clone());
    }

    /// Loads the durable log for `conversation_id`
    ///
    /// Replaces whatever the store held before.
    ///
    /// # Errors
    ///
    /// Returns [`EmrysError::Load`] when the fetch fails; the store is then
    /// empty and in [`LoadState::Failed`].
    pub async fn initialize(&mut self, conversation_id: &str) -> Result<&[Message]> {
        self.conversation_id = Some(conversation_id.to_string());
        self.messages.clear();
        self.pending.clear();

        match self.gateway.list_messages(conversation_id).await {
            Ok(messages) => {
                tracing::info!(
                    conversation_id,
                    count = messages.len(),
                    "Loaded conversation"
                );
                self.messages = messages;
                self.state = LoadState::Ready;
                self.publish();
                Ok(&self.messages)
            }
            Err(e) => {
                tracing::warn!(conversation_id, "Failed to load conversation: {:#}", e);
                let reason = e.to_string();
                self.state = LoadState::Failed(reason.clone());
                self.publish();
                Err(EmrysError::Load(reason).into())
            }
        }
    }

    /// Appends a locally built user message at the tail
    ///
    /// Never suspends; the entry is visible as soon as this returns.
    pub fn append_optimistic(&mut self, content: impl Into<String>) -> PendingSend {
        let mut message = Message::user(content);
        if let Some(id) = &self.conversation_id {
            message.conversation_id = Some(id.clone());
        }
        let pending = PendingSend {
            local_id: message.id.clone(),
            content: message.content.clone(),
        };
        self.pending.insert(message.id.clone());
        self.messages.push(message);
        self.publish();
        pending
    }

    /// Appends a backend-produced message at the tail
    ///
    /// No deduplication is attempted; optimistic entries are `user` messages
    /// and never collide with persona or system replies.
    pub fn append_confirmed(&mut self, message: Message) {
        self.messages.push(message);
        self.publish();
    }

    /// Reconciles an optimistic entry once its send has resolved
    ///
    /// When `confirmed` is given, it replaces the optimistic entry at the same
    /// position. Either way the entry stops being pending. Returns `false` if
    /// the entry is no longer in the log (for example after a clear).
    pub fn confirm_pending(&mut self, pending: &PendingSend, confirmed: Option<Message>) -> bool {
        self.pending.remove(&pending.local_id);
        let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.id == pending.local_id)
        else {
            return false;
        };
        if let Some(message) = confirmed {
            *slot = message;
            self.publish();
        }
        true
    }

    /// Appends an in-log error bubble for a failed send
    pub fn append_error(&mut self, text: impl Into<String>, sender: SenderKind) -> &Message {
        let mut message = Message::error(sender, text);
        message.conversation_id = self.conversation_id.clone();
        self.messages.push(message);
        self.publish();
        &self.messages[self.messages.len() - 1]
    }

    /// Deletes the conversation's messages remotely, then empties the log
    ///
    /// The local log is untouched when the remote delete fails.
    pub async fn clear(&mut self) -> Result<()> {
        let conversation_id = self
            .conversation_id
            .clone()
            .ok_or_else(|| EmrysError::Load("no conversation is open".to_string()))?;

        self.gateway.clear_messages(&conversation_id).await?;
        tracing::info!(conversation_id = %conversation_id, "Cleared conversation history");
        self.messages.clear();
        self.pending.clear();
        self.publish();
        Ok(())
    }

    /// The log in display order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current load state
    pub fn load_state(&self) -> &LoadState {
        &self.state
    }

    /// Id of the loaded conversation
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Number of optimistic entries awaiting reconciliation
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether `message` is an unreconciled optimistic entry
    pub fn is_pending(&self, message: &Message) -> bool {
        self.pending.contains(&message.id)
    }

    /// Watches the log; every change publishes a fresh snapshot
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.snapshot.subscribe()
    }

    /// Number of entries in the log
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log has no entries
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
