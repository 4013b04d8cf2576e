//! Multi-persona hub chat

use std::sync::Arc;

use tokio::sync::watch;

use crate::chat::{credential_gate, load_error, HUB_SEND_FAILED};
use crate::config::ChatConfig;
use crate::credential::SessionContext;
use crate::error::Result;
use crate::gateway::PersistenceGateway;
use crate::inference::{GroupChatRequest, GroupOutcome, InferenceClient};
use crate::mention::{self, KeyOutcome, MentionMenu, MenuKey, RosterEntry};
use crate::models::{Conversation, ConversationTarget, Group, Message, SenderKind};
use crate::sequencer::{ActiveSpeaker, ResponseSequencer, RevealBatch};
use crate::session::SessionStore;

/// What happened to a submitted hub message
#[derive(Debug, Clone, PartialEq)]
pub enum HubSendResult {
    /// Blank input; nothing happened
    Ignored,
    /// No credential stored; nothing was appended or sent
    CredentialRequired,
    /// Replies are scheduled; collect them with [`HubChat::next_reveal`]
    Dispatched {
        /// Personas the message addressed by `@mention`; empty means everyone
        targets: Vec<String>,
        /// Number of replies scheduled
        replies: usize,
    },
    /// The send failed; this error bubble is already in the log
    Failed(Message),
}

/// Controller for a hub conversation
pub struct HubChat {
    ctx: SessionContext,
    inference: Arc<dyn InferenceClient>,
    group: Group,
    roster: Vec<RosterEntry>,
    conversation: Conversation,
    store: SessionStore,
    sequencer: ResponseSequencer,
    reveals: Option<RevealBatch>,
    menu: MentionMenu,
}

impl HubChat {
    /// Loads the hub, its roster, and its conversation
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::EmrysError::Load`] if any fetch fails.
    pub async fn open(
        ctx: SessionContext,
        gateway: Arc<dyn PersistenceGateway>,
        inference: Arc<dyn InferenceClient>,
        group_id: &str,
        config: &ChatConfig,
    ) -> Result<Self> {
        let group = gateway
            .get_group(group_id)
            .await
            .map_err(|e| load_error("hub", e))?;
        let roster: Vec<RosterEntry> = group
            .personas()
            .into_iter()
            .map(RosterEntry::from)
            .collect();
        let conversation = gateway
            .get_or_create_conversation(ctx.user_id(), &ConversationTarget::Group(group.id.clone()))
            .await
            .map_err(|e| load_error("conversation", e))?;

        let mut store = SessionStore::new(gateway);
        store.initialize(&conversation.id).await?;

        tracing::info!(
            hub = %group.name,
            members = roster.len(),
            conversation_id = %conversation.id,
            "Opened hub chat"
        );

        Ok(Self {
            ctx,
            inference,
            group,
            roster,
            conversation,
            store,
            sequencer: ResponseSequencer::from_config(config),
            reveals: None,
            menu: MentionMenu::Closed,
        })
    }

    /// Sends one message to the hub
    ///
    /// Pending reveals from an earlier send are cancelled first. On success
    /// the replies are revealed one by one through [`Self::next_reveal`].
    pub async fn send(&mut self, text: &str) -> HubSendResult {
        let text = text.trim();
        if text.is_empty() {
            return HubSendResult::Ignored;
        }

        let api_key = match credential_gate(&self.ctx) {
            Ok(Some(key)) => key,
            Ok(None) => return HubSendResult::CredentialRequired,
            Err(e) => {
                tracing::warn!("Failed to read inference credential: {:#}", e);
                let bubble = self.store.append_error(e.to_string(), SenderKind::System);
                return HubSendResult::Failed(bubble.clone());
            }
        };

        self.sequencer.begin_send();
        self.reveals = None;
        self.menu = MentionMenu::Closed;

        let pending = self.store.append_optimistic(text);
        let targets = mention::resolve_targets(text, &self.roster);
        tracing::debug!(?targets, "Dispatching hub message");

        let request = GroupChatRequest {
            user_id: self.ctx.user_id().to_string(),
            group_id: self.group.id.clone(),
            message: text.to_string(),
            api_key,
        };
        let outcome = self.inference.send_group(&request).await;
        self.store.confirm_pending(&pending, None);

        let result = match outcome {
            Ok(GroupOutcome::Replies(replies)) => {
                let count = replies.len();
                self.reveals = Some(self.sequencer.reveal(replies));
                HubSendResult::Dispatched {
                    targets,
                    replies: count,
                }
            }
            Ok(GroupOutcome::Failed { message }) => {
                tracing::warn!(hub_id = %self.group.id, "Backend rejected hub send: {}", message);
                let bubble = self.store.append_error(message, SenderKind::System);
                HubSendResult::Failed(bubble.clone())
            }
            Err(e) => {
                tracing::error!(hub_id = %self.group.id, "Hub send failed: {:#}", e);
                let bubble = self.store.append_error(HUB_SEND_FAILED, SenderKind::System);
                HubSendResult::Failed(bubble.clone())
            }
        };

        self.sequencer.finish_send();
        result
    }

    /// Waits for the next staggered reply and appends it to the log
    ///
    /// Returns `None` when the current send has nothing left to reveal.
    pub async fn next_reveal(&mut self) -> Option<Message> {
        let batch = self.reveals.as_mut()?;
        match batch.next().await {
            Some(message) => {
                let message = message.in_conversation(self.conversation.id.clone());
                self.store.append_confirmed(message.clone());
                Some(message)
            }
            None => {
                self.reveals = None;
                None
            }
        }
    }

    /// Invalidates pending reveals and the speaker reset, e.g. on leaving the view
    pub fn cancel_pending(&mut self) {
        self.sequencer.cancel();
        self.reveals = None;
    }

    /// Re-reads the mention token after an edit; returns the current matches
    pub fn update_compose(&mut self, buffer: &str, caret: usize) -> Vec<&RosterEntry> {
        self.menu.on_buffer_change(buffer, caret);
        self.menu.matches(&self.roster)
    }

    /// Feeds a navigation key to the mention menu
    pub fn mention_key(&mut self, key: MenuKey, buffer: &str) -> KeyOutcome {
        self.menu.on_key(key, buffer, &self.roster)
    }

    /// Current state of the mention menu
    pub fn mention_menu(&self) -> &MentionMenu {
        &self.menu
    }

    /// Deletes the conversation history, remotely first
    pub async fn clear_history(&mut self) -> Result<()> {
        self.cancel_pending();
        self.store.clear().await
    }

    /// Stores a key entered at the credential prompt
    pub fn store_credential(&self, key: &str) -> Result<()> {
        self.ctx.store_key(key)
    }

    /// The hub row as loaded
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// Members that can be addressed with `@mentions`, in hub order
    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// The conversation row backing this hub
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

    /// The persona currently shown as speaking
    pub fn active_speaker(&self) -> Option<ActiveSpeaker> {
        self.sequencer.active_speaker()
    }

    /// Watches the active speaker
    pub fn subscribe_speaker(&self) -> watch::Receiver<Option<ActiveSpeaker>> {
        self.sequencer.subscribe()
    }

    /// Display name of a roster persona
    pub fn persona_name(&self, persona_id: &str) -> Option<&str> {
        self.roster
            .iter()
            .find(|entry| entry.persona_id == persona_id)
            .map(|entry| entry.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use crate::gateway::MemoryGateway;
    use crate::inference::{
        ChatOutcome, ChatRequest, GroupReply, Reflection, ReflectionRequest, SynthesisRequest,
        COLLECTIVE_SILENT,
    };
    use crate::models::{GroupDraft, Mood, PersonaDraft};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct ScriptedHub {
        outcomes: Mutex<Vec<Result<GroupOutcome>>>,
        calls: Mutex<usize>,
        delay: Duration,
    }

    impl ScriptedHub {
        fn new(outcomes: Vec<Result<GroupOutcome>>) -> Arc<Self> {
            Self::delayed(Duration::ZERO, outcomes)
        }

        fn delayed(delay: Duration, outcomes: Vec<Result<GroupOutcome>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
                delay,
            })
        }
    }

    #[async_trait]
    impl InferenceClient for ScriptedHub {
        async fn send_chat(&self, _request: &ChatRequest) -> Result<ChatOutcome> {
            unimplemented!()
        }

        async fn send_group(&self, _request: &GroupChatRequest) -> Result<GroupOutcome> {
            *self.calls.lock().unwrap() += 1;
            tokio::time::sleep(self.delay).await;
            self.outcomes.lock().unwrap().remove(0)
        }

        async fn synthesize_persona(&self, _request: &SynthesisRequest) -> Result<serde_json::Value> {
            unimplemented!()
        }

        async fn reflect(&self, _request: &ReflectionRequest) -> Result<Reflection> {
            unimplemented!()
        }
    }

    fn replies(ids: &[&str]) -> Result<GroupOutcome> {
        Ok(GroupOutcome::Replies(
            ids.iter()
                .map(|id| GroupReply {
                    persona_id: id.to_string(),
                    persona_name: Some(format!("name-{}", id)),
                    response: format!("from {}", id),
                    mood: Some(Mood::Happy),
                })
                .collect(),
        ))
    }

    async fn open_hub(inference: Arc<ScriptedHub>, key: Option<&str>) -> HubChat {
        let gateway = Arc::new(MemoryGateway::new());
        let ada = gateway
            .create_persona("u1", &PersonaDraft::named("Ada Lovelace"))
            .await
            .unwrap();
        let grace = gateway
            .create_persona("u1", &PersonaDraft::named("Grace Hopper"))
            .await
            .unwrap();
        let group = gateway
            .create_group(
                "u1",
                &GroupDraft {
                    name: "Council".to_string(),
                    description: None,
                },
                &[ada.id, grace.id],
            )
            .await
            .unwrap();
        let credentials = match key {
            Some(key) => MemoryCredentialStore::with_key(key),
            None => MemoryCredentialStore::new(),
        };
        HubChat::open(
            SessionContext::new("u1", Arc::new(credentials)),
            gateway,
            inference,
            &group.id,
            &ChatConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_replies_are_appended_in_staggered_order() {
        let mut hub = open_hub(ScriptedHub::new(vec![replies(&["a", "b", "c"])]), Some("k")).await;
        assert_eq!(hub.roster().len(), 2);

        let start = Instant::now();
        let result = hub.send("@Ada what now?").await;
        match &result {
            HubSendResult::Dispatched { targets, replies } => {
                assert_eq!(*replies, 3);
                assert_eq!(targets.len(), 1);
            }
            other => panic!("expected dispatch, got {:?}", other),
        }

        let mut offsets = Vec::new();
        while let Some(message) = hub.next_reveal().await {
            offsets.push(start.elapsed());
            assert_eq!(
                hub.active_speaker().unwrap().persona_id,
                message.persona_id.clone().unwrap()
            );
        }
        assert_eq!(
            offsets,
            vec![
                Duration::from_millis(0),
                Duration::from_millis(1200),
                Duration::from_millis(2400)
            ]
        );

        let log: Vec<&str> = hub.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(log, vec!["@Ada what now?", "from a", "from b", "from c"]);
        assert!(hub
            .messages()
            .iter()
            .all(|m| m.conversation_id.as_deref() == Some(hub.conversation().id.as_str())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_message_visible_while_hub_replies_pending() {
        let mut hub = open_hub(
            ScriptedHub::delayed(Duration::from_millis(200), vec![replies(&["a"])]),
            Some("k"),
        )
        .await;
        let log = hub.subscribe_messages();

        let (result, during) = tokio::join!(hub.send("hello hub"), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            log.borrow()
                .iter()
                .map(|m| (m.sender, m.content.clone()))
                .collect::<Vec<_>>()
        });

        assert_eq!(during, vec![(SenderKind::User, "hello hub".to_string())]);
        assert!(matches!(result, HubSendResult::Dispatched { replies: 1, .. }));
        assert!(hub.next_reveal().await.is_some());
        assert_eq!(hub.subscribe_messages().borrow().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaker_resets_eight_seconds_after_send() {
        let mut hub = open_hub(ScriptedHub::new(vec![replies(&["a", "b"])]), Some("k")).await;
        let mut speaker = hub.subscribe_speaker();
        let start = Instant::now();
        hub.send("hello").await;

        loop {
            speaker.changed().await.unwrap();
            if speaker.borrow_and_update().is_none() {
                break;
            }
        }
        assert_eq!(start.elapsed(), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collective_failure_is_system_error_bubble() {
        let mut hub = open_hub(
            ScriptedHub::new(vec![Ok(GroupOutcome::Failed {
                message: COLLECTIVE_SILENT.to_string(),
            })]),
            Some("k"),
        )
        .await;

        match hub.send("anyone?").await {
            HubSendResult::Failed(bubble) => {
                assert_eq!(bubble.sender, SenderKind::System);
                assert_eq!(bubble.content, COLLECTIVE_SILENT);
                assert!(bubble.is_error);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(hub.next_reveal().await.is_none());
        assert_eq!(hub.messages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_uses_hub_fallback_text() {
        let mut hub = open_hub(
            ScriptedHub::new(vec![Err(anyhow::anyhow!("connection reset"))]),
            Some("k"),
        )
        .await;
        match hub.send("anyone?").await {
            HubSendResult::Failed(bubble) => assert_eq!(bubble.content, HUB_SEND_FAILED),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credential_prompts_without_sending() {
        let inference = ScriptedHub::new(vec![]);
        let mut hub = open_hub(inference.clone(), None).await;

        assert_eq!(hub.send("hello").await, HubSendResult::CredentialRequired);
        assert!(hub.messages().is_empty());
        assert_eq!(*inference.calls.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_send_drops_unrevealed_replies() {
        let mut hub = open_hub(
            ScriptedHub::new(vec![replies(&["a", "b", "c"]), replies(&["d"])]),
            Some("k"),
        )
        .await;

        hub.send("first").await;
        assert_eq!(hub.next_reveal().await.unwrap().content, "from a");

        hub.send("second").await;
        assert_eq!(hub.next_reveal().await.unwrap().content, "from d");
        assert!(hub.next_reveal().await.is_none());

        let log: Vec<&str> = hub.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(log, vec!["first", "from a", "second", "from d"]);
    }

    #[tokio::test]
    async fn test_mention_menu_commits_roster_name() {
        let mut hub = open_hub(ScriptedHub::new(vec![]), Some("k")).await;
        let matches = hub.update_compose("ask @gr", 7);
        assert_eq!(matches.len(), 1);

        match hub.mention_key(MenuKey::Enter, "ask @gr") {
            KeyOutcome::Committed { buffer, .. } => assert_eq!(buffer, "ask @GraceHopper "),
            other => panic!("expected commit, got {:?}", other),
        }
        assert!(!hub.mention_menu().is_open());
        assert!(hub.persona_name(&hub.roster()[0].persona_id).is_some());
    }
}
