//! Staggered reveal of hub replies
//!
//! A hub send returns every persona's reply in one response. Showing them all
//! at once reads badly, so the [`ResponseSequencer`] releases reply `i` at
//! `stagger × i` after receipt and points the active-speaker indicator at each
//! persona as it "speaks". The indicator goes back to nobody a fixed time
//! after the send completes; that timeout is not extended per reply.
//!
//! All deferred work is a tokio task bound to the current send's
//! [`CancellationToken`]. Starting a new send, calling
//! [`ResponseSequencer::cancel`] or dropping the sequencer invalidates every
//! reveal and reset still waiting to fire.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::inference::GroupReply;
use crate::models::{Message, Mood};

/// The persona currently shown as speaking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSpeaker {
    pub persona_id: String,
    pub mood: Option<Mood>,
}

/// Receiver for the replies of one send, in reveal order
///
/// Yields `None` once every reply has been delivered or the send was
/// cancelled.
pub struct RevealBatch {
    rx: mpsc::UnboundedReceiver<Message>,
    expected: usize,
}

impl RevealBatch {
    /// Waits for the next revealed reply
    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Number of replies scheduled in this batch
    pub fn expected(&self) -> usize {
        self.expected
    }
}

/// Schedules reply reveals and the active-speaker indicator
pub struct ResponseSequencer {
    stagger: Duration,
    speaker_timeout: Duration,
    send: CancellationToken,
    speaker: Arc<watch::Sender<Option<ActiveSpeaker>>>,
}

impl ResponseSequencer {
    /// Creates a sequencer with explicit timings
    pub fn new(stagger: Duration, speaker_timeout: Duration) -> Self {
        let (speaker, _) = watch::channel(None);
        Self {
            stagger,
            speaker_timeout,
            send: CancellationToken::new(),
            speaker: Arc::new(speaker),
        }
    }

    /// Creates a sequencer using the `chat` section's timings
    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.reveal_stagger(), config.speaker_timeout())
    }

    /// Starts a new send, invalidating everything the previous one scheduled
    pub fn begin_send(&mut self) {
        self.send.cancel();
        self.send = CancellationToken::new();
    }

    /// Schedules `replies` for reveal, preserving their order
    ///
    /// Must be called from within a tokio runtime.
    pub fn reveal(&self, replies: Vec<GroupReply>) -> RevealBatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let expected = replies.len();
        let received = tokio::time::Instant::now();
        let stagger = self.stagger;
        let token = self.send.clone();
        let speaker = Arc::clone(&self.speaker);

        // One task per batch so delivery follows server order even when
        // several deadlines coincide.
        tokio::spawn(async move {
            for (i, reply) in replies.into_iter().enumerate() {
                let deadline = received + stagger * i as u32;
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!(index = i, "Reveal cancelled");
                        return;
                    }
                    _ = tokio::time::sleep_until(deadline) => {}
                }

                speaker.send_replace(Some(ActiveSpeaker {
                    persona_id: reply.persona_id.clone(),
                    mood: reply.mood.clone(),
                }));
                let message = Message::persona(reply.response)
                    .from_persona(reply.persona_id, reply.persona_name)
                    .with_mood(reply.mood);
                if tx.send(message).is_err() {
                    return;
                }
            }
        });

        RevealBatch { rx, expected }
    }

    /// Schedules the speaker reset, measured from now
    ///
    /// Call once when the send operation has finished, whatever its outcome.
    pub fn finish_send(&self) {
        let token = self.send.clone();
        let speaker = Arc::clone(&self.speaker);
        let timeout = self.speaker_timeout;

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    speaker.send_replace(None);
                }
            }
        });
    }

    /// Invalidates every pending reveal and reset
    pub fn cancel(&self) {
        self.send.cancel();
    }

    /// The persona currently speaking
    pub fn active_speaker(&self) -> Option<ActiveSpeaker> {
        self.speaker.borrow().clone()
    }

    /// Watches active-speaker changes
    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveSpeaker>> {
        self.speaker.subscribe()
    }
}

impl Drop for ResponseSequencer {
    fn drop(&mut self) {
        self.send.cancel();
    }
}
