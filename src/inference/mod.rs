//! Inference backend client
//!
//! Every generated behaviour (persona replies, mood tags, reflection posts,
//! persona synthesis) is delegated to a remote HTTP service. This module
//! defines the [`InferenceClient`] trait the chat controllers depend on and
//! the HTTP implementation used in production.

use async_trait::async_trait;

pub mod http;
pub mod types;

pub use http::HttpInferenceClient;
pub use types::{
    ApiKey, ChatOutcome, ChatRequest, GroupChatRequest, GroupOutcome, GroupReply, PersonaReply,
    Reflection, ReflectionRequest, SynthesisRequest, COLLECTIVE_SILENT,
};

use crate::error::Result;

/// Calls exposed by the inference backend
///
/// Backend-reported failures on the chat endpoints come back as
/// `Ok(ChatOutcome::Failed)` / `Ok(GroupOutcome::Failed)`; `Err` is reserved
/// for transport failures and unreadable responses.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// `POST /api/chat/send`
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatOutcome>;

    /// `POST /api/chat/group/send`
    async fn send_group(&self, request: &GroupChatRequest) -> Result<GroupOutcome>;

    /// `POST /api/persona/synthesize`, returning the raw attribute object
    async fn synthesize_persona(&self, request: &SynthesisRequest) -> Result<serde_json::Value>;

    /// `POST /api/life/reflect`
    async fn reflect(&self, request: &ReflectionRequest) -> Result<Reflection>;
}
