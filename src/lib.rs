//! EMRYS - terminal client for AI personas
//!
//! This library provides the core of EMRYS: one-on-one and multi-persona hub
//! chats against a remote inference backend, with personas, hubs,
//! conversations and reflection posts kept in a hosted table store.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Per-conversation message log with optimistic sends
//! - `chat`: Direct and hub chat controllers (credential gate, send cycle)
//! - `sequencer`: Staggered reveal of hub replies and the active speaker
//! - `mention`: `@mention` token detection, menu state and target resolution
//! - `voice`: Optional speech-to-text capture into the compose buffer
//! - `roster`: Persona, hub and knowledge management, persona synthesis
//! - `feed`: Reflection posts
//! - `gateway`: Persistence gateway trait with REST and in-memory backends
//! - `inference`: Inference backend trait and HTTP client
//! - `credential`: Keyring-backed API key storage and the session context
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` and `commands`: Command-line interface and terminal front end
//!
//! # Example
//!
//! ```no_run
//! use emrys::commands::Runtime;
//! use emrys::chat::{DirectChat, SendResult};
//! use emrys::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!     let runtime = Runtime::from_config(&config)?;
//!
//!     let mut chat = DirectChat::open(
//!         runtime.ctx.clone(),
//!         runtime.gateway.clone(),
//!         runtime.inference.clone(),
//!         "persona-id",
//!         &config.chat,
//!     )
//!     .await?;
//!     if let SendResult::Delivered(reply) = chat.send("Hello!").await {
//!         println!("{}", reply.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credential;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod inference;
pub mod mention;
pub mod models;
pub mod roster;
pub mod sequencer;
pub mod session;
pub mod voice;

// Re-export commonly used types
pub use chat::{DirectChat, HubChat};
pub use config::Config;
pub use credential::SessionContext;
pub use error::{EmrysError, Result};
pub use models::{Message, Mood, SenderKind};
