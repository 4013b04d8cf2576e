//! Chat controllers
//!
//! [`DirectChat`] drives a one-on-one conversation and [`HubChat`] a
//! multi-persona hub. Each owns the [`crate::session::SessionStore`] for its
//! conversation and runs one send cycle at a time: credential gate,
//! optimistic append, inference call, then reply or in-log error.

pub mod direct;
pub mod hub;

pub use direct::{DirectChat, SendResult};
pub use hub::{HubChat, HubSendResult};

use crate::credential::SessionContext;
use crate::error::{classify, EmrysError, Result};
use crate::inference::ApiKey;

/// Error bubble text for a one-on-one send that never got a backend answer
pub const DIRECT_SEND_FAILED: &str =
    "Neural link interrupted. Please check your connection or API key.";

/// Error bubble text for a hub send that never got a backend answer
pub const HUB_SEND_FAILED: &str = "Neural Hub synchronization failed.";

/// Reads the inference key for one send
///
/// `Ok(None)` means no key is stored and the caller must prompt for one
/// before anything is sent.
pub(crate) fn credential_gate(ctx: &SessionContext) -> Result<Option<ApiKey>> {
    match ctx.inference_key() {
        Ok(key) => Ok(Some(ApiKey::new(key))),
        Err(e) if matches!(classify(&e), Some(EmrysError::MissingCredential)) => {
            tracing::info!("No inference credential stored; prompting");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Maps a failed load step to [`EmrysError::Load`]
pub(crate) fn load_error(what: &str, err: anyhow::Error) -> anyhow::Error {
    match classify(&err) {
        Some(EmrysError::Load(_)) => err,
        _ => {
            tracing::warn!("Failed to load {}: {:#}", what, err);
            EmrysError::Load(format!("{}: {}", what, err)).into()
        }
    }
}
