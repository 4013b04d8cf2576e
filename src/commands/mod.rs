/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `chat`     - Interactive one-on-one chat with a persona
- `hub`      - Interactive multi-persona hub chat
- `personas` - Persona roster management
- `hubs`     - Hub management
- `feed`     - Reflection feed
- `synthesize` - Persona drafting from a name
- `auth`     - Inference API key storage

Handlers are thin: they build a [`Runtime`] from configuration and drive
the library controllers, rendering results to the terminal.
*/

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::History;
use rustyline::{Editor, Helper};

use crate::config::Config;
use crate::credential::{CredentialStore, KeyringCredentialStore, SessionContext};
use crate::error::{EmrysError, Result};
use crate::gateway::{PersistenceGateway, RestGateway};
use crate::inference::{HttpInferenceClient, InferenceClient};
use crate::models::{Message, SenderKind};
use crate::voice::{ComposeBuffer, ToggleOutcome, VoiceCapture, VoiceOutcome};

// Special commands parser for the REPLs
pub mod special_commands;

// Interactive chat handlers
pub mod chat;
pub mod hub;

// Roster management handlers
pub mod feed;
pub mod hubs;
pub mod personas;

/// Shared services for one CLI invocation
#[derive(Clone)]
pub struct Runtime {
    pub ctx: SessionContext,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub inference: Arc<dyn InferenceClient>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl Runtime {
    /// Wires the REST gateway, HTTP inference client and keyring store
    ///
    /// # Errors
    ///
    /// Returns an error if no user id is configured or an HTTP client
    /// cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let user_id = config.user_id()?;
        let credentials: Arc<dyn CredentialStore> =
            Arc::new(KeyringCredentialStore::new(&config.credential));
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(RestGateway::new(&config.gateway)?);
        let inference: Arc<dyn InferenceClient> =
            Arc::new(HttpInferenceClient::new(&config.inference)?);

        tracing::debug!(
            user_id = %user_id,
            gateway = %config.gateway.url,
            backend = %config.inference.base_url,
            "Runtime ready"
        );

        Ok(Self {
            ctx: SessionContext::new(user_id, Arc::clone(&credentials)),
            gateway,
            inference,
            credentials,
        })
    }
}

/// Prints one log entry
///
/// `mood_label` renders a persona reply's mood tag for the current view.
pub(crate) fn print_message(message: &Message, speaker: &str, mood_label: Option<&str>) {
    if message.is_error {
        println!("{} {}", "!".red().bold(), message.content.red());
        return;
    }

    match message.sender {
        SenderKind::User => println!("{} {}", "you ›".cyan().bold(), message.content),
        SenderKind::System => println!("{}", message.content.dimmed()),
        SenderKind::Persona => {
            let mut header = format!("{} ›", speaker).green().bold().to_string();
            if let Some(label) = mood_label {
                header.push_str(&format!(" {}", format!("[{}]", label).magenta()));
            }
            if message.retrieved {
                header.push_str(&format!(" {}", "(memory)".dimmed()));
            }
            if message.safety_blocked {
                println!("{} {}", header, "[withheld by safety filter]".yellow());
            } else {
                println!("{} {}", header, message.content);
            }
        }
    }
}

/// Prints an error the way the REPLs report failures
pub(crate) fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
}

/// Asks for the inference API key and stores it
///
/// Returns `Ok(false)` when the user cancels or enters nothing.
pub(crate) fn prompt_for_key<H: Helper, I: History>(
    rl: &mut Editor<H, I>,
    ctx: &SessionContext,
) -> Result<bool> {
    println!(
        "{}",
        "An inference API key is required before messages can be sent.".yellow()
    );
    match rl.readline("API key (blank to cancel): ") {
        Ok(line) if line.trim().is_empty() => Ok(false),
        Ok(line) => {
            ctx.store_key(line.trim())?;
            println!("{}", "Key saved.".green());
            Ok(true)
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Runs one `/voice` dictation into `draft`
///
/// Recording stops when the recognizer finishes or on Ctrl-C. The transcript
/// is appended to the draft, which the REPL offers back for editing.
pub(crate) async fn dictate(voice: &mut VoiceCapture, draft: &mut ComposeBuffer) {
    match voice.toggle() {
        ToggleOutcome::Started => {}
        ToggleOutcome::Stopped => {}
        ToggleOutcome::Unavailable { first_time: true } => {
            println!(
                "{}",
                "Speech recognition is not available. Set voice.command in the config \
                 file (or EMRYS_VOICE_COMMAND) to a program that prints a transcript."
                    .yellow()
            );
            return;
        }
        ToggleOutcome::Unavailable { first_time: false } => {
            println!("{}", "Speech recognition is not available.".yellow());
            return;
        }
    }

    println!("{}", "Listening... press Ctrl-C to stop.".cyan());
    let stop = voice.stop_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Some(stop) = stop {
                stop.cancel();
            }
        }
    });

    let outcome = voice.settle(draft).await;
    interrupt.abort();

    match outcome {
        VoiceOutcome::Transcript(text) => {
            println!("{} {}", "Heard:".cyan(), text);
        }
        VoiceOutcome::Error(e) => {
            println!("{} {}", "Speech recognition error:".red(), e);
        }
        VoiceOutcome::Stopped => println!("{}", "Stopped listening.".dimmed()),
        VoiceOutcome::NoSession => {}
    }
}

/// Reads one line, pre-filled with the pending draft
pub(crate) fn read_line<H: Helper, I: History>(
    rl: &mut Editor<H, I>,
    prompt: &str,
    draft: &mut ComposeBuffer,
) -> rustyline::Result<String> {
    if draft.text.is_empty() {
        return rl.readline(prompt);
    }
    let caret = draft.caret.min(draft.text.len());
    let (left, right) = draft.text.split_at(caret);
    let line = rl.readline_with_initial(prompt, (left, right));
    draft.take();
    line
}

const BANNER_WIDTH: usize = 62;

/// Left and right padding that centers `title` in the banner
fn banner_padding(title: &str) -> (usize, usize) {
    let pad = BANNER_WIDTH.saturating_sub(title.chars().count());
    (pad / 2, pad - pad / 2)
}

/// Prints the boxed session banner
pub(crate) fn print_welcome_banner(title: &str, details: &[(&str, String)]) {
    let title = format!("EMRYS · {}", title);
    let (left, right) = banner_padding(&title);

    println!("\n╔{}╗", "═".repeat(BANNER_WIDTH));
    println!(
        "║{}{}{}║",
        " ".repeat(left),
        title.bold(),
        " ".repeat(right)
    );
    println!("╚{}╝\n", "═".repeat(BANNER_WIDTH));
    for (label, value) in details {
        println!("{:<9} {}", format!("{}:", label), value);
    }
    println!("\nType '/help' for available commands, 'exit' to quit\n");
}

// Inference API key management
pub mod auth {
    //! Store, replace, or remove the inference API key.

    use super::*;
    use rustyline::DefaultEditor;

    /// Run the `auth` command
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `key` - Key to store; prompts when `None`
    /// * `clear` - Remove the stored key instead
    pub async fn run_auth(config: &Config, key: Option<String>, clear: bool) -> Result<()> {
        let store = KeyringCredentialStore::new(&config.credential);
        run_auth_with(&store, key, clear, || {
            let mut rl = DefaultEditor::new()?;
            match rl.readline("API key: ") {
                Ok(line) => Ok(Some(line)),
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Store logic behind [`run_auth`], with the prompt injected
    pub fn run_auth_with<F>(
        store: &dyn CredentialStore,
        key: Option<String>,
        clear: bool,
        prompt: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<Option<String>>,
    {
        if clear {
            store.clear()?;
            tracing::info!("Inference API key removed");
            println!("Inference API key removed.");
            return Ok(());
        }

        let key = match key {
            Some(key) => key,
            None => match prompt()? {
                Some(key) => key,
                None => {
                    println!("Cancelled.");
                    return Ok(());
                }
            },
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(EmrysError::Validation("API key must not be empty".to_string()).into());
        }

        store.save(key)?;
        tracing::info!("Inference API key stored");
        println!("{}", "Inference API key stored.".green());
        Ok(())
    }

}

// Persona synthesis
pub mod synthesize {
    //! Draft a persona profile from a name.

    use super::*;
    use crate::roster::RosterService;

    /// Run the `synthesize` command
    ///
    /// Prints the drafted profile as YAML; with `save` the draft is also
    /// created as a persona.
    pub async fn run_synthesize(
        runtime: &Runtime,
        name: &str,
        context: Option<&str>,
        save: bool,
    ) -> Result<()> {
        let roster = RosterService::new(
            runtime.ctx.clone(),
            Arc::clone(&runtime.gateway),
            Arc::clone(&runtime.inference),
        );

        println!("{}", format!("Synthesizing {}...", name).dimmed());
        let draft = roster.synthesize(name, context).await?;
        print!("{}", serde_yaml::to_string(&draft)?);

        if save {
            let persona = roster.create_persona(&draft).await?;
            println!(
                "\n{} {} ({})",
                "Created persona".green(),
                persona.name().bold(),
                persona.id
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_padding_centers_title() {
        let title = "EMRYS · Neural Hub";
        let (left, right) = banner_padding(title);
        assert_eq!(left + title.chars().count() + right, BANNER_WIDTH);
        assert!(right - left <= 1);
    }

    #[test]
    fn test_banner_padding_never_underflows() {
        assert_eq!(banner_padding(&"x".repeat(80)), (0, 0));
    }
}
