//! Interactive one-on-one chat handler
//!
//! Opens a [`DirectChat`] for the persona, replays its history, then runs a
//! readline loop that sends each line and prints the reply with its mood.

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::{dictate, print_error, print_message, print_welcome_banner, prompt_for_key, read_line};
use super::Runtime;
use crate::chat::{DirectChat, SendResult};
use crate::config::Config;
use crate::error::Result;
use crate::models::Message;
use crate::voice::{ComposeBuffer, VoiceCapture};

/// Start an interactive chat with a persona
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `runtime` - Gateway, inference client and session context
/// * `persona_id` - Persona to talk to
///
/// # Errors
///
/// Returns an error if the persona or its conversation cannot be loaded.
pub async fn run_chat(config: &Config, runtime: &Runtime, persona_id: &str) -> Result<()> {
    let mut chat = DirectChat::open(
        runtime.ctx.clone(),
        Arc::clone(&runtime.gateway),
        Arc::clone(&runtime.inference),
        persona_id,
        &config.chat,
    )
    .await?;
    let mut voice = VoiceCapture::from_config(&config.voice);
    let mut rl = DefaultEditor::new()?;
    let mut draft = ComposeBuffer::default();

    let persona = chat.persona().clone();
    let mut details = vec![("Persona", persona.name().bold().to_string())];
    if let Some(occupation) = &persona.profile.occupation {
        details.push(("Role", occupation.clone()));
    }
    details.push(("Mood", chat.mood().direct_label().to_string()));
    print_welcome_banner("Direct Link", &details);

    if let Some(greeting) = persona
        .profile
        .typical_greeting
        .as_deref()
        .filter(|_| chat.messages().is_empty())
    {
        println!("{}\n", format!("{} usually opens with: \"{}\"", persona.name(), greeting).dimmed());
    }
    for message in chat.messages() {
        render(message, persona.name());
    }

    loop {
        let prompt = format!("{} ", "you ›".cyan().bold());
        match read_line(&mut rl, &prompt, &mut draft) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                match parse_special_command(trimmed) {
                    Ok(SpecialCommand::None) => {}
                    Ok(SpecialCommand::Exit) => break,
                    Ok(SpecialCommand::Help) => {
                        print_help();
                        continue;
                    }
                    Ok(SpecialCommand::Clear) => {
                        match chat.clear_history().await {
                            Ok(()) => println!("{}", "Conversation cleared.".dimmed()),
                            Err(e) => print_error(&e),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Voice) => {
                        dictate(&mut voice, &mut draft).await;
                        continue;
                    }
                    Ok(SpecialCommand::Mood) => {
                        println!(
                            "{} is {}",
                            persona.name(),
                            chat.mood().direct_label().magenta()
                        );
                        continue;
                    }
                    Ok(SpecialCommand::Key) => {
                        prompt_for_key(&mut rl, &runtime.ctx)?;
                        continue;
                    }
                    Ok(SpecialCommand::Roster) => {
                        println!("{}", "/roster is only available in hub chats.".yellow());
                        continue;
                    }
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                }

                if !send(&mut chat, &mut rl, runtime, trimmed).await? {
                    // Keep the unsent text so it can be resubmitted.
                    draft = ComposeBuffer::new(trimmed);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    tracing::info!(persona_id, "Left direct chat");
    Ok(())
}

/// Sends one line; returns `false` if it was held back for a credential
async fn send(
    chat: &mut DirectChat,
    rl: &mut DefaultEditor,
    runtime: &Runtime,
    text: &str,
) -> Result<bool> {
    let name = chat.persona().name().to_string();

    loop {
        let mut retrieving = chat.subscribe_retrieving();
        let watcher_name = name.clone();
        let watcher = tokio::spawn(async move {
            while retrieving.changed().await.is_ok() {
                if *retrieving.borrow_and_update() {
                    println!(
                        "{}",
                        format!("{} is retrieving memories...", watcher_name).dimmed()
                    );
                }
            }
        });

        let result = chat.send(text).await;
        watcher.abort();

        match result {
            SendResult::Ignored => return Ok(true),
            SendResult::CredentialRequired => {
                if !prompt_for_key(rl, &runtime.ctx)? {
                    return Ok(false);
                }
            }
            SendResult::Delivered(message) | SendResult::Failed(message) => {
                render(&message, &name);
                return Ok(true);
            }
        }
    }
}

fn render(message: &Message, persona_name: &str) {
    print_message(
        message,
        persona_name,
        message.mood.as_ref().map(|m| m.direct_label()),
    );
}
