//! Interactive hub chat handler
//!
//! Runs a readline loop against a [`HubChat`]. Typing `@` offers the hub
//! roster: Tab completes the mention, and an inline hint lists the matching
//! personas. Replies are printed one at a time as they are revealed.

use std::borrow::Cow;
use std::sync::Arc;

use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hint, Hinter};
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use super::{dictate, print_error, print_message, print_welcome_banner, prompt_for_key, read_line};
use super::Runtime;
use crate::chat::{HubChat, HubSendResult};
use crate::config::Config;
use crate::error::Result;
use crate::mention::{self, RosterEntry};
use crate::models::{Message, Mood};
use crate::voice::{ComposeBuffer, VoiceCapture};

/// Inline hint for the mention being typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionHint {
    display: String,
    completion: Option<String>,
}

impl Hint for MentionHint {
    fn display(&self) -> &str {
        &self.display
    }

    fn completion(&self) -> Option<&str> {
        self.completion.as_deref()
    }
}

/// Readline helper that completes `@mentions` from the hub roster
pub struct MentionHelper {
    roster: Vec<RosterEntry>,
}

impl MentionHelper {
    pub fn new(roster: Vec<RosterEntry>) -> Self {
        Self { roster }
    }
}

impl Completer for MentionHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let Some(token) = mention::active_token(line, pos) else {
            return Ok((pos, Vec::new()));
        };

        let candidates = mention::filter(&self.roster, &token.query)
            .into_iter()
            .map(|entry| Pair {
                display: match &entry.subtitle {
                    Some(subtitle) => format!("{} ({})", entry.name, subtitle),
                    None => entry.name.clone(),
                },
                replacement: mention::mention_text(&entry.name),
            })
            .collect();

        Ok((token.start, candidates))
    }
}

impl Hinter for MentionHelper {
    type Hint = MentionHint;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<MentionHint> {
        if pos < line.len() {
            return None;
        }
        let token = mention::active_token(line, pos)?;
        let matches = mention::filter(&self.roster, &token.query);

        let Some(first) = matches.first() else {
            return Some(MentionHint {
                display: "  (no persona matches)".to_string(),
                completion: None,
            });
        };

        // Right-arrow accepts the rest of the first match when the query is its prefix.
        let mention = mention::mention_text(&first.name);
        let typed = &line[token.start..pos];
        let completion = mention
            .to_lowercase()
            .starts_with(&typed.to_lowercase())
            .then(|| mention.get(typed.len()..).map(str::to_string))
            .flatten()
            .filter(|rest| !rest.is_empty());

        let names: Vec<&str> = matches.iter().map(|entry| entry.name.as_str()).collect();
        let display = match &completion {
            Some(rest) if matches.len() == 1 => rest.clone(),
            _ => format!("  [{}]", names.join(" · ")),
        };

        Some(MentionHint {
            display,
            completion: completion.filter(|_| matches.len() == 1),
        })
    }
}

impl Highlighter for MentionHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(hint.dimmed().to_string())
    }
}

impl Validator for MentionHelper {}

impl Helper for MentionHelper {}

/// Start an interactive chat in a hub
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `runtime` - Gateway, inference client and session context
/// * `group_id` - Hub to open
///
/// # Errors
///
/// Returns an error if the hub, its roster or its conversation cannot be
/// loaded.
pub async fn run_hub(config: &Config, runtime: &Runtime, group_id: &str) -> Result<()> {
    let mut hub = HubChat::open(
        runtime.ctx.clone(),
        Arc::clone(&runtime.gateway),
        Arc::clone(&runtime.inference),
        group_id,
        &config.chat,
    )
    .await?;
    let mut voice = VoiceCapture::from_config(&config.voice);
    let mut rl: Editor<MentionHelper, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(MentionHelper::new(hub.roster().to_vec())));
    let mut draft = ComposeBuffer::default();

    let names: Vec<&str> = hub.roster().iter().map(|e| e.name.as_str()).collect();
    let mut details = vec![
        ("Hub", hub.group().name.bold().to_string()),
        ("Members", names.join(", ")),
    ];
    if let Some(description) = &hub.group().description {
        details.push(("About", description.clone()));
    }
    print_welcome_banner("Neural Hub", &details);

    for message in hub.messages() {
        render(&hub, message);
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
                        match hub.clear_history().await {
                            Ok(()) => println!("{}", "Conversation cleared.".dimmed()),
                            Err(e) => print_error(&e),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Voice) => {
                        dictate(&mut voice, &mut draft).await;
                        continue;
                    }
                    Ok(SpecialCommand::Roster) => {
                        print_roster(hub.roster());
                        continue;
                    }
                    Ok(SpecialCommand::Mood) => {
                        match hub.active_speaker() {
                            Some(speaker) => {
                                let mood = speaker.mood.unwrap_or(Mood::Default);
                                println!(
                                    "{} is {}",
                                    hub.persona_name(&speaker.persona_id).unwrap_or("A persona"),
                                    mood.hub_label().magenta()
                                );
                            }
                            None => println!("{}", "No one is speaking right now.".dimmed()),
                        }
                        continue;
                    }
                    Ok(SpecialCommand::Key) => {
                        prompt_for_key(&mut rl, &runtime.ctx)?;
                        continue;
                    }
                    Err(e) => {
                        eprintln!("{}", e.to_string().red());
                        continue;
                    }
                }

                if !send(&mut hub, &mut rl, runtime, trimmed).await? {
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

    hub.cancel_pending();
    tracing::info!(group_id, "Left hub chat");
    Ok(())
}

/// Sends one line and prints replies as they are revealed
///
/// Returns `false` if the line was held back for a credential.
async fn send(
    hub: &mut HubChat,
    rl: &mut Editor<MentionHelper, DefaultHistory>,
    runtime: &Runtime,
    text: &str,
) -> Result<bool> {
    loop {
        println!("{}", "Synchronizing with the hub...".dimmed());
        match hub.send(text).await {
            HubSendResult::Ignored => return Ok(true),
            HubSendResult::CredentialRequired => {
                if !prompt_for_key(rl, &runtime.ctx)? {
                    return Ok(false);
                }
            }
            HubSendResult::Failed(message) => {
                render(hub, &message);
                return Ok(true);
            }
            HubSendResult::Dispatched { targets, replies } => {
                if !targets.is_empty() {
                    let names: Vec<&str> = targets
                        .iter()
                        .filter_map(|id| hub.persona_name(id))
                        .collect();
                    tracing::debug!(replies, "Addressed {}", names.join(", "));
                }
                while let Some(message) = hub.next_reveal().await {
                    render(hub, &message);
                }
                return Ok(true);
            }
        }
    }
}

fn render(hub: &HubChat, message: &Message) {
    let speaker = message
        .persona_name
        .as_deref()
        .or_else(|| message.persona_id.as_deref().and_then(|id| hub.persona_name(id)))
        .unwrap_or("Persona");
    print_message(
        message,
        speaker,
        message.mood.as_ref().map(|m| m.hub_label()),
    );
}

fn print_roster(roster: &[RosterEntry]) {
    println!("\n{}", "Hub roster".bold());
    for entry in roster {
        let mention = mention::mention_text(&entry.name);
        match &entry.subtitle {
            Some(subtitle) => println!("  {} {} ({})", padded(&mention).cyan(), entry.name, subtitle),
            None => println!("  {} {}", padded(&mention).cyan(), entry.name),
        }
    }
    println!();
}

fn padded(mention: &str) -> String {
    format!("{:<24}", mention.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::DefaultHistory;

    fn helper() -> MentionHelper {
        MentionHelper::new(vec![
            RosterEntry {
                persona_id: "p1".to_string(),
                name: "Ada Lovelace".to_string(),
                subtitle: Some("Mathematician".to_string()),
            },
            RosterEntry {
                persona_id: "p2".to_string(),
                name: "Alan Turing".to_string(),
                subtitle: None,
            },
            RosterEntry {
                persona_id: "p3".to_string(),
                name: "Grace Hopper".to_string(),
                subtitle: None,
            },
        ])
    }

    #[test]
    fn test_complete_replaces_token_span() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let (start, candidates) = helper().complete("hi @a", 5, &ctx).unwrap();
        assert_eq!(start, 3);
        let replacements: Vec<&str> = candidates.iter().map(|c| c.replacement.as_str()).collect();
        assert_eq!(replacements, vec!["@AdaLovelace ", "@AlanTuring ", "@GraceHopper "]);
        assert_eq!(candidates[0].display, "Ada Lovelace (Mathematician)");
    }

    #[test]
    fn test_complete_ignores_email_addresses() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let line = "mail me@gr";
        let (start, candidates) = helper().complete(line, line.len(), &ctx).unwrap();
        assert_eq!(start, line.len());
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_hint_single_match_completes() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let hint = helper().hint("@gra", 4, &ctx).unwrap();
        assert_eq!(hint.completion(), Some("ceHopper "));
        assert_eq!(hint.display(), "ceHopper ");
    }

    #[test]
    fn test_hint_lists_several_matches_and_empty_state() {
        let history = DefaultHistory::new();
        let ctx = Context::new(&history);
        let hint = helper().hint("@a", 2, &ctx).unwrap();
        assert_eq!(hint.completion(), None);
        assert!(hint.display().contains("Ada Lovelace"));
        assert!(hint.display().contains("Alan Turing"));

        let empty = helper().hint("@zed", 4, &ctx).unwrap();
        assert_eq!(empty.completion(), None);
        assert!(empty.display().contains("no persona"));

        assert!(helper().hint("no mention", 10, &ctx).is_none());
    }
}
