//! Special commands parser for the chat REPLs
//!
//! Lines starting with `/` are session commands rather than messages:
//! clearing the history, dictating with the microphone, showing the roster
//! or the current mood, replacing the API key, and leaving the session.
//!
//! Commands are case-insensitive. `exit` and `quit` work without the slash.

use colored::Colorize;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an argument it does not take
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Special commands that can be executed during a chat session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Delete the conversation history, remotely first
    Clear,

    /// Start or stop speech capture into the compose buffer
    Voice,

    /// Show the persona's current mood
    Mood,

    /// List the hub roster with mention names
    Roster,

    /// Prompt for a new inference API key
    Key,

    /// Display help information
    Help,

    /// Leave the session
    Exit,

    /// Not a special command; send the line as a message
    None,
}

/// Parse a user input line into a special command
///
/// # Errors
///
/// Returns [`CommandError::UnknownCommand`] for an unrecognised `/command`,
/// and [`CommandError::UnsupportedArgument`] when a command is given an
/// argument.
///
/// # Examples
///
/// ```
/// use emrys::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/CLEAR").unwrap(), SpecialCommand::Clear);
/// assert_eq!(parse_special_command("quit").unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("hello there").unwrap(), SpecialCommand::None);
/// assert!(parse_special_command("/dance").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match lower.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (lower.as_str(), ""),
    };

    let parsed = match command {
        "/clear" => SpecialCommand::Clear,
        "/voice" | "/mic" => SpecialCommand::Voice,
        "/mood" => SpecialCommand::Mood,
        "/roster" | "/who" => SpecialCommand::Roster,
        "/key" => SpecialCommand::Key,
        "/help" | "/?" => SpecialCommand::Help,
        "/exit" | "/quit" => SpecialCommand::Exit,
        _ => return Err(CommandError::UnknownCommand(trimmed.to_string())),
    };

    if !arg.is_empty() {
        return Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }

    Ok(parsed)
}

/// Print help for the chat REPLs
pub fn print_help() {
    println!(
        r#"
{}
==========================

SESSION:
  /clear          - Delete this conversation's history
  /key            - Enter a new inference API key
  /help, /?       - Show this help
  /exit, exit     - Leave the session (Ctrl-D also works)

VOICE:
  /voice, /mic    - Start dictating; press Ctrl-C to stop and
                    edit the transcript before sending

DIRECT CHAT:
  /mood           - Show the persona's current mood

HUB CHAT:
  /roster, /who   - List hub members and their mention names
  @Name           - Address one persona (Tab completes names)
  (no mention)    - Everyone in the hub may answer
"#,
        "Chat Session Commands".bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(parse_special_command("/clear").unwrap(), SpecialCommand::Clear);
        assert_eq!(parse_special_command("/Voice").unwrap(), SpecialCommand::Voice);
        assert_eq!(parse_special_command("/mic").unwrap(), SpecialCommand::Voice);
        assert_eq!(parse_special_command("/mood").unwrap(), SpecialCommand::Mood);
        assert_eq!(parse_special_command("/who").unwrap(), SpecialCommand::Roster);
        assert_eq!(parse_special_command("/key").unwrap(), SpecialCommand::Key);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("  /exit  ").unwrap(), SpecialCommand::Exit);
        assert_eq!(parse_special_command("EXIT").unwrap(), SpecialCommand::Exit);
    }

    #[test]
    fn test_plain_text_and_mentions_are_messages() {
        assert_eq!(
            parse_special_command("@Ada what do you think?").unwrap(),
            SpecialCommand::None
        );
        assert_eq!(
            parse_special_command("exit the building").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_unknown_and_extra_arguments() {
        assert_eq!(
            parse_special_command("/dance"),
            Err(CommandError::UnknownCommand("/dance".to_string()))
        );
        assert_eq!(
            parse_special_command("/clear all"),
            Err(CommandError::UnsupportedArgument {
                command: "/clear".to_string(),
                arg: "all".to_string(),
            })
        );
        let message = CommandError::UnknownCommand("/x".to_string()).to_string();
        assert!(message.contains("/help"));
    }
}
