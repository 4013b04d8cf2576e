//! Command-line interface definition for EMRYS
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for direct chat, hub chat, roster management,
//! the reflection feed, and credential setup.

use clap::{Parser, Subcommand};

/// EMRYS - chat with AI personas from the terminal
#[derive(Parser, Debug, Clone)]
#[command(name = "emrys")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file [default: config/config.yaml, then the
    /// per-user config directory]
    #[arg(short, long, env = "EMRYS_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the inference backend URL
    #[arg(long, env = "EMRYS_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Override the user id
    #[arg(short, long)]
    pub user: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for EMRYS
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start a one-on-one chat with a persona
    Chat {
        /// Persona id
        persona: String,
    },

    /// Start a group chat in a hub
    Hub {
        /// Hub (group) id
        hub: String,
    },

    /// Manage personas
    Personas {
        #[command(subcommand)]
        command: PersonaCommand,
    },

    /// Manage hubs
    Hubs {
        #[command(subcommand)]
        command: HubCommand,
    },

    /// Draft a persona profile from a name using the inference backend
    Synthesize {
        /// Name of the person or character
        #[arg(short, long)]
        name: String,

        /// Additional context for the synthesis
        #[arg(long)]
        context: Option<String>,

        /// Save the drafted persona instead of only printing it
        #[arg(long)]
        save: bool,
    },

    /// Show the reflection feed
    Feed {
        /// Ask a random persona for a new reflection first
        #[arg(long)]
        reflect: bool,
    },

    /// Store, replace, or remove the inference API key
    Auth {
        /// Key to store; prompts when omitted
        #[arg(long)]
        key: Option<String>,

        /// Remove the stored key
        #[arg(long, conflicts_with = "key")]
        clear: bool,
    },
}

/// Persona management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum PersonaCommand {
    /// List your personas
    List {
        /// List public personas instead
        #[arg(long)]
        public: bool,

        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one persona
    Show {
        /// Persona id
        id: String,
    },

    /// Create a persona
    Create {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Occupation or role
        #[arg(long)]
        occupation: Option<String>,

        /// Background story
        #[arg(long)]
        background: Option<String>,

        /// Make the persona public
        #[arg(long)]
        public: bool,
    },

    /// Update a persona's profile
    Update {
        /// Persona id
        id: String,

        /// New display name
        #[arg(short, long)]
        name: Option<String>,

        /// New occupation or role
        #[arg(long)]
        occupation: Option<String>,

        /// New background story
        #[arg(long)]
        background: Option<String>,

        /// Make the persona public or private
        #[arg(long)]
        public: Option<bool>,
    },

    /// Delete a persona
    Delete {
        /// Persona id
        id: String,
    },

    /// Add a knowledge entry to a persona
    Learn {
        /// Persona id
        id: String,

        /// Knowledge category
        #[arg(long, default_value = "fact")]
        category: String,

        /// Knowledge key
        #[arg(long)]
        key: String,

        /// Knowledge value
        #[arg(long)]
        value: String,
    },

    /// List a persona's knowledge entries
    Knowledge {
        /// Persona id
        id: String,
    },
}

/// Hub management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HubCommand {
    /// List your hubs
    List {
        /// Output JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one hub with its roster
    Show {
        /// Hub id
        id: String,
    },

    /// Create a hub from at least two personas
    Create {
        /// Hub name
        #[arg(short, long)]
        name: String,

        /// Hub description
        #[arg(long)]
        description: Option<String>,

        /// Persona ids to link (repeat the flag)
        #[arg(short, long = "persona")]
        personas: Vec<String>,
    },

    /// Link more personas to a hub
    Add {
        /// Hub id
        id: String,

        /// Persona ids to link (repeat the flag)
        #[arg(short, long = "persona")]
        personas: Vec<String>,
    },

    /// Unlink a persona from a hub
    Remove {
        /// Hub id
        id: String,

        /// Persona id
        #[arg(short, long)]
        persona: String,
    },

    /// Delete a hub
    Delete {
        /// Hub id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            backend_url: None,
            user: None,
            command: Commands::Auth {
                key: None,
                clear: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(cli.backend_url.is_none());
    }

    #[test]
    fn test_cli_parse_chat() {
        let cli = Cli::try_parse_from(["emrys", "chat", "persona-1"]).unwrap();
        match cli.command {
            Commands::Chat { persona } => assert_eq!(persona, "persona-1"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parse_hub_create_with_personas() {
        let cli = Cli::try_parse_from([
            "emrys", "hubs", "create", "--name", "Council", "-p", "a", "-p", "b",
        ])
        .unwrap();
        match cli.command {
            Commands::Hubs {
                command: HubCommand::Create { name, personas, .. },
            } => {
                assert_eq!(name, "Council");
                assert_eq!(personas, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_auth_key_conflicts_with_clear() {
        let result = Cli::try_parse_from(["emrys", "auth", "--key", "k", "--clear"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_user_override() {
        let cli = Cli::try_parse_from(["emrys", "--user", "u-9", "feed"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("u-9"));
        assert!(matches!(cli.command, Commands::Feed { reflect: false }));
    }
}
