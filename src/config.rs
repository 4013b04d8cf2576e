//! Configuration management for EMRYS
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, EmrysError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for EMRYS
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Persistence gateway (hosted table API) settings
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Inference backend settings
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Chat timing and behaviour
    #[serde(default)]
    pub chat: ChatConfig,
    /// Where the inference API key is kept on this device
    #[serde(default)]
    pub credential: CredentialConfig,
    /// Optional speech-to-text capability
    #[serde(default)]
    pub voice: VoiceConfig,
    /// Signed-in user
    #[serde(default)]
    pub user: UserConfig,
}

/// Persistence gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Project base URL; tables live under `/rest/v1`
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Public (anon) project key sent as the `apikey` header
    #[serde(default)]
    pub anon_key: String,

    /// Session access token; falls back to the anon key when absent
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_gateway_url() -> String {
    "http://localhost:54321".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            anon_key: String::new(),
            access_token: None,
        }
    }
}

/// Inference backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Backend base URL (e.g. `http://localhost:5000`)
    #[serde(default = "default_inference_url")]
    pub base_url: String,

    /// Optional request timeout. Unset means requests wait until the backend answers.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_inference_url() -> String {
    "http://localhost:5000".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_inference_url(),
            timeout_seconds: None,
        }
    }
}

/// Chat behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Delay between consecutive hub replies being revealed
    #[serde(default = "default_reveal_stagger_ms")]
    pub reveal_stagger_ms: u64,

    /// How long the active-speaker indicator stays lit after a hub send
    #[serde(default = "default_speaker_timeout_ms")]
    pub speaker_timeout_ms: u64,

    /// Delay before the "retrieving" indicator appears in direct chat
    #[serde(default = "default_retrieving_delay_ms")]
    pub retrieving_delay_ms: u64,
}

fn default_reveal_stagger_ms() -> u64 {
    1200
}

fn default_speaker_timeout_ms() -> u64 {
    8000
}

fn default_retrieving_delay_ms() -> u64 {
    500
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reveal_stagger_ms: default_reveal_stagger_ms(),
            speaker_timeout_ms: default_speaker_timeout_ms(),
            retrieving_delay_ms: default_retrieving_delay_ms(),
        }
    }
}

impl ChatConfig {
    /// Stagger between revealed hub replies
    pub fn reveal_stagger(&self) -> Duration {
        Duration::from_millis(self.reveal_stagger_ms)
    }

    /// Active-speaker reset delay
    pub fn speaker_timeout(&self) -> Duration {
        Duration::from_millis(self.speaker_timeout_ms)
    }

    /// Retrieving indicator delay
    pub fn retrieving_delay(&self) -> Duration {
        Duration::from_millis(self.retrieving_delay_ms)
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    /// Keyring service name
    #[serde(default = "default_credential_service")]
    pub service: String,

    /// Keyring account name
    #[serde(default = "default_credential_account")]
    pub account: String,
}

fn default_credential_service() -> String {
    "emrys".to_string()
}

fn default_credential_account() -> String {
    "openrouter_api_key".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            service: default_credential_service(),
            account: default_credential_account(),
        }
    }
}

/// Speech-to-text configuration
///
/// When `command` is unset the voice capability is reported as unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoiceConfig {
    /// Program that records one utterance and prints the transcript to stdout
    #[serde(default)]
    pub command: Option<String>,

    /// Extra arguments for the program
    #[serde(default)]
    pub args: Vec<String>,
}

/// Signed-in user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    /// User id as known to the persistence gateway
    #[serde(default)]
    pub id: Option<String>,
}

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_PATH: &str = "config/config.yaml";

impl Config {
    /// Default config file location
    ///
    /// `config/config.yaml` in the working directory when it exists, else
    /// `config.yaml` in the per-user config directory (for example
    /// `~/.config/emrys/config.yaml` on Linux).
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(LOCAL_CONFIG_PATH);
        if local.exists() {
            return local;
        }
        directories::ProjectDirs::from("", "", "emrys")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or(local)
    }

    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EmrysError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| EmrysError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("EMRYS_GATEWAY_URL") {
            self.gateway.url = url;
        }

        if let Ok(key) = std::env::var("EMRYS_GATEWAY_ANON_KEY") {
            self.gateway.anon_key = key;
        }

        if let Ok(token) = std::env::var("EMRYS_GATEWAY_ACCESS_TOKEN") {
            self.gateway.access_token = Some(token);
        }

        if let Ok(url) = std::env::var("EMRYS_BACKEND_URL") {
            self.inference.base_url = url;
        }

        if let Ok(timeout) = std::env::var("EMRYS_BACKEND_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.inference.timeout_seconds = Some(v);
                    tracing::debug!(timeout_seconds = v, "Env override: EMRYS_BACKEND_TIMEOUT");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for EMRYS_BACKEND_TIMEOUT: {}", timeout);
                }
            }
        }

        if let Ok(stagger) = std::env::var("EMRYS_REVEAL_STAGGER_MS") {
            match stagger.parse::<u64>() {
                Ok(v) => self.chat.reveal_stagger_ms = v,
                Err(_) => tracing::warn!("Invalid value for EMRYS_REVEAL_STAGGER_MS: {}", stagger),
            }
        }

        if let Ok(timeout) = std::env::var("EMRYS_SPEAKER_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(v) => self.chat.speaker_timeout_ms = v,
                Err(_) => tracing::warn!("Invalid value for EMRYS_SPEAKER_TIMEOUT_MS: {}", timeout),
            }
        }

        if let Ok(command) = std::env::var("EMRYS_VOICE_COMMAND") {
            self.voice.command = Some(command);
        }

        if let Ok(user_id) = std::env::var("EMRYS_USER_ID") {
            self.user.id = Some(user_id);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(url) = &cli.backend_url {
            tracing::debug!("Using backend override: {}", url);
            self.inference.base_url = url.clone();
        }

        if let Some(user) = &cli.user {
            self.user.id = Some(user.clone());
        }
    }

    /// Returns the configured user id or a validation error
    pub fn user_id(&self) -> Result<String> {
        match self.user.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(EmrysError::Validation(
                "user.id is not configured (set it in the config file, EMRYS_USER_ID or --user)"
                    .to_string(),
            )
            .into()),
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("gateway.url", &self.gateway.url),
            ("inference.base_url", &self.inference.base_url),
        ] {
            url::Url::parse(value).map_err(|e| {
                EmrysError::Config(format!("{} is not a valid URL ({}): {}", name, value, e))
            })?;
        }

        if self.inference.timeout_seconds == Some(0) {
            return Err(EmrysError::Config(
                "inference.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.speaker_timeout_ms == 0 {
            return Err(EmrysError::Config(
                "chat.speaker_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.credential.service.is_empty() || self.credential.account.is_empty() {
            return Err(EmrysError::Config(
                "credential.service and credential.account cannot be empty".to_string(),
            )
            .into());
        }

        if let Some(command) = &self.voice.command {
            if command.trim().is_empty() {
                return Err(
                    EmrysError::Config("voice.command cannot be blank".to_string()).into(),
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inference.base_url, "http://localhost:5000");
        assert_eq!(config.chat.reveal_stagger_ms, 1200);
        assert_eq!(config.chat.speaker_timeout_ms, 8000);
        assert_eq!(config.chat.retrieving_delay_ms, 500);
        assert!(config.inference.timeout_seconds.is_none());
        assert!(config.voice.command.is_none());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_bad_url() {
        let mut config = Config::default();
        config.inference.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_speaker_timeout() {
        let mut config = Config::default();
        config.chat.speaker_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_backend_timeout() {
        let mut config = Config::default();
        config.inference.timeout_seconds = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_blank_voice_command() {
        let mut config = Config::default();
        config.voice.command = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_user_id_required() {
        let mut config = Config::default();
        assert!(config.user_id().is_err());

        config.user.id = Some("   ".to_string());
        assert!(config.user_id().is_err());

        config.user.id = Some("user-1".to_string());
        assert_eq!(config.user_id().unwrap(), "user-1");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
gateway:
  url: https://project.example.co
  anon_key: anon-123
inference:
  base_url: https://backend.example.com
  timeout_seconds: 90
chat:
  reveal_stagger_ms: 600
voice:
  command: whisper-once
  args: ["--lang", "en"]
user:
  id: user-42
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.gateway.url, "https://project.example.co");
        assert_eq!(config.gateway.anon_key, "anon-123");
        assert_eq!(config.inference.timeout_seconds, Some(90));
        assert_eq!(config.chat.reveal_stagger_ms, 600);
        assert_eq!(config.chat.speaker_timeout_ms, 8000);
        assert_eq!(config.voice.command.as_deref(), Some("whisper-once"));
        assert_eq!(config.voice.args, vec!["--lang", "en"]);
        assert_eq!(config.user.id.as_deref(), Some("user-42"));
        assert_eq!(config.credential.account, "openrouter_api_key");
    }

    #[test]
    #[serial]
    fn test_load_from_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "user:\n  id: temp-user\nchat:\n  speaker_timeout_ms: 3000\n",
        )
        .unwrap();

        let cli = crate::cli::Cli::default();
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.user_id().unwrap(), "temp-user");
        assert_eq!(config.chat.speaker_timeout_ms, 3000);
        assert_eq!(config.chat.reveal_stagger_ms, 1200);
    }

    #[test]
    #[serial]
    fn test_load_rejects_malformed_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "chat: [not, a, map").unwrap();

        let cli = crate::cli::Cli::default();
        let err = Config::load(path.to_str().unwrap(), &cli).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_default_path_ends_with_config_yaml() {
        assert!(Config::default_path().ends_with("config.yaml"));
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let cli = crate::cli::Cli::default();
        let config = Config::load("/nonexistent/emrys.yaml", &cli).unwrap();
        assert_eq!(config.chat.reveal_stagger_ms, default_reveal_stagger_ms());
    }

    #[test]
    #[serial]
    fn test_env_overrides_apply() {
        std::env::set_var("EMRYS_BACKEND_URL", "http://backend.test:9000");
        std::env::set_var("EMRYS_SPEAKER_TIMEOUT_MS", "4000");
        std::env::set_var("EMRYS_REVEAL_STAGGER_MS", "not-a-number");

        let mut config = Config::default();
        config.apply_env_vars();

        std::env::remove_var("EMRYS_BACKEND_URL");
        std::env::remove_var("EMRYS_SPEAKER_TIMEOUT_MS");
        std::env::remove_var("EMRYS_REVEAL_STAGGER_MS");

        assert_eq!(config.inference.base_url, "http://backend.test:9000");
        assert_eq!(config.chat.speaker_timeout_ms, 4000);
        assert_eq!(config.chat.reveal_stagger_ms, 1200);
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "user:\n  id: from-file\n").unwrap();

        let cli = crate::cli::Cli::default();
        let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
        assert_eq!(config.user.id.as_deref(), Some("from-file"));
    }
}
