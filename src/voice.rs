//! Speech-to-text input for the compose buffer
//!
//! Speech recognition is an optional capability of the environment. When it
//! is configured (`voice.command`), [`VoiceCapture`] runs one recognition
//! session at a time and appends the final transcript to the
//! [`ComposeBuffer`]. When it is not, toggling recording reports
//! [`ToggleOutcome::Unavailable`] instead of doing nothing.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::VoiceConfig;
use crate::error::{EmrysError, Result};

/// A source of final transcripts
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listens until a final transcript is available or `stop` fires
    ///
    /// Returns `Ok(None)` when stopped before anything was recognized.
    async fn listen(&self, stop: CancellationToken) -> Result<Option<String>>;
}

/// Recognizer that runs an external speech-to-text program
///
/// The program's trimmed stdout is the transcript. It is killed when the
/// session is stopped.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    /// Recognizer that runs `program` with `args` and reads its stdout
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a recognizer from the `voice` section, if one is configured
    pub fn from_config(config: &VoiceConfig) -> Option<Self> {
        config
            .command
            .as_ref()
            .map(|program| Self::new(program.clone(), config.args.clone()))
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    async fn listen(&self, stop: CancellationToken) -> Result<Option<String>> {
        tracing::debug!(program = %self.program, "Starting speech recognizer");
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EmrysError::CapabilityUnavailable(format!(
                    "speech recognizer `{}` not found",
                    self.program
                )),
                _ => EmrysError::Io(e),
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| EmrysError::CapabilityUnavailable("recognizer has no stdout".into()))?;

        let run = async {
            let mut transcript = String::new();
            stdout.read_to_string(&mut transcript).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((transcript, status))
        };

        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                tracing::debug!("Speech recognizer stopped");
                Ok(None)
            }
            result = run => {
                let (transcript, status) = result.map_err(EmrysError::Io)?;
                if !status.success() {
                    anyhow::bail!("speech recognizer exited with {}", status);
                }
                let transcript = transcript.trim();
                Ok((!transcript.is_empty()).then(|| transcript.to_string()))
            }
        }
    }
}

/// Text being composed, with a byte-offset caret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeBuffer {
    pub text: String,
    pub caret: usize,
}

impl ComposeBuffer {
    /// Buffer holding `text` with the caret at its end
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let caret = text.len();
        Self { text, caret }
    }

    /// Appends a transcript, separated by a space when the buffer is non-empty
    ///
    /// The caret moves to the end.
    pub fn append_transcript(&mut self, transcript: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(transcript);
        self.caret = self.text.len();
    }

    /// Takes the text out, leaving the buffer empty
    pub fn take(&mut self) -> String {
        self.caret = 0;
        std::mem::take(&mut self.text)
    }
}

/// Result of toggling the record control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// A recognition session started
    Started,
    /// The running session was asked to stop
    Stopped,
    /// No recognizer is available; `first_time` is set on the first attempt
    Unavailable { first_time: bool },
}

/// How a recognition session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    /// A transcript was appended to the buffer
    Transcript(String),
    /// Recognition failed; the buffer is unchanged
    Error(String),
    /// Stopped without a transcript
    Stopped,
    /// There was no session to settle
    NoSession,
}

struct Session {
    stop: CancellationToken,
    task: JoinHandle<Result<Option<String>>>,
}

/// Idle/Recording state machine around an optional recognizer
pub struct VoiceCapture {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    session: Option<Session>,
    notice_shown: bool,
}

impl VoiceCapture {
    /// Idle capture; `None` means voice input is unavailable
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            session: None,
            notice_shown: false,
        }
    }

    /// Builds the adapter from configuration; no command means no capability
    pub fn from_config(config: &VoiceConfig) -> Self {
        let recognizer = CommandRecognizer::from_config(config)
            .map(|r| Arc::new(r) as Arc<dyn SpeechRecognizer>);
        Self::new(recognizer)
    }

    /// Whether a recognizer is configured
    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Whether a recognition session is still listening
    ///
    /// Turns false on its own once the recognizer has produced its final
    /// transcript, errored or been stopped. The transcript itself reaches the
    /// buffer through [`Self::settle`].
    pub fn is_recording(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.task.is_finished())
    }

    /// Starts a session when idle, stops it when recording
    ///
    /// Never starts a second session, including one whose recognizer has
    /// already finished but has not been settled. Must be called from within
    /// a tokio runtime.
    pub fn toggle(&mut self) -> ToggleOutcome {
        let Some(recognizer) = self.recognizer.clone() else {
            let first_time = !self.notice_shown;
            self.notice_shown = true;
            tracing::warn!("Speech recognition is not available");
            return ToggleOutcome::Unavailable { first_time };
        };

        if let Some(session) = &self.session {
            session.stop.cancel();
            return ToggleOutcome::Stopped;
        }

        let stop = CancellationToken::new();
        let listen_stop = stop.clone();
        let task = tokio::spawn(async move { recognizer.listen(listen_stop).await });
        self.session = Some(Session { stop, task });
        tracing::debug!("Voice capture started");
        ToggleOutcome::Started
    }

    /// Token that stops the running session, for wiring to a key or signal
    pub fn stop_token(&self) -> Option<CancellationToken> {
        self.session.as_ref().map(|s| s.stop.clone())
    }

    /// Waits for the running session to end and returns to idle
    ///
    /// A final transcript is appended to `buffer`.
    pub async fn settle(&mut self, buffer: &mut ComposeBuffer) -> VoiceOutcome {
        let Some(session) = self.session.take() else {
            return VoiceOutcome::NoSession;
        };

        match session.task.await {
            Ok(Ok(Some(transcript))) => {
                buffer.append_transcript(&transcript);
                VoiceOutcome::Transcript(transcript)
            }
            Ok(Ok(None)) => VoiceOutcome::Stopped,
            Ok(Err(e)) => {
                tracing::warn!("Speech recognition error: {:#}", e);
                VoiceOutcome::Error(e.to_string())
            }
            Err(e) => {
                tracing::warn!("Speech recognition task failed: {}", e);
                VoiceOutcome::Error(e.to_string())
            }
        }
    }
}
