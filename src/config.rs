//! Configuration loading and management
//!
//! Everything comes from the environment, optionally seeded from a `.env`
//! file. Empty values count as unset.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::backend::ApiSettings;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[cfg(target_os = "macos")]
const DEFAULT_RECORD_COMMAND: &str = "sox -q -d -c 1 -r 16000 -b 16";
#[cfg(not(target_os = "macos"))]
const DEFAULT_RECORD_COMMAND: &str = "arecord -q -f S16_LE -r 16000 -c 1";

#[cfg(target_os = "macos")]
const DEFAULT_PLAYER_COMMAND: &str = "afplay";
#[cfg(not(target_os = "macos"))]
const DEFAULT_PLAYER_COMMAND: &str = "mpg123 -q";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must not be empty")]
    EmptyCommand(&'static str),
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Directory of the trigger and state files
    pub trigger_dir: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// How long a raised abort flag stays up
    pub abort_grace: Duration,

    pub abort_poll: Duration,

    pub trigger_poll: Duration,

    pub api: ApiSettings,

    pub chat_model: String,
    pub stt_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,

    /// Capture command; the output path is appended
    pub record_command: Vec<String>,

    /// Playback command; the audio path is appended
    pub player_command: Vec<String>,

    /// Create `session-1` at startup
    pub initial_conversation: bool,

    /// Where the transcript is mirrored, if anywhere
    pub transcript_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = match get("SYRI_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = get("HOME").ok_or(ConfigError::Missing("HOME"))?;
                PathBuf::from(home).join(".local").join("share").join("syri")
            }
        };

        let trigger_dir = get("SYRI_TRIGGER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("triggers"));
        let socket_path = get("SYRI_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let transcript_file = match get("SYRI_TRANSCRIPT_FILE") {
            Some(v) if v.trim().eq_ignore_ascii_case("off") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => Some(data_dir.join("transcript.jsonl")),
        };

        let api = ApiSettings {
            api_key: get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?,
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        Ok(Self {
            abort_grace: millis(&get, "SYRI_ABORT_GRACE_MS", 1000)?,
            abort_poll: millis(&get, "SYRI_ABORT_POLL_MS", 200)?,
            trigger_poll: millis(&get, "SYRI_TRIGGER_POLL_MS", 100)?,
            api,
            chat_model: get("SYRI_CHAT_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            stt_model: get("SYRI_STT_MODEL").unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: get("SYRI_TTS_MODEL").unwrap_or_else(|| "gpt-4o-mini-tts".to_string()),
            tts_voice: get("SYRI_TTS_VOICE").unwrap_or_else(|| "coral".to_string()),
            tts_speed: parse(&get, "SYRI_TTS_SPEED", 1.2)?,
            record_command: command(&get, "SYRI_RECORD_COMMAND", DEFAULT_RECORD_COMMAND)?,
            player_command: command(&get, "SYRI_PLAYER_COMMAND", DEFAULT_PLAYER_COMMAND)?,
            initial_conversation: flag(&get, "SYRI_INITIAL_CONVERSATION", true)?,
            transcript_file,
            data_dir,
            trigger_dir,
            socket_path,
        })
    }

    /// Ensure runtime directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.trigger_dir)?;
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn millis<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse(get, key, default)?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

fn flag<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}

fn command<G>(get: &G, key: &'static str, default: &str) -> Result<Vec<String>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).unwrap_or_else(|| default.to_string());
    let parts: Vec<String> = value.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(ConfigError::EmptyCommand(key));
    }
    Ok(parts)
}
