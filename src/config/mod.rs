//! Configuration management for Koutei

pub mod file;

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use crate::{Persona, Result};

/// Default OpenAI chat model
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI API base URL
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default ElevenLabs synthesis model
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// Default ElevenLabs API base URL
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Default Whisper model for the terminal recognizer
pub const DEFAULT_STT_MODEL: &str = "whisper-1";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Koutei configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API keys
    pub api_keys: ApiKeys,

    /// Chat completion configuration
    pub llm: LlmConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Persona texts
    pub persona: Persona,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat completions and Whisper)
    pub openai: Option<SecretString>,

    /// ElevenLabs API key
    pub elevenlabs: Option<SecretString>,
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier
    pub model: String,

    /// API base URL
    pub base_url: String,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// ElevenLabs voice identifier
    pub voice_id: Option<String>,

    /// ElevenLabs model
    pub tts_model: String,

    /// ElevenLabs API base URL
    pub tts_base_url: String,

    /// Whisper model
    pub stt_model: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the environment and the optional config file
    ///
    /// Priority is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given config file cannot be loaded
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Ok(Self::from_sources(fc, |key| std::env::var(key).ok()))
    }

    /// Build configuration from a parsed config file and an environment lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_sources(
        fc: file::KouteiConfigFile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let non_empty = |v: Option<String>| v.filter(|v| !v.trim().is_empty());

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or_else(|| non_empty(fc.api_keys.openai))
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or_else(|| non_empty(fc.api_keys.elevenlabs))
                .map(SecretString::from),
        };

        let llm = LlmConfig {
            model: env("KOUTEI_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: env("OPENAI_BASE_URL")
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        };

        let voice = VoiceConfig {
            voice_id: env("ELEVENLABS_VOICE_ID").or_else(|| non_empty(fc.voice.voice_id)),
            tts_model: env("KOUTEI_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_base_url: env("ELEVENLABS_BASE_URL")
                .or(fc.voice.tts_base_url)
                .unwrap_or_else(|| DEFAULT_ELEVENLABS_BASE_URL.to_string()),
            stt_model: env("KOUTEI_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
        };

        let api_server = ApiServerConfig {
            port: env("KOUTEI_PORT")
                .or_else(|| env("PORT"))
                .and_then(|p| p.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            static_dir: env("KOUTEI_STATIC_DIR")
                .or(fc.server.static_dir)
                .map(PathBuf::from),
        };

        let persona = Persona::default().with_overrides(fc.persona);

        Self {
            api_keys,
            llm,
            voice,
            api_server,
            persona,
        }
    }

    /// Whether the chat completion provider has everything it needs
    #[must_use]
    pub const fn llm_configured(&self) -> bool {
        self.api_keys.openai.is_some()
    }

    /// Whether the speech synthesis provider has everything it needs
    #[must_use]
    pub const fn tts_configured(&self) -> bool {
        self.api_keys.elevenlabs.is_some() && self.voice.voice_id.is_some()
    }
}
