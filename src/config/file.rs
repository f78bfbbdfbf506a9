//! TOML configuration file loading
//!
//! Supports `~/.config/koutei/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct KouteiConfigFile {
    /// Chat completion configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis and recognition configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Persona overrides
    #[serde(default)]
    pub persona: PersonaFileConfig,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// API base URL (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// ElevenLabs voice identifier
    pub voice_id: Option<String>,

    /// ElevenLabs model (e.g. "eleven_multilingual_v2")
    pub tts_model: Option<String>,

    /// ElevenLabs API base URL
    pub tts_base_url: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory of static files for a web front-end
    pub static_dir: Option<String>,
}

/// Persona text overrides
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    pub system_prompt: Option<String>,
    pub greeting: Option<String>,
    pub fallback: Option<String>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path is
/// tried and `KouteiConfigFile::default()` is returned if it is missing or
/// unreadable.
///
/// # Errors
///
/// Returns error if an explicitly requested file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<KouteiConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(KouteiConfigFile::default());
    };

    if !path.exists() {
        return Ok(KouteiConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                KouteiConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            KouteiConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/koutei/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("koutei").join("config.toml"))
}
