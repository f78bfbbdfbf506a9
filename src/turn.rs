//! Conversation turns
//!
//! A turn is one utterance/reply exchange. The handler is stateless between
//! calls: providers and persona are fixed at construction time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::llm::{ChatModel, OpenAIChat};
use crate::voice::{SpeechSynthesizer, TextToSpeech, data_uri};
use crate::{Error, Persona, Result};

/// Error message when the chat provider is missing credentials
pub const LLM_NOT_CONFIGURED: &str = "OpenAI API key is not configured";

/// Error message when the speech provider is missing credentials
pub const TTS_NOT_CONFIGURED: &str = "ElevenLabs API key or Voice ID is not configured";

/// Turn request as sent by the client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    /// What the user said; ignored for the initial turn
    #[serde(default)]
    pub user_text: String,

    /// Client-generated correlation tag
    #[serde(default)]
    pub session_id: String,

    /// First turn of a conversation
    #[serde(default)]
    pub is_initial: bool,
}

impl TurnRequest {
    /// Request for the opening greeting
    #[must_use]
    pub fn initial(session_id: impl Into<String>) -> Self {
        Self {
            user_text: String::new(),
            session_id: session_id.into(),
            is_initial: true,
        }
    }

    /// Request carrying a user utterance
    #[must_use]
    pub fn utterance(user_text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            session_id: session_id.into(),
            is_initial: false,
        }
    }
}

/// Reply text plus its synthesized audio
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    /// Reply utterance, never empty
    pub text: String,

    /// `data:audio/mpeg;base64,...`
    pub audio_url: String,
}

/// Produces replies and their audio
pub struct TurnHandler {
    chat: Option<Arc<dyn ChatModel>>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    persona: Persona,
}

impl TurnHandler {
    /// Create a handler from explicit providers
    ///
    /// A missing provider makes every turn fail with a configuration error.
    #[must_use]
    pub fn new(
        chat: Option<Arc<dyn ChatModel>>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        persona: Persona,
    ) -> Self {
        Self {
            chat,
            speech,
            persona,
        }
    }

    /// Build providers from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let chat = config.api_keys.openai.clone().and_then(|key| {
            OpenAIChat::new(key, config.llm.model.clone(), config.llm.base_url.clone())
                .map_err(|e| tracing::warn!(error = %e, "chat provider unavailable"))
                .ok()
                .map(|c| Arc::new(c) as Arc<dyn ChatModel>)
        });

        let speech = config
            .api_keys
            .elevenlabs
            .clone()
            .zip(config.voice.voice_id.clone())
            .and_then(|(key, voice_id)| {
                TextToSpeech::new_elevenlabs(
                    key,
                    voice_id,
                    config.voice.tts_model.clone(),
                    config.voice.tts_base_url.clone(),
                )
                .map_err(|e| tracing::warn!(error = %e, "speech provider unavailable"))
                .ok()
                .map(|t| Arc::new(t) as Arc<dyn SpeechSynthesizer>)
            });

        if chat.is_none() {
            tracing::warn!("{LLM_NOT_CONFIGURED}; turns will be rejected");
        }
        if speech.is_none() {
            tracing::warn!("{TTS_NOT_CONFIGURED}; turns will be rejected");
        }

        Self::new(chat, speech, config.persona.clone())
    }

    /// Whether the chat provider is present
    #[must_use]
    pub fn chat_configured(&self) -> bool {
        self.chat.is_some()
    }

    /// Whether the speech provider is present
    #[must_use]
    pub fn speech_configured(&self) -> bool {
        self.speech.is_some()
    }

    /// Run one turn: pick the reply, synthesize it, encode the audio inline
    ///
    /// # Errors
    ///
    /// - `Error::Config` if either provider is missing (checked before any call)
    /// - `Error::InvalidRequest` for an empty non-initial utterance
    /// - provider errors from the completion or synthesis call
    pub async fn handle_turn(&self, request: &TurnRequest) -> Result<TurnResponse> {
        let chat = self
            .chat
            .as_ref()
            .ok_or_else(|| Error::Config(LLM_NOT_CONFIGURED.to_string()))?;
        let speech = self
            .speech
            .as_ref()
            .ok_or_else(|| Error::Config(TTS_NOT_CONFIGURED.to_string()))?;

        tracing::info!(
            session_id = %request.session_id,
            is_initial = request.is_initial,
            "handling turn"
        );

        let text = if request.is_initial {
            self.persona.greeting.clone()
        } else {
            if request.user_text.is_empty() {
                return Err(Error::InvalidRequest("userText is required".to_string()));
            }
            let completion = chat
                .complete(&self.persona.system_prompt, &request.user_text)
                .await?;
            self.persona.reply_or_fallback(completion)
        };

        let stream = speech.synthesize(&text).await?;
        let audio = data_uri::collect_chunks(stream).await?;
        if audio.is_empty() {
            return Err(Error::Tts(format!("{} returned no audio", speech.name())));
        }

        tracing::debug!(
            chat = chat.name(),
            speech = speech.name(),
            audio_bytes = audio.len(),
            "turn complete"
        );

        Ok(TurnResponse {
            text,
            audio_url: data_uri::encode(data_uri::MPEG_MIME, &audio),
        })
    }
}
