//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::{Error, Result};

/// Ordered stream of encoded audio chunks
pub type AudioStream = BoxStream<'static, Result<Bytes>>;

/// Trait for speech synthesis providers
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing `text`, yielding MPEG chunks as they arrive
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the request
    async fn synthesize(&self, text: &str) -> Result<AudioStream>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Voice quality parameters sent with every ElevenLabs request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.7,
            similarity_boost: 0.8,
            style: 0.5,
            use_speaker_boost: true,
        }
    }
}

/// Synthesizes speech through ElevenLabs
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    model: String,
    base_url: String,
    settings: VoiceSettings,
}

impl TextToSpeech {
    /// Create a new ElevenLabs TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if API key or voice ID is missing
    pub fn new_elevenlabs(
        api_key: SecretString,
        voice_id: String,
        model: String,
        base_url: String,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() || voice_id.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key or Voice ID is not configured".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice_id,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            settings: VoiceSettings::default(),
        })
    }

    /// Synthesize text to a single MP3 buffer
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize_to_vec(&self, text: &str) -> Result<Vec<u8>> {
        let stream = self.synthesize(text).await?;
        super::data_uri::collect_chunks(stream).await
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            voice_settings: VoiceSettings,
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            voice_settings: self.settings,
        };

        tracing::debug!(voice = %self.voice_id, model = %self.model, "requesting speech synthesis");

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", super::data_uri::MPEG_MIME)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::Tts(format!("audio stream interrupted: {e}"))));

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn tts(server: &MockServer) -> TextToSpeech {
        TextToSpeech::new_elevenlabs(
            SecretString::from("el-key".to_string()),
            "voice-1".to_string(),
            "eleven_multilingual_v2".to_string(),
            server.uri(),
        )
        .unwrap()
    }

    #[test]
    fn missing_voice_is_config_error() {
        let result = TextToSpeech::new_elevenlabs(
            SecretString::from("el-key".to_string()),
            String::new(),
            "eleven_multilingual_v2".to_string(),
            "http://localhost".to_string(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn default_voice_settings() {
        let json = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert_eq!(json["use_speaker_boost"], true);
        assert!((json["stability"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((json["similarity_boost"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!((json["style"].as_f64().unwrap() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn synthesize_streams_response_body() {
        let server = MockServer::start().await;
        let audio = vec![0xffu8, 0xfb, 0x90, 0x64, 0x00, 0x01, 0x02];

        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .and(header("xi-api-key", "el-key"))
            .and(body_partial_json(serde_json::json!({
                "text": "うん、聞いてるよ。",
                "model_id": "eleven_multilingual_v2",
                "voice_settings": { "use_speaker_boost": true }
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(audio.clone()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = tts(&server).synthesize_to_vec("うん、聞いてるよ。").await.unwrap();
        assert_eq!(body, audio);
    }

    #[tokio::test]
    async fn provider_error_is_tts_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/voice-1"))
            .respond_with(ResponseTemplate::new(422).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let result = tts(&server).synthesize("hello").await;
        assert!(matches!(result, Err(Error::Tts(msg)) if msg.contains("422")));
    }
}
