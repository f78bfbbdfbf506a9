//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use koutei::api::ApiServer;
use koutei::voice::{AudioStream, SpeechSynthesizer};
use koutei::{ChatModel, Error, Persona, Result, TurnHandler};

/// MP3 bytes returned by [`FakeSpeech`], split over two chunks
pub const FAKE_AUDIO: &[u8] = b"ID3fake-mpeg-frames";

/// Chat model returning a canned reply
#[derive(Default)]
pub struct FakeChat {
    pub reply: Option<String>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _system_prompt: &str, _user_text: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Llm("upstream unavailable".to_string()));
        }
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// How a [`FakeSpeech`] misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechFailure {
    /// The synthesis call itself errors
    Refuse,
    /// The first chunk arrives, then the stream errors
    Interrupt,
}

/// Synthesizer streaming [`FAKE_AUDIO`] in two chunks
#[derive(Default)]
pub struct FakeSpeech {
    pub failure: Option<SpeechFailure>,
    pub calls: AtomicUsize,
}

impl FakeSpeech {
    pub fn failing(failure: SpeechFailure) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(failure),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSpeech {
    async fn synthesize(&self, _text: &str) -> Result<AudioStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (head, tail) = FAKE_AUDIO.split_at(3);
        let second = match self.failure {
            Some(SpeechFailure::Refuse) => {
                return Err(Error::Tts("synthesis refused".to_string()));
            }
            Some(SpeechFailure::Interrupt) => Err(Error::Tts("connection reset".to_string())),
            None => Ok(Bytes::from_static(tail)),
        };
        Ok(Box::pin(stream::iter(vec![Ok(Bytes::from_static(head)), second])))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Build a router around the given providers
pub fn build_test_router(
    chat: Option<Arc<FakeChat>>,
    speech: Option<Arc<FakeSpeech>>,
) -> axum::Router {
    let handler = TurnHandler::new(
        chat.map(|c| c as Arc<dyn ChatModel>),
        speech.map(|s| s as Arc<dyn SpeechSynthesizer>),
        Persona::default(),
    );
    ApiServer::new(handler, 0).router()
}
