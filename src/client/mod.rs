//! Conversation client
//!
//! The client side of a conversation: turn history, the loading gate, audio
//! playback ownership and voice input. Every platform dependency sits behind
//! a trait so the same controller drives the terminal front-end and tests.
//!
//! ```text
//! ┌──────────────┐  TurnTransport   ┌──────────────┐
//! │ Conversation │ ───────────────▶ │ POST         │
//! │ Controller   │ ◀─────────────── │ /api/respond │
//! └──────┬───────┘                  └──────────────┘
//!        │ AudioSink
//!        ▼
//!   ActivePlayback (at most one)
//! ```

mod controller;
mod microphone;
pub mod recognition;
pub mod session;
mod speaker;
mod transport;

pub use controller::{ConversationController, Message};
pub use microphone::{DeviceMicrophone, WhisperRecognizer};
pub use recognition::{
    LISTENING_MARKER, MicrophoneAccess, RecognitionError, RecognitionEvent, RecognitionResult,
    RecognitionState, SpeechRecognizer, VoiceInput,
};
pub use session::{FileStore, KeyValueStore, MemoryStore, SESSION_KEY, SessionId};
pub use speaker::SpeakerSink;
pub use transport::HttpTransport;

use async_trait::async_trait;

use crate::Result;
use crate::turn::{TurnRequest, TurnResponse};

/// Alert shown when a turn request fails
pub const TURN_FAILED_ALERT: &str = "エラーが発生しました。もう一度お試しください。";

/// Alert shown when microphone access is refused
pub const PERMISSION_ALERT: &str =
    "マイクへのアクセスが許可されていません。ブラウザの設定でマイクの使用を許可してください。";

/// Alert shown when no recognizer exists on this platform
pub const UNSUPPORTED_ALERT: &str = "お使いのブラウザでは音声認識がサポートされていません。";

/// Alert shown when the recognizer refuses to start
pub const START_FAILED_ALERT: &str =
    "音声認識を開始できませんでした。ブラウザの設定を確認してください。";

/// Alert shown when recognition fails with `code`
#[must_use]
pub fn recognition_error_alert(code: &str) -> String {
    format!("音声認識でエラーが発生しました: {code}")
}

/// Sends turn requests to the server
#[async_trait]
pub trait TurnTransport: Send + Sync {
    /// Send one turn request and wait for the reply
    ///
    /// # Errors
    ///
    /// Returns error on network failure or a non-success response
    async fn send_turn(&self, request: &TurnRequest) -> Result<TurnResponse>;
}

/// Starts playback of an audio URL
pub trait AudioSink: Send + Sync {
    /// Begin playing `audio_url`, returning a handle that can stop it
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or played
    fn start(&self, audio_url: &str) -> Result<Box<dyn ActivePlayback>>;
}

/// A playback that can be stopped
pub trait ActivePlayback: Send {
    /// Stop playback immediately
    fn stop(self: Box<Self>);
}

/// Surfaces messages to the user
pub trait Notifier: Send + Sync {
    /// Show a user-facing alert
    fn alert(&self, message: &str);
}

/// Notifier that writes alerts to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn alert(&self, message: &str) {
        eprintln!("⚠ {message}");
    }
}
