//! Koutei - supportive Japanese voice conversation gateway
//!
//! This library provides both halves of a spoken conversation:
//! - A stateless turn handler: utterance in, reply text plus synthesized audio out
//! - An HTTP API exposing the handler to web and terminal clients
//! - A conversation client with playback ownership and voice input
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Client                          │
//! │  Controller  │  Voice Input  │  Speaker  │  Session  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ POST /api/respond
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Turn Handler                       │
//! │         Persona  │  Chat Model  │  Synthesizer       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Providers                         │
//! │     OpenAI chat  │  ElevenLabs TTS  │  Whisper      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod persona;
pub mod turn;
pub mod voice;

pub use api::ApiServer;
pub use client::{ConversationController, Message, SessionId, VoiceInput};
pub use config::Config;
pub use error::{Error, Result};
pub use llm::{ChatModel, OpenAIChat};
pub use persona::Persona;
pub use turn::{TurnHandler, TurnRequest, TurnResponse};
pub use voice::{SpeechSynthesizer, TextToSpeech};
