//! Voice processing module
//!
//! Speech synthesis for turn replies, plus the microphone, speaker and
//! transcription pieces used by the terminal client.

mod capture;
pub mod data_uri;
mod playback;
mod stt;
mod tts;

pub use capture::{
    AudioCapture, SAMPLE_RATE, SILENCE_RMS, calculate_rms, input_available, is_silent,
    samples_to_wav,
};
pub use data_uri::{DataUri, MPEG_MIME};
pub use playback::{AudioPlayback, DecodedAudio, PlaybackHandle, decode_mp3};
pub use stt::{RECOGNITION_LANGUAGE, SpeechToText};
pub use tts::{AudioStream, SpeechSynthesizer, TextToSpeech, VoiceSettings};
