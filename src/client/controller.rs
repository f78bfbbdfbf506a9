//! Conversation controller: turn history, loading gate and playback ownership

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::{ActivePlayback, AudioSink, Notifier, TURN_FAILED_ALERT, TurnTransport, VoiceInput};
use crate::Result;
use crate::turn::{TurnRequest, TurnResponse};

/// One entry in the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub is_user: bool,
}

impl Message {
    fn user(text: &str) -> Self {
        Self {
            text: text.to_string(),
            audio_url: None,
            is_user: true,
        }
    }

    fn reply(response: TurnResponse) -> Self {
        Self {
            text: response.text,
            audio_url: Some(response.audio_url).filter(|u| !u.is_empty()),
            is_user: false,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    messages: Vec<Message>,
    is_loading: bool,
    has_started: bool,
}

/// Drives a conversation against a turn transport
///
/// Operations take `&self`; the loading gate is checked and set under one
/// lock, so a submission racing an in-flight turn is rejected, never queued.
pub struct ConversationController {
    transport: Arc<dyn TurnTransport>,
    sink: Arc<dyn AudioSink>,
    notifier: Arc<dyn Notifier>,
    session_id: String,
    state: Mutex<State>,
    playback: Mutex<Option<Box<dyn ActivePlayback>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversationController {
    /// Create a controller for one session
    #[must_use]
    pub fn new(
        transport: Arc<dyn TurnTransport>,
        sink: Arc<dyn AudioSink>,
        notifier: Arc<dyn Notifier>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            sink,
            notifier,
            session_id: session_id.into(),
            state: Mutex::new(State::default()),
            playback: Mutex::new(None),
        }
    }

    /// Request the greeting and play it; runs at most once
    ///
    /// Returns `false` if the conversation had already been started or a
    /// turn is in flight.
    pub async fn start_conversation(&self) -> bool {
        match self.begin_conversation() {
            Some(request) => {
                self.complete_turn(request).await;
                true
            }
            None => false,
        }
    }

    /// Send a user utterance and play the reply
    ///
    /// Returns `false` without doing anything if `text` is blank or a turn is
    /// already in flight.
    pub async fn submit_utterance(&self, text: &str) -> bool {
        match self.begin_utterance(text) {
            Some(request) => {
                self.complete_turn(request).await;
                true
            }
            None => false,
        }
    }

    /// Claim the loading gate for the greeting turn
    ///
    /// The returned request must be passed to [`Self::complete_turn`].
    #[must_use]
    pub fn begin_conversation(&self) -> Option<TurnRequest> {
        let mut state = lock(&self.state);
        if state.has_started || state.is_loading {
            return None;
        }
        state.has_started = true;
        state.is_loading = true;
        tracing::debug!(session_id = %self.session_id, "starting conversation");
        Some(TurnRequest::initial(self.session_id.clone()))
    }

    /// Claim the loading gate for `text` and append it to the history
    ///
    /// The returned request must be passed to [`Self::complete_turn`].
    #[must_use]
    pub fn begin_utterance(&self, text: &str) -> Option<TurnRequest> {
        if text.trim().is_empty() {
            return None;
        }

        let mut state = lock(&self.state);
        if state.is_loading {
            tracing::debug!("turn in flight, submission ignored");
            return None;
        }
        state.messages.push(Message::user(text));
        state.is_loading = true;
        Some(TurnRequest::utterance(text, self.session_id.clone()))
    }

    /// Submit what voice input has heard
    ///
    /// The input field is cleared only when the turn is accepted; a rejected
    /// submission leaves the recognized text in place.
    #[must_use]
    pub fn begin_voice_utterance(&self, input: &mut VoiceInput) -> Option<TurnRequest> {
        let request = self.begin_utterance(&input.pending_input())?;
        input.take_input();
        Some(request)
    }

    /// Send a request claimed by one of the `begin_*` methods
    pub async fn complete_turn(&self, request: TurnRequest) {
        let result = self.transport.send_turn(&request).await;
        self.finish_turn(result);
    }

    fn finish_turn(&self, result: Result<TurnResponse>) {
        match result {
            Ok(response) => {
                let message = Message::reply(response);
                let audio_url = message.audio_url.clone();
                {
                    let mut state = lock(&self.state);
                    state.messages.push(message);
                    state.is_loading = false;
                }
                if let Some(url) = audio_url {
                    self.play_audio(&url);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "turn request failed");
                lock(&self.state).is_loading = false;
                self.notifier.alert(TURN_FAILED_ALERT);
            }
        }
    }

    /// Play `audio_url`, stopping whatever was playing before
    pub fn play_audio(&self, audio_url: &str) {
        let mut current = lock(&self.playback);
        if let Some(previous) = current.take() {
            previous.stop();
        }

        match self.sink.start(audio_url) {
            Ok(playback) => *current = Some(playback),
            Err(e) => tracing::error!(error = %e, "audio playback failed"),
        }
    }

    /// Replay the audio of the message at `index`
    ///
    /// Returns `false` if there is no such message or it has no audio.
    pub fn replay(&self, index: usize) -> bool {
        let audio_url = lock(&self.state)
            .messages
            .get(index)
            .and_then(|m| m.audio_url.clone());

        audio_url.is_some_and(|url| {
            self.play_audio(&url);
            true
        })
    }

    /// Stop any current playback
    pub fn stop_audio(&self) {
        if let Some(playback) = lock(&self.playback).take() {
            playback.stop();
        }
    }

    /// Snapshot of the conversation history
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    /// Messages from `start` onward
    #[must_use]
    pub fn messages_since(&self, start: usize) -> Vec<Message> {
        lock(&self.state)
            .messages
            .get(start..)
            .map(<[Message]>::to_vec)
            .unwrap_or_default()
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_loading(&self) -> bool {
        lock(&self.state).is_loading
    }

    /// Whether the greeting has been requested
    #[must_use]
    pub fn has_started(&self) -> bool {
        lock(&self.state).has_started
    }
}
