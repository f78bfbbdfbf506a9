//! Voice input state machine
//!
//! Recognition events from a [`SpeechRecognizer`] are folded into the text of
//! the input field. The pending interim transcript is the only source of the
//! [`LISTENING_MARKER`]; the displayed text is always derived as
//! `committed + interim + marker`, so replacing an interim result can never
//! duplicate it.
//!
//! ```text
//!            toggle (mic ok)            interim
//!   Idle ─────────────────────▶ Listening ─────▶ ProcessingResult
//!    ▲                             ▲   final          │
//!    │ toggle / error / end        └──────────────────┘
//!    └────────────────────────────────────────────────
//! ```

use std::fmt;
use std::sync::Arc;

use super::{
    Notifier, PERMISSION_ALERT, START_FAILED_ALERT, UNSUPPORTED_ALERT, recognition_error_alert,
};
use crate::Result;

/// Suffix shown while an interim transcript is pending
pub const LISTENING_MARKER: &str = " [聞き取り中...]";

/// Recognition locale
pub const RECOGNITION_LOCALE: &str = "ja-JP";

/// Voice input state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionState {
    Idle,
    Listening,
    /// An interim transcript is pending
    ProcessingResult,
}

/// One recognized segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionResult {
    #[must_use]
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    #[must_use]
    pub fn final_result(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// Recognition failure codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Nothing was said
    NoSpeech,
    /// Microphone access refused mid-session
    NotAllowed,
    /// Audio capture failed
    AudioCapture,
    /// Transcription service unreachable or failed
    Network,
    Other(String),
}

impl RecognitionError {
    /// Parse a recognizer error code
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "not-allowed" => Self::NotAllowed,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire code of this error
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::NotAllowed => "not-allowed",
            Self::AudioCapture => "audio-capture",
            Self::Network => "network",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Events emitted by a recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Results from `result_index` onward are new or changed
    Result {
        result_index: usize,
        results: Vec<RecognitionResult>,
    },
    Error(RecognitionError),
    /// Recognition session closed; always the last event of a session
    End,
}

/// A continuous, interim-enabled speech recognizer
pub trait SpeechRecognizer: Send {
    /// Begin a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be started
    fn start(&mut self) -> Result<()>;

    /// Stop listening; pending audio is still recognized before `End`
    fn stop(&mut self);

    /// Stop listening and discard pending audio
    fn abort(&mut self);
}

/// Grants or refuses microphone access
pub trait MicrophoneAccess: Send + Sync {
    /// Request access to the microphone
    ///
    /// # Errors
    ///
    /// Returns error if access is denied or no microphone exists
    fn request(&self) -> Result<()>;
}

/// Voice-driven input field
pub struct VoiceInput {
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    microphone: Box<dyn MicrophoneAccess>,
    notifier: Arc<dyn Notifier>,
    state: RecognitionState,
    committed: String,
    interim: String,
}

impl VoiceInput {
    /// Create voice input; `None` means no recognizer exists on this platform
    #[must_use]
    pub fn new(
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        microphone: Box<dyn MicrophoneAccess>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            recognizer,
            microphone,
            notifier,
            state: RecognitionState::Idle,
            committed: String::new(),
            interim: String::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> RecognitionState {
        self.state
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state != RecognitionState::Idle
    }

    /// Start or stop listening
    pub fn toggle(&mut self) -> RecognitionState {
        let Some(recognizer) = self.recognizer.as_mut() else {
            self.notifier.alert(UNSUPPORTED_ALERT);
            return self.state;
        };

        if self.state != RecognitionState::Idle {
            tracing::debug!("stopping recognition");
            recognizer.stop();
            self.state = RecognitionState::Idle;
            return self.state;
        }

        if let Err(e) = self.microphone.request() {
            tracing::warn!(error = %e, "microphone access denied");
            self.notifier.alert(PERMISSION_ALERT);
            return self.state;
        }

        match recognizer.start() {
            Ok(()) => {
                tracing::debug!(locale = RECOGNITION_LOCALE, "recognition started");
                self.state = RecognitionState::Listening;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start recognition");
                self.notifier.alert(START_FAILED_ALERT);
            }
        }
        self.state
    }

    /// Apply a recognizer event
    pub fn handle_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Result {
                result_index,
                results,
            } => self.apply_results(result_index, &results),
            RecognitionEvent::Error(error) => {
                tracing::debug!(code = %error, "recognition error");
                self.state = RecognitionState::Idle;
                match error {
                    RecognitionError::NoSpeech => {}
                    RecognitionError::NotAllowed => self.notifier.alert(PERMISSION_ALERT),
                    other => self.notifier.alert(&recognition_error_alert(other.code())),
                }
            }
            RecognitionEvent::End => {
                self.state = RecognitionState::Idle;
                let pending = std::mem::take(&mut self.interim);
                self.committed.push_str(&pending);
            }
        }
    }

    fn apply_results(&mut self, result_index: usize, results: &[RecognitionResult]) {
        let new = results.get(result_index..).unwrap_or_default();
        let join = |is_final: bool| {
            new.iter()
                .filter(|r| r.is_final == is_final)
                .map(|r| r.transcript.as_str())
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string()
        };

        let final_text = join(true);
        if !final_text.is_empty() {
            self.committed.push_str(&final_text);
            self.interim.clear();
            if self.state != RecognitionState::Idle {
                self.state = RecognitionState::Listening;
            }
            return;
        }

        let interim_text = join(false);
        if !interim_text.is_empty() {
            self.interim = interim_text;
            if self.state != RecognitionState::Idle {
                self.state = RecognitionState::ProcessingResult;
            }
        }
    }

    /// Text to display in the input field
    #[must_use]
    pub fn input_text(&self) -> String {
        if self.interim.is_empty() {
            self.committed.clone()
        } else {
            format!("{}{}{LISTENING_MARKER}", self.committed, self.interim)
        }
    }

    /// Replace the input field contents
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.committed = text.into();
        self.interim.clear();
    }

    /// Take the input text for submission, clearing the field
    pub fn take_input(&mut self) -> String {
        let mut text = std::mem::take(&mut self.committed);
        text.push_str(&std::mem::take(&mut self.interim));
        text
    }

    /// What [`Self::take_input`] would return, without clearing the field
    #[must_use]
    pub fn pending_input(&self) -> String {
        format!("{}{}", self.committed, self.interim)
    }
}

impl Drop for VoiceInput {
    fn drop(&mut self) {
        if self.state != RecognitionState::Idle {
            if let Some(recognizer) = self.recognizer.as_mut() {
                recognizer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Calls {
        start: AtomicUsize,
        stop: AtomicUsize,
        abort: AtomicUsize,
    }

    struct FakeRecognizer {
        calls: Arc<Calls>,
        fail_start: bool,
    }

    impl SpeechRecognizer for FakeRecognizer {
        fn start(&mut self) -> Result<()> {
            self.calls.start.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(Error::Recognition("busy".to_string()));
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.calls.stop.fetch_add(1, Ordering::SeqCst);
        }

        fn abort(&mut self) {
            self.calls.abort.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeMicrophone(bool);

    impl MicrophoneAccess for FakeMicrophone {
        fn request(&self) -> Result<()> {
            if self.0 {
                Ok(())
            } else {
                Err(Error::Permission("denied".to_string()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier(Mutex<Vec<String>>);

    impl Notifier for RecordingNotifier {
        fn alert(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    struct Harness {
        input: VoiceInput,
        calls: Arc<Calls>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(mic_ok: bool, fail_start: bool) -> Harness {
        let calls = Arc::new(Calls::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let input = VoiceInput::new(
            Some(Box::new(FakeRecognizer {
                calls: calls.clone(),
                fail_start,
            })),
            Box::new(FakeMicrophone(mic_ok)),
            notifier.clone(),
        );
        Harness {
            input,
            calls,
            notifier,
        }
    }

    fn listening() -> Harness {
        let mut h = harness(true, false);
        assert_eq!(h.input.toggle(), RecognitionState::Listening);
        h
    }

    fn result(results: Vec<RecognitionResult>) -> RecognitionEvent {
        RecognitionEvent::Result {
            result_index: 0,
            results,
        }
    }

    fn alerts(h: &Harness) -> Vec<String> {
        h.notifier.0.lock().unwrap().clone()
    }

    #[test]
    fn interim_then_final_yields_one_occurrence() {
        let mut h = listening();

        h.input
            .handle_event(result(vec![RecognitionResult::interim("今日は")]));
        assert_eq!(h.input.input_text(), format!("今日は{LISTENING_MARKER}"));
        assert_eq!(h.input.state(), RecognitionState::ProcessingResult);

        h.input
            .handle_event(result(vec![RecognitionResult::interim("今日は疲れ")]));
        assert_eq!(h.input.input_text(), format!("今日は疲れ{LISTENING_MARKER}"));

        h.input
            .handle_event(result(vec![RecognitionResult::final_result("今日は疲れた")]));
        assert_eq!(h.input.input_text(), "今日は疲れた");
        assert_eq!(h.input.state(), RecognitionState::Listening);
    }

    #[test]
    fn final_wins_over_interim_in_same_event() {
        let mut h = listening();

        h.input.handle_event(result(vec![
            RecognitionResult::final_result("はい"),
            RecognitionResult::interim("そう"),
        ]));

        assert_eq!(h.input.input_text(), "はい");
        assert_eq!(h.input.state(), RecognitionState::Listening);
    }

    #[test]
    fn results_before_index_are_ignored() {
        let mut h = listening();

        h.input.handle_event(RecognitionEvent::Result {
            result_index: 1,
            results: vec![
                RecognitionResult::final_result("old"),
                RecognitionResult::final_result("new"),
                RecognitionResult::final_result("words"),
            ],
        });

        assert_eq!(h.input.input_text(), "new words");
    }

    #[test]
    fn final_text_appends_without_separator() {
        let mut h = listening();
        h.input.set_input("こんにちは");

        h.input
            .handle_event(result(vec![RecognitionResult::final_result("元気")]));

        assert_eq!(h.input.input_text(), "こんにちは元気");
    }

    #[test]
    fn end_strips_marker_and_keeps_pending_text() {
        let mut h = listening();
        h.input
            .handle_event(result(vec![RecognitionResult::interim("疲れた")]));

        h.input.handle_event(RecognitionEvent::End);

        assert_eq!(h.input.input_text(), "疲れた");
        assert!(!h.input.input_text().ends_with(LISTENING_MARKER));
        assert_eq!(h.input.state(), RecognitionState::Idle);
    }

    #[test]
    fn no_speech_raises_no_alert() {
        let mut h = listening();

        h.input
            .handle_event(RecognitionEvent::Error(RecognitionError::NoSpeech));

        assert_eq!(h.input.state(), RecognitionState::Idle);
        assert!(alerts(&h).is_empty());
    }

    #[test]
    fn not_allowed_raises_permission_alert() {
        let mut h = listening();

        h.input
            .handle_event(RecognitionEvent::Error(RecognitionError::from_code(
                "not-allowed",
            )));

        assert_eq!(alerts(&h), vec![PERMISSION_ALERT.to_string()]);
        assert_eq!(h.input.state(), RecognitionState::Idle);
    }

    #[test]
    fn other_error_alert_names_the_code() {
        let mut h = listening();

        h.input
            .handle_event(RecognitionEvent::Error(RecognitionError::Network));

        assert_eq!(
            alerts(&h),
            vec!["音声認識でエラーが発生しました: network".to_string()]
        );
    }

    #[test]
    fn toggle_stops_when_listening() {
        let mut h = listening();

        assert_eq!(h.input.toggle(), RecognitionState::Idle);
        assert_eq!(h.calls.start.load(Ordering::SeqCst), 1);
        assert_eq!(h.calls.stop.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_microphone_stays_idle() {
        let mut h = harness(false, false);

        assert_eq!(h.input.toggle(), RecognitionState::Idle);
        assert_eq!(h.calls.start.load(Ordering::SeqCst), 0);
        assert_eq!(alerts(&h), vec![PERMISSION_ALERT.to_string()]);
    }

    #[test]
    fn failed_start_alerts() {
        let mut h = harness(true, true);

        assert_eq!(h.input.toggle(), RecognitionState::Idle);
        assert_eq!(alerts(&h), vec![START_FAILED_ALERT.to_string()]);
    }

    #[test]
    fn missing_recognizer_is_unsupported() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut input = VoiceInput::new(None, Box::new(FakeMicrophone(true)), notifier.clone());

        assert_eq!(input.toggle(), RecognitionState::Idle);
        assert_eq!(
            *notifier.0.lock().unwrap(),
            vec![UNSUPPORTED_ALERT.to_string()]
        );
    }

    #[test]
    fn late_final_after_stop_is_committed() {
        let mut h = listening();
        h.input.toggle();

        h.input
            .handle_event(result(vec![RecognitionResult::final_result("最後")]));

        assert_eq!(h.input.input_text(), "最後");
        assert_eq!(h.input.state(), RecognitionState::Idle);
    }

    #[test]
    fn take_input_clears_field() {
        let mut h = listening();
        h.input
            .handle_event(result(vec![RecognitionResult::final_result("送信")]));

        assert_eq!(h.input.take_input(), "送信");
        assert_eq!(h.input.input_text(), "");
    }

    #[test]
    fn drop_aborts_active_recognizer() {
        let h = listening();
        let calls = h.calls.clone();

        drop(h);

        assert_eq!(calls.abort.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn error_codes_round_trip() {
        for code in ["no-speech", "not-allowed", "audio-capture", "network", "aborted"] {
            assert_eq!(RecognitionError::from_code(code).code(), code);
        }
    }
}
