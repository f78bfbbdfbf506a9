//! Microphone recognizer backed by Whisper transcription
//!
//! Audio is captured on a dedicated thread (cpal streams are not `Send`).
//! While listening, the growing buffer is transcribed periodically and
//! reported as an interim result; on stop the whole recording is transcribed
//! once more as the final result. All transcription runs through a single
//! worker task so events arrive in capture order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::recognition::{
    MicrophoneAccess, RecognitionError, RecognitionEvent, RecognitionResult, SpeechRecognizer,
};
use crate::voice::{
    AudioCapture, SAMPLE_RATE, SpeechToText, input_available, is_silent, samples_to_wav,
};
use crate::{Error, Result};

/// Default interval between interim transcriptions
pub const INTERIM_INTERVAL: Duration = Duration::from_secs(2);

/// Microphone access through the default input device
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceMicrophone;

impl MicrophoneAccess for DeviceMicrophone {
    fn request(&self) -> Result<()> {
        if input_available() {
            Ok(())
        } else {
            Err(Error::Permission("no input device available".to_string()))
        }
    }
}

enum Command {
    Finish,
    Abort,
}

#[derive(Debug)]
enum Job {
    Interim(Vec<f32>),
    Final(Vec<f32>),
    Failed(RecognitionError),
    End,
}

/// Continuous recognizer: microphone capture plus Whisper
pub struct WhisperRecognizer {
    jobs: UnboundedSender<Job>,
    interim_busy: Arc<AtomicBool>,
    interim_interval: Duration,
    session: Option<mpsc::Sender<Command>>,
}

impl WhisperRecognizer {
    /// Create a recognizer that reports to `events`
    ///
    /// # Errors
    ///
    /// Returns error if called outside a tokio runtime
    pub fn new(stt: Arc<SpeechToText>, events: UnboundedSender<RecognitionEvent>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Recognition(format!("no async runtime: {e}")))?;

        let (jobs, jobs_rx) = unbounded_channel();
        let interim_busy = Arc::new(AtomicBool::new(false));
        runtime.spawn(transcription_worker(
            stt,
            jobs_rx,
            events,
            Arc::clone(&interim_busy),
        ));

        Ok(Self {
            jobs,
            interim_busy,
            interim_interval: INTERIM_INTERVAL,
            session: None,
        })
    }

    /// Override how often interim results are produced
    #[must_use]
    pub const fn with_interim_interval(mut self, interval: Duration) -> Self {
        self.interim_interval = interval;
        self
    }

    fn send(&mut self, command: Command) {
        if let Some(session) = self.session.take() {
            // the capture thread may already have exited after a failure
            let _ = session.send(command);
        }
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    /// Blocks until the capture thread has opened the input device; call it
    /// from `spawn_blocking` or `block_in_place` inside a runtime.
    fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::Recognition("recognition already started".to_string()));
        }

        let (commands, commands_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let jobs = self.jobs.clone();
        let busy = Arc::clone(&self.interim_busy);
        let interval = self.interim_interval;

        std::thread::Builder::new()
            .name("koutei-capture".to_string())
            .spawn(move || capture_loop(&commands_rx, &ready_tx, &jobs, &busy, interval))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Recognition("capture thread exited".to_string()))??;

        self.session = Some(commands);
        Ok(())
    }

    fn stop(&mut self) {
        self.send(Command::Finish);
    }

    fn abort(&mut self) {
        self.send(Command::Abort);
    }
}

impl Drop for WhisperRecognizer {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Live audio source driven by the capture thread
trait Recording {
    /// Still delivering audio
    fn is_live(&self) -> bool;
    /// Everything recorded so far
    fn snapshot(&self) -> Vec<f32>;
    /// Stop recording and hand over the buffer
    fn finish(&mut self) -> Vec<f32>;
}

impl Recording for AudioCapture {
    fn is_live(&self) -> bool {
        self.is_capturing()
    }

    fn snapshot(&self) -> Vec<f32> {
        self.peek_buffer()
    }

    fn finish(&mut self) -> Vec<f32> {
        self.stop();
        self.take_buffer()
    }
}

fn capture_loop(
    commands: &mpsc::Receiver<Command>,
    ready: &mpsc::Sender<Result<()>>,
    jobs: &UnboundedSender<Job>,
    interim_busy: &AtomicBool,
    interval: Duration,
) {
    let mut capture = match AudioCapture::new().and_then(|mut c| c.start().map(|()| c)) {
        Ok(capture) => capture,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));
    tracing::debug!("capture thread started");

    record(&mut capture, commands, jobs, interim_busy, interval);
    tracing::debug!("capture thread stopped");
}

/// Drive one recording session until stopped, aborted or the source fails
fn record(
    recording: &mut impl Recording,
    commands: &mpsc::Receiver<Command>,
    jobs: &UnboundedSender<Job>,
    interim_busy: &AtomicBool,
    interval: Duration,
) {
    loop {
        match commands.recv_timeout(interval) {
            Ok(Command::Finish) => {
                let _ = jobs.send(Job::Final(recording.finish()));
                break;
            }
            Ok(Command::Abort) | Err(RecvTimeoutError::Disconnected) => {
                recording.finish();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !recording.is_live() {
                    recording.finish();
                    let _ = jobs.send(Job::Failed(RecognitionError::AudioCapture));
                    break;
                }
                let samples = recording.snapshot();
                if !samples.is_empty()
                    && !is_silent(&samples)
                    && !interim_busy.swap(true, Ordering::AcqRel)
                {
                    let _ = jobs.send(Job::Interim(samples));
                }
            }
        }
    }

    let _ = jobs.send(Job::End);
}

async fn transcribe_samples(stt: &SpeechToText, samples: &[f32]) -> Result<String> {
    let wav = samples_to_wav(samples, SAMPLE_RATE)?;
    Ok(stt.transcribe(&wav).await?.trim().to_string())
}

async fn transcription_worker(
    stt: Arc<SpeechToText>,
    mut jobs: UnboundedReceiver<Job>,
    events: UnboundedSender<RecognitionEvent>,
    interim_busy: Arc<AtomicBool>,
) {
    let emit = |event: RecognitionEvent| {
        if events.send(event).is_err() {
            tracing::debug!("recognition listener gone");
        }
    };
    let result = |transcript: String, is_final: bool| RecognitionEvent::Result {
        result_index: 0,
        results: vec![RecognitionResult {
            transcript,
            is_final,
        }],
    };

    while let Some(job) = jobs.recv().await {
        match job {
            Job::Interim(samples) => {
                match transcribe_samples(&stt, &samples).await {
                    Ok(text) if !text.is_empty() => emit(result(text, false)),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "interim transcription failed"),
                }
                interim_busy.store(false, Ordering::Release);
            }
            Job::Final(samples) => {
                if samples.is_empty() || is_silent(&samples) {
                    emit(RecognitionEvent::Error(RecognitionError::NoSpeech));
                    continue;
                }
                match transcribe_samples(&stt, &samples).await {
                    Ok(text) if !text.is_empty() => emit(result(text, true)),
                    Ok(_) => emit(RecognitionEvent::Error(RecognitionError::NoSpeech)),
                    Err(e) => {
                        tracing::error!(error = %e, "transcription failed");
                        emit(RecognitionEvent::Error(RecognitionError::Network));
                    }
                }
            }
            Job::Failed(error) => emit(RecognitionEvent::Error(error)),
            Job::End => emit(RecognitionEvent::End),
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn tone() -> Vec<f32> {
        (0..1600)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / SAMPLE_RATE as f32;
                (t * 440.0 * std::f32::consts::TAU).sin() * 0.5
            })
            .collect()
    }

    async fn worker(server: &MockServer) -> (UnboundedSender<Job>, UnboundedReceiver<RecognitionEvent>) {
        let stt = SpeechToText::new_whisper(
            SecretString::from("test-key".to_string()),
            "whisper-1".to_string(),
            server.uri(),
        )
        .unwrap();
        let (jobs, jobs_rx) = unbounded_channel();
        let (events, events_rx) = unbounded_channel();
        tokio::spawn(transcription_worker(
            Arc::new(stt),
            jobs_rx,
            events,
            Arc::new(AtomicBool::new(true)),
        ));
        (jobs, events_rx)
    }

    async fn mock_transcript(server: &MockServer, status: u16, text: &str) {
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(serde_json::json!({ "text": text })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn interim_then_final_then_end() {
        let server = MockServer::start().await;
        mock_transcript(&server, 200, " 今日は疲れた ").await;
        let (jobs, mut events) = worker(&server).await;

        jobs.send(Job::Interim(tone())).ok();
        jobs.send(Job::Final(tone())).ok();
        jobs.send(Job::End).ok();

        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Result {
                result_index: 0,
                results: vec![RecognitionResult::interim("今日は疲れた")],
            })
        );
        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Result {
                result_index: 0,
                results: vec![RecognitionResult::final_result("今日は疲れた")],
            })
        );
        assert_eq!(events.recv().await, Some(RecognitionEvent::End));
    }

    #[tokio::test]
    async fn silent_final_is_no_speech() {
        let server = MockServer::start().await;
        let (jobs, mut events) = worker(&server).await;

        jobs.send(Job::Final(vec![0.0; 1600])).ok();
        jobs.send(Job::End).ok();

        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Error(RecognitionError::NoSpeech))
        );
        assert_eq!(events.recv().await, Some(RecognitionEvent::End));
    }

    #[tokio::test]
    async fn empty_transcript_is_no_speech() {
        let server = MockServer::start().await;
        mock_transcript(&server, 200, "  ").await;
        let (jobs, mut events) = worker(&server).await;

        jobs.send(Job::Final(tone())).ok();

        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Error(RecognitionError::NoSpeech))
        );
    }

    #[tokio::test]
    async fn service_failure_is_network_error() {
        let server = MockServer::start().await;
        mock_transcript(&server, 500, "").await;
        let (jobs, mut events) = worker(&server).await;

        jobs.send(Job::Interim(tone())).ok();
        jobs.send(Job::Final(tone())).ok();

        // the failed interim is swallowed
        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Error(RecognitionError::Network))
        );
    }

    #[tokio::test]
    async fn capture_failure_is_reported() {
        let server = MockServer::start().await;
        let (jobs, mut events) = worker(&server).await;

        jobs.send(Job::Failed(RecognitionError::AudioCapture)).ok();
        jobs.send(Job::End).ok();

        assert_eq!(
            events.recv().await,
            Some(RecognitionEvent::Error(RecognitionError::AudioCapture))
        );
        assert_eq!(events.recv().await, Some(RecognitionEvent::End));
    }

    struct FakeRecording {
        live: bool,
        samples: Vec<f32>,
        finished: bool,
    }

    impl Recording for FakeRecording {
        fn is_live(&self) -> bool {
            self.live
        }

        fn snapshot(&self) -> Vec<f32> {
            self.samples.clone()
        }

        fn finish(&mut self) -> Vec<f32> {
            self.finished = true;
            std::mem::take(&mut self.samples)
        }
    }

    fn drain(jobs: &mut UnboundedReceiver<Job>) -> Vec<Job> {
        std::iter::from_fn(|| jobs.try_recv().ok()).collect()
    }

    #[test]
    fn dead_source_reports_capture_failure() {
        let mut recording = FakeRecording {
            live: false,
            samples: tone(),
            finished: false,
        };
        let (_commands, commands_rx) = mpsc::channel();
        let (jobs, mut jobs_rx) = unbounded_channel();

        record(
            &mut recording,
            &commands_rx,
            &jobs,
            &AtomicBool::new(false),
            Duration::from_millis(1),
        );

        let sent = drain(&mut jobs_rx);
        assert!(matches!(
            sent.as_slice(),
            [Job::Failed(RecognitionError::AudioCapture), Job::End]
        ));
        assert!(recording.finished);
    }

    #[test]
    fn finish_hands_over_recording() {
        let mut recording = FakeRecording {
            live: true,
            samples: tone(),
            finished: false,
        };
        let (commands, commands_rx) = mpsc::channel();
        let (jobs, mut jobs_rx) = unbounded_channel();
        commands.send(Command::Finish).unwrap();

        record(
            &mut recording,
            &commands_rx,
            &jobs,
            &AtomicBool::new(false),
            Duration::from_secs(5),
        );

        let sent = drain(&mut jobs_rx);
        assert!(matches!(
            sent.as_slice(),
            [Job::Final(samples), Job::End] if samples.len() == 1600
        ));
    }

    #[test]
    fn microphone_access_matches_device_presence() {
        assert_eq!(DeviceMicrophone.request().is_ok(), input_available());
    }
}
