//! Audio playback to speakers
//!
//! Each clip plays on its own thread and can be stopped early through its
//! [`PlaybackHandle`]. Dropping the handle stops the clip.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// How often the playback thread checks for completion or a stop request
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Decoded PCM audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Plays audio to the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioPlayback;

/// A clip that is currently playing
#[derive(Debug)]
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Stop the clip and wait for the output stream to close
    pub fn stop(mut self) {
        self.halt();
    }

    /// Block until the clip has played out
    pub fn wait(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("playback thread panicked");
            }
        }
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("playback thread panicked");
            }
            tracing::debug!("playback stopped");
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let device = default_output()?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );
        Ok(Self)
    }

    /// Start playing MP3 bytes in the background
    ///
    /// # Errors
    ///
    /// Returns error if decoding fails or no output device is available
    pub fn play_mp3(&self, mp3_data: &[u8]) -> Result<PlaybackHandle> {
        let audio = decode_mp3(mp3_data)?;
        self.play(audio)
    }

    /// Start playing decoded samples in the background
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output configuration exists
    pub fn play(&self, audio: DecodedAudio) -> Result<PlaybackHandle> {
        let config = output_config(&default_output()?, audio.sample_rate)?;

        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let thread = {
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name("koutei-playback".to_string())
                .spawn(move || {
                    let result = default_output().and_then(|device| {
                        play_samples_blocking(&device, &config, audio, &stop, &finished)
                    });
                    if let Err(e) = result {
                        tracing::error!(error = %e, "audio playback failed");
                        finished.store(true, Ordering::Release);
                    }
                })?
        };

        Ok(PlaybackHandle {
            stop,
            thread: Some(thread),
        })
    }
}

fn default_output() -> Result<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))
}

/// Find a mono (or, failing that, stereo) output config at `sample_rate`
fn output_config(device: &Device, sample_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(sample_rate);
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        })
    };

    let supported = supports(1)
        .or_else(|| supports(2))
        .ok_or_else(|| Error::Audio(format!("no output config for {sample_rate} Hz")))?;

    Ok(supported.with_sample_rate(rate).config())
}

/// Play samples until they run out or `stop` is raised
fn play_samples_blocking(
    device: &Device,
    config: &StreamConfig,
    audio: DecodedAudio,
    stop: &AtomicBool,
    finished: &Arc<AtomicBool>,
) -> Result<()> {
    if audio.samples.is_empty() {
        finished.store(true, Ordering::Release);
        return Ok(());
    }

    let channels = usize::from(config.channels);
    let samples = Arc::new(audio.samples);
    let position = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let finished = Arc::clone(finished);
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Release);
                            0.0
                        });
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    while !finished.load(Ordering::Acquire) && !stop.load(Ordering::Acquire) {
        std::thread::sleep(POLL_INTERVAL);
    }

    drop(stream);
    tracing::debug!(
        samples = samples.len(),
        stopped_early = stop.load(Ordering::Acquire),
        "playback complete"
    );

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = u32::try_from(frame.sample_rate).unwrap_or_default();
                }

                // Convert i16 samples to f32 and handle stereo to mono
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 contained no audio frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
