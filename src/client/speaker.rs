//! Speaker output for reply audio

use super::{ActivePlayback, AudioSink};
use crate::voice::{AudioPlayback, MPEG_MIME, PlaybackHandle, data_uri};
use crate::{Error, Result};

/// Plays `data:audio/mpeg` URLs on the default output device
#[derive(Debug, Default, Clone, Copy)]
pub struct SpeakerSink {
    playback: AudioPlayback,
}

impl SpeakerSink {
    /// Create a sink on the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        Ok(Self {
            playback: AudioPlayback::new()?,
        })
    }
}

impl AudioSink for SpeakerSink {
    fn start(&self, audio_url: &str) -> Result<Box<dyn ActivePlayback>> {
        let uri = data_uri::decode(audio_url)?;
        if uri.mime_type != MPEG_MIME {
            return Err(Error::Audio(format!(
                "unsupported audio type: {}",
                uri.mime_type
            )));
        }

        let handle = self.playback.play_mp3(&uri.data)?;
        Ok(Box::new(handle))
    }
}

impl ActivePlayback for PlaybackHandle {
    fn stop(self: Box<Self>) {
        PlaybackHandle::stop(*self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_audio_uri() {
        let sink = SpeakerSink::default();
        let url = data_uri::encode("text/plain", b"hello");

        assert!(matches!(sink.start(&url), Err(Error::Audio(_))));
    }

    #[test]
    fn rejects_malformed_uri() {
        let sink = SpeakerSink::default();

        assert!(matches!(
            sink.start("https://example.com/a.mp3"),
            Err(Error::DataUri(_))
        ));
    }

    #[test]
    fn rejects_undecodable_mp3() {
        let sink = SpeakerSink::default();
        let url = data_uri::encode(MPEG_MIME, &[0u8; 64]);

        assert!(sink.start(&url).is_err());
    }
}
