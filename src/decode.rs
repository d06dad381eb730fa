//! Audio decoding over symphonia.
//!
//! One decoder instance backs either a full in-memory decode (sound
//! buffers) or an incremental pull (music streaming). Samples are delivered
//! as interleaved `f32`.

use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};
use thiserror::Error;

/// Interleaved stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("unrecognized media container: {0}")]
    Probe(SymphoniaError),

    #[error("no default audio track")]
    NoTrack,

    #[error("decoder init failed: {0}")]
    DecoderInit(SymphoniaError),

    #[error("decode failed: {0}")]
    Decode(SymphoniaError),

    #[error("seek failed: {0}")]
    Seek(SymphoniaError),

    #[error("stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stream spec could not be determined")]
    MissingSpec,
}

pub(crate) struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    spec: AudioSpec,
    time_base: Option<TimeBase>,
    duration: Option<Duration>,
    sample_buf: Option<SampleBuffer<f32>>,
    pending: Vec<f32>,
}

impl AudioDecoder {
    /// Probe and open a media source.
    ///
    /// `extension` is an optional container hint (taken from a file path);
    /// memory and callback-stream sources pass None and rely on probing.
    pub(crate) fn open(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(source, MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(DecodeError::Probe)?;

        let mut format = probed.format;
        let track = format.default_track().ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(DecodeError::DecoderInit)?;

        let time_base = params.time_base;
        let duration = match (time_base, params.n_frames) {
            (Some(tb), Some(frames)) => Some(duration_from_time_base(tb, frames)),
            _ => None,
        };

        let mut sample_rate = params.sample_rate.unwrap_or(0);
        let mut channels = params
            .channels
            .as_ref()
            .map(|v| v.count() as u16)
            .unwrap_or(0);

        // Some containers only reveal the stream spec once decoding starts.
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut pending = Vec::new();
        while sample_rate == 0 || channels == 0 {
            match format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != track_id {
                        continue;
                    }
                    match decoder.decode(&packet) {
                        Ok(audio_buf) => {
                            if sample_rate == 0 {
                                sample_rate = audio_buf.spec().rate;
                            }
                            if channels == 0 {
                                channels = audio_buf.spec().channels.count() as u16;
                            }
                            append_decoded(&mut sample_buf, &mut pending, audio_buf);
                        }
                        Err(SymphoniaError::DecodeError(_)) => continue,
                        Err(SymphoniaError::ResetRequired) => {
                            decoder.reset();
                            continue;
                        }
                        Err(e) => return Err(DecodeError::Decode(e)),
                    }
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::Decode(e)),
            }
        }
        if sample_rate == 0 || channels == 0 {
            return Err(DecodeError::MissingSpec);
        }

        Ok(Self {
            format,
            decoder,
            track_id,
            spec: AudioSpec {
                sample_rate,
                channels,
            },
            time_base,
            duration,
            sample_buf,
            pending,
        })
    }

    pub(crate) fn spec(&self) -> AudioSpec {
        self.spec
    }

    pub(crate) fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Pull up to `frames` frames of interleaved samples.
    ///
    /// Returns None once the stream is exhausted.
    pub(crate) fn next_block(&mut self, frames: usize) -> Result<Option<Vec<f32>>, DecodeError> {
        let channels = self.spec.channels.max(1) as usize;
        let want_samples = frames.saturating_mul(channels).max(channels);

        while self.pending.len() < want_samples {
            match self.format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != self.track_id {
                        continue;
                    }
                    match self.decoder.decode(&packet) {
                        Ok(audio_buf) => {
                            append_decoded(&mut self.sample_buf, &mut self.pending, audio_buf);
                        }
                        Err(SymphoniaError::DecodeError(_)) => continue,
                        Err(SymphoniaError::ResetRequired) => {
                            self.decoder.reset();
                            continue;
                        }
                        Err(e) => return Err(DecodeError::Decode(e)),
                    }
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => return Err(DecodeError::Decode(e)),
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }
        let take = want_samples.min(self.pending.len());
        Ok(Some(self.pending.drain(..take).collect()))
    }

    /// Decode the whole stream into one interleaved buffer.
    pub(crate) fn decode_all(&mut self) -> Result<Vec<f32>, DecodeError> {
        let mut out = std::mem::take(&mut self.pending);
        while let Some(block) = self.next_block(4096)? {
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    /// Seek to an absolute position from the start of the stream.
    pub(crate) fn seek_to(&mut self, position: Duration) -> Result<(), DecodeError> {
        let secs = position.as_secs();
        let frac = position.subsec_nanos() as f64 / 1_000_000_000.0;
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::new(secs, frac),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(DecodeError::Seek)?;
        self.decoder.reset();
        self.pending.clear();
        Ok(())
    }
}

fn append_decoded(
    sample_buf: &mut Option<SampleBuffer<f32>>,
    pending: &mut Vec<f32>,
    audio_buf: AudioBufferRef<'_>,
) {
    let spec = SignalSpec::new(audio_buf.spec().rate, audio_buf.spec().channels);
    let capacity = audio_buf.capacity() as u64;
    let needs_realloc = sample_buf
        .as_ref()
        .is_none_or(|buf| buf.capacity() < audio_buf.capacity());
    if needs_realloc {
        *sample_buf = Some(SampleBuffer::<f32>::new(capacity, spec));
    }

    let Some(sample_buf) = sample_buf.as_mut() else {
        return;
    };
    sample_buf.copy_interleaved_ref(audio_buf);
    pending.extend_from_slice(sample_buf.samples());
}

fn duration_from_time_base(tb: TimeBase, ts: u64) -> Duration {
    let t = tb.calc_time(ts);
    Duration::from_secs(t.seconds) + Duration::from_secs_f64(t.frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::test_wav_bytes;
    use std::io::Cursor;

    #[test]
    fn decodes_generated_wav() {
        let (bytes, spec, frames) = test_wav_bytes();
        let mut decoder =
            AudioDecoder::open(Box::new(Cursor::new(bytes)), Some("wav")).expect("open");

        assert_eq!(decoder.spec(), spec);
        let samples = decoder.decode_all().expect("decode");
        assert_eq!(samples.len(), frames * spec.channels as usize);
    }

    #[test]
    fn seek_rewinds_the_stream() {
        let (bytes, spec, frames) = test_wav_bytes();
        let mut decoder =
            AudioDecoder::open(Box::new(Cursor::new(bytes)), Some("wav")).expect("open");

        let first = decoder.decode_all().expect("decode");
        decoder.seek_to(Duration::ZERO).expect("seek");
        let second = decoder.decode_all().expect("decode again");

        assert_eq!(first.len(), frames * spec.channels as usize);
        assert_eq!(first, second);
    }

    #[test]
    fn garbage_is_rejected() {
        let garbage = vec![0u8; 64];
        assert!(AudioDecoder::open(Box::new(Cursor::new(garbage)), None).is_err());
    }
}
