//! Playback voices.
//!
//! A voice is the state shared between binding calls and the device thread:
//! a lock-free control block (status, volume, pitch, looping, cursor) plus a
//! [`SampleProvider`] that maps source frames onto the device's rate and
//! channel layout. Rate and pitch are forwarded as a cursor step; real
//! resampling stays out of scope.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::decode::{AudioDecoder, AudioSpec, DecodeError};
use crate::effect::{EffectHook, EffectStage, RawSource};
use crate::output::SampleProvider;

pub(crate) const STATUS_STOPPED: u8 = 0;
pub(crate) const STATUS_PAUSED: u8 = 1;
pub(crate) const STATUS_PLAYING: u8 = 2;

const SEEK_NONE: u64 = u64::MAX;

/// Control block shared by the handle and the device thread.
///
/// Everything here is atomic; the device thread reads it per frame without
/// taking locks.
pub(crate) struct VoiceControl {
    status: AtomicU8,
    volume: AtomicU32,
    pitch: AtomicU32,
    looping: AtomicBool,
    cursor_frames: AtomicU64,
    seek_frames: AtomicU64,
}

impl VoiceControl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            status: AtomicU8::new(STATUS_STOPPED),
            volume: AtomicU32::new(100f32.to_bits()),
            pitch: AtomicU32::new(1f32.to_bits()),
            looping: AtomicBool::new(false),
            cursor_frames: AtomicU64::new(0),
            seek_frames: AtomicU64::new(SEEK_NONE),
        })
    }

    pub(crate) fn status(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    pub(crate) fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::Release);
    }

    /// Volume on the 0-100 scale.
    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch.load(Ordering::Relaxed))
    }

    pub(crate) fn set_pitch(&self, pitch: f32) {
        self.pitch.store(pitch.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// Source-frame position as maintained by the provider.
    pub(crate) fn cursor(&self) -> f64 {
        f64::from_bits(self.cursor_frames.load(Ordering::Relaxed))
    }

    pub(crate) fn set_cursor(&self, frames: f64) {
        self.cursor_frames.store(frames.to_bits(), Ordering::Relaxed);
    }

    /// Ask the provider to jump to an absolute source frame.
    pub(crate) fn request_seek(&self, frames: f64) {
        self.seek_frames.store(frames.to_bits(), Ordering::Release);
        self.set_cursor(frames);
    }

    fn take_seek(&self) -> Option<f64> {
        let bits = self.seek_frames.swap(SEEK_NONE, Ordering::AcqRel);
        (bits != SEEK_NONE).then(|| f64::from_bits(bits))
    }
}

/// Gain factor combining voice volume and the listener's global volume.
fn gain(ctrl: &VoiceControl) -> f32 {
    ctrl.volume() / 100.0 * crate::audio::master_gain()
}

/// Voice over a fully decoded buffer.
pub(crate) struct BufferVoice {
    samples: Arc<crate::buffer::BufferData>,
    ctrl: Arc<VoiceControl>,
    src_channels: usize,
    dev_channels: usize,
    /// Source frames advanced per device frame at pitch 1.
    rate_step: f64,
    pos: f64,
    channel: usize,
    effect: Option<EffectStage>,
}

impl BufferVoice {
    pub(crate) fn new(
        samples: Arc<crate::buffer::BufferData>,
        ctrl: Arc<VoiceControl>,
        effect: Option<EffectHook>,
        dev_spec: AudioSpec,
    ) -> Self {
        let src_spec = samples.spec();
        let start = ctrl.cursor().max(0.0);
        Self {
            ctrl,
            src_channels: src_spec.channels.max(1) as usize,
            dev_channels: dev_spec.channels.max(1) as usize,
            rate_step: src_spec.sample_rate as f64 / dev_spec.sample_rate.max(1) as f64,
            pos: start,
            channel: 0,
            effect: effect.map(|hook| EffectStage::new(hook, dev_spec.channels)),
            samples,
        }
    }

    fn frame_count(&self) -> f64 {
        (self.samples.samples().len() / self.src_channels) as f64
    }
}

impl RawSource for BufferVoice {
    fn next_raw(&mut self) -> Option<f32> {
        if self.channel == 0 {
            if let Some(target) = self.ctrl.take_seek() {
                self.pos = target.max(0.0);
            }

            let frames = self.frame_count();
            if self.pos >= frames {
                if self.ctrl.looping() && frames > 0.0 {
                    self.pos %= frames;
                } else {
                    self.ctrl.set_status(STATUS_STOPPED);
                    self.ctrl.set_cursor(0.0);
                    return None;
                }
            }
            self.ctrl.set_cursor(self.pos);
        }

        let frame = self.pos as usize;
        let src_channel = self.channel % self.src_channels;
        let index = frame * self.src_channels + src_channel;
        let value = self
            .samples
            .samples()
            .get(index)
            .map(|&s| s as f32 / 32768.0)
            .unwrap_or(0.0);

        self.channel += 1;
        if self.channel == self.dev_channels {
            self.channel = 0;
            self.pos += self.rate_step * self.ctrl.pitch() as f64;
        }

        Some(value * gain(&self.ctrl))
    }
}

impl SampleProvider for BufferVoice {
    fn pop_sample(&mut self) -> Option<f32> {
        if self.ctrl.status() != STATUS_PLAYING {
            return None;
        }
        match self.effect.take() {
            Some(mut stage) => {
                let v = stage.pop(self);
                self.effect = Some(stage);
                v
            }
            None => self.next_raw(),
        }
    }
}

/// Decoder state behind a streaming voice, shared with the control side for
/// seeks. The device thread takes the lock once per block.
pub(crate) struct MusicStream {
    decoder: AudioDecoder,
    /// Absolute source frame the decoder will yield next.
    next_frame: u64,
    /// Loop window in source frames, when loop points are set.
    pub(crate) loop_span: Option<(u64, u64)>,
    /// Bumped on every seek so providers discard buffered data.
    epoch: u64,
}

impl MusicStream {
    pub(crate) fn new(decoder: AudioDecoder) -> Self {
        Self {
            decoder,
            next_frame: 0,
            loop_span: None,
            epoch: 0,
        }
    }

    pub(crate) fn spec(&self) -> AudioSpec {
        self.decoder.spec()
    }

    pub(crate) fn seek_frames(&mut self, frame: u64) -> Result<(), DecodeError> {
        let rate = self.decoder.spec().sample_rate.max(1) as u64;
        let position = std::time::Duration::from_secs_f64(frame as f64 / rate as f64);
        self.decoder.seek_to(position)?;
        self.next_frame = frame;
        self.epoch += 1;
        Ok(())
    }
}

const STREAM_BLOCK_FRAMES: usize = 1024;

/// Voice streaming from a [`MusicStream`].
pub(crate) struct StreamVoice {
    stream: Arc<Mutex<MusicStream>>,
    ctrl: Arc<VoiceControl>,
    src_channels: usize,
    dev_channels: usize,
    rate_step: f64,
    /// Buffered source samples and the absolute frame of their first frame.
    pending: Vec<f32>,
    pending_start: u64,
    epoch: u64,
    /// Loop window as of the last time the stream lock was taken.
    cached_loop: Option<(u64, u64)>,
    /// Fractional source-frame cursor, absolute.
    pos: f64,
    channel: usize,
    finished: bool,
    effect: Option<EffectStage>,
}

impl StreamVoice {
    pub(crate) fn new(
        stream: Arc<Mutex<MusicStream>>,
        ctrl: Arc<VoiceControl>,
        effect: Option<EffectHook>,
        dev_spec: AudioSpec,
    ) -> Self {
        let (src_spec, epoch, cached_loop) = {
            let guard = stream.lock();
            (guard.spec(), guard.epoch, guard.loop_span)
        };
        let start = ctrl.cursor().max(0.0);
        Self {
            ctrl,
            src_channels: src_spec.channels.max(1) as usize,
            dev_channels: dev_spec.channels.max(1) as usize,
            rate_step: src_spec.sample_rate as f64 / dev_spec.sample_rate.max(1) as f64,
            pending: Vec::new(),
            pending_start: start as u64,
            epoch,
            cached_loop,
            pos: start,
            channel: 0,
            finished: false,
            effect: effect.map(|hook| EffectStage::new(hook, dev_spec.channels)),
            stream,
        }
    }

    /// Ensure the frame at `self.pos` is buffered, wrapping at the loop
    /// window. Takes the stream lock only when refilling or wrapping.
    fn buffer_frame(&mut self) -> bool {
        loop {
            let frame = self.pos as u64;

            // Loop window wrap, checked against the cached span so the hot
            // path stays lock-free.
            if let Some((start, end)) = self.cached_loop {
                if self.ctrl.looping() && frame >= end && end > start {
                    let mut stream = self.stream.lock();
                    self.cached_loop = stream.loop_span;
                    if stream.loop_span == Some((start, end)) {
                        if stream.seek_frames(start).is_err() {
                            self.finished = true;
                            return false;
                        }
                        self.epoch = stream.epoch;
                        self.pending.clear();
                        self.pending_start = start;
                        self.pos = start as f64;
                    }
                    continue;
                }
            }

            let pending_frames = (self.pending.len() / self.src_channels) as u64;
            if frame >= self.pending_start && frame < self.pending_start + pending_frames {
                return true;
            }

            let mut stream = self.stream.lock();
            self.cached_loop = stream.loop_span;
            if stream.epoch != self.epoch {
                self.epoch = stream.epoch;
                self.pending.clear();
                self.pending_start = stream.next_frame;
                self.pos = stream.next_frame as f64;
            }

            // Drop decoded history the cursor has already passed.
            let frame = self.pos as u64;
            let pending_frames = (self.pending.len() / self.src_channels) as u64;
            let consumed = frame
                .saturating_sub(self.pending_start)
                .min(pending_frames) as usize;
            self.pending.drain(..consumed * self.src_channels);
            self.pending_start += consumed as u64;

            match stream.decoder.next_block(STREAM_BLOCK_FRAMES) {
                Ok(Some(block)) => {
                    if self.pending.is_empty() {
                        self.pending_start = stream.next_frame;
                    }
                    stream.next_frame += (block.len() / self.src_channels) as u64;
                    self.pending.extend_from_slice(&block);
                }
                Ok(None) => {
                    if self.ctrl.looping() && stream.loop_span.is_none() {
                        if stream.seek_frames(0).is_err() {
                            self.finished = true;
                            return false;
                        }
                        self.epoch = stream.epoch;
                        self.pending.clear();
                        self.pending_start = 0;
                        self.pos = 0.0;
                        continue;
                    }
                    self.finished = true;
                    return false;
                }
                Err(e) => {
                    tracing::warn!("stream decode failed: {e}");
                    self.finished = true;
                    return false;
                }
            }
        }
    }
}

impl RawSource for StreamVoice {
    fn next_raw(&mut self) -> Option<f32> {
        if self.finished {
            return None;
        }

        if self.channel == 0 {
            if let Some(target) = self.ctrl.take_seek() {
                let mut stream = self.stream.lock();
                if stream.seek_frames(target.max(0.0) as u64).is_err() {
                    self.finished = true;
                }
                drop(stream);
                if self.finished {
                    self.ctrl.set_status(STATUS_STOPPED);
                    return None;
                }
            }

            if !self.buffer_frame() {
                self.ctrl.set_status(STATUS_STOPPED);
                self.ctrl.set_cursor(0.0);
                return None;
            }
            self.ctrl.set_cursor(self.pos);
        }

        let frame = self.pos as u64;
        let offset = (frame - self.pending_start) as usize * self.src_channels;
        let src_channel = self.channel % self.src_channels;
        let value = self
            .pending
            .get(offset + src_channel)
            .copied()
            .unwrap_or(0.0);

        self.channel += 1;
        if self.channel == self.dev_channels {
            self.channel = 0;
            self.pos += self.rate_step * self.ctrl.pitch() as f64;
        }

        Some(value * gain(&self.ctrl))
    }
}

impl SampleProvider for StreamVoice {
    fn pop_sample(&mut self) -> Option<f32> {
        if self.ctrl.status() != STATUS_PLAYING {
            return None;
        }
        match self.effect.take() {
            Some(mut stage) => {
                let v = stage.pop(self);
                self.effect = Some(stage);
                v
            }
            None => self.next_raw(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_block_round_trips() {
        let ctrl = VoiceControl::new();
        assert_eq!(ctrl.status(), STATUS_STOPPED);
        assert_eq!(ctrl.volume(), 100.0);
        assert_eq!(ctrl.pitch(), 1.0);
        assert!(!ctrl.looping());

        ctrl.set_status(STATUS_PLAYING);
        ctrl.set_volume(250.0);
        ctrl.set_pitch(0.5);
        ctrl.set_looping(true);
        assert_eq!(ctrl.status(), STATUS_PLAYING);
        assert_eq!(ctrl.volume(), 100.0);
        assert_eq!(ctrl.pitch(), 0.5);
        assert!(ctrl.looping());
    }

    #[test]
    fn seek_request_is_consumed_once() {
        let ctrl = VoiceControl::new();
        assert_eq!(ctrl.take_seek(), None);

        ctrl.request_seek(44100.0);
        assert_eq!(ctrl.cursor(), 44100.0);
        assert_eq!(ctrl.take_seek(), Some(44100.0));
        assert_eq!(ctrl.take_seek(), None);
    }

    #[test]
    fn buffer_voice_maps_mono_to_stereo() {
        let _guard = crate::audio::VOLUME_TEST_LOCK.lock();
        let buffer = Arc::new(crate::buffer::BufferData::from_samples(
            vec![16384, -16384],
            1,
            44100,
        ));
        let ctrl = VoiceControl::new();
        ctrl.set_status(STATUS_PLAYING);

        let mut voice = BufferVoice::new(
            buffer,
            ctrl.clone(),
            None,
            AudioSpec {
                sample_rate: 44100,
                channels: 2,
            },
        );

        // Each mono source frame is duplicated across both device channels.
        assert_eq!(voice.pop_sample(), Some(0.5));
        assert_eq!(voice.pop_sample(), Some(0.5));
        assert_eq!(voice.pop_sample(), Some(-0.5));
        assert_eq!(voice.pop_sample(), Some(-0.5));
        assert_eq!(voice.pop_sample(), None);
        assert_eq!(ctrl.status(), STATUS_STOPPED);
    }

    #[test]
    fn buffer_voice_honors_volume_and_loop() {
        let _guard = crate::audio::VOLUME_TEST_LOCK.lock();
        let buffer = Arc::new(crate::buffer::BufferData::from_samples(
            vec![16384],
            1,
            48000,
        ));
        let ctrl = VoiceControl::new();
        ctrl.set_status(STATUS_PLAYING);
        ctrl.set_volume(50.0);
        ctrl.set_looping(true);

        let mut voice = BufferVoice::new(
            buffer,
            ctrl.clone(),
            None,
            AudioSpec {
                sample_rate: 48000,
                channels: 1,
            },
        );

        for _ in 0..8 {
            assert_eq!(voice.pop_sample(), Some(0.25));
        }

        ctrl.set_looping(false);
        // One more frame drains the wrapped position, then the voice stops.
        while voice.pop_sample().is_some() {}
        assert_eq!(ctrl.status(), STATUS_STOPPED);
    }
}
