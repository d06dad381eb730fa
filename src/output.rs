//! Audio device I/O over cpal.
//!
//! cpal streams are not `Send`, so a dedicated service thread owns every
//! open output and capture stream. Binding code talks to it through a
//! command channel; the device callbacks pull samples from a
//! [`SampleProvider`] or push capture blocks into a caller-supplied sink.

use std::collections::HashMap;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::decode::AudioSpec;

/// Pull interface the output callback drains, one interleaved sample at a
/// time. Implementations run on the device thread and must stay lightweight
/// (no allocations, locks held briefly or not at all).
pub(crate) trait SampleProvider: Send + 'static {
    fn pop_sample(&mut self) -> Option<f32>;

    /// Called once per device callback after the buffer has been filled.
    fn on_block(&mut self, _requested: usize, _provided: usize) {}
}

/// Sink for capture blocks. Returning false requests capture stop.
pub(crate) type CaptureSink = Box<dyn FnMut(&[i16], AudioSpec) -> bool + Send>;

#[derive(Debug, Error)]
pub(crate) enum OutputError {
    #[error("no default audio device")]
    NoDevice,

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build device stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start device stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported device sample format: {0}")]
    UnsupportedFormat(String),

    #[error("no capture device available")]
    CaptureUnavailable,

    #[error("audio service thread is gone")]
    ServiceGone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct VoiceId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CaptureId(u64);

type ProviderFactory = Box<dyn FnOnce(AudioSpec) -> Box<dyn SampleProvider> + Send>;

enum Command {
    StartVoice {
        build: ProviderFactory,
        reply: Sender<Result<VoiceId, OutputError>>,
    },
    PauseVoice(VoiceId),
    ResumeVoice(VoiceId),
    StopVoice(VoiceId, Sender<()>),
    StartCapture {
        sample_rate: u32,
        sink: CaptureSink,
        reply: Sender<Result<(CaptureId, AudioSpec), OutputError>>,
    },
    StopCapture(CaptureId, Sender<()>),
}

static SERVICE: Lazy<Sender<Command>> = Lazy::new(|| {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("lyra-audio".into())
        .spawn(move || run_service(rx))
        .expect("failed to spawn audio service thread");
    tx
});

/// Open an output stream fed by the provider the factory builds for the
/// device's native spec.
pub(crate) fn start_voice(build: ProviderFactory) -> Result<VoiceId, OutputError> {
    let (reply, rx) = bounded(1);
    SERVICE
        .send(Command::StartVoice { build, reply })
        .map_err(|_| OutputError::ServiceGone)?;
    rx.recv().map_err(|_| OutputError::ServiceGone)?
}

pub(crate) fn pause_voice(id: VoiceId) {
    let _ = SERVICE.send(Command::PauseVoice(id));
}

pub(crate) fn resume_voice(id: VoiceId) {
    let _ = SERVICE.send(Command::ResumeVoice(id));
}

/// Drop a voice's stream. Blocks until the service has released it, so a
/// following buffer destroy cannot observe a transient borrow.
pub(crate) fn stop_voice(id: VoiceId) {
    let (done, rx) = bounded(1);
    if SERVICE.send(Command::StopVoice(id, done)).is_ok() {
        let _ = rx.recv();
    }
}

/// Open a capture stream delivering interleaved i16 blocks to `sink`.
///
/// `sample_rate` of 0 keeps the device default. The actual spec is
/// reported back once the stream is running.
pub(crate) fn start_capture(
    sample_rate: u32,
    sink: CaptureSink,
) -> Result<(CaptureId, AudioSpec), OutputError> {
    let (reply, rx) = bounded(1);
    SERVICE
        .send(Command::StartCapture {
            sample_rate,
            sink,
            reply,
        })
        .map_err(|_| OutputError::ServiceGone)?;
    rx.recv().map_err(|_| OutputError::ServiceGone)?
}

/// Drop a capture stream. Blocks until the service has released it; no
/// callback runs after this returns.
pub(crate) fn stop_capture(id: CaptureId) {
    let (done, rx) = bounded(1);
    if SERVICE.send(Command::StopCapture(id, done)).is_ok() {
        let _ = rx.recv();
    }
}

/// Spec of the default output device.
pub(crate) fn default_output_spec() -> Result<AudioSpec, OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
    let config = device.default_output_config()?;
    Ok(AudioSpec {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    })
}

/// Names of all output devices on the default host.
pub(crate) fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    let mut names = Vec::new();
    if let Ok(devices) = host.output_devices() {
        for device in devices {
            names.push(device_label(&device));
        }
    }
    names
}

/// Whether any capture device is present.
pub(crate) fn capture_available() -> bool {
    cpal::default_host().default_input_device().is_some()
}

fn device_label(device: &cpal::Device) -> String {
    match device.name() {
        Ok(name) => name.trim().to_string(),
        Err(_) => "Unknown Device".to_string(),
    }
}

struct Service {
    voices: HashMap<VoiceId, cpal::Stream>,
    captures: HashMap<CaptureId, cpal::Stream>,
    next_id: u64,
}

fn run_service(rx: Receiver<Command>) {
    let mut service = Service {
        voices: HashMap::new(),
        captures: HashMap::new(),
        next_id: 1,
    };

    for cmd in rx.iter() {
        match cmd {
            Command::StartVoice { build, reply } => {
                let id = VoiceId(service.next_id);
                service.next_id += 1;
                let result = open_output_stream(build).map(|stream| {
                    service.voices.insert(id, stream);
                    id
                });
                let _ = reply.send(result);
            }
            Command::PauseVoice(id) => {
                if let Some(stream) = service.voices.get(&id) {
                    if let Err(e) = stream.pause() {
                        tracing::warn!("pause failed: {e}");
                    }
                }
            }
            Command::ResumeVoice(id) => {
                if let Some(stream) = service.voices.get(&id) {
                    if let Err(e) = stream.play() {
                        tracing::warn!("resume failed: {e}");
                    }
                }
            }
            Command::StopVoice(id, done) => {
                service.voices.remove(&id);
                let _ = done.send(());
            }
            Command::StartCapture {
                sample_rate,
                sink,
                reply,
            } => {
                let id = CaptureId(service.next_id);
                service.next_id += 1;
                let result = open_capture_stream(sample_rate, sink).map(|(stream, spec)| {
                    service.captures.insert(id, stream);
                    (id, spec)
                });
                let _ = reply.send(result);
            }
            Command::StopCapture(id, done) => {
                service.captures.remove(&id);
                let _ = done.send(());
            }
        }
    }
}

fn open_output_stream(build: ProviderFactory) -> Result<cpal::Stream, OutputError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(OutputError::NoDevice)?;
    let config = device.default_output_config()?;

    let spec = AudioSpec {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
    };
    let mut provider = build(spec);
    let stream_config: cpal::StreamConfig = config.clone().into();

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _| fill_f32(data, &mut provider),
            |err| tracing::warn!("output stream error: {err}"),
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [i16], _| fill_i16(data, &mut provider),
            |err| tracing::warn!("output stream error: {err}"),
            None,
        )?,
        cpal::SampleFormat::U16 => device.build_output_stream(
            &stream_config,
            move |data: &mut [u16], _| fill_u16(data, &mut provider),
            |err| tracing::warn!("output stream error: {err}"),
            None,
        )?,
        other => return Err(OutputError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok(stream)
}

fn open_capture_stream(
    sample_rate: u32,
    mut sink: CaptureSink,
) -> Result<(cpal::Stream, AudioSpec), OutputError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(OutputError::CaptureUnavailable)?;
    let config = device.default_input_config()?;

    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if sample_rate != 0 {
        stream_config.sample_rate = cpal::SampleRate(sample_rate);
    }
    let spec = AudioSpec {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };

    // Reused between callbacks so the capture path does not allocate in
    // steady state.
    let mut scratch: Vec<i16> = Vec::new();
    let mut active = true;

    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if active {
                    active = sink(data, spec);
                }
            },
            |err| tracing::warn!("capture stream error: {err}"),
            None,
        )?,
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !active {
                    return;
                }
                scratch.clear();
                scratch.extend(data.iter().map(|&v| f32_to_i16(v)));
                active = sink(&scratch, spec);
            },
            |err| tracing::warn!("capture stream error: {err}"),
            None,
        )?,
        cpal::SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                if !active {
                    return;
                }
                scratch.clear();
                scratch.extend(data.iter().map(|&v| (v as i32 - 32768) as i16));
                active = sink(&scratch, spec);
            },
            |err| tracing::warn!("capture stream error: {err}"),
            None,
        )?,
        other => return Err(OutputError::UnsupportedFormat(format!("{other:?}"))),
    };

    stream.play()?;
    Ok((stream, spec))
}

fn fill_f32(out: &mut [f32], provider: &mut Box<dyn SampleProvider>) {
    let mut provided = 0usize;
    for slot in out.iter_mut() {
        match provider.pop_sample() {
            Some(v) => {
                provided += 1;
                *slot = v;
            }
            None => *slot = 0.0,
        }
    }
    provider.on_block(out.len(), provided);
}

fn fill_i16(out: &mut [i16], provider: &mut Box<dyn SampleProvider>) {
    let mut provided = 0usize;
    for slot in out.iter_mut() {
        match provider.pop_sample() {
            Some(v) => {
                provided += 1;
                *slot = f32_to_i16(v);
            }
            None => *slot = 0,
        }
    }
    provider.on_block(out.len(), provided);
}

fn fill_u16(out: &mut [u16], provider: &mut Box<dyn SampleProvider>) {
    let mut provided = 0usize;
    for slot in out.iter_mut() {
        match provider.pop_sample() {
            Some(v) => {
                provided += 1;
                *slot = f32_to_u16(v);
            }
            None => *slot = 0,
        }
    }
    provider.on_block(out.len(), provided);
}

pub(crate) fn f32_to_i16(v: f32) -> i16 {
    let v = v.clamp(-1.0, 1.0);
    (v * i16::MAX as f32) as i16
}

fn f32_to_u16(v: f32) -> u16 {
    let v = v.clamp(-1.0, 1.0);
    ((v + 1.0) * 0.5 * u16::MAX as f32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_conversion_clamps() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert_eq!(f32_to_u16(-1.0), 0);
        assert_eq!(f32_to_u16(1.0), u16::MAX);
    }

    struct Ramp {
        next: f32,
        limit: usize,
        emitted: usize,
    }

    impl SampleProvider for Ramp {
        fn pop_sample(&mut self) -> Option<f32> {
            if self.emitted == self.limit {
                return None;
            }
            self.emitted += 1;
            let v = self.next;
            self.next += 0.25;
            Some(v)
        }
    }

    #[test]
    fn fill_pads_with_silence_after_exhaustion() {
        let mut provider: Box<dyn SampleProvider> = Box::new(Ramp {
            next: 0.0,
            limit: 3,
            emitted: 0,
        });
        let mut out = [1.0f32; 6];
        fill_f32(&mut out, &mut provider);
        assert_eq!(out, [0.0, 0.25, 0.5, 0.0, 0.0, 0.0]);
    }
}
