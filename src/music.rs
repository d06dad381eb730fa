//! Music: streamed playback decoding on the audio thread.

use std::fs::File;
use std::io::Cursor;
use std::os::raw::{c_char, c_void};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::decode::{AudioDecoder, AudioSpec};
use crate::effect::{EffectHook, LyraEffectProcessor};
use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::output::{self, VoiceId};
use crate::sound::{LyraSoundStatus, status_from_u8};
use crate::stream::{CallbackStream, LyraInputStream};
use crate::types::{LyraTime, LyraTimeSpan};
use crate::util::{cstr_to_path, set_error, set_ok};
use crate::voice::{
    MusicStream, STATUS_PAUSED, STATUS_PLAYING, STATUS_STOPPED, StreamVoice, VoiceControl,
};

pub(crate) struct MusicData {
    stream: Arc<Mutex<MusicStream>>,
    ctrl: Arc<VoiceControl>,
    voice: Mutex<Option<VoiceId>>,
    effect: Mutex<Option<EffectHook>>,
    spec: AudioSpec,
    duration: Option<std::time::Duration>,
}

static MUSICS: Registry<MusicData> = Registry::new();

define_handle!(
    /// Handle to a music stream.
    LyraMusic
);

fn get(handle: LyraMusic) -> Option<Arc<MusicData>> {
    MUSICS.get(handle.raw())
}

fn insert_decoder(decoder: AudioDecoder) -> LyraMusic {
    let spec = decoder.spec();
    let duration = decoder.duration();
    LyraMusic::from_raw(MUSICS.insert(MusicData {
        stream: Arc::new(Mutex::new(MusicStream::new(decoder))),
        ctrl: VoiceControl::new(),
        voice: Mutex::new(None),
        effect: Mutex::new(None),
        spec,
        duration,
    }))
}

impl MusicData {
    fn halt_voice(&self) {
        if let Some(id) = self.voice.lock().take() {
            output::stop_voice(id);
        }
    }

    fn spawn_voice(&self) -> Result<(), LyraError> {
        self.halt_voice();
        self.ctrl.set_status(STATUS_PLAYING);

        let stream = Arc::clone(&self.stream);
        let ctrl = Arc::clone(&self.ctrl);
        let effect = *self.effect.lock();
        let id = output::start_voice(Box::new(move |dev_spec| {
            Box::new(StreamVoice::new(stream, ctrl, effect, dev_spec))
                as Box<dyn crate::output::SampleProvider>
        }))
        .map_err(|e| {
            self.ctrl.set_status(STATUS_STOPPED);
            LyraError::from(e)
        })?;

        *self.voice.lock() = Some(id);
        Ok(())
    }

    fn frames_from_time(&self, time: LyraTime) -> u64 {
        (time.to_duration().as_secs_f64() * self.spec.sample_rate as f64) as u64
    }

    fn time_from_frames(&self, frames: f64) -> LyraTime {
        LyraTime {
            microseconds: (frames / self.spec.sample_rate as f64 * 1_000_000.0) as i64,
        }
    }
}

/// Open a music stream from an audio file.
///
/// The file is decoded incrementally during playback, on the engine's audio
/// thread.
///
/// # Returns
///
/// Handle on success, the invalid handle on failure.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_music_destroy()`.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_create_from_file(
    path: *const c_char,
    error: *mut LyraError,
) -> LyraMusic {
    let path = match unsafe { cstr_to_path(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!("music open failed: {}: {e}", path.display());
            return unsafe { set_error(error, LyraError::from_io_error(e)) };
        }
    };

    match AudioDecoder::open(Box::new(file), extension.as_deref()) {
        Ok(decoder) => {
            unsafe { set_ok(error) };
            insert_decoder(decoder)
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Open a music stream from a memory block. The contents are copied.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_create_from_memory(
    data: *const u8,
    size: usize,
    error: *mut LyraError,
) -> LyraMusic {
    if data.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("data")) };
    }

    let bytes = unsafe { std::slice::from_raw_parts(data, size) }.to_vec();
    match AudioDecoder::open(Box::new(Cursor::new(bytes)), None) {
        Ok(decoder) => {
            unsafe { set_ok(error) };
            insert_decoder(decoder)
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Open a music stream from a caller-supplied stream.
///
/// Unlike the one-shot loaders, the table is used for the whole lifetime of
/// the music: playback pulls from it on the engine's audio thread. The
/// callbacks and `user_data` must stay valid until the music is destroyed
/// and must tolerate being called from that thread.
///
/// # Safety
///
/// - `stream` must point to a valid table satisfying the lifetime contract
///   above
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_create_from_stream(
    stream: *const LyraInputStream,
    error: *mut LyraError,
) -> LyraMusic {
    let adapter = match unsafe { CallbackStream::new(stream) } {
        Ok(s) => s,
        Err(e) => return unsafe { set_error(error, e) },
    };

    match AudioDecoder::open(Box::new(adapter), None) {
        Ok(decoder) => {
            unsafe { set_ok(error) };
            insert_decoder(decoder)
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Destroy a music stream. Any playing voice is stopped first.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_destroy(music: LyraMusic, error: *mut LyraError) -> bool {
    if let Some(data) = get(music) {
        data.halt_voice();
        data.ctrl.set_status(STATUS_STOPPED);
    }
    match MUSICS.remove(music.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe { set_error(error, LyraError::resource_busy("music")) },
    }
}

/// Start or resume playback.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_play(music: LyraMusic, error: *mut LyraError) -> bool {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    if data.ctrl.status() == STATUS_PAUSED {
        if let Some(id) = *data.voice.lock() {
            data.ctrl.set_status(STATUS_PLAYING);
            output::resume_voice(id);
            unsafe { set_ok(error) };
            return true;
        }
    }

    match data.spawn_voice() {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Pause playback.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_pause(music: LyraMusic, error: *mut LyraError) -> bool {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    if data.ctrl.status() == STATUS_PLAYING {
        if let Some(id) = *data.voice.lock() {
            output::pause_voice(id);
        }
        data.ctrl.set_status(STATUS_PAUSED);
    }
    unsafe { set_ok(error) };
    true
}

/// Stop playback and rewind to the start.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_stop(music: LyraMusic, error: *mut LyraError) -> bool {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.halt_voice();
    data.ctrl.set_status(STATUS_STOPPED);
    data.ctrl.request_seek(0.0);
    unsafe { set_ok(error) };
    true
}

/// Get the current playback status.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_status(
    music: LyraMusic,
    error: *mut LyraError,
) -> LyraSoundStatus {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            status_from_u8(d.ctrl.status())
        }
        None => unsafe {
            set_error::<()>(error, LyraError::invalid_handle());
            LyraSoundStatus::Stopped
        },
    }
}

/// Get the total duration, or zero when the container does not report one.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_duration(
    music: LyraMusic,
    error: *mut LyraError,
) -> LyraTime {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.duration.map(LyraTime::from_duration).unwrap_or(LyraTime::ZERO)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the number of channels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_channel_count(
    music: LyraMusic,
    error: *mut LyraError,
) -> u32 {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec.channels as u32
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the sample rate in Hz.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_sample_rate(
    music: LyraMusic,
    error: *mut LyraError,
) -> u32 {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec.sample_rate
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the volume (0-100).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_volume(
    music: LyraMusic,
    volume: f32,
    error: *mut LyraError,
) -> bool {
    match get(music) {
        Some(d) => {
            d.ctrl.set_volume(volume);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the volume (0-100).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_volume(music: LyraMusic, error: *mut LyraError) -> f32 {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.ctrl.volume()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the pitch (playback rate multiplier).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_pitch(
    music: LyraMusic,
    pitch: f32,
    error: *mut LyraError,
) -> bool {
    match get(music) {
        Some(d) => {
            d.ctrl.set_pitch(pitch);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the pitch.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_pitch(music: LyraMusic, error: *mut LyraError) -> f32 {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.ctrl.pitch()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Enable or disable looping.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_looping(
    music: LyraMusic,
    looping: bool,
    error: *mut LyraError,
) -> bool {
    match get(music) {
        Some(d) => {
            d.ctrl.set_looping(looping);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether the music loops.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_is_looping(music: LyraMusic, error: *mut LyraError) -> bool {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.ctrl.looping()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the current playing offset.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_playing_offset(
    music: LyraMusic,
    error: *mut LyraError,
) -> LyraTime {
    match get(music) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.time_from_frames(d.ctrl.cursor())
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Jump to a playing offset. Applied by the streaming voice at its next
/// block boundary.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_playing_offset(
    music: LyraMusic,
    offset: LyraTime,
    error: *mut LyraError,
) -> bool {
    match get(music) {
        Some(d) => {
            d.ctrl.request_seek(d.frames_from_time(offset) as f64);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the loop window. A zero or negative length clears the loop points
/// and reverts to whole-stream looping.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_loop_points(
    music: LyraMusic,
    span: LyraTimeSpan,
    error: *mut LyraError,
) -> bool {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let mut stream = data.stream.lock();
    if span.length.microseconds <= 0 {
        stream.loop_span = None;
    } else {
        let start = data.frames_from_time(span.offset);
        let end = start + data.frames_from_time(span.length);
        stream.loop_span = Some((start, end));
    }
    unsafe { set_ok(error) };
    true
}

/// Get the loop window; a zero-length span means no loop points are set.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_get_loop_points(
    music: LyraMusic,
    error: *mut LyraError,
) -> LyraTimeSpan {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let span = data.stream.lock().loop_span;
    unsafe { set_ok(error) };
    match span {
        Some((start, end)) => LyraTimeSpan {
            offset: data.time_from_frames(start as f64),
            length: data.time_from_frames((end - start) as f64),
        },
        None => LyraTimeSpan::default(),
    }
}

/// Attach or remove an effect processor.
///
/// A NULL `processor` removes the stage entirely. A playing voice is
/// restarted in place so the change applies immediately.
///
/// # Safety
///
/// - `processor`, if non-NULL, must stay callable until replaced or the
///   music is destroyed; it runs on the audio thread
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_music_set_effect_processor(
    music: LyraMusic,
    processor: LyraEffectProcessor,
    user_data: *mut c_void,
    error: *mut LyraError,
) -> bool {
    let data = match get(music) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    *data.effect.lock() = processor.map(|proc_fn| EffectHook { proc_fn, user_data });

    if data.ctrl.status() == STATUS_PLAYING {
        if let Err(e) = data.spawn_voice() {
            return unsafe { set_error(error, e) };
        }
    }
    unsafe { set_ok(error) };
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;
    use crate::wav::test_wav_bytes;

    fn make_music() -> LyraMusic {
        let (bytes, _, _) = test_wav_bytes();
        let mut error = LyraError::ok();
        let music =
            unsafe { lyra_music_create_from_memory(bytes.as_ptr(), bytes.len(), &mut error) };
        assert!(music.is_valid());
        music
    }

    #[test]
    fn memory_music_reports_stream_properties() {
        let music = make_music();
        let mut error = LyraError::ok();

        unsafe {
            assert_eq!(lyra_music_get_sample_rate(music, &mut error), 8000);
            assert_eq!(lyra_music_get_channel_count(music, &mut error), 2);
            let duration = lyra_music_get_duration(music, &mut error);
            assert_eq!(duration.microseconds, 32_000);
            assert_eq!(
                lyra_music_get_status(music, &mut error),
                LyraSoundStatus::Stopped
            );
        }

        assert!(unsafe { lyra_music_destroy(music, &mut error) });
    }

    #[test]
    fn loop_points_round_trip_and_clear() {
        let music = make_music();
        let mut error = LyraError::ok();

        let span = LyraTimeSpan {
            offset: crate::types::lyra_time_from_milliseconds(8),
            length: crate::types::lyra_time_from_milliseconds(16),
        };
        assert!(unsafe { lyra_music_set_loop_points(music, span, &mut error) });
        let read = unsafe { lyra_music_get_loop_points(music, &mut error) };
        assert_eq!(read.offset.microseconds, 8_000);
        assert_eq!(read.length.microseconds, 16_000);

        let cleared = LyraTimeSpan::default();
        assert!(unsafe { lyra_music_set_loop_points(music, cleared, &mut error) });
        let read = unsafe { lyra_music_get_loop_points(music, &mut error) };
        assert_eq!(read.length.microseconds, 0);

        assert!(unsafe { lyra_music_destroy(music, &mut error) });
    }

    #[test]
    fn playing_offset_round_trips_while_stopped() {
        let music = make_music();
        let mut error = LyraError::ok();

        let offset = crate::types::lyra_time_from_milliseconds(16);
        assert!(unsafe { lyra_music_set_playing_offset(music, offset, &mut error) });
        let read = unsafe { lyra_music_get_playing_offset(music, &mut error) };
        assert_eq!(read.microseconds, 16_000);

        assert!(unsafe { lyra_music_destroy(music, &mut error) });
    }

    #[test]
    fn garbage_memory_yields_invalid_handle() {
        let garbage = [0u8; 32];
        let mut error = LyraError::ok();
        let music =
            unsafe { lyra_music_create_from_memory(garbage.as_ptr(), garbage.len(), &mut error) };
        assert!(!music.is_valid());
        assert_ne!(error.code, LyraErrorCode::Ok);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    #[ignore = "requires an audio output device"]
    fn play_pause_stop_cycle() {
        let music = make_music();
        let mut error = LyraError::ok();

        assert!(unsafe { lyra_music_play(music, &mut error) });
        assert_eq!(
            unsafe { lyra_music_get_status(music, &mut error) },
            LyraSoundStatus::Playing
        );
        assert!(unsafe { lyra_music_pause(music, &mut error) });
        assert!(unsafe { lyra_music_stop(music, &mut error) });

        assert!(unsafe { lyra_music_destroy(music, &mut error) });
    }
}
