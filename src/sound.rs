//! Sounds: buffer-backed playback voices.

use std::os::raw::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{BufferData, LyraSoundBuffer};
use crate::effect::{EffectHook, LyraEffectProcessor};
use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::output::{self, VoiceId};
use crate::types::{LyraCone, LyraTime, LyraVec3};
use crate::util::{set_error, set_ok};
use crate::voice::{BufferVoice, STATUS_PAUSED, STATUS_PLAYING, STATUS_STOPPED, VoiceControl};

/// Playback state of a sound or music voice.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyraSoundStatus {
    Stopped = 0,
    Paused = 1,
    Playing = 2,
}

pub(crate) fn status_from_u8(raw: u8) -> LyraSoundStatus {
    match raw {
        STATUS_PAUSED => LyraSoundStatus::Paused,
        STATUS_PLAYING => LyraSoundStatus::Playing,
        _ => LyraSoundStatus::Stopped,
    }
}

/// Spatial attributes stored on the voice and forwarded to the output
/// backend; attenuation itself is the backend's concern.
#[derive(Clone, Copy)]
pub(crate) struct Spatial {
    pub position: LyraVec3,
    pub cone: LyraCone,
    pub relative_to_listener: bool,
    pub min_distance: f32,
    pub attenuation: f32,
}

impl Default for Spatial {
    fn default() -> Self {
        Self {
            position: LyraVec3::default(),
            cone: LyraCone::default(),
            relative_to_listener: false,
            min_distance: 1.0,
            attenuation: 1.0,
        }
    }
}

pub(crate) struct SoundData {
    buffer: Mutex<Option<(LyraSoundBuffer, Arc<BufferData>)>>,
    ctrl: Arc<VoiceControl>,
    voice: Mutex<Option<VoiceId>>,
    effect: Mutex<Option<EffectHook>>,
    spatial: Mutex<Spatial>,
}

static SOUNDS: Registry<SoundData> = Registry::new();

define_handle!(
    /// Handle to a sound.
    LyraSound
);

fn get(handle: LyraSound) -> Option<Arc<SoundData>> {
    SOUNDS.get(handle.raw())
}

impl SoundData {
    fn sample_rate(&self) -> Option<u32> {
        self.buffer
            .lock()
            .as_ref()
            .map(|(_, data)| data.spec().sample_rate)
    }

    /// Drop the current voice stream, leaving the cursor untouched.
    fn halt_voice(&self) {
        if let Some(id) = self.voice.lock().take() {
            output::stop_voice(id);
        }
    }

    /// Start a fresh voice from the current cursor position.
    fn spawn_voice(&self) -> Result<(), LyraError> {
        let buffer = match &*self.buffer.lock() {
            Some((_, data)) => Arc::clone(data),
            None => return Err(LyraError::invalid_argument("sound has no buffer")),
        };

        self.halt_voice();
        self.ctrl.set_status(STATUS_PLAYING);

        let ctrl = Arc::clone(&self.ctrl);
        let effect = *self.effect.lock();
        let id = output::start_voice(Box::new(move |dev_spec| {
            Box::new(BufferVoice::new(buffer, ctrl, effect, dev_spec))
                as Box<dyn crate::output::SampleProvider>
        }))
        .map_err(|e| {
            self.ctrl.set_status(STATUS_STOPPED);
            LyraError::from(e)
        })?;

        *self.voice.lock() = Some(id);
        Ok(())
    }
}

/// Create a sound with no buffer attached.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_sound_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_create(error: *mut LyraError) -> LyraSound {
    unsafe { set_ok(error) };
    LyraSound::from_raw(SOUNDS.insert(SoundData {
        buffer: Mutex::new(None),
        ctrl: VoiceControl::new(),
        voice: Mutex::new(None),
        effect: Mutex::new(None),
        spatial: Mutex::new(Spatial::default()),
    }))
}

/// Destroy a sound. Any playing voice is stopped first.
///
/// # Returns
///
/// `true` if the sound was destroyed.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_destroy(sound: LyraSound, error: *mut LyraError) -> bool {
    if let Some(data) = get(sound) {
        data.halt_voice();
        data.ctrl.set_status(STATUS_STOPPED);
    }
    match SOUNDS.remove(sound.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe { set_error(error, LyraError::resource_busy("sound")) },
    }
}

/// Attach a sound buffer.
///
/// The sound borrows the buffer: destroying the buffer while it is attached
/// fails with `ResourceBusy`. A playing voice is stopped.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_buffer(
    sound: LyraSound,
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> bool {
    let data = match get(sound) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let buffer_data = match crate::buffer::get(buffer) {
        Some(b) => b,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.halt_voice();
    data.ctrl.set_status(STATUS_STOPPED);
    data.ctrl.set_cursor(0.0);
    *data.buffer.lock() = Some((buffer, buffer_data));
    unsafe { set_ok(error) };
    true
}

/// Get the attached buffer handle, or the invalid handle if none.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_buffer(
    sound: LyraSound,
    error: *mut LyraError,
) -> LyraSoundBuffer {
    let data = match get(sound) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    unsafe { set_ok(error) };
    data.buffer
        .lock()
        .as_ref()
        .map(|(handle, _)| *handle)
        .unwrap_or_default()
}

/// Start or resume playback.
///
/// Resumes when paused; otherwise starts a voice at the current playing
/// offset.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_play(sound: LyraSound, error: *mut LyraError) -> bool {
    let data = match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_pause(sound: LyraSound, error: *mut LyraError) -> bool {
    let data = match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_stop(sound: LyraSound, error: *mut LyraError) -> bool {
    let data = match get(sound) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.halt_voice();
    data.ctrl.set_status(STATUS_STOPPED);
    data.ctrl.set_cursor(0.0);
    unsafe { set_ok(error) };
    true
}

/// Get the current playback status.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_status(
    sound: LyraSound,
    error: *mut LyraError,
) -> LyraSoundStatus {
    match get(sound) {
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

/// Set the volume (0-100).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_volume(
    sound: LyraSound,
    volume: f32,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_get_volume(sound: LyraSound, error: *mut LyraError) -> f32 {
    match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_set_pitch(
    sound: LyraSound,
    pitch: f32,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_get_pitch(sound: LyraSound, error: *mut LyraError) -> f32 {
    match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_set_looping(
    sound: LyraSound,
    looping: bool,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.ctrl.set_looping(looping);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether the sound loops.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_is_looping(sound: LyraSound, error: *mut LyraError) -> bool {
    match get(sound) {
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
pub unsafe extern "C" fn lyra_sound_get_playing_offset(
    sound: LyraSound,
    error: *mut LyraError,
) -> LyraTime {
    let data = match get(sound) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    unsafe { set_ok(error) };
    match data.sample_rate() {
        Some(rate) => LyraTime {
            microseconds: (data.ctrl.cursor() / rate as f64 * 1_000_000.0) as i64,
        },
        None => LyraTime::ZERO,
    }
}

/// Jump to a playing offset.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_playing_offset(
    sound: LyraSound,
    offset: LyraTime,
    error: *mut LyraError,
) -> bool {
    let data = match get(sound) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let rate = match data.sample_rate() {
        Some(r) => r,
        None => return unsafe { set_error(error, LyraError::invalid_argument("sound has no buffer")) },
    };
    let frames = offset.to_duration().as_secs_f64() * rate as f64;
    data.ctrl.request_seek(frames);
    unsafe { set_ok(error) };
    true
}

/// Attach or remove an effect processor.
///
/// A NULL `processor` removes the stage entirely. A playing voice is
/// restarted in place so the change applies immediately.
///
/// # Safety
///
/// - `processor`, if non-NULL, must stay callable until replaced or the
///   sound is destroyed; it runs on the audio thread
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_effect_processor(
    sound: LyraSound,
    processor: LyraEffectProcessor,
    user_data: *mut c_void,
    error: *mut LyraError,
) -> bool {
    let data = match get(sound) {
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

/// Set the 3D position of the sound.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_position(
    sound: LyraSound,
    position: LyraVec3,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.spatial.lock().position = position;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the 3D position of the sound.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_position(
    sound: LyraSound,
    error: *mut LyraError,
) -> LyraVec3 {
    match get(sound) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spatial.lock().position
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the attenuation cone.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_cone(
    sound: LyraSound,
    cone: LyraCone,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.spatial.lock().cone = cone;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the attenuation cone.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_cone(
    sound: LyraSound,
    error: *mut LyraError,
) -> LyraCone {
    match get(sound) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spatial.lock().cone
        }
        None => unsafe {
            set_error::<()>(error, LyraError::invalid_handle());
            LyraCone::default()
        },
    }
}

/// Set the distance under which no attenuation is applied.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_min_distance(
    sound: LyraSound,
    distance: f32,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.spatial.lock().min_distance = distance.max(0.0);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the minimum attenuation distance.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_min_distance(
    sound: LyraSound,
    error: *mut LyraError,
) -> f32 {
    match get(sound) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spatial.lock().min_distance
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Set the attenuation factor applied beyond the minimum distance.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_attenuation(
    sound: LyraSound,
    attenuation: f32,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.spatial.lock().attenuation = attenuation.max(0.0);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the attenuation factor.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_get_attenuation(
    sound: LyraSound,
    error: *mut LyraError,
) -> f32 {
    match get(sound) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spatial.lock().attenuation
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Make the sound position relative to the listener.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_set_relative_to_listener(
    sound: LyraSound,
    relative: bool,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            d.spatial.lock().relative_to_listener = relative;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether the sound position is relative to the listener.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_is_relative_to_listener(
    sound: LyraSound,
    error: *mut LyraError,
) -> bool {
    match get(sound) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spatial.lock().relative_to_listener
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;

    fn make_buffer() -> LyraSoundBuffer {
        let samples: Vec<i16> = vec![0; 800];
        let mut error = LyraError::ok();
        let buffer = unsafe {
            crate::buffer::lyra_sound_buffer_create_from_samples(
                samples.as_ptr(),
                samples.len(),
                2,
                8000,
                &mut error,
            )
        };
        assert!(buffer.is_valid());
        buffer
    }

    #[test]
    fn buffer_destroy_while_attached_is_busy() {
        let buffer = make_buffer();
        let mut error = LyraError::ok();
        let sound = unsafe { lyra_sound_create(&mut error) };

        assert!(unsafe { lyra_sound_set_buffer(sound, buffer, &mut error) });
        assert_eq!(
            unsafe { lyra_sound_get_buffer(sound, &mut error) },
            buffer
        );

        assert!(!unsafe { crate::buffer::lyra_sound_buffer_destroy(buffer, &mut error) });
        assert_eq!(error.code, LyraErrorCode::ResourceBusy);
        unsafe { crate::error::lyra_error_free(&mut error) };

        assert!(unsafe { lyra_sound_destroy(sound, &mut error) });
        assert!(unsafe { crate::buffer::lyra_sound_buffer_destroy(buffer, &mut error) });
    }

    #[test]
    fn properties_round_trip() {
        let mut error = LyraError::ok();
        let sound = unsafe { lyra_sound_create(&mut error) };

        unsafe {
            lyra_sound_set_volume(sound, 40.0, &mut error);
            lyra_sound_set_pitch(sound, 2.0, &mut error);
            lyra_sound_set_looping(sound, true, &mut error);
            lyra_sound_set_position(sound, LyraVec3 { x: 1.0, y: 2.0, z: 3.0 }, &mut error);
            lyra_sound_set_cone(
                sound,
                LyraCone {
                    inner_angle: 45.0,
                    outer_angle: 90.0,
                    outer_gain: 0.5,
                },
                &mut error,
            );
            lyra_sound_set_relative_to_listener(sound, true, &mut error);
            lyra_sound_set_min_distance(sound, 5.0, &mut error);
            lyra_sound_set_attenuation(sound, 0.5, &mut error);
        }

        unsafe {
            assert_eq!(lyra_sound_get_volume(sound, &mut error), 40.0);
            assert_eq!(lyra_sound_get_pitch(sound, &mut error), 2.0);
            assert!(lyra_sound_is_looping(sound, &mut error));
            assert_eq!(lyra_sound_get_min_distance(sound, &mut error), 5.0);
            assert_eq!(lyra_sound_get_attenuation(sound, &mut error), 0.5);
            let pos = lyra_sound_get_position(sound, &mut error);
            assert_eq!((pos.x, pos.y, pos.z), (1.0, 2.0, 3.0));
            let cone = lyra_sound_get_cone(sound, &mut error);
            assert_eq!(cone.outer_gain, 0.5);
            assert!(lyra_sound_is_relative_to_listener(sound, &mut error));
        }

        assert!(unsafe { lyra_sound_destroy(sound, &mut error) });
    }

    unsafe extern "C" fn passthrough_processor(
        input: *const f32,
        input_frame_count: *mut u32,
        output: *mut f32,
        output_frame_count: *mut u32,
        channel_count: u32,
        _user_data: *mut c_void,
    ) {
        let frames = unsafe { (*input_frame_count).min(*output_frame_count) };
        let samples = (frames * channel_count) as usize;
        unsafe {
            std::ptr::copy_nonoverlapping(input, output, samples);
            *input_frame_count = frames;
            *output_frame_count = frames;
        }
    }

    #[test]
    fn null_processor_removes_the_stage() {
        let mut error = LyraError::ok();
        let sound = unsafe { lyra_sound_create(&mut error) };

        assert!(unsafe {
            lyra_sound_set_effect_processor(
                sound,
                Some(passthrough_processor),
                std::ptr::null_mut(),
                &mut error,
            )
        });
        assert!(get(sound).unwrap().effect.lock().is_some());

        // NULL removes the stage entirely rather than installing a no-op.
        assert!(unsafe {
            lyra_sound_set_effect_processor(sound, None, std::ptr::null_mut(), &mut error)
        });
        assert!(get(sound).unwrap().effect.lock().is_none());

        assert!(unsafe { lyra_sound_destroy(sound, &mut error) });
    }

    #[test]
    fn playing_offset_maps_frames_to_time() {
        let buffer = make_buffer();
        let mut error = LyraError::ok();
        let sound = unsafe { lyra_sound_create(&mut error) };
        assert!(unsafe { lyra_sound_set_buffer(sound, buffer, &mut error) });

        let offset = crate::types::lyra_time_from_milliseconds(25);
        assert!(unsafe { lyra_sound_set_playing_offset(sound, offset, &mut error) });
        let read = unsafe { lyra_sound_get_playing_offset(sound, &mut error) };
        assert_eq!(read.microseconds, 25_000);

        assert!(unsafe { lyra_sound_destroy(sound, &mut error) });
        assert!(unsafe { crate::buffer::lyra_sound_buffer_destroy(buffer, &mut error) });
    }

    #[test]
    #[ignore = "requires an audio output device"]
    fn play_produces_a_running_voice() {
        let buffer = make_buffer();
        let mut error = LyraError::ok();
        let sound = unsafe { lyra_sound_create(&mut error) };
        assert!(unsafe { lyra_sound_set_buffer(sound, buffer, &mut error) });

        assert!(unsafe { lyra_sound_play(sound, &mut error) });
        assert_eq!(
            unsafe { lyra_sound_get_status(sound, &mut error) },
            LyraSoundStatus::Playing
        );

        assert!(unsafe { lyra_sound_pause(sound, &mut error) });
        assert_eq!(
            unsafe { lyra_sound_get_status(sound, &mut error) },
            LyraSoundStatus::Paused
        );

        assert!(unsafe { lyra_sound_stop(sound, &mut error) });
        assert_eq!(
            unsafe { lyra_sound_get_status(sound, &mut error) },
            LyraSoundStatus::Stopped
        );

        assert!(unsafe { lyra_sound_destroy(sound, &mut error) });
        assert!(unsafe { crate::buffer::lyra_sound_buffer_destroy(buffer, &mut error) });
    }
}
