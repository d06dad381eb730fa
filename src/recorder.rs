//! Sound recorders: audio capture driven by C callbacks.

use std::os::raw::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::buffer::{BufferData, LyraSoundBuffer};
use crate::decode::AudioSpec;
use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::output::{self, CaptureId};
use crate::util::{set_error, set_ok};

/// Called when capture starts, on the caller's thread. Returning false
/// aborts the start.
pub type LyraRecorderStartFn = Option<unsafe extern "C" fn(user_data: *mut c_void) -> bool>;

/// Called with each captured block of interleaved i16 samples, on the
/// engine's capture thread. Returning false stops the capture.
pub type LyraRecorderProcessFn =
    Option<unsafe extern "C" fn(samples: *const i16, sample_count: usize, user_data: *mut c_void) -> bool>;

/// Called when capture stops, on the caller's thread.
pub type LyraRecorderStopFn = Option<unsafe extern "C" fn(user_data: *mut c_void)>;

type ProcessFn = unsafe extern "C" fn(*const i16, usize, *mut c_void) -> bool;

/// Callback table copied at create time.
///
/// `on_process` runs on the capture thread; the C caller synchronizes any
/// state it shares with it.
#[derive(Clone, Copy)]
struct RecorderCallbacks {
    on_start: LyraRecorderStartFn,
    on_process: ProcessFn,
    on_stop: LyraRecorderStopFn,
    user_data: *mut c_void,
}

unsafe impl Send for RecorderCallbacks {}
unsafe impl Sync for RecorderCallbacks {}

pub(crate) struct RecorderData {
    callbacks: RecorderCallbacks,
    capture: Mutex<Option<CaptureId>>,
    spec: Mutex<Option<AudioSpec>>,
    stop_requested: Arc<AtomicBool>,
}

static RECORDERS: Registry<RecorderData> = Registry::new();

define_handle!(
    /// Handle to a callback-driven sound recorder.
    LyraSoundRecorder
);

fn get(handle: LyraSoundRecorder) -> Option<Arc<RecorderData>> {
    RECORDERS.get(handle.raw())
}

/// Whether audio capture is supported on this system.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_sound_recorder_is_available() -> bool {
    output::capture_available()
}

/// Create a recorder from a callback table.
///
/// # Parameters
///
/// - `on_start`: Invoked by `lyra_sound_recorder_start` (may be NULL)
/// - `on_process`: Invoked per captured block on the capture thread
/// - `on_stop`: Invoked by `lyra_sound_recorder_stop` (may be NULL)
/// - `user_data`: Passed through to every callback verbatim
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Handle on success, the invalid handle if `on_process` is NULL.
///
/// # Safety
///
/// - The callbacks must stay callable until the recorder is destroyed
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_create(
    on_start: LyraRecorderStartFn,
    on_process: LyraRecorderProcessFn,
    on_stop: LyraRecorderStopFn,
    user_data: *mut c_void,
    error: *mut LyraError,
) -> LyraSoundRecorder {
    let on_process = match on_process {
        Some(f) => f,
        None => return unsafe { set_error(error, LyraError::null_pointer("on_process")) },
    };

    unsafe { set_ok(error) };
    LyraSoundRecorder::from_raw(RECORDERS.insert(RecorderData {
        callbacks: RecorderCallbacks {
            on_start,
            on_process,
            on_stop,
            user_data,
        },
        capture: Mutex::new(None),
        spec: Mutex::new(None),
        stop_requested: Arc::new(AtomicBool::new(false)),
    }))
}

/// Start capturing.
///
/// # Parameters
///
/// - `recorder`: Valid recorder handle
/// - `sample_rate`: Requested rate in Hz, or 0 for the device default
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// `true` once the capture stream is running. Returns `false` without an
/// error code when `on_start` vetoes the start.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_start(
    recorder: LyraSoundRecorder,
    sample_rate: u32,
    error: *mut LyraError,
) -> bool {
    let data = match get(recorder) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let mut capture = data.capture.lock();
    if capture.is_some() {
        return unsafe {
            set_error(error, LyraError::invalid_argument("recorder already started"))
        };
    }

    let callbacks = data.callbacks;
    if let Some(on_start) = callbacks.on_start {
        if !unsafe { on_start(callbacks.user_data) } {
            unsafe { set_ok(error) };
            return false;
        }
    }

    data.stop_requested.store(false, Ordering::Release);
    let stop_flag = Arc::clone(&data.stop_requested);
    let sink = Box::new(move |samples: &[i16], _spec: AudioSpec| -> bool {
        // Capture the whole `Send` callback table, not its individual
        // fields: edition-2024 disjoint captures would otherwise grab the
        // bare `*mut c_void` user_data, which is not `Send`.
        let callbacks = callbacks;
        if stop_flag.load(Ordering::Acquire) {
            return false;
        }
        let keep = unsafe { (callbacks.on_process)(samples.as_ptr(), samples.len(), callbacks.user_data) };
        if !keep {
            stop_flag.store(true, Ordering::Release);
        }
        keep
    });

    match output::start_capture(sample_rate, sink) {
        Ok((id, spec)) => {
            *capture = Some(id);
            *data.spec.lock() = Some(spec);
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Stop capturing. No `on_process` call happens after this returns.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_stop(
    recorder: LyraSoundRecorder,
    error: *mut LyraError,
) -> bool {
    let data = match get(recorder) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.stop_requested.store(true, Ordering::Release);
    if let Some(id) = data.capture.lock().take() {
        output::stop_capture(id);
        if let Some(on_stop) = data.callbacks.on_stop {
            unsafe { on_stop(data.callbacks.user_data) };
        }
    }
    unsafe { set_ok(error) };
    true
}

/// Get the capture sample rate of the last started session, or 0.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_get_sample_rate(
    recorder: LyraSoundRecorder,
    error: *mut LyraError,
) -> u32 {
    match get(recorder) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec.lock().map(|s| s.sample_rate).unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the capture channel count of the last started session, or 0.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_get_channel_count(
    recorder: LyraSoundRecorder,
    error: *mut LyraError,
) -> u32 {
    match get(recorder) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec.lock().map(|s| s.channels as u32).unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Destroy a recorder. An active capture is stopped first.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_recorder_destroy(
    recorder: LyraSoundRecorder,
    error: *mut LyraError,
) -> bool {
    if let Some(data) = get(recorder) {
        data.stop_requested.store(true, Ordering::Release);
        if let Some(id) = data.capture.lock().take() {
            output::stop_capture(id);
            if let Some(on_stop) = data.callbacks.on_stop {
                unsafe { on_stop(data.callbacks.user_data) };
            }
        }
    }
    match RECORDERS.remove(recorder.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("sound recorder"))
        },
    }
}

pub(crate) struct BufferRecorderData {
    samples: Arc<Mutex<Vec<i16>>>,
    capture: Mutex<Option<CaptureId>>,
    spec: Mutex<Option<AudioSpec>>,
}

static BUFFER_RECORDERS: Registry<BufferRecorderData> = Registry::new();

define_handle!(
    /// Handle to a recorder that captures into a sound buffer.
    LyraSoundBufferRecorder
);

fn get_buffer_recorder(handle: LyraSoundBufferRecorder) -> Option<Arc<BufferRecorderData>> {
    BUFFER_RECORDERS.get(handle.raw())
}

/// Create a recorder that accumulates captured audio in memory.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_recorder_create(
    error: *mut LyraError,
) -> LyraSoundBufferRecorder {
    unsafe { set_ok(error) };
    LyraSoundBufferRecorder::from_raw(BUFFER_RECORDERS.insert(BufferRecorderData {
        samples: Arc::new(Mutex::new(Vec::new())),
        capture: Mutex::new(None),
        spec: Mutex::new(None),
    }))
}

/// Start capturing into memory.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_recorder_start(
    recorder: LyraSoundBufferRecorder,
    sample_rate: u32,
    error: *mut LyraError,
) -> bool {
    let data = match get_buffer_recorder(recorder) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let mut capture = data.capture.lock();
    if capture.is_some() {
        return unsafe {
            set_error(error, LyraError::invalid_argument("recorder already started"))
        };
    }

    data.samples.lock().clear();
    let sink_store = Arc::clone(&data.samples);
    let sink = Box::new(move |samples: &[i16], _spec: AudioSpec| -> bool {
        sink_store.lock().extend_from_slice(samples);
        true
    });

    match output::start_capture(sample_rate, sink) {
        Ok((id, spec)) => {
            *capture = Some(id);
            *data.spec.lock() = Some(spec);
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Stop capturing and return the recorded sound buffer.
///
/// # Returns
///
/// A new sound buffer handle owning the captured samples, or the invalid
/// handle if the recorder was never started.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_recorder_stop(
    recorder: LyraSoundBufferRecorder,
    error: *mut LyraError,
) -> LyraSoundBuffer {
    let data = match get_buffer_recorder(recorder) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    if let Some(id) = data.capture.lock().take() {
        output::stop_capture(id);
    }
    let spec = match *data.spec.lock() {
        Some(s) => s,
        None => {
            return unsafe {
                set_error(error, LyraError::invalid_argument("recorder was never started"))
            };
        }
    };

    let samples = std::mem::take(&mut *data.samples.lock());
    unsafe { set_ok(error) };
    crate::buffer::insert(BufferData::from_samples(
        samples,
        spec.channels,
        spec.sample_rate,
    ))
}

/// Destroy a buffer recorder. An active capture is discarded.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_recorder_destroy(
    recorder: LyraSoundBufferRecorder,
    error: *mut LyraError,
) -> bool {
    if let Some(data) = get_buffer_recorder(recorder) {
        if let Some(id) = data.capture.lock().take() {
            output::stop_capture(id);
        }
    }
    match BUFFER_RECORDERS.remove(recorder.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("sound buffer recorder"))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;

    unsafe extern "C" fn discard_process(_: *const i16, _: usize, _: *mut c_void) -> bool {
        true
    }

    #[test]
    fn create_requires_process_callback() {
        let mut error = LyraError::ok();
        let recorder = unsafe {
            lyra_sound_recorder_create(None, None, None, std::ptr::null_mut(), &mut error)
        };
        assert!(!recorder.is_valid());
        assert_eq!(error.code, LyraErrorCode::NullPointer);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn create_stop_destroy_without_capture() {
        let mut error = LyraError::ok();
        let recorder = unsafe {
            lyra_sound_recorder_create(
                None,
                Some(discard_process),
                None,
                std::ptr::null_mut(),
                &mut error,
            )
        };
        assert!(recorder.is_valid());

        // Stop before start is a no-op.
        assert!(unsafe { lyra_sound_recorder_stop(recorder, &mut error) });
        assert_eq!(
            unsafe { lyra_sound_recorder_get_sample_rate(recorder, &mut error) },
            0
        );

        assert!(unsafe { lyra_sound_recorder_destroy(recorder, &mut error) });
        assert!(!unsafe { lyra_sound_recorder_destroy(recorder, &mut error) });
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn buffer_recorder_stop_without_start_fails() {
        let mut error = LyraError::ok();
        let recorder = unsafe { lyra_sound_buffer_recorder_create(&mut error) };
        assert!(recorder.is_valid());

        let buffer = unsafe { lyra_sound_buffer_recorder_stop(recorder, &mut error) };
        assert!(!buffer.is_valid());
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };

        assert!(unsafe { lyra_sound_buffer_recorder_destroy(recorder, &mut error) });
    }

    #[test]
    #[ignore = "requires an audio capture device"]
    fn buffer_recorder_produces_a_buffer() {
        let mut error = LyraError::ok();
        let recorder = unsafe { lyra_sound_buffer_recorder_create(&mut error) };
        assert!(unsafe { lyra_sound_buffer_recorder_start(recorder, 0, &mut error) });
        std::thread::sleep(std::time::Duration::from_millis(100));

        let buffer = unsafe { lyra_sound_buffer_recorder_stop(recorder, &mut error) };
        assert!(buffer.is_valid());
        assert!(unsafe { crate::buffer::lyra_sound_buffer_get_sample_rate(buffer, &mut error) } > 0);

        assert!(unsafe { crate::buffer::lyra_sound_buffer_destroy(buffer, &mut error) });
        assert!(unsafe { lyra_sound_buffer_recorder_destroy(recorder, &mut error) });
    }
}
