//! Listener state and audio device queries.

use std::ffi::CString;
use std::os::raw::c_char;
use std::sync::atomic::{AtomicU32, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::LyraError;
use crate::types::LyraVec3;
use crate::util::{set_error, set_ok};

static MASTER_VOLUME: AtomicU32 = AtomicU32::new(0x42C80000); // 100.0f32

// Serializes tests that touch the global volume.
#[cfg(test)]
pub(crate) static VOLUME_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Listener gain factor applied by every voice.
pub(crate) fn master_gain() -> f32 {
    f32::from_bits(MASTER_VOLUME.load(Ordering::Relaxed)) / 100.0
}

struct Listener {
    position: LyraVec3,
    direction: LyraVec3,
    up_vector: LyraVec3,
}

static LISTENER: Mutex<Listener> = Mutex::new(Listener {
    position: LyraVec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    },
    direction: LyraVec3 {
        x: 0.0,
        y: 0.0,
        z: -1.0,
    },
    up_vector: LyraVec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    },
});

/// Set the global playback volume (0-100). Applied to every voice.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_set_global_volume(volume: f32) {
    MASTER_VOLUME.store(volume.clamp(0.0, 100.0).to_bits(), Ordering::Relaxed);
}

/// Get the global playback volume (0-100).
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_get_global_volume() -> f32 {
    f32::from_bits(MASTER_VOLUME.load(Ordering::Relaxed))
}

/// Set the listener position.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_set_position(position: LyraVec3) {
    LISTENER.lock().position = position;
}

/// Get the listener position.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_get_position() -> LyraVec3 {
    LISTENER.lock().position
}

/// Set the listener's forward direction.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_set_direction(direction: LyraVec3) {
    LISTENER.lock().direction = direction;
}

/// Get the listener's forward direction.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_get_direction() -> LyraVec3 {
    LISTENER.lock().direction
}

/// Set the listener's up vector.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_set_up_vector(up_vector: LyraVec3) {
    LISTENER.lock().up_vector = up_vector;
}

/// Get the listener's up vector.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_listener_get_up_vector() -> LyraVec3 {
    LISTENER.lock().up_vector
}

static DEVICE_NAMES: Lazy<Mutex<Vec<CString>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// Enumerate output devices and return their count.
///
/// Refreshes the cached name list read by `lyra_audio_get_device_name`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_audio_get_device_count(error: *mut LyraError) -> usize {
    let names: Vec<CString> = crate::output::output_device_names()
        .into_iter()
        .filter_map(|n| CString::new(n).ok())
        .collect();
    let count = names.len();
    *DEVICE_NAMES.lock() = names;
    unsafe { set_ok(error) };
    count
}

/// Get the name of an output device by index.
///
/// The returned pointer stays valid until the next call to
/// `lyra_audio_get_device_count`, which rebuilds the list.
///
/// # Returns
///
/// Device name, or NULL for an out-of-range index.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_audio_get_device_name(
    index: usize,
    error: *mut LyraError,
) -> *const c_char {
    let names = DEVICE_NAMES.lock();
    match names.get(index) {
        Some(name) => {
            unsafe { set_ok(error) };
            name.as_ptr()
        }
        None => unsafe {
            set_error::<()>(error, LyraError::invalid_argument("device index out of range"));
            std::ptr::null()
        },
    }
}

/// Whether a capture device is present.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_audio_is_capture_available() -> bool {
    crate::output::capture_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_volume_scales_master_gain() {
        let _guard = VOLUME_TEST_LOCK.lock();
        lyra_listener_set_global_volume(50.0);
        assert_eq!(lyra_listener_get_global_volume(), 50.0);
        assert_eq!(master_gain(), 0.5);

        lyra_listener_set_global_volume(250.0);
        assert_eq!(lyra_listener_get_global_volume(), 100.0);

        lyra_listener_set_global_volume(100.0);
        assert_eq!(master_gain(), 1.0);
    }

    #[test]
    fn listener_vectors_round_trip() {
        let pos = LyraVec3 {
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        lyra_listener_set_position(pos);
        assert_eq!(lyra_listener_get_position(), pos);

        let dir = lyra_listener_get_direction();
        assert_eq!((dir.x, dir.y, dir.z), (0.0, 0.0, -1.0));
        let up = lyra_listener_get_up_vector();
        assert_eq!((up.x, up.y, up.z), (0.0, 1.0, 0.0));
    }

    #[test]
    fn out_of_range_device_index_is_rejected() {
        let mut error = LyraError::ok();
        let name = unsafe { lyra_audio_get_device_name(usize::MAX, &mut error) };
        assert!(name.is_null());
        assert_eq!(error.code, crate::error::LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }
}
