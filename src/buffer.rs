//! Sound buffers: fully decoded audio held in memory.

use std::fs::File;
use std::io::Cursor;
use std::os::raw::c_char;
use std::sync::Arc;

use crate::decode::{AudioDecoder, AudioSpec};
use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::stream::{CallbackStream, LyraInputStream};
use crate::types::LyraTime;
use crate::util::{cstr_to_path, set_error, set_ok};

/// Decoded samples plus their layout. Shared with playing sounds by `Arc`,
/// which is what makes destroy-while-attached detectable.
pub(crate) struct BufferData {
    samples: Vec<i16>,
    channels: u16,
    sample_rate: u32,
}

impl BufferData {
    pub(crate) fn from_samples(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    pub(crate) fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub(crate) fn spec(&self) -> AudioSpec {
        AudioSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub(crate) fn duration(&self) -> LyraTime {
        let frames = self.samples.len() as u64 / self.channels as u64;
        LyraTime {
            microseconds: (frames as i128 * 1_000_000 / self.sample_rate as i128) as i64,
        }
    }
}

static BUFFERS: Registry<BufferData> = Registry::new();

define_handle!(
    /// Handle to a sound buffer.
    LyraSoundBuffer
);

pub(crate) fn get(handle: LyraSoundBuffer) -> Option<Arc<BufferData>> {
    BUFFERS.get(handle.raw())
}

pub(crate) fn insert(data: BufferData) -> LyraSoundBuffer {
    LyraSoundBuffer::from_raw(BUFFERS.insert(data))
}

fn from_decoder(mut decoder: AudioDecoder) -> Result<BufferData, LyraError> {
    let spec = decoder.spec();
    let samples_f32 = decoder.decode_all().map_err(LyraError::from)?;
    let samples = samples_f32
        .iter()
        .map(|&v| crate::output::f32_to_i16(v))
        .collect();
    Ok(BufferData::from_samples(
        samples,
        spec.channels,
        spec.sample_rate,
    ))
}

/// Load a sound buffer from an audio file.
///
/// # Parameters
///
/// - `path`: Filesystem path (UTF-8 encoded, null-terminated)
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Handle on success, the invalid handle on failure.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_sound_buffer_destroy()`.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_create_from_file(
    path: *const c_char,
    error: *mut LyraError,
) -> LyraSoundBuffer {
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
            tracing::debug!("sound buffer load failed: {}: {e}", path.display());
            return unsafe { set_error(error, LyraError::from_io_error(e)) };
        }
    };

    let decoder = match AudioDecoder::open(Box::new(file), extension.as_deref()) {
        Ok(d) => d,
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    match from_decoder(decoder) {
        Ok(data) => {
            unsafe { set_ok(error) };
            insert(data)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Load a sound buffer from a memory block.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_create_from_memory(
    data: *const u8,
    size: usize,
    error: *mut LyraError,
) -> LyraSoundBuffer {
    if data.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("data")) };
    }

    let bytes = unsafe { std::slice::from_raw_parts(data, size) }.to_vec();
    let decoder = match AudioDecoder::open(Box::new(Cursor::new(bytes)), None) {
        Ok(d) => d,
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    match from_decoder(decoder) {
        Ok(data) => {
            unsafe { set_ok(error) };
            insert(data)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Load a sound buffer from a caller-supplied stream.
///
/// The stream callbacks are only invoked for the duration of this call.
///
/// # Safety
///
/// - `stream` must point to a valid table whose callbacks stay callable for
///   the duration of the call
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_create_from_stream(
    stream: *const LyraInputStream,
    error: *mut LyraError,
) -> LyraSoundBuffer {
    let adapter = match unsafe { CallbackStream::new(stream) } {
        Ok(s) => s,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let decoder = match AudioDecoder::open(Box::new(adapter), None) {
        Ok(d) => d,
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    match from_decoder(decoder) {
        Ok(data) => {
            unsafe { set_ok(error) };
            insert(data)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Create a sound buffer from raw interleaved samples.
///
/// # Safety
///
/// - `samples` must point to `sample_count` readable i16 values
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_create_from_samples(
    samples: *const i16,
    sample_count: usize,
    channel_count: u32,
    sample_rate: u32,
    error: *mut LyraError,
) -> LyraSoundBuffer {
    if samples.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("samples")) };
    }
    if sample_count == 0 || channel_count == 0 || sample_rate == 0 {
        return unsafe {
            set_error(
                error,
                LyraError::invalid_argument("sample_count, channel_count and sample_rate must be non-zero"),
            )
        };
    }

    let data = unsafe { std::slice::from_raw_parts(samples, sample_count) }.to_vec();
    unsafe { set_ok(error) };
    insert(BufferData::from_samples(
        data,
        channel_count as u16,
        sample_rate,
    ))
}

/// Destroy a sound buffer.
///
/// Fails with `ResourceBusy` while a sound still uses the buffer.
///
/// # Returns
///
/// `true` if the buffer was destroyed.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_destroy(
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> bool {
    match BUFFERS.remove(buffer.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("sound buffer"))
        },
    }
}

/// Get a pointer to the buffer's samples.
///
/// The pointer stays valid for the buffer's lifetime.
///
/// # Parameters
///
/// - `buffer`: Valid buffer handle
/// - `sample_count`: Out-parameter for the number of samples (may be NULL)
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `sample_count` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_get_samples(
    buffer: LyraSoundBuffer,
    sample_count: *mut usize,
    error: *mut LyraError,
) -> *const i16 {
    let data = match get(buffer) {
        Some(d) => d,
        None => {
            return unsafe {
                crate::util::set_error_null::<i16>(error, LyraError::invalid_handle())
            }
            .cast_const();
        }
    };

    if let Some(out) = unsafe { sample_count.as_mut() } {
        *out = data.samples().len();
    }
    unsafe { set_ok(error) };
    data.samples().as_ptr()
}

/// Get the number of samples in the buffer.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_get_sample_count(
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> usize {
    match get(buffer) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.samples().len()
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
pub unsafe extern "C" fn lyra_sound_buffer_get_sample_rate(
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> u32 {
    match get(buffer) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec().sample_rate
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
pub unsafe extern "C" fn lyra_sound_buffer_get_channel_count(
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> u32 {
    match get(buffer) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.spec().channels as u32
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the total duration of the buffer.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_sound_buffer_get_duration(
    buffer: LyraSoundBuffer,
    error: *mut LyraError,
) -> LyraTime {
    match get(buffer) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.duration()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;
    use crate::stream::test_support::MemSource;
    use crate::wav::test_wav_bytes;
    use std::ffi::CString;

    #[test]
    fn create_from_memory_decodes_wav() {
        let (bytes, spec, frames) = test_wav_bytes();

        let mut error = LyraError::ok();
        let buffer = unsafe {
            lyra_sound_buffer_create_from_memory(bytes.as_ptr(), bytes.len(), &mut error)
        };
        assert!(buffer.is_valid());
        assert_eq!(error.code, LyraErrorCode::Ok);

        let count = unsafe { lyra_sound_buffer_get_sample_count(buffer, &mut error) };
        assert_eq!(count, frames * spec.channels as usize);
        assert_eq!(
            unsafe { lyra_sound_buffer_get_sample_rate(buffer, &mut error) },
            spec.sample_rate
        );
        assert_eq!(
            unsafe { lyra_sound_buffer_get_channel_count(buffer, &mut error) },
            spec.channels as u32
        );

        let duration = unsafe { lyra_sound_buffer_get_duration(buffer, &mut error) };
        assert_eq!(duration.microseconds, 32_000); // 256 frames at 8 kHz

        assert!(unsafe { lyra_sound_buffer_destroy(buffer, &mut error) });
    }

    #[test]
    fn create_from_samples_round_trips() {
        let samples: Vec<i16> = vec![0, 100, -100, 32767];
        let mut error = LyraError::ok();
        let buffer = unsafe {
            lyra_sound_buffer_create_from_samples(samples.as_ptr(), samples.len(), 2, 44100, &mut error)
        };
        assert!(buffer.is_valid());

        let mut count = 0usize;
        let ptr = unsafe { lyra_sound_buffer_get_samples(buffer, &mut count, &mut error) };
        assert_eq!(count, samples.len());
        let readback = unsafe { std::slice::from_raw_parts(ptr, count) };
        assert_eq!(readback, samples.as_slice());

        assert!(unsafe { lyra_sound_buffer_destroy(buffer, &mut error) });
    }

    #[test]
    fn nonexistent_file_yields_invalid_handle() {
        let path = CString::new("/definitely/not/here.wav").unwrap();
        let mut error = LyraError::ok();
        let buffer = unsafe { lyra_sound_buffer_create_from_file(path.as_ptr(), &mut error) };
        assert!(!buffer.is_valid());
        assert_eq!(error.code, LyraErrorCode::Io);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn zero_length_memory_fails() {
        let data = [0u8; 1];
        let mut error = LyraError::ok();
        let buffer = unsafe { lyra_sound_buffer_create_from_memory(data.as_ptr(), 0, &mut error) };
        assert!(!buffer.is_valid());
        assert_ne!(error.code, LyraErrorCode::Ok);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn erroring_stream_fails_the_load() {
        let (bytes, _, _) = test_wav_bytes();
        let mut src = MemSource::new(bytes);
        src.fail_reads = true;
        let table = MemSource::table(&mut src);

        let mut error = LyraError::ok();
        let buffer = unsafe { lyra_sound_buffer_create_from_stream(&table, &mut error) };
        assert!(!buffer.is_valid());
        assert_ne!(error.code, LyraErrorCode::Ok);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn stream_load_matches_memory_load() {
        let (bytes, _, frames) = test_wav_bytes();
        let mut src = MemSource::new(bytes);
        let table = MemSource::table(&mut src);

        let mut error = LyraError::ok();
        let buffer = unsafe { lyra_sound_buffer_create_from_stream(&table, &mut error) };
        assert!(buffer.is_valid());
        let count = unsafe { lyra_sound_buffer_get_sample_count(buffer, &mut error) };
        assert_eq!(count, frames * 2);
        assert!(unsafe { lyra_sound_buffer_destroy(buffer, &mut error) });
    }

    #[test]
    fn destroy_twice_reports_invalid_handle() {
        let samples: Vec<i16> = vec![1, 2, 3, 4];
        let mut error = LyraError::ok();
        let buffer = unsafe {
            lyra_sound_buffer_create_from_samples(samples.as_ptr(), samples.len(), 1, 8000, &mut error)
        };
        assert!(unsafe { lyra_sound_buffer_destroy(buffer, &mut error) });
        assert!(!unsafe { lyra_sound_buffer_destroy(buffer, &mut error) });
        assert_eq!(error.code, LyraErrorCode::InvalidHandle);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }
}
