//! Error handling for the FFI layer.
//!
//! This module provides C-compatible error types and conversion from the
//! engine-facing error enums of each subsystem.

use std::ffi::CString;
use std::os::raw::c_char;

/// Error codes for FFI functions.
///
/// These codes are stable and can be matched in C code.
/// Codes 1-40 map to engine subsystem failures.
/// Codes 100+ are FFI-specific errors.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyraErrorCode {
    /// No error
    Ok = 0,

    // I/O and codec errors (1-10)
    /// General I/O error
    Io = 1,
    /// Media container or pixel format not supported
    UnsupportedFormat = 2,
    /// Decoding failed
    Decode = 3,
    /// Encoding failed
    Encode = 4,
    /// A caller-supplied stream callback reported failure
    StreamCallback = 5,
    /// Seek rejected by the media source
    Seek = 6,

    // Audio errors (11-20)
    /// No audio device available
    NoAudioDevice = 11,
    /// Device configuration query failed
    AudioConfig = 12,
    /// Building the device stream failed
    StreamBuild = 13,
    /// Starting the device stream failed
    StreamPlay = 14,
    /// Capture is not available on this system
    CaptureUnavailable = 15,

    // Window errors (21-30)
    /// Event loop creation or pumping failed
    EventLoop = 21,
    /// Window creation failed
    WindowCreate = 22,
    /// Window function called from the wrong thread
    WindowThread = 23,

    // Network errors (31-40)
    /// HTTP transport failure
    Http = 31,
    /// Malformed URI or host
    InvalidUri = 32,
    /// Address resolution failed
    AddressResolution = 33,

    // FFI-specific errors (100+)
    /// Null pointer passed
    NullPointer = 100,
    /// Invalid UTF-8 string
    InvalidUtf8 = 101,
    /// Argument out of range or otherwise invalid
    InvalidArgument = 102,
    /// Stale, foreign or zero handle
    InvalidHandle = 103,
    /// Object still borrowed by another handle
    ResourceBusy = 104,
    /// Unknown error
    Unknown = 255,
}

/// Error structure returned via out-parameter.
///
/// # Memory Ownership
///
/// The `message` field is owned by the FFI layer when non-null.
/// Call `lyra_error_free()` to release the message memory.
#[repr(C)]
#[derive(Debug)]
pub struct LyraError {
    /// Error code
    pub code: LyraErrorCode,
    /// Error message (NULL if code == Ok)
    pub message: *mut c_char,
}

impl LyraError {
    /// Create a success result (no error).
    pub fn ok() -> Self {
        Self {
            code: LyraErrorCode::Ok,
            message: std::ptr::null_mut(),
        }
    }

    /// Create an error with a code and a display message.
    pub fn new(code: LyraErrorCode, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            message: CString::new(message.to_string())
                .map(CString::into_raw)
                .unwrap_or(std::ptr::null_mut()),
        }
    }

    /// Create a null pointer error.
    pub fn null_pointer(param: &str) -> Self {
        Self::new(
            LyraErrorCode::NullPointer,
            format!("null pointer passed for parameter: {param}"),
        )
    }

    /// Create an invalid UTF-8 error.
    pub fn invalid_utf8(context: &str) -> Self {
        Self::new(
            LyraErrorCode::InvalidUtf8,
            format!("invalid UTF-8 in {context}"),
        )
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl std::fmt::Display) -> Self {
        Self::new(LyraErrorCode::InvalidArgument, message)
    }

    /// Create an invalid handle error.
    pub fn invalid_handle() -> Self {
        Self::new(LyraErrorCode::InvalidHandle, "invalid or stale handle")
    }

    /// Create a resource busy error (destroy attempted while borrowed).
    pub fn resource_busy(what: &str) -> Self {
        Self::new(
            LyraErrorCode::ResourceBusy,
            format!("{what} is still referenced by another handle"),
        )
    }

    /// Create an error from a std I/O error.
    pub fn from_io_error(e: std::io::Error) -> Self {
        Self::new(LyraErrorCode::Io, e)
    }
}

#[cfg(feature = "audio")]
impl From<crate::decode::DecodeError> for LyraError {
    fn from(e: crate::decode::DecodeError) -> Self {
        use crate::decode::DecodeError::*;
        let code = match &e {
            Probe(_) | NoTrack | MissingSpec => LyraErrorCode::UnsupportedFormat,
            DecoderInit(_) | Decode(_) => LyraErrorCode::Decode,
            Seek(_) => LyraErrorCode::Seek,
            Io(_) => LyraErrorCode::Io,
        };
        Self::new(code, e)
    }
}

#[cfg(feature = "audio")]
impl From<crate::output::OutputError> for LyraError {
    fn from(e: crate::output::OutputError) -> Self {
        use crate::output::OutputError::*;
        let code = match &e {
            NoDevice => LyraErrorCode::NoAudioDevice,
            DefaultConfig(_) | UnsupportedFormat(_) => LyraErrorCode::AudioConfig,
            BuildStream(_) => LyraErrorCode::StreamBuild,
            PlayStream(_) => LyraErrorCode::StreamPlay,
            CaptureUnavailable => LyraErrorCode::CaptureUnavailable,
            ServiceGone => LyraErrorCode::Unknown,
        };
        Self::new(code, e)
    }
}

#[cfg(feature = "graphics")]
impl From<image::ImageError> for LyraError {
    fn from(e: image::ImageError) -> Self {
        use image::ImageError;
        let code = match &e {
            ImageError::Decoding(_) => LyraErrorCode::Decode,
            ImageError::Encoding(_) => LyraErrorCode::Encode,
            ImageError::Unsupported(_) => LyraErrorCode::UnsupportedFormat,
            ImageError::IoError(_) => LyraErrorCode::Io,
            ImageError::Limits(_) | ImageError::Parameter(_) => LyraErrorCode::InvalidArgument,
        };
        Self::new(code, e)
    }
}

#[cfg(feature = "net")]
impl From<reqwest::Error> for LyraError {
    fn from(e: reqwest::Error) -> Self {
        let code = if e.is_builder() {
            LyraErrorCode::InvalidUri
        } else {
            LyraErrorCode::Http
        };
        Self::new(code, e)
    }
}

/// Free error message memory.
///
/// Safe to call with NULL error or NULL message.
///
/// # Safety
///
/// The error pointer must be valid or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_error_free(error: *mut LyraError) {
    if error.is_null() {
        return;
    }
    unsafe {
        let err = &mut *error;
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
            err.message = std::ptr::null_mut();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_has_no_message() {
        let e = LyraError::ok();
        assert_eq!(e.code, LyraErrorCode::Ok);
        assert!(e.message.is_null());
    }

    #[test]
    fn error_free_clears_message() {
        let mut e = LyraError::null_pointer("buffer");
        assert_eq!(e.code, LyraErrorCode::NullPointer);
        assert!(!e.message.is_null());

        unsafe { lyra_error_free(&mut e) };
        assert!(e.message.is_null());

        // Safe on an already-freed error.
        unsafe { lyra_error_free(&mut e) };
        assert!(e.message.is_null());
    }
}
