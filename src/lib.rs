//! C FFI bindings for the Lyra multimedia stack.
//!
//! This crate exposes windowing, 2D pixel graphics, audio playback and
//! capture, and networking primitives as a flat C API. Every function is a
//! thin forwarding call into the engine crates underneath (cpal, symphonia,
//! image, winit, reqwest, std::net): validate the handle, convert the C
//! value structs, invoke one engine operation, convert the result back.
//!
//! # Handles
//!
//! Objects are addressed through generational `u64` handles rather than raw
//! pointers. The zero handle is always invalid, factories return it on
//! failure, stale handles are detected rather than dereferenced, and
//! destroying an object that another handle still borrows fails with
//! `ResourceBusy`.
//!
//! # Thread Safety
//!
//! Handles may be shared across threads; per-object state is internally
//! synchronized. Window functions are the exception: they are bound to the
//! thread that created the first window. Caller-supplied callbacks (stream
//! tables, effect processors, recorder callbacks) are invoked from
//! engine-owned threads; any state they share with the caller must be
//! synchronized by the caller.
//!
//! # Memory Management
//!
//! - Handles returned by `lyra_*_create*` must be freed with the matching
//!   `lyra_*_destroy`
//! - Error messages must be freed with `lyra_error_free`
//! - Strings returned through cache pointers stay owned by the handle and
//!   are overwritten by the next call on that handle
//!
//! # Feature Flags
//!
//! - `audio` (default): sound buffers, sounds, music, recording via cpal +
//!   symphonia
//! - `graphics` (default): images and textures via the image crate
//! - `window` (default): windows, events and input via winit
//! - `net` (default): packets, sockets and HTTP sessions

#![allow(clippy::missing_safety_doc)]

mod error;
mod handle;
mod types;
mod util;

mod stream;

#[cfg(feature = "audio")]
mod audio;
#[cfg(feature = "audio")]
mod buffer;
#[cfg(feature = "audio")]
mod decode;
#[cfg(feature = "audio")]
mod effect;
#[cfg(feature = "audio")]
mod music;
#[cfg(feature = "audio")]
mod output;
#[cfg(feature = "audio")]
mod recorder;
#[cfg(feature = "audio")]
mod sound;
#[cfg(feature = "audio")]
mod voice;
#[cfg(all(test, feature = "audio"))]
mod wav;

#[cfg(feature = "graphics")]
mod image;
#[cfg(feature = "graphics")]
mod texture;

#[cfg(feature = "window")]
mod event;
#[cfg(feature = "window")]
mod input;
#[cfg(feature = "window")]
mod window;

#[cfg(feature = "net")]
mod http;
#[cfg(feature = "net")]
mod packet;
#[cfg(feature = "net")]
mod socket;

// Re-export the public FFI types and functions.
pub use error::{LyraError, LyraErrorCode, lyra_error_free};
pub use stream::{
    LyraInputStream, LyraStreamGetSizeFn, LyraStreamReadFn, LyraStreamSeekFn, LyraStreamTellFn,
};
pub use types::{
    LyraColor, LyraCone, LyraIntRect, LyraRect, LyraTime, LyraTimeSpan, LyraVec2, LyraVec2i,
    LyraVec2u, LyraVec3,
};
pub use util::lyra_string_free;

#[cfg(feature = "audio")]
pub use buffer::LyraSoundBuffer;
#[cfg(feature = "audio")]
pub use effect::LyraEffectProcessor;
#[cfg(feature = "audio")]
pub use music::LyraMusic;
#[cfg(feature = "audio")]
pub use recorder::{
    LyraRecorderProcessFn, LyraRecorderStartFn, LyraRecorderStopFn, LyraSoundBufferRecorder,
    LyraSoundRecorder,
};
#[cfg(feature = "audio")]
pub use sound::{LyraSound, LyraSoundStatus};

#[cfg(feature = "graphics")]
pub use crate::image::LyraImage;
#[cfg(feature = "graphics")]
pub use texture::LyraTexture;

#[cfg(feature = "window")]
pub use event::{
    LyraEvent, LyraEventData, LyraEventType, LyraKeyEvent, LyraMouseButtonEvent,
    LyraMouseMoveEvent, LyraMouseWheelEvent, LyraSizeEvent, LyraTextEvent,
};
#[cfg(feature = "window")]
pub use input::{LyraKeyCode, LyraMouseButton};
#[cfg(feature = "window")]
pub use window::{
    LYRA_WINDOW_STYLE_CLOSE, LYRA_WINDOW_STYLE_DEFAULT, LYRA_WINDOW_STYLE_FULLSCREEN,
    LYRA_WINDOW_STYLE_RESIZE, LYRA_WINDOW_STYLE_TITLEBAR, LyraVideoMode, LyraWindow,
};

#[cfg(feature = "net")]
pub use http::{LyraHttp, LyraHttpMethod, LyraHttpRequest, LyraHttpResponse};
#[cfg(feature = "net")]
pub use packet::LyraPacket;
#[cfg(feature = "net")]
pub use socket::{LyraSocketStatus, LyraTcpListener, LyraTcpSocket, LyraUdpSocket};

use std::os::raw::c_char;

/// Library version string.
///
/// # Returns
///
/// Static string containing the version (e.g., "0.1.0").
/// Do not free this string.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_version() -> *const c_char {
    // Include null terminator in the static string
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

/// Feature flags bitmask.
///
/// # Returns
///
/// Bitmask indicating which subsystems are compiled in:
/// - Bit 0 (0x01): `audio`
/// - Bit 1 (0x02): `graphics`
/// - Bit 2 (0x04): `window`
/// - Bit 3 (0x08): `net`
#[unsafe(no_mangle)]
pub extern "C" fn lyra_features() -> u32 {
    let mut flags = 0u32;

    #[cfg(feature = "audio")]
    {
        flags |= 1 << 0;
    }

    #[cfg(feature = "graphics")]
    {
        flags |= 1 << 1;
    }

    #[cfg(feature = "window")]
    {
        flags |= 1 << 2;
    }

    #[cfg(feature = "net")]
    {
        flags |= 1 << 3;
    }

    flags
}

/// Install a tracing subscriber reading the `LYRA_LOG` environment
/// variable (falling back to `RUST_LOG`, then "warn").
///
/// Optional; hosts that already install their own subscriber can skip it.
/// Repeated calls are no-ops.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_init_tracing() {
    use std::sync::OnceLock;
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        let filter = std::env::var("LYRA_LOG")
            .map(tracing_subscriber::EnvFilter::new)
            .or_else(|_| {
                tracing_subscriber::EnvFilter::try_from_default_env()
            })
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_a_static_c_string() {
        let version = lyra_version();
        assert!(!version.is_null());
        let version_str = unsafe { std::ffi::CStr::from_ptr(version) };
        assert!(!version_str.to_str().unwrap().is_empty());
    }

    #[test]
    fn features_reflect_compiled_subsystems() {
        let features = lyra_features();
        #[cfg(feature = "audio")]
        assert!(features & 0x01 != 0);
        #[cfg(feature = "graphics")]
        assert!(features & 0x02 != 0);
        #[cfg(feature = "window")]
        assert!(features & 0x04 != 0);
        #[cfg(feature = "net")]
        assert!(features & 0x08 != 0);
    }

    #[test]
    fn init_tracing_is_idempotent() {
        lyra_init_tracing();
        lyra_init_tracing();
    }
}
