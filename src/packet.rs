//! Packets: typed FIFO byte queues in network byte order.
//!
//! Values are appended and read back in the same order and types. A read
//! that runs past the end clears the packet's read flag and leaves the
//! read position unchanged; further reads keep failing until `clear`.

use std::os::raw::c_char;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::util::{set_error, set_ok};

struct PacketInner {
    bytes: Vec<u8>,
    read_pos: usize,
    valid: bool,
}

pub(crate) struct PacketData {
    inner: Mutex<PacketInner>,
}

impl PacketInner {
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        if !self.valid || self.read_pos + N > self.bytes.len() {
            self.valid = false;
            return None;
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.read_pos..self.read_pos + N]);
        self.read_pos += N;
        Some(out)
    }
}

static PACKETS: Registry<PacketData> = Registry::new();

define_handle!(
    /// Handle to a packet.
    LyraPacket
);

fn get(handle: LyraPacket) -> Option<Arc<PacketData>> {
    PACKETS.get(handle.raw())
}

pub(crate) fn packet_bytes(handle: LyraPacket) -> Option<Vec<u8>> {
    get(handle).map(|p| p.inner.lock().bytes.clone())
}

pub(crate) fn packet_fill(handle: LyraPacket, bytes: &[u8]) -> bool {
    match get(handle) {
        Some(p) => {
            let mut inner = p.inner.lock();
            inner.bytes.clear();
            inner.bytes.extend_from_slice(bytes);
            inner.read_pos = 0;
            inner.valid = true;
            true
        }
        None => false,
    }
}

/// Create an empty packet.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_packet_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_create(error: *mut LyraError) -> LyraPacket {
    unsafe { set_ok(error) };
    LyraPacket::from_raw(PACKETS.insert(PacketData {
        inner: Mutex::new(PacketInner {
            bytes: Vec::new(),
            read_pos: 0,
            valid: true,
        }),
    }))
}

/// Duplicate a packet, including its read position and read flag.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_copy(packet: LyraPacket, error: *mut LyraError) -> LyraPacket {
    let data = match get(packet) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let inner = data.inner.lock();
    unsafe { set_ok(error) };
    LyraPacket::from_raw(PACKETS.insert(PacketData {
        inner: Mutex::new(PacketInner {
            bytes: inner.bytes.clone(),
            read_pos: inner.read_pos,
            valid: inner.valid,
        }),
    }))
}

/// Destroy a packet.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_destroy(packet: LyraPacket, error: *mut LyraError) -> bool {
    match PACKETS.remove(packet.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe { set_error(error, LyraError::resource_busy("packet")) },
    }
}

/// Append raw bytes to the packet.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_append(
    packet: LyraPacket,
    data: *const u8,
    size: usize,
    error: *mut LyraError,
) -> bool {
    let packet = match get(packet) {
        Some(p) => p,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    if data.is_null() && size != 0 {
        return unsafe { set_error(error, LyraError::null_pointer("data")) };
    }

    if size != 0 {
        let bytes = unsafe { std::slice::from_raw_parts(data, size) };
        packet.inner.lock().bytes.extend_from_slice(bytes);
    }
    unsafe { set_ok(error) };
    true
}

/// Empty the packet and reset its read state.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_clear(packet: LyraPacket, error: *mut LyraError) -> bool {
    match get(packet) {
        Some(p) => {
            let mut inner = p.inner.lock();
            inner.bytes.clear();
            inner.read_pos = 0;
            inner.valid = true;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get a pointer to the packet's bytes.
///
/// The pointer stays valid until the next call that modifies this packet.
///
/// # Safety
///
/// - `size` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_get_data(
    packet: LyraPacket,
    size: *mut usize,
    error: *mut LyraError,
) -> *const u8 {
    let data = match get(packet) {
        Some(p) => p,
        None => {
            return unsafe { crate::util::set_error_null::<u8>(error, LyraError::invalid_handle()) }
                .cast_const();
        }
    };

    let inner = data.inner.lock();
    if let Some(out) = unsafe { size.as_mut() } {
        *out = inner.bytes.len();
    }
    unsafe { set_ok(error) };
    inner.bytes.as_ptr()
}

/// Get the number of bytes in the packet.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_get_data_size(
    packet: LyraPacket,
    error: *mut LyraError,
) -> usize {
    match get(packet) {
        Some(p) => {
            unsafe { set_ok(error) };
            p.inner.lock().bytes.len()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether the read position has reached the end of the packet.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_end_of_packet(
    packet: LyraPacket,
    error: *mut LyraError,
) -> bool {
    match get(packet) {
        Some(p) => {
            let inner = p.inner.lock();
            unsafe { set_ok(error) };
            inner.read_pos >= inner.bytes.len()
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether the last read succeeded. Cleared by a read past the end, reset
/// by `lyra_packet_clear`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_can_read(packet: LyraPacket, error: *mut LyraError) -> bool {
    match get(packet) {
        Some(p) => {
            unsafe { set_ok(error) };
            p.inner.lock().valid
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Define the read/write pair for one numeric type, big-endian on the wire.
macro_rules! packet_numeric {
    ($read_name:ident, $write_name:ident, $ty:ty) => {
        /// Read one value from the packet.
        ///
        /// On a read past the end, returns zero, clears the packet's read
        /// flag and leaves the read position unchanged.
        ///
        /// # Safety
        ///
        /// `error` must be a valid pointer or NULL.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $read_name(packet: LyraPacket, error: *mut LyraError) -> $ty {
            let data = match get(packet) {
                Some(p) => p,
                None => return unsafe { set_error(error, LyraError::invalid_handle()) },
            };
            unsafe { set_ok(error) };
            let mut inner = data.inner.lock();
            match inner.read_array() {
                Some(bytes) => <$ty>::from_be_bytes(bytes),
                None => <$ty>::default(),
            }
        }

        /// Append one value to the packet.
        ///
        /// # Safety
        ///
        /// `error` must be a valid pointer or NULL.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $write_name(
            packet: LyraPacket,
            value: $ty,
            error: *mut LyraError,
        ) -> bool {
            let data = match get(packet) {
                Some(p) => p,
                None => return unsafe { set_error(error, LyraError::invalid_handle()) },
            };
            data.inner.lock().bytes.extend_from_slice(&value.to_be_bytes());
            unsafe { set_ok(error) };
            true
        }
    };
}

packet_numeric!(lyra_packet_read_i8, lyra_packet_write_i8, i8);
packet_numeric!(lyra_packet_read_u8, lyra_packet_write_u8, u8);
packet_numeric!(lyra_packet_read_i16, lyra_packet_write_i16, i16);
packet_numeric!(lyra_packet_read_u16, lyra_packet_write_u16, u16);
packet_numeric!(lyra_packet_read_i32, lyra_packet_write_i32, i32);
packet_numeric!(lyra_packet_read_u32, lyra_packet_write_u32, u32);
packet_numeric!(lyra_packet_read_i64, lyra_packet_write_i64, i64);
packet_numeric!(lyra_packet_read_u64, lyra_packet_write_u64, u64);
packet_numeric!(lyra_packet_read_f32, lyra_packet_write_f32, f32);
packet_numeric!(lyra_packet_read_f64, lyra_packet_write_f64, f64);

/// Read a boolean from the packet.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_read_bool(packet: LyraPacket, error: *mut LyraError) -> bool {
    unsafe { lyra_packet_read_u8(packet, error) != 0 }
}

/// Append a boolean to the packet.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_write_bool(
    packet: LyraPacket,
    value: bool,
    error: *mut LyraError,
) -> bool {
    unsafe { lyra_packet_write_u8(packet, value as u8, error) }
}

/// Append a string as a 32-bit length prefix plus UTF-8 bytes.
///
/// # Safety
///
/// - `string` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_write_string(
    packet: LyraPacket,
    string: *const c_char,
    error: *mut LyraError,
) -> bool {
    let data = match get(packet) {
        Some(p) => p,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let value = match unsafe { crate::util::cstr_to_string(string, "string") } {
        Ok(s) => s,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let mut inner = data.inner.lock();
    inner
        .bytes
        .extend_from_slice(&(value.len() as u32).to_be_bytes());
    inner.bytes.extend_from_slice(value.as_bytes());
    unsafe { set_ok(error) };
    true
}

/// Read a string written by `lyra_packet_write_string` into `buffer`,
/// null-terminated.
///
/// Fails (clearing the read flag, leaving the read position unchanged)
/// when the packet has no complete string or `buffer_size` is too small
/// for the string plus terminator.
///
/// # Safety
///
/// - `buffer` must point to `buffer_size` writable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_packet_read_string(
    packet: LyraPacket,
    buffer: *mut c_char,
    buffer_size: usize,
    error: *mut LyraError,
) -> bool {
    let data = match get(packet) {
        Some(p) => p,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    if buffer.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("buffer")) };
    }

    let mut inner = data.inner.lock();
    let saved_pos = inner.read_pos;

    let len = match inner.read_array::<4>() {
        Some(bytes) => u32::from_be_bytes(bytes) as usize,
        None => {
            unsafe { set_ok(error) };
            return false;
        }
    };

    if inner.read_pos + len > inner.bytes.len() || len + 1 > buffer_size {
        inner.read_pos = saved_pos;
        inner.valid = false;
        unsafe { set_ok(error) };
        return false;
    }

    unsafe {
        std::ptr::copy_nonoverlapping(
            inner.bytes.as_ptr().add(inner.read_pos),
            buffer as *mut u8,
            len,
        );
        *buffer.add(len) = 0;
    }
    inner.read_pos += len;
    unsafe { set_ok(error) };
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    #[test]
    fn typed_round_trip_in_order() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };

        unsafe {
            lyra_packet_write_bool(packet, true, &mut error);
            lyra_packet_write_i8(packet, -5, &mut error);
            lyra_packet_write_u16(packet, 65535, &mut error);
            lyra_packet_write_i32(packet, -123456, &mut error);
            lyra_packet_write_u64(packet, u64::MAX, &mut error);
            lyra_packet_write_f32(packet, 2.5, &mut error);
            lyra_packet_write_f64(packet, -0.125, &mut error);
        }

        unsafe {
            assert!(lyra_packet_read_bool(packet, &mut error));
            assert_eq!(lyra_packet_read_i8(packet, &mut error), -5);
            assert_eq!(lyra_packet_read_u16(packet, &mut error), 65535);
            assert_eq!(lyra_packet_read_i32(packet, &mut error), -123456);
            assert_eq!(lyra_packet_read_u64(packet, &mut error), u64::MAX);
            assert_eq!(lyra_packet_read_f32(packet, &mut error), 2.5);
            assert_eq!(lyra_packet_read_f64(packet, &mut error), -0.125);
            assert!(lyra_packet_end_of_packet(packet, &mut error));
            assert!(lyra_packet_can_read(packet, &mut error));
        }

        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }

    #[test]
    fn values_are_big_endian_on_the_wire() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };
        unsafe { lyra_packet_write_u32(packet, 0x0102_0304, &mut error) };

        let mut size = 0usize;
        let ptr = unsafe { lyra_packet_get_data(packet, &mut size, &mut error) };
        let bytes = unsafe { std::slice::from_raw_parts(ptr, size) };
        assert_eq!(bytes, &[1, 2, 3, 4]);

        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }

    #[test]
    fn read_past_end_freezes_position() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };
        unsafe { lyra_packet_write_u16(packet, 7, &mut error) };

        unsafe {
            // A u32 read needs 4 bytes; only 2 are available.
            assert_eq!(lyra_packet_read_u32(packet, &mut error), 0);
            assert!(!lyra_packet_can_read(packet, &mut error));

            // Position is unchanged, but the packet stays unreadable.
            assert!(!lyra_packet_end_of_packet(packet, &mut error));
            assert_eq!(lyra_packet_read_u16(packet, &mut error), 0);

            // Clearing restores readability.
            assert!(lyra_packet_clear(packet, &mut error));
            assert!(lyra_packet_can_read(packet, &mut error));
            assert_eq!(lyra_packet_get_data_size(packet, &mut error), 0);
        }

        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }

    #[test]
    fn string_round_trip() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };
        let input = CString::new("hello packet").unwrap();
        assert!(unsafe { lyra_packet_write_string(packet, input.as_ptr(), &mut error) });

        let mut buffer = [0i8; 32];
        assert!(unsafe {
            lyra_packet_read_string(packet, buffer.as_mut_ptr() as *mut c_char, buffer.len(), &mut error)
        });
        let read = unsafe { CStr::from_ptr(buffer.as_ptr() as *const c_char) };
        assert_eq!(read.to_str().unwrap(), "hello packet");

        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }

    #[test]
    fn string_read_into_small_buffer_fails_cleanly() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };
        let input = CString::new("too long for the buffer").unwrap();
        assert!(unsafe { lyra_packet_write_string(packet, input.as_ptr(), &mut error) });

        let mut buffer = [0i8; 4];
        assert!(!unsafe {
            lyra_packet_read_string(packet, buffer.as_mut_ptr() as *mut c_char, buffer.len(), &mut error)
        });
        assert!(!unsafe { lyra_packet_can_read(packet, &mut error) });

        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }

    #[test]
    fn append_and_copy_preserve_bytes() {
        let mut error = LyraError::ok();
        let packet = unsafe { lyra_packet_create(&mut error) };
        let payload = [9u8, 8, 7];
        assert!(unsafe { lyra_packet_append(packet, payload.as_ptr(), payload.len(), &mut error) });

        let copy = unsafe { lyra_packet_copy(packet, &mut error) };
        assert_eq!(unsafe { lyra_packet_get_data_size(copy, &mut error) }, 3);
        assert_eq!(unsafe { lyra_packet_read_u8(copy, &mut error) }, 9);

        assert!(unsafe { lyra_packet_destroy(copy, &mut error) });
        assert!(unsafe { lyra_packet_destroy(packet, &mut error) });
    }
}
