//! TCP and UDP sockets over std::net.
//!
//! Transport behavior is the platform's; this layer converts between C
//! buffers and the socket calls and maps `io::ErrorKind` onto the flat
//! status enum. Packet-framed TCP transfers carry a 32-bit big-endian
//! length prefix; a non-blocking receive keeps partial state across calls
//! and reports `NotReady` until the frame completes.

use std::ffi::CString;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::raw::c_char;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::packet::LyraPacket;
use crate::types::LyraTime;
use crate::util::{cstr_to_string, set_error, set_ok};

/// Result of a socket operation.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyraSocketStatus {
    /// The operation completed.
    Done = 0,
    /// The non-blocking socket has no data ready.
    NotReady = 1,
    /// Only part of the data was sent; call again with the remainder.
    Partial = 2,
    /// The peer closed the connection.
    Disconnected = 3,
    /// An unexpected error happened.
    Error = 4,
}

fn status_from_io(e: &std::io::Error) -> LyraSocketStatus {
    use std::io::ErrorKind::*;
    match e.kind() {
        WouldBlock | TimedOut => LyraSocketStatus::NotReady,
        ConnectionReset | ConnectionAborted | BrokenPipe | NotConnected | UnexpectedEof => {
            LyraSocketStatus::Disconnected
        }
        _ => LyraSocketStatus::Error,
    }
}

/// The largest payload a single UDP datagram can carry.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_udp_socket_max_datagram_size() -> usize {
    65507
}

// ---------------------------------------------------------------------------
// TCP listener
// ---------------------------------------------------------------------------

pub(crate) struct TcpListenerData {
    inner: Mutex<Option<TcpListener>>,
    blocking: AtomicBool,
}

static TCP_LISTENERS: Registry<TcpListenerData> = Registry::new();

define_handle!(
    /// Handle to a TCP listener.
    LyraTcpListener
);

fn get_listener(handle: LyraTcpListener) -> Option<Arc<TcpListenerData>> {
    TCP_LISTENERS.get(handle.raw())
}

/// Create a TCP listener (not yet listening).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_create(error: *mut LyraError) -> LyraTcpListener {
    unsafe { set_ok(error) };
    LyraTcpListener::from_raw(TCP_LISTENERS.insert(TcpListenerData {
        inner: Mutex::new(None),
        blocking: AtomicBool::new(true),
    }))
}

/// Destroy a TCP listener, closing it if listening.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_destroy(
    listener: LyraTcpListener,
    error: *mut LyraError,
) -> bool {
    match TCP_LISTENERS.remove(listener.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("tcp listener"))
        },
    }
}

/// Switch the listener between blocking and non-blocking accept.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_set_blocking(
    listener: LyraTcpListener,
    blocking: bool,
    error: *mut LyraError,
) -> bool {
    let data = match get_listener(listener) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.blocking.store(blocking, Ordering::Relaxed);
    if let Some(inner) = &*data.inner.lock() {
        if let Err(e) = inner.set_nonblocking(!blocking) {
            return unsafe { set_error(error, LyraError::from_io_error(e)) };
        }
    }
    unsafe { set_ok(error) };
    true
}

/// Start listening on a local port (all interfaces).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_listen(
    listener: LyraTcpListener,
    port: u16,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let data = match get_listener(listener) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };

    match TcpListener::bind(("0.0.0.0", port)) {
        Ok(socket) => {
            if let Err(e) = socket.set_nonblocking(!data.blocking.load(Ordering::Relaxed)) {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
                return LyraSocketStatus::Error;
            }
            *data.inner.lock() = Some(socket);
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            status
        }
    }
}

/// Get the port the listener is bound to, or 0.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_get_local_port(
    listener: LyraTcpListener,
    error: *mut LyraError,
) -> u16 {
    match get_listener(listener) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.inner
                .lock()
                .as_ref()
                .and_then(|l| l.local_addr().ok())
                .map(|a| a.port())
                .unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Accept a pending connection into a new TCP socket handle.
///
/// # Parameters
///
/// - `listener`: Valid, listening listener handle
/// - `connected`: Out-parameter receiving the new socket handle on `Done`
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `connected` must be a valid pointer
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_listener_accept(
    listener: LyraTcpListener,
    connected: *mut LyraTcpSocket,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let data = match get_listener(listener) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    if connected.is_null() {
        unsafe { set_error::<()>(error, LyraError::null_pointer("connected")) };
        return LyraSocketStatus::Error;
    }

    let guard = data.inner.lock();
    let socket = match &*guard {
        Some(s) => s,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_argument("listener is not listening")) };
            return LyraSocketStatus::Error;
        }
    };

    match socket.accept() {
        Ok((stream, _addr)) => {
            let _ = stream.set_nonblocking(false);
            unsafe { *connected = insert_tcp_stream(stream) };
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            unsafe { set_ok(error) };
            if status == LyraSocketStatus::Error {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            }
            status
        }
    }
}

// ---------------------------------------------------------------------------
// TCP socket
// ---------------------------------------------------------------------------

/// Partial state of a framed (packet) receive in non-blocking mode.
#[derive(Default)]
struct FrameRecv {
    header: Vec<u8>,
    payload: Vec<u8>,
}

pub(crate) struct TcpSocketData {
    inner: Mutex<Option<TcpStream>>,
    blocking: AtomicBool,
    frame: Mutex<FrameRecv>,
    remote_cache: Mutex<CString>,
}

static TCP_SOCKETS: Registry<TcpSocketData> = Registry::new();

define_handle!(
    /// Handle to a TCP socket.
    LyraTcpSocket
);

fn get_tcp(handle: LyraTcpSocket) -> Option<Arc<TcpSocketData>> {
    TCP_SOCKETS.get(handle.raw())
}

fn insert_tcp_stream(stream: TcpStream) -> LyraTcpSocket {
    LyraTcpSocket::from_raw(TCP_SOCKETS.insert(TcpSocketData {
        inner: Mutex::new(Some(stream)),
        blocking: AtomicBool::new(true),
        frame: Mutex::new(FrameRecv::default()),
        remote_cache: Mutex::new(CString::default()),
    }))
}

/// Create an unconnected TCP socket.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_create(error: *mut LyraError) -> LyraTcpSocket {
    unsafe { set_ok(error) };
    LyraTcpSocket::from_raw(TCP_SOCKETS.insert(TcpSocketData {
        inner: Mutex::new(None),
        blocking: AtomicBool::new(true),
        frame: Mutex::new(FrameRecv::default()),
        remote_cache: Mutex::new(CString::default()),
    }))
}

/// Destroy a TCP socket, disconnecting it first.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_destroy(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> bool {
    match TCP_SOCKETS.remove(socket.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("tcp socket"))
        },
    }
}

/// Switch the socket between blocking and non-blocking mode.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_set_blocking(
    socket: LyraTcpSocket,
    blocking: bool,
    error: *mut LyraError,
) -> bool {
    let data = match get_tcp(socket) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.blocking.store(blocking, Ordering::Relaxed);
    if let Some(stream) = &*data.inner.lock() {
        if let Err(e) = stream.set_nonblocking(!blocking) {
            return unsafe { set_error(error, LyraError::from_io_error(e)) };
        }
    }
    unsafe { set_ok(error) };
    true
}

/// Whether the socket is in blocking mode.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_is_blocking(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> bool {
    match get_tcp(socket) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.blocking.load(Ordering::Relaxed)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Connect to a remote host.
///
/// Blocks for at most `timeout` when it is positive; otherwise blocks
/// until the platform gives up.
///
/// # Safety
///
/// - `host` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_connect(
    socket: LyraTcpSocket,
    host: *const c_char,
    port: u16,
    timeout: LyraTime,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    let host = match unsafe { cstr_to_string(host, "host") } {
        Ok(h) => h,
        Err(e) => {
            unsafe { set_error::<()>(error, e) };
            return LyraSocketStatus::Error;
        }
    };

    let addr: Option<SocketAddr> = (host.as_str(), port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next());
    let addr = match addr {
        Some(a) => a,
        None => {
            unsafe {
                set_error::<()>(
                    error,
                    LyraError::new(
                        crate::error::LyraErrorCode::AddressResolution,
                        format!("could not resolve {host}:{port}"),
                    ),
                )
            };
            return LyraSocketStatus::Error;
        }
    };

    let result = if timeout.microseconds > 0 {
        TcpStream::connect_timeout(&addr, timeout.to_duration())
    } else {
        TcpStream::connect(addr)
    };

    match result {
        Ok(stream) => {
            if let Err(e) = stream.set_nonblocking(!data.blocking.load(Ordering::Relaxed)) {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
                return LyraSocketStatus::Error;
            }
            *data.inner.lock() = Some(stream);
            *data.frame.lock() = FrameRecv::default();
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            status
        }
    }
}

/// Close the connection.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_disconnect(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> bool {
    match get_tcp(socket) {
        Some(d) => {
            *d.inner.lock() = None;
            *d.frame.lock() = FrameRecv::default();
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the local port, or 0 when unconnected.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_get_local_port(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> u16 {
    match get_tcp(socket) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.inner
                .lock()
                .as_ref()
                .and_then(|s| s.local_addr().ok())
                .map(|a| a.port())
                .unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the remote port, or 0 when unconnected.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_get_remote_port(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> u16 {
    match get_tcp(socket) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.inner
                .lock()
                .as_ref()
                .and_then(|s| s.peer_addr().ok())
                .map(|a| a.port())
                .unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the remote address as a string.
///
/// The pointer points into a cache owned by this socket handle and is
/// overwritten by the next call on the same handle.
///
/// # Returns
///
/// Address string, or NULL when unconnected.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_get_remote_address(
    socket: LyraTcpSocket,
    error: *mut LyraError,
) -> *const c_char {
    let data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            return unsafe {
                crate::util::set_error_null::<c_char>(error, LyraError::invalid_handle())
            }
            .cast_const();
        }
    };

    let addr = data.inner.lock().as_ref().and_then(|s| s.peer_addr().ok());
    match addr {
        Some(addr) => {
            let mut cache = data.remote_cache.lock();
            *cache = CString::new(addr.ip().to_string()).unwrap_or_default();
            unsafe { set_ok(error) };
            cache.as_ptr()
        }
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_argument("socket is not connected")) };
            std::ptr::null()
        }
    }
}

fn with_stream<R>(
    data: &TcpSocketData,
    error: *mut LyraError,
    f: impl FnOnce(&mut TcpStream) -> (LyraSocketStatus, R),
) -> (LyraSocketStatus, R)
where
    R: Default,
{
    let mut guard = data.inner.lock();
    match guard.as_mut() {
        Some(stream) => f(stream),
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_argument("socket is not connected")) };
            (LyraSocketStatus::Disconnected, R::default())
        }
    }
}

/// Send raw bytes.
///
/// # Parameters
///
/// - `socket`: Valid, connected socket handle
/// - `data`: Bytes to send
/// - `size`: Number of bytes
/// - `sent`: Out-parameter for the number of bytes actually sent (may be
///   NULL)
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// `Done` when everything was sent, `Partial` when only a prefix was (the
/// count is in `sent`), `NotReady` when a non-blocking socket cannot send.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `sent` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_send(
    socket: LyraTcpSocket,
    data: *const u8,
    size: usize,
    sent: *mut usize,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    if data.is_null() && size != 0 {
        unsafe { set_error::<()>(error, LyraError::null_pointer("data")) };
        return LyraSocketStatus::Error;
    }

    let bytes = unsafe { std::slice::from_raw_parts(data, size) };
    let (status, written) = with_stream(&socket_data, error, |stream| {
        let mut written = 0usize;
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => return (LyraSocketStatus::Disconnected, written),
                Ok(n) => written += n,
                Err(e) => {
                    let status = status_from_io(&e);
                    let status = if status == LyraSocketStatus::NotReady && written > 0 {
                        LyraSocketStatus::Partial
                    } else {
                        status
                    };
                    return (status, written);
                }
            }
        }
        (LyraSocketStatus::Done, written)
    });

    if let Some(out) = unsafe { sent.as_mut() } {
        *out = written;
    }
    if status == LyraSocketStatus::Done {
        unsafe { set_ok(error) };
    }
    status
}

/// Receive raw bytes.
///
/// # Returns
///
/// `Done` with the count in `received`, `NotReady` for an empty
/// non-blocking socket, `Disconnected` when the peer closed the
/// connection.
///
/// # Safety
///
/// - `buffer` must point to `size` writable bytes
/// - `received` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_receive(
    socket: LyraTcpSocket,
    buffer: *mut u8,
    size: usize,
    received: *mut usize,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    if buffer.is_null() {
        unsafe { set_error::<()>(error, LyraError::null_pointer("buffer")) };
        return LyraSocketStatus::Error;
    }

    let out = unsafe { std::slice::from_raw_parts_mut(buffer, size) };
    let (status, count) = with_stream(&socket_data, error, |stream| match stream.read(out) {
        Ok(0) => (LyraSocketStatus::Disconnected, 0),
        Ok(n) => (LyraSocketStatus::Done, n),
        Err(e) => (status_from_io(&e), 0),
    });

    if let Some(out_count) = unsafe { received.as_mut() } {
        *out_count = count;
    }
    if status == LyraSocketStatus::Done {
        unsafe { set_ok(error) };
    }
    status
}

/// Send a packet with a 32-bit big-endian length prefix.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_send_packet(
    socket: LyraTcpSocket,
    packet: LyraPacket,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    let bytes = match crate::packet::packet_bytes(packet) {
        Some(b) => b,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };

    let mut framed = Vec::with_capacity(4 + bytes.len());
    framed.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    framed.extend_from_slice(&bytes);

    let (status, _) = with_stream(&socket_data, error, |stream| {
        match stream.write_all(&framed) {
            Ok(()) => (LyraSocketStatus::Done, ()),
            Err(e) => (status_from_io(&e), ()),
        }
    });
    if status == LyraSocketStatus::Done {
        unsafe { set_ok(error) };
    }
    status
}

/// Receive a packet framed by `lyra_tcp_socket_send_packet`.
///
/// In non-blocking mode partial frames are retained across calls; the
/// function keeps returning `NotReady` until the frame completes, then
/// fills `packet` and returns `Done`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_tcp_socket_receive_packet(
    socket: LyraTcpSocket,
    packet: LyraPacket,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_tcp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };

    let mut frame = socket_data.frame.lock();
    let (status, done) = with_stream(&socket_data, error, |stream| {
        // Finish the 4-byte header first.
        while frame.header.len() < 4 {
            let mut byte = [0u8; 1];
            match stream.read(&mut byte) {
                Ok(0) => return (LyraSocketStatus::Disconnected, false),
                Ok(_) => frame.header.push(byte[0]),
                Err(e) => return (status_from_io(&e), false),
            }
        }
        let expected = u32::from_be_bytes([
            frame.header[0],
            frame.header[1],
            frame.header[2],
            frame.header[3],
        ]) as usize;

        while frame.payload.len() < expected {
            let mut chunk = [0u8; 4096];
            let want = (expected - frame.payload.len()).min(chunk.len());
            match stream.read(&mut chunk[..want]) {
                Ok(0) => return (LyraSocketStatus::Disconnected, false),
                Ok(n) => frame.payload.extend_from_slice(&chunk[..n]),
                Err(e) => return (status_from_io(&e), false),
            }
        }
        (LyraSocketStatus::Done, true)
    });

    if done {
        if !crate::packet::packet_fill(packet, &frame.payload) {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
        *frame = FrameRecv::default();
        unsafe { set_ok(error) };
    }
    status
}

// ---------------------------------------------------------------------------
// UDP socket
// ---------------------------------------------------------------------------

pub(crate) struct UdpSocketData {
    inner: Mutex<Option<UdpSocket>>,
    blocking: AtomicBool,
    remote_cache: Mutex<CString>,
}

static UDP_SOCKETS: Registry<UdpSocketData> = Registry::new();

define_handle!(
    /// Handle to a UDP socket.
    LyraUdpSocket
);

fn get_udp(handle: LyraUdpSocket) -> Option<Arc<UdpSocketData>> {
    UDP_SOCKETS.get(handle.raw())
}

/// Create an unbound UDP socket.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_create(error: *mut LyraError) -> LyraUdpSocket {
    unsafe { set_ok(error) };
    LyraUdpSocket::from_raw(UDP_SOCKETS.insert(UdpSocketData {
        inner: Mutex::new(None),
        blocking: AtomicBool::new(true),
        remote_cache: Mutex::new(CString::default()),
    }))
}

/// Destroy a UDP socket, unbinding it first.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_destroy(
    socket: LyraUdpSocket,
    error: *mut LyraError,
) -> bool {
    match UDP_SOCKETS.remove(socket.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe {
            set_error(error, LyraError::resource_busy("udp socket"))
        },
    }
}

/// Switch the socket between blocking and non-blocking mode.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_set_blocking(
    socket: LyraUdpSocket,
    blocking: bool,
    error: *mut LyraError,
) -> bool {
    let data = match get_udp(socket) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    data.blocking.store(blocking, Ordering::Relaxed);
    if let Some(inner) = &*data.inner.lock() {
        if let Err(e) = inner.set_nonblocking(!blocking) {
            return unsafe { set_error(error, LyraError::from_io_error(e)) };
        }
    }
    unsafe { set_ok(error) };
    true
}

/// Bind the socket to a local port (0 picks an ephemeral port).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_bind(
    socket: LyraUdpSocket,
    port: u16,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let data = match get_udp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };

    match UdpSocket::bind(("0.0.0.0", port)) {
        Ok(inner) => {
            if let Err(e) = inner.set_nonblocking(!data.blocking.load(Ordering::Relaxed)) {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
                return LyraSocketStatus::Error;
            }
            *data.inner.lock() = Some(inner);
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            status
        }
    }
}

/// Release the bound port.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_unbind(
    socket: LyraUdpSocket,
    error: *mut LyraError,
) -> bool {
    match get_udp(socket) {
        Some(d) => {
            *d.inner.lock() = None;
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Get the bound local port, or 0.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_get_local_port(
    socket: LyraUdpSocket,
    error: *mut LyraError,
) -> u16 {
    match get_udp(socket) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.inner
                .lock()
                .as_ref()
                .and_then(|s| s.local_addr().ok())
                .map(|a| a.port())
                .unwrap_or(0)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Send a datagram to a host and port.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `host` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_send_to(
    socket: LyraUdpSocket,
    data: *const u8,
    size: usize,
    host: *const c_char,
    port: u16,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_udp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    if data.is_null() && size != 0 {
        unsafe { set_error::<()>(error, LyraError::null_pointer("data")) };
        return LyraSocketStatus::Error;
    }
    if size > lyra_udp_socket_max_datagram_size() {
        unsafe {
            set_error::<()>(error, LyraError::invalid_argument("datagram exceeds the maximum size"))
        };
        return LyraSocketStatus::Error;
    }
    let host = match unsafe { cstr_to_string(host, "host") } {
        Ok(h) => h,
        Err(e) => {
            unsafe { set_error::<()>(error, e) };
            return LyraSocketStatus::Error;
        }
    };

    let mut guard = socket_data.inner.lock();
    // An unbound socket binds to an ephemeral port on first send.
    if guard.is_none() {
        match UdpSocket::bind(("0.0.0.0", 0)) {
            Ok(inner) => {
                let _ = inner.set_nonblocking(!socket_data.blocking.load(Ordering::Relaxed));
                *guard = Some(inner);
            }
            Err(e) => {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
                return LyraSocketStatus::Error;
            }
        }
    }
    let inner = guard.as_ref().expect("socket was just bound");

    let bytes = unsafe { std::slice::from_raw_parts(data, size) };
    match inner.send_to(bytes, (host.as_str(), port)) {
        Ok(_) => {
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            status
        }
    }
}

/// Receive a datagram.
///
/// # Parameters
///
/// - `socket`: Valid, bound socket handle
/// - `buffer`: Destination buffer
/// - `size`: Buffer capacity in bytes
/// - `received`: Out-parameter for the datagram length (may be NULL)
/// - `port`: Out-parameter for the sender's port (may be NULL)
/// - `error`: Out-parameter for error information
///
/// The sender's address is readable afterwards through
/// `lyra_udp_socket_get_remote_address`.
///
/// # Safety
///
/// - `buffer` must point to `size` writable bytes
/// - `received` and `port` must be valid pointers or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_receive_from(
    socket: LyraUdpSocket,
    buffer: *mut u8,
    size: usize,
    received: *mut usize,
    port: *mut u16,
    error: *mut LyraError,
) -> LyraSocketStatus {
    let socket_data = match get_udp(socket) {
        Some(d) => d,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_handle()) };
            return LyraSocketStatus::Error;
        }
    };
    if buffer.is_null() {
        unsafe { set_error::<()>(error, LyraError::null_pointer("buffer")) };
        return LyraSocketStatus::Error;
    }

    let guard = socket_data.inner.lock();
    let inner = match &*guard {
        Some(s) => s,
        None => {
            unsafe { set_error::<()>(error, LyraError::invalid_argument("socket is not bound")) };
            return LyraSocketStatus::Error;
        }
    };

    let out = unsafe { std::slice::from_raw_parts_mut(buffer, size) };
    match inner.recv_from(out) {
        Ok((count, addr)) => {
            if let Some(out_count) = unsafe { received.as_mut() } {
                *out_count = count;
            }
            if let Some(out_port) = unsafe { port.as_mut() } {
                *out_port = addr.port();
            }
            *socket_data.remote_cache.lock() =
                CString::new(addr.ip().to_string()).unwrap_or_default();
            unsafe { set_ok(error) };
            LyraSocketStatus::Done
        }
        Err(e) => {
            let status = status_from_io(&e);
            if status == LyraSocketStatus::Error {
                unsafe { set_error::<()>(error, LyraError::from_io_error(e)) };
            } else {
                unsafe { set_ok(error) };
            }
            status
        }
    }
}

/// Address of the last datagram's sender.
///
/// Points into a cache owned by this socket handle, overwritten by the
/// next receive.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_udp_socket_get_remote_address(
    socket: LyraUdpSocket,
    error: *mut LyraError,
) -> *const c_char {
    match get_udp(socket) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.remote_cache.lock().as_ptr()
        }
        None => unsafe {
            crate::util::set_error_null::<c_char>(error, LyraError::invalid_handle())
        }
        .cast_const(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;
    use std::ffi::CString;

    #[test]
    fn udp_datagram_round_trip_on_loopback() {
        let mut error = LyraError::ok();
        let receiver = unsafe { lyra_udp_socket_create(&mut error) };
        assert_eq!(
            unsafe { lyra_udp_socket_bind(receiver, 0, &mut error) },
            LyraSocketStatus::Done
        );
        let port = unsafe { lyra_udp_socket_get_local_port(receiver, &mut error) };
        assert_ne!(port, 0);

        let sender = unsafe { lyra_udp_socket_create(&mut error) };
        let host = CString::new("127.0.0.1").unwrap();
        let payload = [1u8, 2, 3, 4, 5];
        assert_eq!(
            unsafe {
                lyra_udp_socket_send_to(
                    sender,
                    payload.as_ptr(),
                    payload.len(),
                    host.as_ptr(),
                    port,
                    &mut error,
                )
            },
            LyraSocketStatus::Done
        );

        let mut buffer = [0u8; 16];
        let mut received = 0usize;
        let mut from_port = 0u16;
        assert_eq!(
            unsafe {
                lyra_udp_socket_receive_from(
                    receiver,
                    buffer.as_mut_ptr(),
                    buffer.len(),
                    &mut received,
                    &mut from_port,
                    &mut error,
                )
            },
            LyraSocketStatus::Done
        );
        assert_eq!(&buffer[..received], &payload);
        assert_ne!(from_port, 0);

        let addr = unsafe { lyra_udp_socket_get_remote_address(receiver, &mut error) };
        let addr = unsafe { std::ffi::CStr::from_ptr(addr) };
        assert_eq!(addr.to_str().unwrap(), "127.0.0.1");

        assert!(unsafe { lyra_udp_socket_destroy(sender, &mut error) });
        assert!(unsafe { lyra_udp_socket_destroy(receiver, &mut error) });
    }

    #[test]
    fn tcp_packet_framing_round_trip_on_loopback() {
        let mut error = LyraError::ok();
        let listener = unsafe { lyra_tcp_listener_create(&mut error) };
        assert_eq!(
            unsafe { lyra_tcp_listener_listen(listener, 0, &mut error) },
            LyraSocketStatus::Done
        );
        let port = unsafe { lyra_tcp_listener_get_local_port(listener, &mut error) };

        let client = unsafe { lyra_tcp_socket_create(&mut error) };
        let host = CString::new("127.0.0.1").unwrap();
        assert_eq!(
            unsafe {
                lyra_tcp_socket_connect(client, host.as_ptr(), port, LyraTime::ZERO, &mut error)
            },
            LyraSocketStatus::Done
        );

        let mut server_side = LyraTcpSocket::invalid();
        assert_eq!(
            unsafe { lyra_tcp_listener_accept(listener, &mut server_side, &mut error) },
            LyraSocketStatus::Done
        );
        assert!(server_side.is_valid());

        // Send a typed packet one way and read it back.
        let outgoing = unsafe { crate::packet::lyra_packet_create(&mut error) };
        unsafe {
            crate::packet::lyra_packet_write_u32(outgoing, 0xDEADBEEF, &mut error);
            crate::packet::lyra_packet_write_i16(outgoing, -42, &mut error);
        }
        assert_eq!(
            unsafe { lyra_tcp_socket_send_packet(client, outgoing, &mut error) },
            LyraSocketStatus::Done
        );

        let incoming = unsafe { crate::packet::lyra_packet_create(&mut error) };
        assert_eq!(
            unsafe { lyra_tcp_socket_receive_packet(server_side, incoming, &mut error) },
            LyraSocketStatus::Done
        );
        unsafe {
            assert_eq!(
                crate::packet::lyra_packet_read_u32(incoming, &mut error),
                0xDEADBEEF
            );
            assert_eq!(crate::packet::lyra_packet_read_i16(incoming, &mut error), -42);
        }

        unsafe {
            crate::packet::lyra_packet_destroy(outgoing, &mut error);
            crate::packet::lyra_packet_destroy(incoming, &mut error);
            lyra_tcp_socket_destroy(server_side, &mut error);
            lyra_tcp_socket_destroy(client, &mut error);
            lyra_tcp_listener_destroy(listener, &mut error);
        }
    }

    #[test]
    fn nonblocking_accept_reports_not_ready() {
        let mut error = LyraError::ok();
        let listener = unsafe { lyra_tcp_listener_create(&mut error) };
        assert!(unsafe { lyra_tcp_listener_set_blocking(listener, false, &mut error) });
        assert_eq!(
            unsafe { lyra_tcp_listener_listen(listener, 0, &mut error) },
            LyraSocketStatus::Done
        );

        let mut connected = LyraTcpSocket::invalid();
        assert_eq!(
            unsafe { lyra_tcp_listener_accept(listener, &mut connected, &mut error) },
            LyraSocketStatus::NotReady
        );
        assert!(!connected.is_valid());

        assert!(unsafe { lyra_tcp_listener_destroy(listener, &mut error) });
    }

    #[test]
    fn operations_on_unconnected_sockets_fail_cleanly() {
        let mut error = LyraError::ok();
        let socket = unsafe { lyra_tcp_socket_create(&mut error) };

        let mut buffer = [0u8; 4];
        let status = unsafe {
            lyra_tcp_socket_receive(socket, buffer.as_mut_ptr(), buffer.len(), std::ptr::null_mut(), &mut error)
        };
        assert_eq!(status, LyraSocketStatus::Disconnected);
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };

        assert_eq!(unsafe { lyra_tcp_socket_get_local_port(socket, &mut error) }, 0);
        assert!(unsafe { lyra_tcp_socket_destroy(socket, &mut error) });
    }

    #[test]
    fn unresolvable_host_reports_resolution_error() {
        let mut error = LyraError::ok();
        let socket = unsafe { lyra_tcp_socket_create(&mut error) };
        let host = CString::new("host.invalid.").unwrap();

        let status = unsafe {
            lyra_tcp_socket_connect(socket, host.as_ptr(), 80, LyraTime::ZERO, &mut error)
        };
        assert_eq!(status, LyraSocketStatus::Error);
        assert_eq!(error.code, LyraErrorCode::AddressResolution);
        unsafe { crate::error::lyra_error_free(&mut error) };

        assert!(unsafe { lyra_tcp_socket_destroy(socket, &mut error) });
    }
}
