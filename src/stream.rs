//! Caller-supplied input streams.
//!
//! C code can feed loaders (images, sound buffers, music) from arbitrary
//! sources by filling a [`LyraInputStream`] table. The adapter exposes the
//! table as `std::io::Read + Seek` (and as a symphonia `MediaSource` for
//! the audio decoders), propagating the table's negative-sentinel errors as
//! I/O failures so the enclosing load aborts instead of substituting data.

use std::io::{self, Read, Seek, SeekFrom};
use std::os::raw::c_void;

use crate::error::{LyraError, LyraErrorCode};

/// Read callback: fill `data` with up to `size` bytes, returning the number
/// of bytes actually read, or -1 on error.
pub type LyraStreamReadFn =
    unsafe extern "C" fn(data: *mut c_void, size: i64, user_data: *mut c_void) -> i64;

/// Seek callback: jump to the absolute byte `position`, returning the new
/// position, or -1 on error.
pub type LyraStreamSeekFn = unsafe extern "C" fn(position: i64, user_data: *mut c_void) -> i64;

/// Tell callback: return the current byte position, or -1 on error.
pub type LyraStreamTellFn = unsafe extern "C" fn(user_data: *mut c_void) -> i64;

/// Size callback: return the total number of bytes, or -1 if unknown.
pub type LyraStreamGetSizeFn = unsafe extern "C" fn(user_data: *mut c_void) -> i64;

/// Function-pointer table describing a caller-owned data source.
///
/// All four callbacks are required. `user_data` is passed through verbatim
/// and never dereferenced by the library.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LyraInputStream {
    pub read: Option<LyraStreamReadFn>,
    pub seek: Option<LyraStreamSeekFn>,
    pub tell: Option<LyraStreamTellFn>,
    pub get_size: Option<LyraStreamGetSizeFn>,
    pub user_data: *mut c_void,
}

/// Adapter from a [`LyraInputStream`] table to the engine's stream traits.
///
/// The adapter holds a copy of the table for its entire lifetime, which is
/// scoped to the load call that consumes it. It performs no caching of its
/// own; every `read`/`seek` goes straight to the callbacks.
#[derive(Debug)]
pub(crate) struct CallbackStream {
    read: LyraStreamReadFn,
    seek: LyraStreamSeekFn,
    tell: LyraStreamTellFn,
    get_size: LyraStreamGetSizeFn,
    user_data: *mut c_void,
}

// The table is invoked from whatever thread the engine decodes on (audio
// streaming pulls from its playback thread). The C caller contractually
// provides callbacks that tolerate this; the library adds no synchronization.
unsafe impl Send for CallbackStream {}
unsafe impl Sync for CallbackStream {}

impl CallbackStream {
    /// Validate the table and build the adapter.
    ///
    /// # Safety
    ///
    /// `stream` must point to a valid table whose callbacks remain callable
    /// for the adapter's lifetime.
    pub(crate) unsafe fn new(stream: *const LyraInputStream) -> Result<Self, LyraError> {
        let table = match unsafe { stream.as_ref() } {
            Some(t) => t,
            None => return Err(LyraError::null_pointer("stream")),
        };
        match (table.read, table.seek, table.tell, table.get_size) {
            (Some(read), Some(seek), Some(tell), Some(get_size)) => Ok(Self {
                read,
                seek,
                tell,
                get_size,
                user_data: table.user_data,
            }),
            _ => Err(LyraError::new(
                LyraErrorCode::NullPointer,
                "input stream table has a null callback",
            )),
        }
    }

    fn stream_err(what: &str) -> io::Error {
        io::Error::other(format!("input stream {what} callback reported failure"))
    }
}

impl Read for CallbackStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = unsafe { (self.read)(buf.as_mut_ptr() as *mut c_void, buf.len() as i64, self.user_data) };
        if n < 0 {
            return Err(Self::stream_err("read"));
        }
        Ok((n as u64).min(buf.len() as u64) as usize)
    }
}

impl Seek for CallbackStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(delta) => {
                let here = unsafe { (self.tell)(self.user_data) };
                if here < 0 {
                    return Err(Self::stream_err("tell"));
                }
                here + delta
            }
            SeekFrom::End(delta) => {
                let size = unsafe { (self.get_size)(self.user_data) };
                if size < 0 {
                    return Err(Self::stream_err("get_size"));
                }
                size + delta
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        let landed = unsafe { (self.seek)(target, self.user_data) };
        if landed < 0 {
            return Err(Self::stream_err("seek"));
        }
        Ok(landed as u64)
    }
}

#[cfg(feature = "audio")]
impl symphonia::core::io::MediaSource for CallbackStream {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        let size = unsafe { (self.get_size)(self.user_data) };
        (size >= 0).then_some(size as u64)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A memory-backed stream table shared by loader tests.

    use super::*;

    pub struct MemSource {
        pub data: Vec<u8>,
        pub pos: usize,
        /// When set, `read` reports the error sentinel.
        pub fail_reads: bool,
    }

    impl MemSource {
        pub fn new(data: Vec<u8>) -> Box<Self> {
            Box::new(Self {
                data,
                pos: 0,
                fail_reads: false,
            })
        }

        pub fn table(me: &mut Box<Self>) -> LyraInputStream {
            LyraInputStream {
                read: Some(mem_read),
                seek: Some(mem_seek),
                tell: Some(mem_tell),
                get_size: Some(mem_get_size),
                user_data: &mut **me as *mut MemSource as *mut c_void,
            }
        }
    }

    unsafe extern "C" fn mem_read(data: *mut c_void, size: i64, user: *mut c_void) -> i64 {
        let src = unsafe { &mut *(user as *mut MemSource) };
        if src.fail_reads {
            return -1;
        }
        let remaining = src.data.len() - src.pos;
        let n = (size.max(0) as usize).min(remaining);
        unsafe {
            std::ptr::copy_nonoverlapping(src.data.as_ptr().add(src.pos), data as *mut u8, n);
        }
        src.pos += n;
        n as i64
    }

    unsafe extern "C" fn mem_seek(position: i64, user: *mut c_void) -> i64 {
        let src = unsafe { &mut *(user as *mut MemSource) };
        if position < 0 || position as usize > src.data.len() {
            return -1;
        }
        src.pos = position as usize;
        src.pos as i64
    }

    unsafe extern "C" fn mem_tell(user: *mut c_void) -> i64 {
        let src = unsafe { &*(user as *mut MemSource) };
        src.pos as i64
    }

    unsafe extern "C" fn mem_get_size(user: *mut c_void) -> i64 {
        let src = unsafe { &*(user as *mut MemSource) };
        src.data.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemSource;
    use super::*;

    #[test]
    fn sequential_read_recovers_bytes() {
        let payload: Vec<u8> = (0u8..=63).collect();
        let mut src = MemSource::new(payload.clone());
        let table = MemSource::table(&mut src);

        let mut stream = unsafe { CallbackStream::new(&table) }.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn seek_then_read_starts_at_offset() {
        let payload: Vec<u8> = (0u8..=63).collect();
        let mut src = MemSource::new(payload.clone());
        let table = MemSource::table(&mut src);

        let mut stream = unsafe { CallbackStream::new(&table) }.unwrap();
        assert_eq!(stream.seek(SeekFrom::Start(10)).unwrap(), 10);
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &payload[10..14]);

        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 62);
        assert_eq!(stream.seek(SeekFrom::Current(-1)).unwrap(), 61);
    }

    #[test]
    fn negative_sentinel_becomes_io_error() {
        let mut src = MemSource::new(vec![1, 2, 3]);
        src.fail_reads = true;
        let table = MemSource::table(&mut src);

        let mut stream = unsafe { CallbackStream::new(&table) }.unwrap();
        let mut buf = [0u8; 3];
        assert!(stream.read(&mut buf).is_err());
    }

    #[test]
    fn missing_callback_is_rejected() {
        let mut src = MemSource::new(vec![]);
        let mut table = MemSource::table(&mut src);
        table.read = None;

        let mut err = unsafe { CallbackStream::new(&table) }.unwrap_err();
        assert_eq!(err.code, LyraErrorCode::NullPointer);
        unsafe { crate::error::lyra_error_free(&mut err) };
    }

    #[test]
    fn null_table_is_rejected() {
        let err = unsafe { CallbackStream::new(std::ptr::null()) }.unwrap_err();
        assert_eq!(err.code, LyraErrorCode::NullPointer);
    }
}
