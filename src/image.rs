//! Images: CPU-side RGBA pixel buffers with file, memory and stream loaders.

use std::io::BufReader;
use std::os::raw::c_char;
use std::sync::Arc;

use image::{ImageReader, RgbaImage};
use parking_lot::Mutex;

use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::stream::{CallbackStream, LyraInputStream};
use crate::types::{LyraColor, LyraVec2u};
use crate::util::{cstr_to_path, set_error, set_error_null, set_ok};

pub(crate) struct ImageData {
    pixels: Mutex<RgbaImage>,
}

static IMAGES: Registry<ImageData> = Registry::new();

define_handle!(
    /// Handle to an image.
    LyraImage
);

pub(crate) fn get(handle: LyraImage) -> Option<Arc<ImageData>> {
    IMAGES.get(handle.raw())
}

pub(crate) fn insert(pixels: RgbaImage) -> LyraImage {
    LyraImage::from_raw(IMAGES.insert(ImageData {
        pixels: Mutex::new(pixels),
    }))
}

impl ImageData {
    pub(crate) fn clone_pixels(&self) -> RgbaImage {
        self.pixels.lock().clone()
    }
}

/// Create an image filled with a color.
///
/// # Returns
///
/// Handle on success, the invalid handle on failure.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_image_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_create(
    size: LyraVec2u,
    color: LyraColor,
    error: *mut LyraError,
) -> LyraImage {
    unsafe { set_ok(error) };
    insert(RgbaImage::from_pixel(size.x, size.y, color.into()))
}

/// Create an image from raw RGBA pixels.
///
/// # Safety
///
/// - `pixels` must point to `size.x * size.y * 4` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_create_from_pixels(
    size: LyraVec2u,
    pixels: *const u8,
    error: *mut LyraError,
) -> LyraImage {
    if pixels.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("pixels")) };
    }

    let len = size.x as usize * size.y as usize * 4;
    let data = unsafe { std::slice::from_raw_parts(pixels, len) }.to_vec();
    match RgbaImage::from_raw(size.x, size.y, data) {
        Some(img) => {
            unsafe { set_ok(error) };
            insert(img)
        }
        None => unsafe {
            set_error(error, LyraError::invalid_argument("pixel buffer size mismatch"))
        },
    }
}

/// Load an image from a file.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_create_from_file(
    path: *const c_char,
    error: *mut LyraError,
) -> LyraImage {
    let path = match unsafe { cstr_to_path(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { set_error(error, e) },
    };

    match image::open(&path) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img.to_rgba8())
        }
        Err(e) => {
            tracing::debug!("image load failed: {}: {e}", path.display());
            unsafe { set_error(error, e.into()) }
        }
    }
}

/// Load an image from an encoded memory block (PNG, JPEG, BMP).
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_create_from_memory(
    data: *const u8,
    size: usize,
    error: *mut LyraError,
) -> LyraImage {
    if data.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("data")) };
    }

    let bytes = unsafe { std::slice::from_raw_parts(data, size) };
    match image::load_from_memory(bytes) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img.to_rgba8())
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Load an image from a caller-supplied stream.
///
/// The stream callbacks are only invoked for the duration of this call.
///
/// # Safety
///
/// - `stream` must point to a valid table whose callbacks stay callable for
///   the duration of the call
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_create_from_stream(
    stream: *const LyraInputStream,
    error: *mut LyraError,
) -> LyraImage {
    let adapter = match unsafe { CallbackStream::new(stream) } {
        Ok(s) => s,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let reader = match ImageReader::new(BufReader::new(adapter)).with_guessed_format() {
        Ok(r) => r,
        Err(e) => return unsafe { set_error(error, LyraError::from_io_error(e)) },
    };

    match reader.decode() {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img.to_rgba8())
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Duplicate an image into a new handle.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_copy(image: LyraImage, error: *mut LyraError) -> LyraImage {
    match get(image) {
        Some(d) => {
            unsafe { set_ok(error) };
            insert(d.clone_pixels())
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Destroy an image.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_destroy(image: LyraImage, error: *mut LyraError) -> bool {
    match IMAGES.remove(image.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe { set_error(error, LyraError::resource_busy("image")) },
    }
}

/// Save an image to a file; the format is deduced from the extension.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_save_to_file(
    image: LyraImage,
    path: *const c_char,
    error: *mut LyraError,
) -> bool {
    let data = match get(image) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let path = match unsafe { cstr_to_path(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { set_error(error, e) },
    };

    match data.pixels.lock().save(&path) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e.into()) },
    }
}

/// Get the image dimensions in pixels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_get_size(
    image: LyraImage,
    error: *mut LyraError,
) -> LyraVec2u {
    match get(image) {
        Some(d) => {
            let pixels = d.pixels.lock();
            unsafe { set_ok(error) };
            LyraVec2u {
                x: pixels.width(),
                y: pixels.height(),
            }
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Read one pixel.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_get_pixel(
    image: LyraImage,
    x: u32,
    y: u32,
    error: *mut LyraError,
) -> LyraColor {
    let data = match get(image) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let pixels = data.pixels.lock();
    if x >= pixels.width() || y >= pixels.height() {
        return unsafe {
            set_error(error, LyraError::invalid_argument("pixel coordinates out of range"))
        };
    }
    unsafe { set_ok(error) };
    (*pixels.get_pixel(x, y)).into()
}

/// Write one pixel.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_set_pixel(
    image: LyraImage,
    x: u32,
    y: u32,
    color: LyraColor,
    error: *mut LyraError,
) -> bool {
    let data = match get(image) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let mut pixels = data.pixels.lock();
    if x >= pixels.width() || y >= pixels.height() {
        return unsafe {
            set_error(error, LyraError::invalid_argument("pixel coordinates out of range"))
        };
    }
    pixels.put_pixel(x, y, color.into());
    unsafe { set_ok(error) };
    true
}

/// Get a pointer to the raw RGBA pixel array.
///
/// The pointer stays valid until the next size-changing call on this image
/// handle (loads and flips rebuild the buffer).
///
/// # Parameters
///
/// - `image`: Valid image handle
/// - `byte_count`: Out-parameter for the buffer length in bytes (may be NULL)
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `byte_count` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_get_pixels_ptr(
    image: LyraImage,
    byte_count: *mut usize,
    error: *mut LyraError,
) -> *const u8 {
    let data = match get(image) {
        Some(d) => d,
        None => {
            return unsafe { set_error_null::<u8>(error, LyraError::invalid_handle()) }
                .cast_const();
        }
    };

    let pixels = data.pixels.lock();
    if let Some(out) = unsafe { byte_count.as_mut() } {
        *out = pixels.as_raw().len();
    }
    unsafe { set_ok(error) };
    pixels.as_raw().as_ptr()
}

/// Flip the image horizontally in place.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_flip_horizontally(
    image: LyraImage,
    error: *mut LyraError,
) -> bool {
    match get(image) {
        Some(d) => {
            image::imageops::flip_horizontal_in_place(&mut *d.pixels.lock());
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Flip the image vertically in place.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_image_flip_vertically(
    image: LyraImage,
    error: *mut LyraError,
) -> bool {
    match get(image) {
        Some(d) => {
            image::imageops::flip_vertical_in_place(&mut *d.pixels.lock());
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// Encode a 2x2 PNG with distinct corner colors.
    pub fn test_png_bytes() -> Vec<u8> {
        let mut img = image::RgbaImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, image::Rgba([0, 255, 0, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        img.put_pixel(1, 1, image::Rgba([255, 255, 0, 255]));

        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png)
            .expect("png encode");
        bytes.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::test_png_bytes;
    use super::*;
    use crate::error::LyraErrorCode;
    use crate::stream::test_support::MemSource;

    #[test]
    fn create_filled_and_read_back() {
        let mut error = LyraError::ok();
        let color = LyraColor::rgba(10, 20, 30, 40);
        let image = unsafe {
            lyra_image_create(LyraVec2u { x: 3, y: 2 }, color, &mut error)
        };
        assert!(image.is_valid());

        let size = unsafe { lyra_image_get_size(image, &mut error) };
        assert_eq!((size.x, size.y), (3, 2));
        assert_eq!(unsafe { lyra_image_get_pixel(image, 2, 1, &mut error) }, color);

        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }

    #[test]
    fn pixels_round_trip_through_pointer() {
        let pixels: [u8; 16] = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 0, 255,
        ];
        let mut error = LyraError::ok();
        let image = unsafe {
            lyra_image_create_from_pixels(LyraVec2u { x: 2, y: 2 }, pixels.as_ptr(), &mut error)
        };
        assert!(image.is_valid());

        let mut len = 0usize;
        let ptr = unsafe { lyra_image_get_pixels_ptr(image, &mut len, &mut error) };
        assert_eq!(len, 16);
        let readback = unsafe { std::slice::from_raw_parts(ptr, len) };
        assert_eq!(readback, &pixels);

        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }

    #[test]
    fn set_pixel_and_flip() {
        let mut error = LyraError::ok();
        let image = unsafe {
            lyra_image_create(LyraVec2u { x: 2, y: 1 }, LyraColor::default(), &mut error)
        };
        let red = LyraColor::rgba(255, 0, 0, 255);
        assert!(unsafe { lyra_image_set_pixel(image, 0, 0, red, &mut error) });

        assert!(unsafe { lyra_image_flip_horizontally(image, &mut error) });
        assert_eq!(unsafe { lyra_image_get_pixel(image, 1, 0, &mut error) }, red);

        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }

    #[test]
    fn load_from_memory_png() {
        let png = test_png_bytes();
        let mut error = LyraError::ok();
        let image = unsafe { lyra_image_create_from_memory(png.as_ptr(), png.len(), &mut error) };
        assert!(image.is_valid());
        assert_eq!(
            unsafe { lyra_image_get_pixel(image, 1, 1, &mut error) },
            LyraColor::rgba(255, 255, 0, 255)
        );
        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }

    #[test]
    fn load_from_stream_matches_memory() {
        let png = test_png_bytes();
        let mut src = MemSource::new(png);
        let table = MemSource::table(&mut src);

        let mut error = LyraError::ok();
        let image = unsafe { lyra_image_create_from_stream(&table, &mut error) };
        assert!(image.is_valid());
        assert_eq!(
            unsafe { lyra_image_get_pixel(image, 0, 0, &mut error) },
            LyraColor::rgba(255, 0, 0, 255)
        );
        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }

    #[test]
    fn erroring_stream_fails_the_load() {
        let mut src = MemSource::new(test_png_bytes());
        src.fail_reads = true;
        let table = MemSource::table(&mut src);

        let mut error = LyraError::ok();
        let image = unsafe { lyra_image_create_from_stream(&table, &mut error) };
        assert!(!image.is_valid());
        assert_ne!(error.code, LyraErrorCode::Ok);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn zero_length_memory_fails() {
        let data = [0u8; 1];
        let mut error = LyraError::ok();
        let image = unsafe { lyra_image_create_from_memory(data.as_ptr(), 0, &mut error) };
        assert!(!image.is_valid());
        assert_ne!(error.code, LyraErrorCode::Ok);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn out_of_range_pixel_is_rejected() {
        let mut error = LyraError::ok();
        let image = unsafe {
            lyra_image_create(LyraVec2u { x: 2, y: 2 }, LyraColor::default(), &mut error)
        };
        unsafe { lyra_image_get_pixel(image, 5, 0, &mut error) };
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };
        assert!(unsafe { lyra_image_destroy(image, &mut error) });
    }
}
