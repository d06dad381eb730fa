//! Textures: pixel stores with sampling attributes.
//!
//! A texture here is the CPU-side container consumers upload to whatever
//! rendering backend they use; rendering itself is out of scope. The
//! `smooth`/`repeated` flags travel with the pixels so an uploader can
//! honor them.

use std::io::BufReader;
use std::os::raw::c_char;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{ImageReader, RgbaImage};
use parking_lot::Mutex;

use crate::error::LyraError;
use crate::handle::{Registry, RemoveError, define_handle};
use crate::image::LyraImage;
use crate::stream::{CallbackStream, LyraInputStream};
use crate::types::{LyraIntRect, LyraVec2u};
use crate::util::{cstr_to_path, set_error, set_ok};

/// Backend-independent cap on texture dimensions.
const MAXIMUM_SIZE: u32 = 16384;

pub(crate) struct TextureData {
    pixels: Mutex<RgbaImage>,
    smooth: AtomicBool,
    repeated: AtomicBool,
}

static TEXTURES: Registry<TextureData> = Registry::new();

define_handle!(
    /// Handle to a texture.
    LyraTexture
);

fn get(handle: LyraTexture) -> Option<Arc<TextureData>> {
    TEXTURES.get(handle.raw())
}

fn insert(pixels: RgbaImage) -> LyraTexture {
    LyraTexture::from_raw(TEXTURES.insert(TextureData {
        pixels: Mutex::new(pixels),
        smooth: AtomicBool::new(false),
        repeated: AtomicBool::new(false),
    }))
}

/// Crop a loaded image to the requested area, or keep it whole when `area`
/// is NULL or empty.
fn apply_area(img: RgbaImage, area: *const LyraIntRect) -> Result<RgbaImage, LyraError> {
    let area = match unsafe { area.as_ref() } {
        Some(a) if a.width > 0 && a.height > 0 => *a,
        _ => return Ok(img),
    };

    if area.left < 0
        || area.top < 0
        || (area.left + area.width) as u32 > img.width()
        || (area.top + area.height) as u32 > img.height()
    {
        return Err(LyraError::invalid_argument("texture area out of image bounds"));
    }

    Ok(image::imageops::crop_imm(
        &img,
        area.left as u32,
        area.top as u32,
        area.width as u32,
        area.height as u32,
    )
    .to_image())
}

fn check_size(width: u32, height: u32) -> Result<(), LyraError> {
    if width == 0 || height == 0 || width > MAXIMUM_SIZE || height > MAXIMUM_SIZE {
        return Err(LyraError::invalid_argument(format!(
            "texture size {width}x{height} outside 1..={MAXIMUM_SIZE}"
        )));
    }
    Ok(())
}

/// Create an empty (transparent) texture.
///
/// # Returns
///
/// Handle on success, the invalid handle on failure.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_texture_destroy()`.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_create(
    width: u32,
    height: u32,
    error: *mut LyraError,
) -> LyraTexture {
    if let Err(e) = check_size(width, height) {
        return unsafe { set_error(error, e) };
    }
    unsafe { set_ok(error) };
    insert(RgbaImage::new(width, height))
}

/// Load a texture from an image file, optionally restricted to an area.
///
/// # Parameters
///
/// - `path`: Filesystem path (UTF-8 encoded, null-terminated)
/// - `area`: Sub-rectangle to load, or NULL for the whole image
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string or NULL
/// - `area` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_create_from_file(
    path: *const c_char,
    area: *const LyraIntRect,
    error: *mut LyraError,
) -> LyraTexture {
    let path = match unsafe { cstr_to_path(path) } {
        Ok(p) => p,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let img = match image::open(&path) {
        Ok(i) => i.to_rgba8(),
        Err(e) => {
            tracing::debug!("texture load failed: {}: {e}", path.display());
            return unsafe { set_error(error, e.into()) };
        }
    };

    match apply_area(img, area) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Load a texture from an encoded memory block.
///
/// # Safety
///
/// - `data` must point to `size` readable bytes
/// - `area` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_create_from_memory(
    data: *const u8,
    size: usize,
    area: *const LyraIntRect,
    error: *mut LyraError,
) -> LyraTexture {
    if data.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("data")) };
    }

    let bytes = unsafe { std::slice::from_raw_parts(data, size) };
    let img = match image::load_from_memory(bytes) {
        Ok(i) => i.to_rgba8(),
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    match apply_area(img, area) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Load a texture from a caller-supplied stream.
///
/// The stream callbacks are only invoked for the duration of this call.
///
/// # Safety
///
/// - `stream` must point to a valid table whose callbacks stay callable for
///   the duration of the call
/// - `area` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_create_from_stream(
    stream: *const LyraInputStream,
    area: *const LyraIntRect,
    error: *mut LyraError,
) -> LyraTexture {
    let adapter = match unsafe { CallbackStream::new(stream) } {
        Ok(s) => s,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let reader = match ImageReader::new(BufReader::new(adapter)).with_guessed_format() {
        Ok(r) => r,
        Err(e) => return unsafe { set_error(error, LyraError::from_io_error(e)) },
    };
    let img = match reader.decode() {
        Ok(i) => i.to_rgba8(),
        Err(e) => return unsafe { set_error(error, e.into()) },
    };

    match apply_area(img, area) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Create a texture from an existing image handle.
///
/// # Safety
///
/// - `area` must be a valid pointer or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_create_from_image(
    image: LyraImage,
    area: *const LyraIntRect,
    error: *mut LyraError,
) -> LyraTexture {
    let data = match crate::image::get(image) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    match apply_area(data.clone_pixels(), area) {
        Ok(img) => {
            unsafe { set_ok(error) };
            insert(img)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Duplicate a texture into a new handle.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_copy(
    texture: LyraTexture,
    error: *mut LyraError,
) -> LyraTexture {
    let data = match get(texture) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    unsafe { set_ok(error) };
    let copy = insert(data.pixels.lock().clone());
    if let Some(new_data) = get(copy) {
        new_data
            .smooth
            .store(data.smooth.load(Ordering::Relaxed), Ordering::Relaxed);
        new_data
            .repeated
            .store(data.repeated.load(Ordering::Relaxed), Ordering::Relaxed);
    }
    copy
}

/// Destroy a texture.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_destroy(
    texture: LyraTexture,
    error: *mut LyraError,
) -> bool {
    match TEXTURES.remove(texture.raw()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(RemoveError::Invalid) => unsafe { set_error(error, LyraError::invalid_handle()) },
        Err(RemoveError::Busy) => unsafe { set_error(error, LyraError::resource_busy("texture")) },
    }
}

/// Get the texture dimensions in pixels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_get_size(
    texture: LyraTexture,
    error: *mut LyraError,
) -> LyraVec2u {
    match get(texture) {
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

/// Overwrite a region of the texture with raw RGBA pixels.
///
/// # Parameters
///
/// - `texture`: Valid texture handle
/// - `pixels`: `width * height * 4` bytes of RGBA data
/// - `width`, `height`: Region size in pixels
/// - `x`, `y`: Region origin inside the texture
/// - `error`: Out-parameter for error information
///
/// # Safety
///
/// - `pixels` must point to `width * height * 4` readable bytes
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_update_from_pixels(
    texture: LyraTexture,
    pixels: *const u8,
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    error: *mut LyraError,
) -> bool {
    let data = match get(texture) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    if pixels.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("pixels")) };
    }

    let mut target = data.pixels.lock();
    if x as u64 + width as u64 > target.width() as u64
        || y as u64 + height as u64 > target.height() as u64
    {
        return unsafe {
            set_error(error, LyraError::invalid_argument("update region out of texture bounds"))
        };
    }

    let src = unsafe { std::slice::from_raw_parts(pixels, width as usize * height as usize * 4) };
    for row in 0..height {
        for col in 0..width {
            let offset = ((row * width + col) * 4) as usize;
            target.put_pixel(
                x + col,
                y + row,
                image::Rgba([src[offset], src[offset + 1], src[offset + 2], src[offset + 3]]),
            );
        }
    }
    unsafe { set_ok(error) };
    true
}

/// Overwrite a region of the texture with an image's pixels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_update_from_image(
    texture: LyraTexture,
    image: LyraImage,
    x: u32,
    y: u32,
    error: *mut LyraError,
) -> bool {
    let data = match get(texture) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };
    let source = match crate::image::get(image) {
        Some(d) => d,
        None => return unsafe { set_error(error, LyraError::invalid_handle()) },
    };

    let src = source.clone_pixels();
    let mut target = data.pixels.lock();
    if x as u64 + src.width() as u64 > target.width() as u64
        || y as u64 + src.height() as u64 > target.height() as u64
    {
        return unsafe {
            set_error(error, LyraError::invalid_argument("update region out of texture bounds"))
        };
    }

    image::imageops::replace(&mut *target, &src, x as i64, y as i64);
    unsafe { set_ok(error) };
    true
}

/// Copy the texture contents into a new image handle.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_copy_to_image(
    texture: LyraTexture,
    error: *mut LyraError,
) -> LyraImage {
    match get(texture) {
        Some(d) => {
            unsafe { set_ok(error) };
            crate::image::insert(d.pixels.lock().clone())
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Enable or disable smooth filtering.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_set_smooth(
    texture: LyraTexture,
    smooth: bool,
    error: *mut LyraError,
) -> bool {
    match get(texture) {
        Some(d) => {
            d.smooth.store(smooth, Ordering::Relaxed);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether smooth filtering is enabled.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_is_smooth(
    texture: LyraTexture,
    error: *mut LyraError,
) -> bool {
    match get(texture) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.smooth.load(Ordering::Relaxed)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Enable or disable repeated (wrapping) sampling.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_set_repeated(
    texture: LyraTexture,
    repeated: bool,
    error: *mut LyraError,
) -> bool {
    match get(texture) {
        Some(d) => {
            d.repeated.store(repeated, Ordering::Relaxed);
            unsafe { set_ok(error) };
            true
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Whether repeated sampling is enabled.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_texture_is_repeated(
    texture: LyraTexture,
    error: *mut LyraError,
) -> bool {
    match get(texture) {
        Some(d) => {
            unsafe { set_ok(error) };
            d.repeated.load(Ordering::Relaxed)
        }
        None => unsafe { set_error(error, LyraError::invalid_handle()) },
    }
}

/// Maximum texture dimension accepted by the library.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_texture_get_maximum_size() -> u32 {
    MAXIMUM_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyraErrorCode;
    use crate::types::LyraColor;

    #[test]
    fn pixel_upload_survives_copy_to_image() {
        let pixels: [u8; 16] = [
            255, 0, 0, 255, 0, 255, 0, 255, //
            0, 0, 255, 255, 255, 255, 0, 255,
        ];
        let mut error = LyraError::ok();
        let texture = unsafe { lyra_texture_create(2, 2, &mut error) };
        assert!(texture.is_valid());
        assert!(unsafe {
            lyra_texture_update_from_pixels(texture, pixels.as_ptr(), 2, 2, 0, 0, &mut error)
        });

        let image = unsafe { lyra_texture_copy_to_image(texture, &mut error) };
        assert!(image.is_valid());
        assert_eq!(
            unsafe { crate::image::lyra_image_get_pixel(image, 1, 1, &mut error) },
            LyraColor::rgba(255, 255, 0, 255)
        );

        assert!(unsafe { crate::image::lyra_image_destroy(image, &mut error) });
        assert!(unsafe { lyra_texture_destroy(texture, &mut error) });
    }

    #[test]
    fn create_from_image_with_area() {
        let png = crate::image::test_support::test_png_bytes();
        let mut error = LyraError::ok();
        let image =
            unsafe { crate::image::lyra_image_create_from_memory(png.as_ptr(), png.len(), &mut error) };

        let area = LyraIntRect {
            left: 1,
            top: 1,
            width: 1,
            height: 1,
        };
        let texture = unsafe { lyra_texture_create_from_image(image, &area, &mut error) };
        assert!(texture.is_valid());

        let size = unsafe { lyra_texture_get_size(texture, &mut error) };
        assert_eq!((size.x, size.y), (1, 1));

        let copied = unsafe { lyra_texture_copy_to_image(texture, &mut error) };
        assert_eq!(
            unsafe { crate::image::lyra_image_get_pixel(copied, 0, 0, &mut error) },
            LyraColor::rgba(255, 255, 0, 255)
        );

        assert!(unsafe { crate::image::lyra_image_destroy(copied, &mut error) });
        assert!(unsafe { crate::image::lyra_image_destroy(image, &mut error) });
        assert!(unsafe { lyra_texture_destroy(texture, &mut error) });
    }

    #[test]
    fn out_of_bounds_area_is_rejected() {
        let png = crate::image::test_support::test_png_bytes();
        let area = LyraIntRect {
            left: 1,
            top: 1,
            width: 5,
            height: 5,
        };
        let mut error = LyraError::ok();
        let texture =
            unsafe { lyra_texture_create_from_memory(png.as_ptr(), png.len(), &area, &mut error) };
        assert!(!texture.is_valid());
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn zero_size_texture_is_rejected() {
        let mut error = LyraError::ok();
        let texture = unsafe { lyra_texture_create(0, 4, &mut error) };
        assert!(!texture.is_valid());
        assert_eq!(error.code, LyraErrorCode::InvalidArgument);
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    fn smooth_and_repeated_flags_round_trip() {
        let mut error = LyraError::ok();
        let texture = unsafe { lyra_texture_create(4, 4, &mut error) };

        assert!(!unsafe { lyra_texture_is_smooth(texture, &mut error) });
        assert!(unsafe { lyra_texture_set_smooth(texture, true, &mut error) });
        assert!(unsafe { lyra_texture_is_smooth(texture, &mut error) });

        assert!(unsafe { lyra_texture_set_repeated(texture, true, &mut error) });
        let copy = unsafe { lyra_texture_copy(texture, &mut error) };
        assert!(unsafe { lyra_texture_is_smooth(copy, &mut error) });
        assert!(unsafe { lyra_texture_is_repeated(copy, &mut error) });

        assert!(unsafe { lyra_texture_destroy(copy, &mut error) });
        assert!(unsafe { lyra_texture_destroy(texture, &mut error) });
        assert!(lyra_texture_get_maximum_size() >= 4096);
    }
}
