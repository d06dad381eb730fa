//! C value structs mirrored across the ABI.
//!
//! All types here are fixed-layout, identity-free aggregates passed and
//! returned by value, with lossless conversion to and from the engine-side
//! representations (`std::time::Duration`, `image::Rgba`, winit physical
//! sizes/positions).

use std::time::Duration;

/// 2D vector of `f32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LyraVec2 {
    pub x: f32,
    pub y: f32,
}

/// 2D vector of `i32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyraVec2i {
    pub x: i32,
    pub y: i32,
}

/// 2D vector of `u32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyraVec2u {
    pub x: u32,
    pub y: u32,
}

/// 3D vector of `f32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LyraVec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// RGBA color, 8 bits per channel.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyraColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl LyraColor {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

#[cfg(feature = "graphics")]
impl From<image::Rgba<u8>> for LyraColor {
    fn from(p: image::Rgba<u8>) -> Self {
        Self {
            r: p.0[0],
            g: p.0[1],
            b: p.0[2],
            a: p.0[3],
        }
    }
}

#[cfg(feature = "graphics")]
impl From<LyraColor> for image::Rgba<u8> {
    fn from(c: LyraColor) -> Self {
        image::Rgba([c.r, c.g, c.b, c.a])
    }
}

/// Axis-aligned rectangle of `f32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LyraRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned rectangle of `i32`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyraIntRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// Time value with microsecond resolution. Negative values are valid as
/// relative offsets; conversion into `Duration` clamps at zero.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LyraTime {
    pub microseconds: i64,
}

impl LyraTime {
    pub const ZERO: LyraTime = LyraTime { microseconds: 0 };

    pub(crate) fn to_duration(self) -> Duration {
        Duration::from_micros(self.microseconds.max(0) as u64)
    }

    pub(crate) fn from_duration(d: Duration) -> Self {
        Self {
            microseconds: d.as_micros().min(i64::MAX as u128) as i64,
        }
    }
}

/// Half-open time window, used for music loop points.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyraTimeSpan {
    /// Start of the window.
    pub offset: LyraTime,
    /// Length of the window.
    pub length: LyraTime,
}

/// Directional attenuation cone for spatialized sound sources.
///
/// Angles are in degrees; `outer_gain` is the multiplier applied outside
/// the outer angle.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LyraCone {
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub outer_gain: f32,
}

impl Default for LyraCone {
    fn default() -> Self {
        Self {
            inner_angle: 360.0,
            outer_angle: 360.0,
            outer_gain: 1.0,
        }
    }
}

// Rectangles are stored unnormalized; comparisons work on the normalized
// extent so negative width/height behaves like the mirrored rectangle.
fn normalize(pos: f32, len: f32) -> (f32, f32) {
    if len < 0.0 { (pos + len, -len) } else { (pos, len) }
}

fn normalize_i(pos: i32, len: i32) -> (i32, i32) {
    if len < 0 { (pos + len, -len) } else { (pos, len) }
}

/// Check whether a point is inside a rectangle.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_rect_contains(rect: LyraRect, point: LyraVec2) -> bool {
    let (left, width) = normalize(rect.left, rect.width);
    let (top, height) = normalize(rect.top, rect.height);
    point.x >= left && point.x < left + width && point.y >= top && point.y < top + height
}

/// Check whether a point is inside an integer rectangle.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_int_rect_contains(rect: LyraIntRect, point: LyraVec2i) -> bool {
    let (left, width) = normalize_i(rect.left, rect.width);
    let (top, height) = normalize_i(rect.top, rect.height);
    point.x >= left && point.x < left + width && point.y >= top && point.y < top + height
}

/// Compute the intersection of two rectangles.
///
/// # Parameters
///
/// - `a`, `b`: Rectangles to intersect
/// - `intersection`: Out-parameter for the overlapping area (may be NULL
///   if only the boolean result is needed)
///
/// # Returns
///
/// `true` if the rectangles overlap.
///
/// # Safety
///
/// `intersection` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_rect_intersection(
    a: LyraRect,
    b: LyraRect,
    intersection: *mut LyraRect,
) -> bool {
    let (a_left, a_width) = normalize(a.left, a.width);
    let (a_top, a_height) = normalize(a.top, a.height);
    let (b_left, b_width) = normalize(b.left, b.width);
    let (b_top, b_height) = normalize(b.top, b.height);

    let left = a_left.max(b_left);
    let top = a_top.max(b_top);
    let right = (a_left + a_width).min(b_left + b_width);
    let bottom = (a_top + a_height).min(b_top + b_height);

    if left < right && top < bottom {
        if let Some(out) = unsafe { intersection.as_mut() } {
            *out = LyraRect {
                left,
                top,
                width: right - left,
                height: bottom - top,
            };
        }
        true
    } else {
        if let Some(out) = unsafe { intersection.as_mut() } {
            *out = LyraRect::default();
        }
        false
    }
}

/// Construct a time from a number of seconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_from_seconds(seconds: f32) -> LyraTime {
    LyraTime {
        microseconds: (seconds as f64 * 1_000_000.0) as i64,
    }
}

/// Construct a time from a number of milliseconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_from_milliseconds(milliseconds: i32) -> LyraTime {
    LyraTime {
        microseconds: milliseconds as i64 * 1000,
    }
}

/// Construct a time from a number of microseconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_from_microseconds(microseconds: i64) -> LyraTime {
    LyraTime { microseconds }
}

/// Return a time as a number of seconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_as_seconds(time: LyraTime) -> f32 {
    (time.microseconds as f64 / 1_000_000.0) as f32
}

/// Return a time as a number of milliseconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_as_milliseconds(time: LyraTime) -> i32 {
    (time.microseconds / 1000) as i32
}

/// Return a time as a number of microseconds.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_time_as_microseconds(time: LyraTime) -> i64 {
    time.microseconds
}
