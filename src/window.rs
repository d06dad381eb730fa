//! Windows: a poll-style surface over the engine's event loop.
//!
//! winit owns the event loop and delivers events through callbacks; this
//! module pumps it with a zero timeout from each binding call, so the C
//! side keeps the familiar create/poll/destroy shape and nothing blocks.
//!
//! Event loops are thread-bound. All window functions must be called from
//! the thread that created the first window; other threads get a
//! `WindowThread` error instead of undefined behavior.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::os::raw::c_char;
use std::time::Duration;

use parking_lot::Mutex;
use winit::application::ApplicationHandler;
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseScrollDelta, TouchPhase, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{ModifiersState, PhysicalKey};
use winit::platform::pump_events::EventLoopExtPumpEvents;
use winit::window::{Fullscreen, Window, WindowAttributes, WindowId};

use crate::error::{LyraError, LyraErrorCode};
use crate::event::{Event, LyraEvent, convert_event};
use crate::handle::{RawHandle, define_handle};
use crate::input::{LyraKeyCode, LyraMouseButton, map_key, map_mouse_button};
use crate::types::{LyraVec2i, LyraVec2u};
use crate::util::{cstr_to_string, set_error, set_ok};

/// Window style flags for `lyra_window_create`.
pub const LYRA_WINDOW_STYLE_TITLEBAR: u32 = 1 << 0;
pub const LYRA_WINDOW_STYLE_RESIZE: u32 = 1 << 1;
pub const LYRA_WINDOW_STYLE_CLOSE: u32 = 1 << 2;
pub const LYRA_WINDOW_STYLE_FULLSCREEN: u32 = 1 << 3;
pub const LYRA_WINDOW_STYLE_DEFAULT: u32 =
    LYRA_WINDOW_STYLE_TITLEBAR | LYRA_WINDOW_STYLE_RESIZE | LYRA_WINDOW_STYLE_CLOSE;

/// Requested window dimensions. `bits_per_pixel` is carried for ABI
/// completeness; the engine always renders at the display depth.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LyraVideoMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

define_handle!(
    /// Handle to a window.
    LyraWindow
);

/// Real-time input snapshot, updated by the pump.
pub(crate) struct InputState {
    pub keys_down: HashSet<LyraKeyCode>,
    pub buttons_down: HashSet<LyraMouseButton>,
    pub mouse_position: (i32, i32),
}

struct WindowSlot {
    generation: u32,
    window: Option<Window>,
    events: VecDeque<Event>,
    open: bool,
}

struct PendingCreate {
    slot: u32,
    attrs: WindowAttributes,
}

struct App {
    slots: Vec<WindowSlot>,
    free: Vec<u32>,
    pending: Vec<PendingCreate>,
    modifiers: ModifiersState,
    input: InputState,
}

struct WindowService {
    event_loop: EventLoop<()>,
    app: App,
}

thread_local! {
    static SERVICE: RefCell<Option<WindowService>> = const { RefCell::new(None) };
}

// The thread that created the first window; every other thread is rejected.
static WINDOW_THREAD: Mutex<Option<std::thread::ThreadId>> = Mutex::new(None);

impl App {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            pending: Vec::new(),
            modifiers: ModifiersState::empty(),
            input: InputState {
                keys_down: HashSet::new(),
                buttons_down: HashSet::new(),
                mouse_position: (0, 0),
            },
        }
    }

    fn allocate_slot(&mut self) -> RawHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.events.clear();
            slot.open = false;
            RawHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(WindowSlot {
                generation: 1,
                window: None,
                events: VecDeque::new(),
                open: false,
            });
            RawHandle {
                index,
                generation: 1,
            }
        }
    }

    fn slot(&mut self, raw: RawHandle) -> Option<&mut WindowSlot> {
        let slot = self.slots.get_mut(raw.index as usize)?;
        (slot.generation == raw.generation).then_some(slot)
    }

    fn slot_by_window(&mut self, id: WindowId) -> Option<&mut WindowSlot> {
        self.slots
            .iter_mut()
            .find(|s| s.window.as_ref().map(Window::id) == Some(id))
    }

    fn service_pending(&mut self, event_loop: &ActiveEventLoop) {
        for request in self.pending.drain(..) {
            match event_loop.create_window(request.attrs) {
                Ok(window) => {
                    if let Some(slot) = self.slots.get_mut(request.slot as usize) {
                        slot.window = Some(window);
                        slot.open = true;
                    }
                }
                Err(e) => {
                    tracing::warn!("window creation failed: {e}");
                }
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        self.service_pending(event_loop);
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.service_pending(event_loop);
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let modifiers = self.modifiers;
        if let WindowEvent::ModifiersChanged(new) = &event {
            self.modifiers = new.state();
            return;
        }

        let input = &mut self.input;
        let mut queued: Option<Event> = None;
        let mut text: Option<Event> = None;

        match event {
            WindowEvent::CloseRequested => queued = Some(Event::Closed),
            WindowEvent::Resized(size) => {
                queued = Some(Event::Resized {
                    width: size.width,
                    height: size.height,
                })
            }
            WindowEvent::Focused(true) => queued = Some(Event::FocusGained),
            WindowEvent::Focused(false) => queued = Some(Event::FocusLost),
            WindowEvent::KeyboardInput { event, .. } => {
                let code = match event.physical_key {
                    PhysicalKey::Code(code) => map_key(code),
                    _ => LyraKeyCode::Unknown,
                };
                let (alt, control, shift, system) = (
                    modifiers.alt_key(),
                    modifiers.control_key(),
                    modifiers.shift_key(),
                    modifiers.super_key(),
                );
                match event.state {
                    ElementState::Pressed => {
                        input.keys_down.insert(code);
                        queued = Some(Event::KeyPressed { code, alt, control, shift, system });
                        if let Some(t) = event.text.as_ref().and_then(|t| t.chars().next()) {
                            text = Some(Event::TextEntered { unicode: t as u32 });
                        }
                    }
                    ElementState::Released => {
                        input.keys_down.remove(&code);
                        queued = Some(Event::KeyReleased { code, alt, control, shift, system });
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                input.mouse_position = (position.x as i32, position.y as i32);
                queued = Some(Event::MouseMoved {
                    x: position.x as i32,
                    y: position.y as i32,
                });
            }
            WindowEvent::CursorEntered { .. } => queued = Some(Event::MouseEntered),
            WindowEvent::CursorLeft { .. } => queued = Some(Event::MouseLeft),
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    // Pixel deltas normalized at 20 px per line.
                    MouseScrollDelta::PixelDelta(p) => (p.y / 20.0) as f32,
                };
                queued = Some(Event::MouseWheelScrolled {
                    delta: lines,
                    x: input.mouse_position.0,
                    y: input.mouse_position.1,
                });
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = map_mouse_button(button) {
                    let (x, y) = input.mouse_position;
                    match state {
                        ElementState::Pressed => {
                            input.buttons_down.insert(button);
                            queued = Some(Event::MouseButtonPressed { button, x, y });
                        }
                        ElementState::Released => {
                            input.buttons_down.remove(&button);
                            queued = Some(Event::MouseButtonReleased { button, x, y });
                        }
                    }
                }
            }
            WindowEvent::Touch(touch) => {
                let x = touch.location.x as i32;
                let y = touch.location.y as i32;
                let finger = touch.id;
                queued = Some(match touch.phase {
                    TouchPhase::Started => Event::TouchBegan { finger, x, y },
                    TouchPhase::Moved => Event::TouchMoved { finger, x, y },
                    TouchPhase::Ended | TouchPhase::Cancelled => {
                        Event::TouchEnded { finger, x, y }
                    }
                });
            }
            // Events with no counterpart in the flat union are dropped here,
            // before conversion.
            _ => {}
        }

        if let Some(slot) = self.slot_by_window(window_id) {
            if let Some(event) = queued {
                slot.events.push_back(event);
            }
            if let Some(event) = text {
                slot.events.push_back(event);
            }
        }
    }
}

fn wrong_thread_error() -> LyraError {
    LyraError::new(
        LyraErrorCode::WindowThread,
        "window functions must be called from the thread that created the first window",
    )
}

/// Run `f` against the thread-local window service.
fn with_service<R>(
    f: impl FnOnce(&mut WindowService) -> Result<R, LyraError>,
) -> Result<R, LyraError> {
    let current = std::thread::current().id();
    if let Some(owner) = *WINDOW_THREAD.lock() {
        if owner != current {
            return Err(wrong_thread_error());
        }
    }

    SERVICE.with(|cell| match cell.borrow_mut().as_mut() {
        Some(service) => f(service),
        None => Err(LyraError::invalid_handle()),
    })
}

fn pump(service: &mut WindowService) {
    let _ = service
        .event_loop
        .pump_app_events(Some(Duration::ZERO), &mut service.app);
}

/// Read the input snapshot; None when this thread owns no windows.
pub(crate) fn with_input_state<R>(f: impl FnOnce(&InputState) -> R) -> Option<R> {
    SERVICE
        .try_with(|cell| cell.borrow().as_ref().map(|svc| f(&svc.app.input)))
        .ok()
        .flatten()
}

/// Open a window.
///
/// The first call binds window handling to the calling thread; subsequent
/// calls from other threads fail with `WindowThread`. On some platforms the
/// event loop must live on the main thread.
///
/// # Parameters
///
/// - `mode`: Requested size
/// - `title`: Window title (UTF-8 encoded, null-terminated)
/// - `style`: Bitwise OR of `LYRA_WINDOW_STYLE_*` flags
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// Handle on success, the invalid handle on failure.
///
/// # Ownership
///
/// Caller owns the returned handle. Must call `lyra_window_destroy()`.
///
/// # Safety
///
/// - `title` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_create(
    mode: LyraVideoMode,
    title: *const c_char,
    style: u32,
    error: *mut LyraError,
) -> LyraWindow {
    let title = match unsafe { cstr_to_string(title, "title") } {
        Ok(t) => t,
        Err(e) => return unsafe { set_error(error, e) },
    };

    let current = std::thread::current().id();
    {
        let mut owner = WINDOW_THREAD.lock();
        match *owner {
            Some(t) if t != current => return unsafe { set_error(error, wrong_thread_error()) },
            _ => *owner = Some(current),
        }
    }

    let result = SERVICE.with(|cell| {
        let mut borrow = cell.borrow_mut();
        if borrow.is_none() {
            let event_loop = EventLoop::new().map_err(|e| {
                LyraError::new(LyraErrorCode::EventLoop, format!("event loop creation failed: {e}"))
            })?;
            *borrow = Some(WindowService {
                event_loop,
                app: App::new(),
            });
        }
        let service = borrow.as_mut().expect("service was just initialized");

        let mut attrs = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(mode.width.max(1), mode.height.max(1)))
            .with_decorations(style & (LYRA_WINDOW_STYLE_TITLEBAR | LYRA_WINDOW_STYLE_CLOSE) != 0)
            .with_resizable(style & LYRA_WINDOW_STYLE_RESIZE != 0);
        if style & LYRA_WINDOW_STYLE_FULLSCREEN != 0 {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let raw = service.app.allocate_slot();
        service.app.pending.push(PendingCreate {
            slot: raw.index,
            attrs,
        });
        pump(service);

        let created = service
            .app
            .slot(raw)
            .map(|slot| slot.window.is_some())
            .unwrap_or(false);
        if created {
            Ok(raw)
        } else {
            // Release the slot; creation was refused by the platform.
            if let Some(slot) = service.app.slot(raw) {
                slot.generation = slot.generation.wrapping_add(1).max(1);
            }
            service.app.free.push(raw.index);
            Err(LyraError::new(
                LyraErrorCode::WindowCreate,
                "the platform refused to create the window",
            ))
        }
    });

    match result {
        Ok(raw) => {
            unsafe { set_ok(error) };
            LyraWindow::from_raw(raw)
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Destroy a window handle, closing the window if still open.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_destroy(window: LyraWindow, error: *mut LyraError) -> bool {
    let result = with_service(|service| {
        let raw = window.raw();
        let slot = service.app.slot(raw).ok_or_else(LyraError::invalid_handle)?;
        slot.window = None;
        slot.open = false;
        slot.events.clear();
        slot.generation = slot.generation.wrapping_add(1).max(1);
        service.app.free.push(raw.index);
        Ok(())
    });

    match result {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Whether the window is open (not yet closed).
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_is_open(window: LyraWindow, error: *mut LyraError) -> bool {
    let result = with_service(|service| {
        service
            .app
            .slot(window.raw())
            .map(|slot| slot.open)
            .ok_or_else(LyraError::invalid_handle)
    });

    match result {
        Ok(open) => {
            unsafe { set_ok(error) };
            open
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Close the window. The handle stays valid until destroyed.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_close(window: LyraWindow, error: *mut LyraError) -> bool {
    let result = with_service(|service| {
        let slot = service
            .app
            .slot(window.raw())
            .ok_or_else(LyraError::invalid_handle)?;
        slot.window = None;
        slot.open = false;
        Ok(())
    });

    match result {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Pop the next pending event.
///
/// Pumps the event loop with a zero timeout, so this never blocks.
///
/// # Parameters
///
/// - `window`: Valid window handle
/// - `event`: Out-parameter receiving the converted event
/// - `error`: Out-parameter for error information
///
/// # Returns
///
/// `true` if an event was written to `event`.
///
/// # Safety
///
/// - `event` must be a valid pointer
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_poll_event(
    window: LyraWindow,
    event: *mut LyraEvent,
    error: *mut LyraError,
) -> bool {
    if event.is_null() {
        return unsafe { set_error(error, LyraError::null_pointer("event")) };
    }

    let result = with_service(|service| {
        pump(service);
        let slot = service
            .app
            .slot(window.raw())
            .ok_or_else(LyraError::invalid_handle)?;
        Ok(slot.events.pop_front())
    });

    match result {
        Ok(Some(engine_event)) => {
            unsafe { *event = convert_event(&engine_event) };
            unsafe { set_ok(error) };
            true
        }
        Ok(None) => {
            unsafe { set_ok(error) };
            false
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

fn with_open_window<R>(
    window: LyraWindow,
    f: impl FnOnce(&Window) -> R,
) -> Result<R, LyraError> {
    with_service(|service| {
        let slot = service
            .app
            .slot(window.raw())
            .ok_or_else(LyraError::invalid_handle)?;
        match &slot.window {
            Some(w) => Ok(f(w)),
            None => Err(LyraError::invalid_argument("window is closed")),
        }
    })
}

/// Get the window's inner size in pixels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_get_size(
    window: LyraWindow,
    error: *mut LyraError,
) -> LyraVec2u {
    match with_open_window(window, |w| {
        let size = w.inner_size();
        LyraVec2u {
            x: size.width,
            y: size.height,
        }
    }) {
        Ok(size) => {
            unsafe { set_ok(error) };
            size
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Request a new inner size in pixels.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_set_size(
    window: LyraWindow,
    size: LyraVec2u,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| {
        let _ = w.request_inner_size(PhysicalSize::new(size.x.max(1), size.y.max(1)));
    }) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Get the window position on the desktop.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_get_position(
    window: LyraWindow,
    error: *mut LyraError,
) -> LyraVec2i {
    match with_open_window(window, |w| {
        w.outer_position()
            .map(|p| LyraVec2i { x: p.x, y: p.y })
            .unwrap_or_default()
    }) {
        Ok(pos) => {
            unsafe { set_ok(error) };
            pos
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Move the window on the desktop.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_set_position(
    window: LyraWindow,
    position: LyraVec2i,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| {
        w.set_outer_position(PhysicalPosition::new(position.x, position.y));
    }) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Change the window title.
///
/// # Safety
///
/// - `title` must be a valid null-terminated UTF-8 string or NULL
/// - `error` must be a valid pointer or NULL
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_set_title(
    window: LyraWindow,
    title: *const c_char,
    error: *mut LyraError,
) -> bool {
    let title = match unsafe { cstr_to_string(title, "title") } {
        Ok(t) => t,
        Err(e) => return unsafe { set_error(error, e) },
    };

    match with_open_window(window, |w| w.set_title(&title)) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Show or hide the window.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_set_visible(
    window: LyraWindow,
    visible: bool,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| w.set_visible(visible)) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Show or hide the mouse cursor over the window.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_set_mouse_cursor_visible(
    window: LyraWindow,
    visible: bool,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| w.set_cursor_visible(visible)) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Ask the platform to focus the window.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_request_focus(
    window: LyraWindow,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| w.focus_window()) {
        Ok(()) => {
            unsafe { set_ok(error) };
            true
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

/// Whether the window has input focus.
///
/// # Safety
///
/// `error` must be a valid pointer or NULL.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn lyra_window_has_focus(
    window: LyraWindow,
    error: *mut LyraError,
) -> bool {
    match with_open_window(window, |w| w.has_focus()) {
        Ok(focus) => {
            unsafe { set_ok(error) };
            focus
        }
        Err(e) => unsafe { set_error(error, e) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_defaults_are_stable() {
        assert_eq!(LYRA_WINDOW_STYLE_DEFAULT, 0b111);
        assert_eq!(LYRA_WINDOW_STYLE_FULLSCREEN, 8);
    }

    #[test]
    fn handles_are_invalid_without_a_service() {
        // Taken on a thread that never created a window.
        let mut error = LyraError::ok();
        let bogus = LyraWindow::invalid();
        assert!(!unsafe { lyra_window_is_open(bogus, &mut error) });
        unsafe { crate::error::lyra_error_free(&mut error) };
    }

    #[test]
    #[ignore = "requires a display and the main thread"]
    fn create_poll_destroy() {
        let title = std::ffi::CString::new("lyra test window").unwrap();
        let mut error = LyraError::ok();
        let window = unsafe {
            lyra_window_create(
                LyraVideoMode {
                    width: 320,
                    height: 200,
                    bits_per_pixel: 32,
                },
                title.as_ptr(),
                LYRA_WINDOW_STYLE_DEFAULT,
                &mut error,
            )
        };
        assert!(window.is_valid());
        assert!(unsafe { lyra_window_is_open(window, &mut error) });

        let mut event = std::mem::MaybeUninit::<LyraEvent>::uninit();
        while unsafe { lyra_window_poll_event(window, event.as_mut_ptr(), &mut error) } {}

        assert!(unsafe { lyra_window_destroy(window, &mut error) });
    }
}
