//! Window events and their flat C representation.
//!
//! The window pump turns engine events into the internal [`Event`] enum;
//! [`convert_event`] then maps each variant onto the flat tagged union the
//! C side reads. Conversion is pure: exactly one union member is written,
//! the one matching `kind`, and callers must read only that member.

use crate::input::{LyraKeyCode, LyraMouseButton};

/// Engine-side window event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Event {
    Closed,
    Resized { width: u32, height: u32 },
    FocusLost,
    FocusGained,
    TextEntered { unicode: u32 },
    KeyPressed { code: LyraKeyCode, alt: bool, control: bool, shift: bool, system: bool },
    KeyReleased { code: LyraKeyCode, alt: bool, control: bool, shift: bool, system: bool },
    MouseWheelScrolled { delta: f32, x: i32, y: i32 },
    MouseButtonPressed { button: LyraMouseButton, x: i32, y: i32 },
    MouseButtonReleased { button: LyraMouseButton, x: i32, y: i32 },
    MouseMoved { x: i32, y: i32 },
    MouseEntered,
    MouseLeft,
    TouchBegan { finger: u64, x: i32, y: i32 },
    TouchMoved { finger: u64, x: i32, y: i32 },
    TouchEnded { finger: u64, x: i32, y: i32 },
}

/// Event discriminant. Tells the caller which union member is populated.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LyraEventType {
    Closed = 0,
    Resized = 1,
    FocusLost = 2,
    FocusGained = 3,
    TextEntered = 4,
    KeyPressed = 5,
    KeyReleased = 6,
    MouseWheelScrolled = 7,
    MouseButtonPressed = 8,
    MouseButtonReleased = 9,
    MouseMoved = 10,
    MouseEntered = 11,
    MouseLeft = 12,
    TouchBegan = 13,
    TouchMoved = 14,
    TouchEnded = 15,
}

/// Window resize parameters.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LyraSizeEvent {
    pub width: u32,
    pub height: u32,
}

/// Keyboard event parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LyraKeyEvent {
    pub code: LyraKeyCode,
    pub alt: bool,
    pub control: bool,
    pub shift: bool,
    pub system: bool,
}

/// Text input parameters (one UTF-32 code point).
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LyraTextEvent {
    pub unicode: u32,
}

/// Mouse move parameters, in window coordinates.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LyraMouseMoveEvent {
    pub x: i32,
    pub y: i32,
}

/// Mouse button parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LyraMouseButtonEvent {
    pub button: LyraMouseButton,
    pub x: i32,
    pub y: i32,
}

/// Mouse wheel parameters. `delta` is in scroll lines, positive away from
/// the user.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LyraMouseWheelEvent {
    pub delta: f32,
    pub x: i32,
    pub y: i32,
}

/// Touch parameters.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct LyraTouchEvent {
    pub finger: u64,
    pub x: i32,
    pub y: i32,
}

/// Per-kind event parameters. Only the member matching the event's `kind`
/// is populated; the others are unspecified.
#[repr(C)]
#[derive(Clone, Copy)]
pub union LyraEventData {
    pub size: LyraSizeEvent,
    pub key: LyraKeyEvent,
    pub text: LyraTextEvent,
    pub mouse_move: LyraMouseMoveEvent,
    pub mouse_button: LyraMouseButtonEvent,
    pub mouse_wheel: LyraMouseWheelEvent,
    pub touch: LyraTouchEvent,
}

/// Flat tagged union delivered by `lyra_window_poll_event`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LyraEvent {
    pub kind: LyraEventType,
    pub data: LyraEventData,
}

/// Map one engine event onto the flat union. Pure; exactly one branch
/// executes per call.
pub(crate) fn convert_event(event: &Event) -> LyraEvent {
    let mut out = LyraEvent {
        kind: LyraEventType::Closed,
        data: LyraEventData {
            size: LyraSizeEvent::default(),
        },
    };

    match *event {
        Event::Closed => {
            out.kind = LyraEventType::Closed;
        }
        Event::Resized { width, height } => {
            out.kind = LyraEventType::Resized;
            out.data.size = LyraSizeEvent { width, height };
        }
        Event::FocusLost => {
            out.kind = LyraEventType::FocusLost;
        }
        Event::FocusGained => {
            out.kind = LyraEventType::FocusGained;
        }
        Event::TextEntered { unicode } => {
            out.kind = LyraEventType::TextEntered;
            out.data.text = LyraTextEvent { unicode };
        }
        Event::KeyPressed { code, alt, control, shift, system } => {
            out.kind = LyraEventType::KeyPressed;
            out.data.key = LyraKeyEvent { code, alt, control, shift, system };
        }
        Event::KeyReleased { code, alt, control, shift, system } => {
            out.kind = LyraEventType::KeyReleased;
            out.data.key = LyraKeyEvent { code, alt, control, shift, system };
        }
        Event::MouseWheelScrolled { delta, x, y } => {
            out.kind = LyraEventType::MouseWheelScrolled;
            out.data.mouse_wheel = LyraMouseWheelEvent { delta, x, y };
        }
        Event::MouseButtonPressed { button, x, y } => {
            out.kind = LyraEventType::MouseButtonPressed;
            out.data.mouse_button = LyraMouseButtonEvent { button, x, y };
        }
        Event::MouseButtonReleased { button, x, y } => {
            out.kind = LyraEventType::MouseButtonReleased;
            out.data.mouse_button = LyraMouseButtonEvent { button, x, y };
        }
        Event::MouseMoved { x, y } => {
            out.kind = LyraEventType::MouseMoved;
            out.data.mouse_move = LyraMouseMoveEvent { x, y };
        }
        Event::MouseEntered => {
            out.kind = LyraEventType::MouseEntered;
        }
        Event::MouseLeft => {
            out.kind = LyraEventType::MouseLeft;
        }
        Event::TouchBegan { finger, x, y } => {
            out.kind = LyraEventType::TouchBegan;
            out.data.touch = LyraTouchEvent { finger, x, y };
        }
        Event::TouchMoved { finger, x, y } => {
            out.kind = LyraEventType::TouchMoved;
            out.data.touch = LyraTouchEvent { finger, x, y };
        }
        Event::TouchEnded { finger, x, y } => {
            out.kind = LyraEventType::TouchEnded;
            out.data.touch = LyraTouchEvent { finger, x, y };
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_kinds_set_only_the_tag() {
        for (event, kind) in [
            (Event::Closed, LyraEventType::Closed),
            (Event::FocusLost, LyraEventType::FocusLost),
            (Event::FocusGained, LyraEventType::FocusGained),
            (Event::MouseEntered, LyraEventType::MouseEntered),
            (Event::MouseLeft, LyraEventType::MouseLeft),
        ] {
            assert_eq!(convert_event(&event).kind, kind);
        }
    }

    #[test]
    fn resized_populates_size() {
        let out = convert_event(&Event::Resized { width: 640, height: 480 });
        assert_eq!(out.kind, LyraEventType::Resized);
        let size = unsafe { out.data.size };
        assert_eq!((size.width, size.height), (640, 480));
    }

    #[test]
    fn text_populates_unicode() {
        let out = convert_event(&Event::TextEntered { unicode: 0x00E9 });
        assert_eq!(out.kind, LyraEventType::TextEntered);
        assert_eq!(unsafe { out.data.text }.unicode, 0x00E9);
    }

    #[test]
    fn key_events_populate_code_and_modifiers() {
        let pressed = Event::KeyPressed {
            code: LyraKeyCode::F5,
            alt: false,
            control: true,
            shift: false,
            system: false,
        };
        let out = convert_event(&pressed);
        assert_eq!(out.kind, LyraEventType::KeyPressed);
        let key = unsafe { out.data.key };
        assert_eq!(key.code, LyraKeyCode::F5);
        assert!(key.control);
        assert!(!key.alt);

        let released = Event::KeyReleased {
            code: LyraKeyCode::Space,
            alt: true,
            control: false,
            shift: true,
            system: false,
        };
        let out = convert_event(&released);
        assert_eq!(out.kind, LyraEventType::KeyReleased);
        let key = unsafe { out.data.key };
        assert_eq!(key.code, LyraKeyCode::Space);
        assert!(key.alt && key.shift);
    }

    #[test]
    fn wheel_populates_delta_and_position() {
        let out = convert_event(&Event::MouseWheelScrolled { delta: -1.5, x: 10, y: 20 });
        assert_eq!(out.kind, LyraEventType::MouseWheelScrolled);
        let wheel = unsafe { out.data.mouse_wheel };
        assert_eq!(wheel.delta, -1.5);
        assert_eq!((wheel.x, wheel.y), (10, 20));
    }

    #[test]
    fn mouse_button_events_populate_button_and_position() {
        for (event, kind) in [
            (
                Event::MouseButtonPressed { button: LyraMouseButton::Right, x: 3, y: 4 },
                LyraEventType::MouseButtonPressed,
            ),
            (
                Event::MouseButtonReleased { button: LyraMouseButton::Right, x: 3, y: 4 },
                LyraEventType::MouseButtonReleased,
            ),
        ] {
            let out = convert_event(&event);
            assert_eq!(out.kind, kind);
            let button = unsafe { out.data.mouse_button };
            assert_eq!(button.button, LyraMouseButton::Right);
            assert_eq!((button.x, button.y), (3, 4));
        }
    }

    #[test]
    fn mouse_moved_populates_position() {
        let out = convert_event(&Event::MouseMoved { x: -7, y: 9 });
        assert_eq!(out.kind, LyraEventType::MouseMoved);
        let moved = unsafe { out.data.mouse_move };
        assert_eq!((moved.x, moved.y), (-7, 9));
    }

    #[test]
    fn touch_events_populate_finger_and_position() {
        for (event, kind) in [
            (
                Event::TouchBegan { finger: 1, x: 5, y: 6 },
                LyraEventType::TouchBegan,
            ),
            (
                Event::TouchMoved { finger: 1, x: 7, y: 8 },
                LyraEventType::TouchMoved,
            ),
            (
                Event::TouchEnded { finger: 1, x: 9, y: 10 },
                LyraEventType::TouchEnded,
            ),
        ] {
            let out = convert_event(&event);
            assert_eq!(out.kind, kind);
            let touch = unsafe { out.data.touch };
            assert_eq!(touch.finger, 1);
        }
    }

    #[test]
    fn conversion_is_deterministic() {
        let event = Event::Resized { width: 800, height: 600 };
        let a = convert_event(&event);
        let b = convert_event(&event);
        assert_eq!(a.kind, b.kind);
        let (sa, sb) = unsafe { (a.data.size, b.data.size) };
        assert_eq!((sa.width, sa.height), (sb.width, sb.height));
    }
}
