//! Keyboard and mouse types.
//!
//! Discriminants are part of the ABI: they cross the boundary as plain
//! integers and must stay stable.

use winit::keyboard::KeyCode;

/// Key codes. `Unknown` is reported for keys the engine recognizes but the
/// table does not cover.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LyraKeyCode {
    Unknown = -1,
    A = 0,
    B = 1,
    C = 2,
    D = 3,
    E = 4,
    F = 5,
    G = 6,
    H = 7,
    I = 8,
    J = 9,
    K = 10,
    L = 11,
    M = 12,
    N = 13,
    O = 14,
    P = 15,
    Q = 16,
    R = 17,
    S = 18,
    T = 19,
    U = 20,
    V = 21,
    W = 22,
    X = 23,
    Y = 24,
    Z = 25,
    Num0 = 26,
    Num1 = 27,
    Num2 = 28,
    Num3 = 29,
    Num4 = 30,
    Num5 = 31,
    Num6 = 32,
    Num7 = 33,
    Num8 = 34,
    Num9 = 35,
    Escape = 36,
    LControl = 37,
    LShift = 38,
    LAlt = 39,
    LSystem = 40,
    RControl = 41,
    RShift = 42,
    RAlt = 43,
    RSystem = 44,
    Menu = 45,
    LBracket = 46,
    RBracket = 47,
    Semicolon = 48,
    Comma = 49,
    Period = 50,
    Apostrophe = 51,
    Slash = 52,
    Backslash = 53,
    Grave = 54,
    Equal = 55,
    Hyphen = 56,
    Space = 57,
    Enter = 58,
    Backspace = 59,
    Tab = 60,
    PageUp = 61,
    PageDown = 62,
    End = 63,
    Home = 64,
    Insert = 65,
    Delete = 66,
    Add = 67,
    Subtract = 68,
    Multiply = 69,
    Divide = 70,
    Left = 71,
    Right = 72,
    Up = 73,
    Down = 74,
    Numpad0 = 75,
    Numpad1 = 76,
    Numpad2 = 77,
    Numpad3 = 78,
    Numpad4 = 79,
    Numpad5 = 80,
    Numpad6 = 81,
    Numpad7 = 82,
    Numpad8 = 83,
    Numpad9 = 84,
    F1 = 85,
    F2 = 86,
    F3 = 87,
    F4 = 88,
    F5 = 89,
    F6 = 90,
    F7 = 91,
    F8 = 92,
    F9 = 93,
    F10 = 94,
    F11 = 95,
    F12 = 96,
    F13 = 97,
    F14 = 98,
    F15 = 99,
    Pause = 100,
}

/// Mouse buttons.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LyraMouseButton {
    Left = 0,
    Right = 1,
    Middle = 2,
    Extra1 = 3,
    Extra2 = 4,
}

/// Map an engine key code onto the ABI table.
pub(crate) fn map_key(code: KeyCode) -> LyraKeyCode {
    use LyraKeyCode as K;
    match code {
        KeyCode::KeyA => K::A,
        KeyCode::KeyB => K::B,
        KeyCode::KeyC => K::C,
        KeyCode::KeyD => K::D,
        KeyCode::KeyE => K::E,
        KeyCode::KeyF => K::F,
        KeyCode::KeyG => K::G,
        KeyCode::KeyH => K::H,
        KeyCode::KeyI => K::I,
        KeyCode::KeyJ => K::J,
        KeyCode::KeyK => K::K,
        KeyCode::KeyL => K::L,
        KeyCode::KeyM => K::M,
        KeyCode::KeyN => K::N,
        KeyCode::KeyO => K::O,
        KeyCode::KeyP => K::P,
        KeyCode::KeyQ => K::Q,
        KeyCode::KeyR => K::R,
        KeyCode::KeyS => K::S,
        KeyCode::KeyT => K::T,
        KeyCode::KeyU => K::U,
        KeyCode::KeyV => K::V,
        KeyCode::KeyW => K::W,
        KeyCode::KeyX => K::X,
        KeyCode::KeyY => K::Y,
        KeyCode::KeyZ => K::Z,
        KeyCode::Digit0 => K::Num0,
        KeyCode::Digit1 => K::Num1,
        KeyCode::Digit2 => K::Num2,
        KeyCode::Digit3 => K::Num3,
        KeyCode::Digit4 => K::Num4,
        KeyCode::Digit5 => K::Num5,
        KeyCode::Digit6 => K::Num6,
        KeyCode::Digit7 => K::Num7,
        KeyCode::Digit8 => K::Num8,
        KeyCode::Digit9 => K::Num9,
        KeyCode::Escape => K::Escape,
        KeyCode::ControlLeft => K::LControl,
        KeyCode::ShiftLeft => K::LShift,
        KeyCode::AltLeft => K::LAlt,
        KeyCode::SuperLeft => K::LSystem,
        KeyCode::ControlRight => K::RControl,
        KeyCode::ShiftRight => K::RShift,
        KeyCode::AltRight => K::RAlt,
        KeyCode::SuperRight => K::RSystem,
        KeyCode::ContextMenu => K::Menu,
        KeyCode::BracketLeft => K::LBracket,
        KeyCode::BracketRight => K::RBracket,
        KeyCode::Semicolon => K::Semicolon,
        KeyCode::Comma => K::Comma,
        KeyCode::Period => K::Period,
        KeyCode::Quote => K::Apostrophe,
        KeyCode::Slash => K::Slash,
        KeyCode::Backslash => K::Backslash,
        KeyCode::Backquote => K::Grave,
        KeyCode::Equal => K::Equal,
        KeyCode::Minus => K::Hyphen,
        KeyCode::Space => K::Space,
        KeyCode::Enter => K::Enter,
        KeyCode::Backspace => K::Backspace,
        KeyCode::Tab => K::Tab,
        KeyCode::PageUp => K::PageUp,
        KeyCode::PageDown => K::PageDown,
        KeyCode::End => K::End,
        KeyCode::Home => K::Home,
        KeyCode::Insert => K::Insert,
        KeyCode::Delete => K::Delete,
        KeyCode::NumpadAdd => K::Add,
        KeyCode::NumpadSubtract => K::Subtract,
        KeyCode::NumpadMultiply => K::Multiply,
        KeyCode::NumpadDivide => K::Divide,
        KeyCode::ArrowLeft => K::Left,
        KeyCode::ArrowRight => K::Right,
        KeyCode::ArrowUp => K::Up,
        KeyCode::ArrowDown => K::Down,
        KeyCode::Numpad0 => K::Numpad0,
        KeyCode::Numpad1 => K::Numpad1,
        KeyCode::Numpad2 => K::Numpad2,
        KeyCode::Numpad3 => K::Numpad3,
        KeyCode::Numpad4 => K::Numpad4,
        KeyCode::Numpad5 => K::Numpad5,
        KeyCode::Numpad6 => K::Numpad6,
        KeyCode::Numpad7 => K::Numpad7,
        KeyCode::Numpad8 => K::Numpad8,
        KeyCode::Numpad9 => K::Numpad9,
        KeyCode::F1 => K::F1,
        KeyCode::F2 => K::F2,
        KeyCode::F3 => K::F3,
        KeyCode::F4 => K::F4,
        KeyCode::F5 => K::F5,
        KeyCode::F6 => K::F6,
        KeyCode::F7 => K::F7,
        KeyCode::F8 => K::F8,
        KeyCode::F9 => K::F9,
        KeyCode::F10 => K::F10,
        KeyCode::F11 => K::F11,
        KeyCode::F12 => K::F12,
        KeyCode::F13 => K::F13,
        KeyCode::F14 => K::F14,
        KeyCode::F15 => K::F15,
        KeyCode::Pause => K::Pause,
        _ => K::Unknown,
    }
}

/// Map an engine mouse button; buttons beyond the ABI table are dropped.
pub(crate) fn map_mouse_button(button: winit::event::MouseButton) -> Option<LyraMouseButton> {
    use winit::event::MouseButton;
    match button {
        MouseButton::Left => Some(LyraMouseButton::Left),
        MouseButton::Right => Some(LyraMouseButton::Right),
        MouseButton::Middle => Some(LyraMouseButton::Middle),
        MouseButton::Back => Some(LyraMouseButton::Extra1),
        MouseButton::Forward => Some(LyraMouseButton::Extra2),
        MouseButton::Other(_) => None,
    }
}

/// Whether a key is down, as of the last event pump on the window thread.
///
/// Returns false when no window has been created.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_keyboard_is_key_pressed(key: LyraKeyCode) -> bool {
    crate::window::with_input_state(|state| state.keys_down.contains(&key)).unwrap_or(false)
}

/// Whether a mouse button is down, as of the last event pump on the window
/// thread.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_mouse_is_button_pressed(button: LyraMouseButton) -> bool {
    crate::window::with_input_state(|state| state.buttons_down.contains(&button)).unwrap_or(false)
}

/// Last cursor position reported to any window, in window coordinates.
#[unsafe(no_mangle)]
pub extern "C" fn lyra_mouse_get_position() -> crate::types::LyraVec2i {
    crate::window::with_input_state(|state| crate::types::LyraVec2i {
        x: state.mouse_position.0,
        y: state.mouse_position.1,
    })
    .unwrap_or_default()
}
