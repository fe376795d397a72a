use std::time::Duration;

use anyhow::{Context, Result};
use global_hotkey::{
    GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState,
    hotkey::{Code, HotKey, Modifiers},
};
use kanal::Sender;
use screenocr_config::{HotkeyBinding, Key, Modifier};
use tokio_util::sync::CancellationToken;

/// How often the blocking loop checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct HotkeyManager {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
}

impl HotkeyManager {
    /// Register `binding` with the global hotkey backend
    pub fn new(binding: &HotkeyBinding) -> Result<Self> {
        let manager = GlobalHotKeyManager::new().context("Failed to create hotkey manager")?;

        let hotkey = to_hotkey(binding);

        manager
            .register(hotkey)
            .with_context(|| format!("Failed to register hotkey {binding}"))?;

        Ok(Self { manager, hotkey })
    }

    /// Block up to `timeout` for a press of our chord
    pub fn wait_pressed(&self, timeout: Duration) -> bool {
        match GlobalHotKeyEvent::receiver().recv_timeout(timeout) {
            Ok(event) => event.id == self.hotkey.id() && event.state == HotKeyState::Pressed,
            Err(_) => false,
        }
    }

    pub fn id(&self) -> u32 {
        self.hotkey.id()
    }
}

impl Drop for HotkeyManager {
    fn drop(&mut self) {
        let _ = self.manager.unregister(self.hotkey);
    }
}

/// Blocking listener loop, meant for a dedicated thread.
///
/// Each press of the chord sends `()` on `presses`. Other keys are never
/// seen here; the backend only grabs the registered chord.
/// `on_registered` runs once the chord is grabbed.
pub fn listen(
    binding: &HotkeyBinding,
    presses: Sender<()>,
    cancel: CancellationToken,
    on_registered: impl FnOnce(),
) -> Result<()> {
    let manager = HotkeyManager::new(binding)?;
    tracing::info!("Hotkey registered ({binding})");
    on_registered();

    while !cancel.is_cancelled() {
        if !manager.wait_pressed(POLL_INTERVAL) {
            continue;
        }

        tracing::debug!("Hotkey {binding} pressed");
        match presses.try_send(()) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Press buffer full, dropping press"),
            Err(_) => {
                tracing::debug!("Press channel closed");
                break;
            }
        }
    }

    tracing::info!("Hotkey listener stopping");
    Ok(())
}

pub fn to_hotkey(binding: &HotkeyBinding) -> HotKey {
    let modifiers = binding
        .modifiers()
        .fold(Modifiers::empty(), |acc, m| acc | to_modifier(m));

    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    HotKey::new(modifiers, to_code(binding.key()))
}

fn to_modifier(modifier: Modifier) -> Modifiers {
    match modifier {
        Modifier::Ctrl => Modifiers::CONTROL,
        Modifier::Alt => Modifiers::ALT,
        Modifier::Shift => Modifiers::SHIFT,
        Modifier::Super => Modifiers::SUPER,
    }
}

fn to_code(key: Key) -> Code {
    match key {
        Key::Char(c) => char_code(c),
        Key::Function(n) => function_code(n),
        Key::Space => Code::Space,
        Key::Enter => Code::Enter,
        Key::Tab => Code::Tab,
        Key::Escape => Code::Escape,
        Key::Backspace => Code::Backspace,
        Key::Insert => Code::Insert,
        Key::Delete => Code::Delete,
        Key::Home => Code::Home,
        Key::End => Code::End,
        Key::PageUp => Code::PageUp,
        Key::PageDown => Code::PageDown,
        Key::Up => Code::ArrowUp,
        Key::Down => Code::ArrowDown,
        Key::Left => Code::ArrowLeft,
        Key::Right => Code::ArrowRight,
        Key::PrintScreen => Code::PrintScreen,
        Key::Minus => Code::Minus,
        Key::Equal => Code::Equal,
        Key::Comma => Code::Comma,
        Key::Period => Code::Period,
        Key::Slash => Code::Slash,
        Key::Backslash => Code::Backslash,
        Key::Semicolon => Code::Semicolon,
        Key::Quote => Code::Quote,
        Key::Backquote => Code::Backquote,
        Key::BracketLeft => Code::BracketLeft,
        Key::BracketRight => Code::BracketRight,
    }
}

fn char_code(c: char) -> Code {
    const LETTERS: [Code; 26] = [
        Code::KeyA, Code::KeyB, Code::KeyC, Code::KeyD, Code::KeyE, Code::KeyF, Code::KeyG,
        Code::KeyH, Code::KeyI, Code::KeyJ, Code::KeyK, Code::KeyL, Code::KeyM, Code::KeyN,
        Code::KeyO, Code::KeyP, Code::KeyQ, Code::KeyR, Code::KeyS, Code::KeyT, Code::KeyU,
        Code::KeyV, Code::KeyW, Code::KeyX, Code::KeyY, Code::KeyZ,
    ];
    const DIGITS: [Code; 10] = [
        Code::Digit0, Code::Digit1, Code::Digit2, Code::Digit3, Code::Digit4,
        Code::Digit5, Code::Digit6, Code::Digit7, Code::Digit8, Code::Digit9,
    ];

    match c.to_ascii_lowercase() {
        l @ 'a'..='z' => LETTERS[(l as u8 - b'a') as usize],
        d @ '0'..='9' => DIGITS[(d as u8 - b'0') as usize],
        // HotkeyBinding only admits ascii alphanumerics
        _ => Code::Space,
    }
}

fn function_code(n: u8) -> Code {
    const KEYS: [Code; 24] = [
        Code::F1, Code::F2, Code::F3, Code::F4, Code::F5, Code::F6, Code::F7, Code::F8,
        Code::F9, Code::F10, Code::F11, Code::F12, Code::F13, Code::F14, Code::F15, Code::F16,
        Code::F17, Code::F18, Code::F19, Code::F20, Code::F21, Code::F22, Code::F23, Code::F24,
    ];
    KEYS[(n.clamp(1, 24) - 1) as usize]
}
