use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOTKEY: &str = "super+shift+t";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Super,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// `a`-`z` and `0`-`9`, stored lowercase
    Char(char),
    /// `F1`-`F24`
    Function(u8),
    Space,
    Enter,
    Tab,
    Escape,
    Backspace,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    PrintScreen,
    Minus,
    Equal,
    Comma,
    Period,
    Slash,
    Backslash,
    Semicolon,
    Quote,
    Backquote,
    BracketLeft,
    BracketRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySymbol {
    Modifier(Modifier),
    Key(Key),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyParseError {
    #[error("hotkey is empty")]
    Empty,

    #[error("empty key in chord '{0}'")]
    EmptySegment(String),

    #[error("unknown key '{0}'")]
    UnknownKey(String),

    #[error("key '{0}' appears more than once")]
    Duplicate(String),

    #[error("chord '{0}' has no non-modifier key")]
    MissingKey(String),

    #[error("chord has more than one non-modifier key: '{0}' and '{1}'")]
    MultipleKeys(String, String),
}

/// A validated trigger chord.
///
/// Always non-empty, free of duplicates, and made of any number of modifiers
/// plus exactly one regular key. Order is kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HotkeyBinding {
    chord: Vec<KeySymbol>,
}

impl HotkeyBinding {
    pub fn parse(input: &str) -> Result<Self, HotkeyParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(HotkeyParseError::Empty);
        }

        let mut chord: Vec<KeySymbol> = Vec::new();
        let mut key: Option<Key> = None;

        for segment in input.split('+') {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(HotkeyParseError::EmptySegment(input.to_string()));
            }

            let symbol = parse_symbol(segment)?;
            if chord.contains(&symbol) {
                return Err(HotkeyParseError::Duplicate(symbol_name(symbol)));
            }

            if let KeySymbol::Key(k) = symbol {
                if let Some(existing) = key {
                    return Err(HotkeyParseError::MultipleKeys(
                        key_name(existing),
                        key_name(k),
                    ));
                }
                key = Some(k);
            }

            chord.push(symbol);
        }

        if key.is_none() {
            return Err(HotkeyParseError::MissingKey(input.to_string()));
        }

        Ok(Self { chord })
    }

    pub fn chord(&self) -> &[KeySymbol] {
        &self.chord
    }

    pub fn modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.chord.iter().filter_map(|s| match s {
            KeySymbol::Modifier(m) => Some(*m),
            KeySymbol::Key(_) => None,
        })
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers().any(|m| m == modifier)
    }

    /// The single non-modifier key of the chord
    pub fn key(&self) -> Key {
        self.chord
            .iter()
            .find_map(|s| match s {
                KeySymbol::Key(k) => Some(*k),
                KeySymbol::Modifier(_) => None,
            })
            .unwrap_or(Key::Space)
    }
}

impl Default for HotkeyBinding {
    fn default() -> Self {
        Self {
            chord: vec![
                KeySymbol::Modifier(Modifier::Super),
                KeySymbol::Modifier(Modifier::Shift),
                KeySymbol::Key(Key::Char('t')),
            ],
        }
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chord.iter().map(|s| symbol_name(*s)).collect();
        f.write_str(&names.join("+"))
    }
}

impl FromStr for HotkeyBinding {
    type Err = HotkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HotkeyBinding {
    type Error = HotkeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HotkeyBinding> for String {
    fn from(binding: HotkeyBinding) -> Self {
        binding.to_string()
    }
}

fn parse_symbol(segment: &str) -> Result<KeySymbol, HotkeyParseError> {
    let lower = segment.to_ascii_lowercase();

    let modifier = match lower.as_str() {
        "ctrl" | "control" => Some(Modifier::Ctrl),
        "alt" | "option" => Some(Modifier::Alt),
        "shift" => Some(Modifier::Shift),
        "super" | "meta" | "win" | "logo" | "cmd" => Some(Modifier::Super),
        _ => None,
    };
    if let Some(m) = modifier {
        return Ok(KeySymbol::Modifier(m));
    }

    let key = match lower.as_str() {
        "space" => Key::Space,
        "enter" | "return" => Key::Enter,
        "tab" => Key::Tab,
        "esc" | "escape" => Key::Escape,
        "backspace" => Key::Backspace,
        "insert" | "ins" => Key::Insert,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "up" => Key::Up,
        "down" => Key::Down,
        "left" => Key::Left,
        "right" => Key::Right,
        "print" | "printscreen" | "prtsc" => Key::PrintScreen,
        "minus" | "-" => Key::Minus,
        "equal" | "=" => Key::Equal,
        "comma" | "," => Key::Comma,
        "period" | "." => Key::Period,
        "slash" | "/" => Key::Slash,
        "backslash" | "\\" => Key::Backslash,
        "semicolon" | ";" => Key::Semicolon,
        "quote" | "'" => Key::Quote,
        "backquote" | "grave" | "`" => Key::Backquote,
        "bracketleft" | "[" => Key::BracketLeft,
        "bracketright" | "]" => Key::BracketRight,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphanumeric() => Key::Char(c),
                _ => parse_function_key(other)
                    .ok_or_else(|| HotkeyParseError::UnknownKey(segment.to_string()))?,
            }
        }
    };

    Ok(KeySymbol::Key(key))
}

fn parse_function_key(name: &str) -> Option<Key> {
    let n: u8 = name.strip_prefix('f')?.parse().ok()?;
    (1..=24).contains(&n).then_some(Key::Function(n))
}

fn symbol_name(symbol: KeySymbol) -> String {
    match symbol {
        KeySymbol::Modifier(Modifier::Ctrl) => "ctrl".to_string(),
        KeySymbol::Modifier(Modifier::Alt) => "alt".to_string(),
        KeySymbol::Modifier(Modifier::Shift) => "shift".to_string(),
        KeySymbol::Modifier(Modifier::Super) => "super".to_string(),
        KeySymbol::Key(key) => key_name(key),
    }
}

fn key_name(key: Key) -> String {
    let name = match key {
        Key::Char(c) => return c.to_string(),
        Key::Function(n) => return format!("f{n}"),
        Key::Space => "space",
        Key::Enter => "enter",
        Key::Tab => "tab",
        Key::Escape => "escape",
        Key::Backspace => "backspace",
        Key::Insert => "insert",
        Key::Delete => "delete",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "pageup",
        Key::PageDown => "pagedown",
        Key::Up => "up",
        Key::Down => "down",
        Key::Left => "left",
        Key::Right => "right",
        Key::PrintScreen => "print",
        Key::Minus => "minus",
        Key::Equal => "equal",
        Key::Comma => "comma",
        Key::Period => "period",
        Key::Slash => "slash",
        Key::Backslash => "backslash",
        Key::Semicolon => "semicolon",
        Key::Quote => "quote",
        Key::Backquote => "backquote",
        Key::BracketLeft => "bracketleft",
        Key::BracketRight => "bracketright",
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_chord() {
        let binding = HotkeyBinding::parse(DEFAULT_HOTKEY).unwrap();
        assert_eq!(binding, HotkeyBinding::default());
        assert_eq!(binding.key(), Key::Char('t'));
        assert!(binding.has_modifier(Modifier::Super));
        assert!(binding.has_modifier(Modifier::Shift));
        assert!(!binding.has_modifier(Modifier::Ctrl));
    }

    #[test]
    fn test_parse_is_case_and_alias_insensitive() {
        let binding = HotkeyBinding::parse(" Control + ALT + O ").unwrap();
        assert_eq!(binding.to_string(), "ctrl+alt+o");

        let binding = HotkeyBinding::parse("meta+F12").unwrap();
        assert_eq!(binding.key(), Key::Function(12));
        assert_eq!(binding.to_string(), "super+f12");
    }

    #[test]
    fn test_order_is_preserved() {
        let binding = HotkeyBinding::parse("shift+ctrl+c").unwrap();
        assert_eq!(
            binding.chord(),
            &[
                KeySymbol::Modifier(Modifier::Shift),
                KeySymbol::Modifier(Modifier::Ctrl),
                KeySymbol::Key(Key::Char('c')),
            ]
        );
    }

    #[test]
    fn test_rejects_malformed_chords() {
        assert_eq!(HotkeyBinding::parse("   "), Err(HotkeyParseError::Empty));
        assert!(matches!(
            HotkeyBinding::parse("ctrl++t"),
            Err(HotkeyParseError::EmptySegment(_))
        ));
        assert!(matches!(
            HotkeyBinding::parse("ctrl+hyper+t"),
            Err(HotkeyParseError::UnknownKey(k)) if k == "hyper"
        ));
        assert!(matches!(
            HotkeyBinding::parse("ctrl+control+t"),
            Err(HotkeyParseError::Duplicate(k)) if k == "ctrl"
        ));
        assert!(matches!(
            HotkeyBinding::parse("ctrl+shift"),
            Err(HotkeyParseError::MissingKey(_))
        ));
        assert!(matches!(
            HotkeyBinding::parse("ctrl+a+b"),
            Err(HotkeyParseError::MultipleKeys(_, _))
        ));
        assert!(matches!(
            HotkeyBinding::parse("f25"),
            Err(HotkeyParseError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_serde_validates_eagerly() {
        let binding: HotkeyBinding = serde_json::from_str("\"ctrl+shift+c\"").unwrap();
        assert_eq!(binding.to_string(), "ctrl+shift+c");

        let err = serde_json::from_str::<HotkeyBinding>("\"ctrl+\"");
        assert!(err.is_err());

        let json = serde_json::to_string(&binding).unwrap();
        assert_eq!(json, "\"ctrl+shift+c\"");
    }
}
