use serde::Serialize;

use crate::config::KEY_MAP;

/// One of the nine symbols every screen listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalKey {
    Q,
    W,
    E,
    A,
    S,
    D,
    Z,
    X,
    C,
}

impl LogicalKey {
    /// Key bound to a calibrated slot
    pub fn for_slot(slot: usize) -> Option<Self> {
        KEY_MAP.get(slot).copied()
    }

    pub fn slot(&self) -> usize {
        // KEY_MAP holds every variant exactly once
        KEY_MAP.iter().position(|k| k == self).unwrap_or_default()
    }

    /// Case-insensitive lookup for keyboard input
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'q' => Some(LogicalKey::Q),
            'w' => Some(LogicalKey::W),
            'e' => Some(LogicalKey::E),
            'a' => Some(LogicalKey::A),
            's' => Some(LogicalKey::S),
            'd' => Some(LogicalKey::D),
            'z' => Some(LogicalKey::Z),
            'x' => Some(LogicalKey::X),
            'c' => Some(LogicalKey::C),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            LogicalKey::Q => 'q',
            LogicalKey::W => 'w',
            LogicalKey::E => 'e',
            LogicalKey::A => 'a',
            LogicalKey::S => 's',
            LogicalKey::D => 'd',
            LogicalKey::Z => 'z',
            LogicalKey::X => 'x',
            LogicalKey::C => 'c',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    Press,
    Release,
}

/// Producer of a key event; consumers treat both the same way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    Pad,
    Keyboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyEvent {
    pub key: LogicalKey,
    pub transition: Transition,
    pub source: InputSource,
}

impl KeyEvent {
    pub fn press(key: LogicalKey, source: InputSource) -> Self {
        KeyEvent {
            key,
            transition: Transition::Press,
            source,
        }
    }

    pub fn release(key: LogicalKey, source: InputSource) -> Self {
        KeyEvent {
            key,
            transition: Transition::Release,
            source,
        }
    }

    pub fn is_press(&self) -> bool {
        self.transition == Transition::Press
    }
}
