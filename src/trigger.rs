//! Key-press trigger: which key starts a run, and edge detection so a held
//! key runs the script once.

use std::fmt;
use std::str::FromStr;

/// Key used when the configured name does not parse.
pub const DEFAULT_KEY: KeyCode = KeyCode::LeftAlt;

// ── key_codes! macro ──────────────────────────────────────────

/// Generates the `KeyCode` enum plus its name table.
macro_rules! key_codes {
    ( $( $key:ident ),* $(,)? ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum KeyCode {
            $( $key, )*
        }

        impl KeyCode {
            pub const ALL: &'static [KeyCode] = &[ $( KeyCode::$key, )* ];

            pub fn name(self) -> &'static str {
                match self {
                    $( KeyCode::$key => stringify!($key), )*
                }
            }
        }
    };
}

key_codes! {
    A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Alpha0, Alpha1, Alpha2, Alpha3, Alpha4, Alpha5, Alpha6, Alpha7, Alpha8, Alpha9,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    LeftAlt, RightAlt, LeftControl, RightControl, LeftShift, RightShift,
    Space, Return, Escape, Tab, Backspace, Insert, Delete, Home, End, PageUp, PageDown,
    UpArrow, DownArrow, LeftArrow, RightArrow,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a key name")]
pub struct KeyParseError(pub String);

impl FromStr for KeyCode {
    type Err = KeyParseError;

    /// Case-insensitive match on the key name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        KeyCode::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| KeyParseError(s.to_string()))
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a key preference, falling back to [`DEFAULT_KEY`]. A bad name is
/// logged and otherwise ignored.
pub fn resolve_key(preference: Option<&str>) -> KeyCode {
    let Some(name) = preference else {
        return DEFAULT_KEY;
    };
    match name.parse() {
        Ok(key) => key,
        Err(e) => {
            log::warn!("{e}; using {DEFAULT_KEY}");
            DEFAULT_KEY
        }
    }
}

// ── edge detection ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn down(key: KeyCode) -> Self {
        Self { key, pressed: true }
    }

    pub fn up(key: KeyCode) -> Self {
        Self { key, pressed: false }
    }
}

/// Fires once per press of its key: on the transition from up to down.
#[derive(Debug, Clone)]
pub struct EdgeTrigger {
    key: KeyCode,
    held: bool,
}

impl EdgeTrigger {
    pub fn new(key: KeyCode) -> Self {
        Self { key, held: false }
    }

    pub fn key(&self) -> KeyCode {
        self.key
    }

    /// Feed one event. Returns `true` on a rising edge of the trigger key.
    pub fn handle(&mut self, event: KeyEvent) -> bool {
        if event.key != self.key {
            return false;
        }
        let fired = event.pressed && !self.held;
        self.held = event.pressed;
        fired
    }

    /// Feed the key's sampled state for one frame.
    pub fn poll(&mut self, pressed: bool) -> bool {
        self.handle(KeyEvent {
            key: self.key,
            pressed,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("leftalt".parse::<KeyCode>().unwrap(), KeyCode::LeftAlt);
        assert_eq!(" F5 ".parse::<KeyCode>().unwrap(), KeyCode::F5);
        assert_eq!("alpha3".parse::<KeyCode>().unwrap(), KeyCode::Alpha3);
        assert_eq!("NotAKey".parse::<KeyCode>(), Err(KeyParseError("NotAKey".into())));
    }

    #[test]
    fn names_round_trip_through_display() {
        for key in KeyCode::ALL {
            assert_eq!(key.to_string().parse::<KeyCode>().unwrap(), *key);
        }
    }

    #[test]
    fn bad_preference_falls_back() {
        assert_eq!(resolve_key(None), KeyCode::LeftAlt);
        assert_eq!(resolve_key(Some("right_alt")), KeyCode::LeftAlt);
        assert_eq!(resolve_key(Some("RightAlt")), KeyCode::RightAlt);
    }

    #[test]
    fn fires_on_rising_edge_only() {
        let mut trigger = EdgeTrigger::new(KeyCode::F9);
        assert!(trigger.poll(true));
        assert!(!trigger.poll(true));
        assert!(!trigger.poll(false));
        assert!(trigger.poll(true));
    }

    #[test]
    fn other_keys_are_ignored() {
        let mut trigger = EdgeTrigger::new(KeyCode::LeftAlt);
        assert!(!trigger.handle(KeyEvent::down(KeyCode::A)));
        assert!(trigger.handle(KeyEvent::down(KeyCode::LeftAlt)));
        assert!(!trigger.handle(KeyEvent::up(KeyCode::A)));
        assert!(!trigger.handle(KeyEvent::down(KeyCode::LeftAlt)));
        assert!(!trigger.handle(KeyEvent::up(KeyCode::LeftAlt)));
        assert!(trigger.handle(KeyEvent::down(KeyCode::LeftAlt)));
    }
}
