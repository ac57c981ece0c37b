//! Drive mode commands sent to the board.
//!
//! The outbound wire format is a single ASCII byte; the board switches its
//! drive routine on receipt.

use serde::Serialize;

/// Drive mode selected by a gesture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureMode {
    /// Drive forward.
    Forward,
    /// Rotate in place.
    Spin,
    /// Wave the indicator.
    Wave,
    /// Hold position.
    #[default]
    Standby,
}

impl GestureMode {
    /// Resolves a classifier label to a mode.
    ///
    /// Unrecognized and absent labels both resolve to [`Self::Standby`].
    #[must_use]
    pub fn from_label(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some(l) if l.eq_ignore_ascii_case("fist") => Self::Forward,
            Some(l) if l.eq_ignore_ascii_case("one") || l.eq_ignore_ascii_case("one-finger") => {
                Self::Spin
            }
            Some(l) if l.eq_ignore_ascii_case("open") || l.eq_ignore_ascii_case("open-hand") => {
                Self::Wave
            }
            _ => Self::Standby,
        }
    }

    /// Parses an explicit mode name, as carried by some event producers.
    #[must_use]
    pub fn from_mode_str(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_lowercase().as_str() {
            "forward" => Some(Self::Forward),
            "spin" => Some(Self::Spin),
            "wave" => Some(Self::Wave),
            "standby" | "stop" => Some(Self::Standby),
            _ => None,
        }
    }

    /// The single command byte written to the board.
    #[must_use]
    pub const fn command_byte(self) -> u8 {
        match self {
            Self::Forward => b'0',
            Self::Spin => b'1',
            Self::Wave => b'2',
            Self::Standby => b'3',
        }
    }

    /// Lowercase mode name, matching the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Spin => "spin",
            Self::Wave => "wave",
            Self::Standby => "standby",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping() {
        assert_eq!(GestureMode::from_label(Some("fist")), GestureMode::Forward);
        assert_eq!(GestureMode::from_label(Some("one")), GestureMode::Spin);
        assert_eq!(GestureMode::from_label(Some("one-finger")), GestureMode::Spin);
        assert_eq!(GestureMode::from_label(Some("Open")), GestureMode::Wave);
        assert_eq!(GestureMode::from_label(Some("none")), GestureMode::Standby);
        assert_eq!(GestureMode::from_label(Some("shrug")), GestureMode::Standby);
        assert_eq!(GestureMode::from_label(None), GestureMode::Standby);
    }

    #[test]
    fn test_command_bytes() {
        assert_eq!(GestureMode::Forward.command_byte(), b'0');
        assert_eq!(GestureMode::Spin.command_byte(), b'1');
        assert_eq!(GestureMode::Wave.command_byte(), b'2');
        assert_eq!(GestureMode::Standby.command_byte(), b'3');
    }

    #[test]
    fn test_mode_str_round_trip() {
        for mode in [
            GestureMode::Forward,
            GestureMode::Spin,
            GestureMode::Wave,
            GestureMode::Standby,
        ] {
            assert_eq!(GestureMode::from_mode_str(mode.as_str()), Some(mode));
        }
        assert_eq!(GestureMode::from_mode_str("warp"), None);
    }
}
