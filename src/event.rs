//! Key event record shared by the capture and injection paths.
//!
//! One record per HID element value change: the raw element value plus the
//! usage page and usage identifying the key. Capture forwards records
//! verbatim; only injection validates them.

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTransition {
    Up = 0,
    Down = 1,
}

impl KeyTransition {
    /// Maps a raw HID element value. Values other than 0 and 1 carry no
    /// transition.
    pub fn from_value(value: u64) -> Option<KeyTransition> {
        match value {
            0 => Some(KeyTransition::Up),
            1 => Some(KeyTransition::Down),
            _ => None,
        }
    }

    /// The raw element value for this transition.
    pub fn value(self) -> u64 {
        self as u64
    }
}

/// One keyboard transition as delivered by a HID element callback.
///
/// `value` is the raw element value: 1 for key down, 0 for key up. Some
/// elements report other values (repeat counts, axis data); capture forwards
/// them unchanged and `send_key` rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub value: u64,
    pub page: u32,
    pub usage: u32,
}

impl KeyEvent {
    pub fn new(transition: KeyTransition, page: u32, usage: u32) -> KeyEvent {
        KeyEvent {
            value: transition.value(),
            page,
            usage,
        }
    }

    /// Key-down event for `usage` on `page`.
    pub fn down(page: u32, usage: u32) -> KeyEvent {
        KeyEvent::new(KeyTransition::Down, page, usage)
    }

    /// Key-up event for `usage` on `page`.
    pub fn up(page: u32, usage: u32) -> KeyEvent {
        KeyEvent::new(KeyTransition::Up, page, usage)
    }

    /// The transition this event encodes, if `value` is 0 or 1.
    pub fn transition(&self) -> Option<KeyTransition> {
        KeyTransition::from_value(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_maps_zero_and_one_only() {
        assert_eq!(KeyTransition::from_value(0), Some(KeyTransition::Up));
        assert_eq!(KeyTransition::from_value(1), Some(KeyTransition::Down));
        assert_eq!(KeyTransition::from_value(2), None);
        assert_eq!(KeyTransition::from_value(u64::MAX), None);
    }

    #[test]
    fn constructors_set_the_raw_value() {
        let down = KeyEvent::down(0x07, 0x04);
        assert_eq!(down.value, 1);
        assert_eq!(down.transition(), Some(KeyTransition::Down));

        let up = KeyEvent::up(0x07, 0x04);
        assert_eq!(up.value, 0);
        assert_eq!(up.transition(), Some(KeyTransition::Up));
    }

    #[test]
    fn out_of_range_value_has_no_transition() {
        let event = KeyEvent {
            value: 7,
            page: 0x07,
            usage: 0x04,
        };
        assert_eq!(event.transition(), None);
    }
}
