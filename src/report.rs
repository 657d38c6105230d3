//! Injection routing: usage-page dispatch onto per-category pressed-key
//! sets, encoded as full-state reports for the virtual keyboard driver.
//!
//! The driver consumes fixed-layout input reports, one layout per category.
//! Every post carries the complete current key set for its category, never
//! a delta, so a dropped report is corrected by the next accepted one.

use std::collections::BTreeSet;

use crate::error::SendKeyError;
use crate::event::{KeyEvent, KeyTransition};
use crate::sink::ReportSink;

// ---------------------------------------------------------------------------
// Usage pages
// ---------------------------------------------------------------------------

/// The four usage pages the injector understands, one per report category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePage {
    /// Keyboard/keypad page (0x07), including the modifier usages
    /// 0xE0..=0xE7.
    Keyboard,
    /// Apple vendor top-case page (0x00FF): Fn and the media row of builtin
    /// keyboards.
    AppleVendorTopCase,
    /// Apple vendor keyboard page (0xFF01).
    AppleVendorKeyboard,
    /// Consumer control page (0x0C): media and launcher usages.
    Consumer,
}

impl UsagePage {
    /// Every recognized page, in report-id order.
    pub const ALL: [UsagePage; 4] = [
        UsagePage::Keyboard,
        UsagePage::Consumer,
        UsagePage::AppleVendorTopCase,
        UsagePage::AppleVendorKeyboard,
    ];

    /// Maps a raw HID usage page to its report category.
    pub fn from_raw(page: u32) -> Option<UsagePage> {
        match page {
            0x07 => Some(UsagePage::Keyboard),
            0x00FF => Some(UsagePage::AppleVendorTopCase),
            0xFF01 => Some(UsagePage::AppleVendorKeyboard),
            0x0C => Some(UsagePage::Consumer),
            _ => None,
        }
    }

    /// The raw HID usage page number.
    pub fn raw(self) -> u32 {
        match self {
            UsagePage::Keyboard => 0x07,
            UsagePage::AppleVendorTopCase => 0x00FF,
            UsagePage::AppleVendorKeyboard => 0xFF01,
            UsagePage::Consumer => 0x0C,
        }
    }

    /// Report id this category posts under.
    fn report_id(self) -> u8 {
        match self {
            UsagePage::Keyboard => 1,
            UsagePage::Consumer => 2,
            UsagePage::AppleVendorTopCase => 3,
            UsagePage::AppleVendorKeyboard => 4,
        }
    }

    fn index(self) -> usize {
        match self {
            UsagePage::Keyboard => 0,
            UsagePage::AppleVendorTopCase => 1,
            UsagePage::AppleVendorKeyboard => 2,
            UsagePage::Consumer => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Input reports
// ---------------------------------------------------------------------------

/// Key slots per report. Usages beyond this many held keys are left off the
/// wire image.
pub(crate) const REPORT_SLOTS: usize = 32;

/// id + modifiers + reserved + slots.
const KEYBOARD_REPORT_LEN: usize = 3 + REPORT_SLOTS;
/// id + slots.
const AUX_REPORT_LEN: usize = 1 + REPORT_SLOTS;

/// Snapshot of one category's pressed keys, ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InputReport {
    page: UsagePage,
    keys: [u8; REPORT_SLOTS],
    len: usize,
}

impl InputReport {
    fn from_set(page: UsagePage, held: &BTreeSet<u32>) -> InputReport {
        let mut keys = [0u8; REPORT_SLOTS];
        let mut len = 0;
        for &usage in held {
            if usage > u8::MAX as u32 {
                log::debug!(
                    "report: usage 0x{:X} does not fit an 8-bit slot, left off the wire",
                    usage
                );
                continue;
            }
            if len == REPORT_SLOTS {
                log::debug!(
                    "report: more than {} keys held on {:?}, extras left off the wire",
                    REPORT_SLOTS,
                    page
                );
                break;
            }
            keys[len] = usage as u8;
            len += 1;
        }
        InputReport { page, keys, len }
    }

    pub fn page(&self) -> UsagePage {
        self.page
    }

    /// Occupied key slots, ascending usage order.
    pub fn keys(&self) -> &[u8] {
        &self.keys[..self.len]
    }

    /// Wire image for the driver. The keyboard report carries modifier and
    /// reserved bytes (always zero; modifier usages travel in the key
    /// slots); the other categories are the report id plus slots.
    pub fn encode(&self) -> ReportBytes {
        let mut buf = [0u8; KEYBOARD_REPORT_LEN];
        buf[0] = self.page.report_id();
        let (slots_at, len) = match self.page {
            UsagePage::Keyboard => (3, KEYBOARD_REPORT_LEN),
            _ => (1, AUX_REPORT_LEN),
        };
        buf[slots_at..slots_at + REPORT_SLOTS].copy_from_slice(&self.keys);
        ReportBytes { buf, len }
    }
}

/// Encoded wire bytes for one report.
pub(crate) struct ReportBytes {
    buf: [u8; KEYBOARD_REPORT_LEN],
    len: usize,
}

impl ReportBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Pressed-key state for all four categories plus the mutate-then-post step
/// behind `send_key`.
///
/// State mutation precedes the post: a rejected post leaves the set mutated,
/// and the next accepted full-state report for the category carries the
/// current set.
#[derive(Debug, Default)]
pub(crate) struct ReportRouter {
    held: [BTreeSet<u32>; 4],
}

impl ReportRouter {
    pub fn new() -> ReportRouter {
        ReportRouter::default()
    }

    /// Applies one event to its category set and builds the report to post.
    /// Rejected events change nothing.
    pub fn route(&mut self, event: &KeyEvent) -> Result<InputReport, SendKeyError> {
        let page = UsagePage::from_raw(event.page)
            .ok_or(SendKeyError::UnrecognizedPage(event.page))?;
        let transition = event
            .transition()
            .ok_or(SendKeyError::InvalidValue(event.value))?;

        let held = &mut self.held[page.index()];
        match transition {
            KeyTransition::Down => {
                held.insert(event.usage);
            }
            KeyTransition::Up => {
                held.remove(&event.usage);
            }
        }
        Ok(InputReport::from_set(page, held))
    }

    /// Routes the event and posts the resulting report.
    pub fn inject(
        &mut self,
        event: &KeyEvent,
        sink: &mut dyn ReportSink,
    ) -> Result<(), SendKeyError> {
        let report = self.route(event)?;
        log::trace!(
            "report: posting {:?} with {} key(s)",
            report.page(),
            report.keys().len()
        );
        sink.post(&report)?;
        Ok(())
    }

    #[cfg(test)]
    fn held(&self, page: UsagePage) -> &BTreeSet<u32> {
        &self.held[page.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{KernStatus, SinkError};
    use crate::sink::{FailingSink, RecordingSink};

    #[test]
    fn from_raw_recognizes_exactly_four_pages() {
        assert_eq!(UsagePage::from_raw(0x07), Some(UsagePage::Keyboard));
        assert_eq!(UsagePage::from_raw(0x0C), Some(UsagePage::Consumer));
        assert_eq!(
            UsagePage::from_raw(0x00FF),
            Some(UsagePage::AppleVendorTopCase)
        );
        assert_eq!(
            UsagePage::from_raw(0xFF01),
            Some(UsagePage::AppleVendorKeyboard)
        );

        // Close neighbours must not alias onto a category.
        assert_eq!(UsagePage::from_raw(0x01), None);
        assert_eq!(UsagePage::from_raw(0x08), None);
        assert_eq!(UsagePage::from_raw(0xFF00), None);
        assert_eq!(UsagePage::from_raw(0xFF02), None);
    }

    #[test]
    fn raw_values_match_the_hid_pages() {
        assert_eq!(UsagePage::Keyboard.raw(), 0x07);
        assert_eq!(UsagePage::Consumer.raw(), 0x0C);
        assert_eq!(UsagePage::AppleVendorTopCase.raw(), 0x00FF);
        assert_eq!(UsagePage::AppleVendorKeyboard.raw(), 0xFF01);
    }

    #[test]
    fn down_inserts_and_posts_the_full_set() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        router
            .inject(&KeyEvent::down(0x07, 0x04), &mut sink)
            .unwrap();
        router
            .inject(&KeyEvent::down(0x07, 0x05), &mut sink)
            .unwrap();

        assert_eq!(sink.posted.len(), 2);
        assert_eq!(sink.posted[0].keys(), [0x04]);
        assert_eq!(sink.posted[1].keys(), [0x04, 0x05]);
        assert!(router.held(UsagePage::Keyboard).contains(&0x05));
    }

    #[test]
    fn up_erases_and_posts_the_remainder() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        router
            .inject(&KeyEvent::down(0x07, 0x04), &mut sink)
            .unwrap();
        router
            .inject(&KeyEvent::down(0x07, 0x05), &mut sink)
            .unwrap();
        router.inject(&KeyEvent::up(0x07, 0x04), &mut sink).unwrap();

        assert_eq!(sink.posted[2].keys(), [0x05]);
        assert!(!router.held(UsagePage::Keyboard).contains(&0x04));
    }

    #[test]
    fn duplicate_down_posts_an_identical_set() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        router
            .inject(&KeyEvent::down(0x07, 0x04), &mut sink)
            .unwrap();
        router
            .inject(&KeyEvent::down(0x07, 0x04), &mut sink)
            .unwrap();

        assert_eq!(sink.posted[0], sink.posted[1]);
        assert_eq!(router.held(UsagePage::Keyboard).len(), 1);
    }

    #[test]
    fn up_for_an_absent_usage_still_posts() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        router.inject(&KeyEvent::up(0x0C, 0xB0), &mut sink).unwrap();

        assert_eq!(sink.posted.len(), 1);
        assert!(sink.posted[0].keys().is_empty());
    }

    #[test]
    fn categories_do_not_share_state() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        router
            .inject(&KeyEvent::down(0x07, 0x04), &mut sink)
            .unwrap();
        router
            .inject(&KeyEvent::down(0x0C, 0xB0), &mut sink)
            .unwrap();

        assert_eq!(sink.posted[1].page(), UsagePage::Consumer);
        assert_eq!(sink.posted[1].keys(), [0xB0]);
        assert_eq!(router.held(UsagePage::Keyboard).len(), 1);
        assert_eq!(router.held(UsagePage::Consumer).len(), 1);
    }

    #[test]
    fn invalid_value_is_rejected_without_mutation_or_post() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        let event = KeyEvent {
            value: 2,
            page: 0x07,
            usage: 0x04,
        };
        assert_eq!(
            router.inject(&event, &mut sink),
            Err(SendKeyError::InvalidValue(2))
        );
        assert!(sink.posted.is_empty());
        assert!(router.held(UsagePage::Keyboard).is_empty());
    }

    #[test]
    fn unrecognized_page_is_rejected_without_post() {
        let mut router = ReportRouter::new();
        let mut sink = RecordingSink::new();

        assert_eq!(
            router.inject(&KeyEvent::down(0x08, 0x01), &mut sink),
            Err(SendKeyError::UnrecognizedPage(0x08))
        );
        assert!(sink.posted.is_empty());
    }

    #[test]
    fn post_failure_surfaces_but_state_stays_mutated() {
        let mut router = ReportRouter::new();
        let mut sink = FailingSink {
            status: KernStatus(0xE000_02CD_u32 as i32),
        };

        let result = router.inject(&KeyEvent::down(0x07, 0x04), &mut sink);
        assert_eq!(
            result,
            Err(SendKeyError::Sink(SinkError::Post(KernStatus(
                0xE000_02CD_u32 as i32
            ))))
        );
        // The next accepted full-state post carries the correction.
        assert!(router.held(UsagePage::Keyboard).contains(&0x04));
    }

    #[test]
    fn keyboard_report_layout() {
        let mut router = ReportRouter::new();
        // Left shift (0xE1) and A (0x04): modifiers are key slots here.
        router.route(&KeyEvent::down(0x07, 0xE1)).unwrap();
        let report = router.route(&KeyEvent::down(0x07, 0x04)).unwrap();

        let bytes = report.encode();
        let wire = bytes.as_slice();
        assert_eq!(wire.len(), 35);
        assert_eq!(wire[0], 1); // report id
        assert_eq!(wire[1], 0); // modifier byte stays zero
        assert_eq!(wire[2], 0); // reserved
        assert_eq!(wire[3], 0x04);
        assert_eq!(wire[4], 0xE1);
        assert!(wire[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn aux_report_layout() {
        let mut router = ReportRouter::new();
        let report = router.route(&KeyEvent::down(0x0C, 0xB0)).unwrap();

        let bytes = report.encode();
        let wire = bytes.as_slice();
        assert_eq!(wire.len(), 33);
        assert_eq!(wire[0], 2); // consumer report id
        assert_eq!(wire[1], 0xB0);
        assert!(wire[2..].iter().all(|&b| b == 0));

        let mut router = ReportRouter::new();
        let report = router.route(&KeyEvent::down(0x00FF, 0x03)).unwrap();
        assert_eq!(report.encode().as_slice()[0], 3); // top-case report id

        let mut router = ReportRouter::new();
        let report = router.route(&KeyEvent::down(0xFF01, 0x04)).unwrap();
        assert_eq!(report.encode().as_slice()[0], 4); // vendor keyboard id
    }

    #[test]
    fn slots_are_filled_in_ascending_usage_order() {
        let mut router = ReportRouter::new();
        router.route(&KeyEvent::down(0x07, 0x52)).unwrap();
        router.route(&KeyEvent::down(0x07, 0x04)).unwrap();
        let report = router.route(&KeyEvent::down(0x07, 0x1E)).unwrap();

        assert_eq!(report.keys(), [0x04, 0x1E, 0x52]);
    }

    #[test]
    fn oversized_usage_is_tracked_but_left_off_the_wire() {
        let mut router = ReportRouter::new();
        let report = router.route(&KeyEvent::down(0xFF01, 0x300)).unwrap();

        assert!(router.held(UsagePage::AppleVendorKeyboard).contains(&0x300));
        assert!(report.keys().is_empty());

        // Releasing it still works through the same set.
        let report = router.route(&KeyEvent::up(0xFF01, 0x300)).unwrap();
        assert!(router.held(UsagePage::AppleVendorKeyboard).is_empty());
        assert!(report.keys().is_empty());
    }

    #[test]
    fn wire_image_caps_at_thirty_two_slots() {
        let mut router = ReportRouter::new();
        let mut last = None;
        for usage in 1..=40u32 {
            last = Some(router.route(&KeyEvent::down(0x07, usage)).unwrap());
        }

        let report = last.unwrap();
        assert_eq!(report.keys().len(), REPORT_SLOTS);
        assert_eq!(report.keys()[0], 1);
        assert_eq!(report.keys()[REPORT_SLOTS - 1], REPORT_SLOTS as u8);
        assert_eq!(router.held(UsagePage::Keyboard).len(), 40);
    }
}
