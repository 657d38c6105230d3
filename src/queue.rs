//! Cross-thread event handoff between the capture callbacks and `wait_key`.
//!
//! An unbounded channel: the write side is cloned once per captured device
//! but every clone lives on the monitor thread, so sends are serialized by
//! that thread's run loop; the single read side backs `Session::wait_key`.
//! When the monitor thread shuts down it drops every writer and the reader
//! observes closure.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::event::KeyEvent;

/// Write side of the event queue. One clone per captured device.
#[derive(Clone)]
pub(crate) struct EventWriter {
    tx: Sender<KeyEvent>,
}

impl EventWriter {
    /// Queues one event. Never blocks; a send after the reader has gone
    /// away is dropped (shutdown race).
    pub fn push(&self, event: KeyEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("queue: event dropped, reader closed");
        }
    }
}

/// Read side of the event queue, owned by the session.
pub(crate) struct EventReader {
    rx: Receiver<KeyEvent>,
}

impl EventReader {
    /// Blocks until an event arrives; `None` once every writer is gone.
    pub fn wait(&self) -> Option<KeyEvent> {
        self.rx.recv().ok()
    }
}

/// Creates a connected writer/reader pair.
pub(crate) fn event_channel() -> (EventWriter, EventReader) {
    let (tx, rx) = mpsc::channel();
    (EventWriter { tx }, EventReader { rx })
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn events_arrive_in_push_order() {
        let (writer, reader) = event_channel();
        writer.push(KeyEvent::down(0x07, 0x04));
        writer.push(KeyEvent::down(0x07, 0x05));
        writer.push(KeyEvent::up(0x07, 0x04));

        assert_eq!(reader.wait(), Some(KeyEvent::down(0x07, 0x04)));
        assert_eq!(reader.wait(), Some(KeyEvent::down(0x07, 0x05)));
        assert_eq!(reader.wait(), Some(KeyEvent::up(0x07, 0x04)));
    }

    #[test]
    fn wait_returns_none_once_all_writers_are_gone() {
        let (writer, reader) = event_channel();
        let second = writer.clone();
        drop(writer);
        second.push(KeyEvent::down(0x0C, 0xB0));
        drop(second);

        assert_eq!(reader.wait(), Some(KeyEvent::down(0x0C, 0xB0)));
        assert_eq!(reader.wait(), None);
    }

    /// A blocked `wait` must unblock when the writer is dropped on another
    /// thread, the shutdown path `release` relies on.
    #[test]
    fn blocked_wait_unblocks_on_writer_drop() {
        let (writer, reader) = event_channel();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.push(KeyEvent::down(0x07, 0x1E));
            // writer dropped here
        });

        assert_eq!(reader.wait(), Some(KeyEvent::down(0x07, 0x1E)));
        assert_eq!(reader.wait(), None);
        worker.join().unwrap();
    }

    #[test]
    fn push_after_reader_drop_is_silent() {
        let (writer, reader) = event_channel();
        drop(reader);
        writer.push(KeyEvent::up(0x07, 0x04));
    }
}
