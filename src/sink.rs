//! Seam between the injection router and the driver connection.
//!
//! The router is portable; on macOS the IOKit user client implements
//! `ReportSink`, and tests substitute recording or failing sinks.

use crate::error::SinkError;
use crate::report::InputReport;

/// Accepts full-state reports for delivery to the virtual keyboard.
pub(crate) trait ReportSink {
    fn post(&mut self, report: &InputReport) -> Result<(), SinkError>;
}

/// Sink that keeps every accepted report, in post order.
#[cfg(test)]
pub(crate) struct RecordingSink {
    pub posted: Vec<InputReport>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> RecordingSink {
        RecordingSink { posted: Vec::new() }
    }
}

#[cfg(test)]
impl ReportSink for RecordingSink {
    fn post(&mut self, report: &InputReport) -> Result<(), SinkError> {
        self.posted.push(report.clone());
        Ok(())
    }
}

/// Sink that rejects every post with a fixed status.
#[cfg(test)]
pub(crate) struct FailingSink {
    pub status: crate::error::KernStatus,
}

#[cfg(test)]
impl ReportSink for FailingSink {
    fn post(&mut self, _report: &InputReport) -> Result<(), SinkError> {
        Err(SinkError::Post(self.status))
    }
}
