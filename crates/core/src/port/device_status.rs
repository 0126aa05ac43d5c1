// Device Status Port
// Side channel for connectivity results (registry status columns)

use crate::domain::TargetId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub target_id: TargetId,
    pub status: DeviceStatus,
    pub latency_ms: Option<f64>,
}

/// Fire-and-forget status sink
///
/// Called from worker tasks; implementations must not block and must
/// swallow their own failures.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceStatusReporter: Send + Sync {
    fn report_status(&self, report: StatusReport);
}

/// Discards every report
pub struct NoopStatusReporter;

impl DeviceStatusReporter for NoopStatusReporter {
    fn report_status(&self, _report: StatusReport) {}
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingStatusReporter {
        reports: Mutex<Vec<StatusReport>>,
    }

    impl RecordingStatusReporter {
        pub fn reports(&self) -> Vec<StatusReport> {
            self.reports.lock().unwrap().clone()
        }

        pub fn status_of(&self, target_id: &str) -> Option<DeviceStatus> {
            self.reports
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|r| r.target_id == target_id)
                .map(|r| r.status)
        }
    }

    impl DeviceStatusReporter for RecordingStatusReporter {
        fn report_status(&self, report: StatusReport) {
            self.reports.lock().unwrap().push(report);
        }
    }
}
