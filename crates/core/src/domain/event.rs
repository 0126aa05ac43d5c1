// Run Events & Aggregate Report

use super::config::OperationKind;
use super::item::{ExecutionItem, ItemState};
use serde::{Deserialize, Serialize};

/// Run ID (UUID v4)
pub type RunId = String;

/// Run-level status exposed to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Idle,
    Confirmed,
    Running,
    Stopping,
    Completed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "IDLE"),
            RunStatus::Confirmed => write!(f, "CONFIRMED"),
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Stopping => write!(f, "STOPPING"),
            RunStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// Item counts per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ItemCounts {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ExecutionItem>) -> Self {
        let mut counts = Self::default();
        for item in items {
            counts.record(item.state);
        }
        counts
    }

    pub fn record(&mut self, state: ItemState) {
        match state {
            ItemState::Pending => self.pending += 1,
            ItemState::Running => self.running += 1,
            ItemState::Success => self.success += 1,
            ItemState::Failed => self.failed += 1,
            ItemState::Skipped => self.skipped += 1,
        }
    }

    pub fn terminal(&self) -> usize {
        self.success + self.failed + self.skipped
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.terminal()
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every item was dispatched
    Finished,
    /// Stop was requested; undispatched items were skipped
    Stopped,
    /// An engine fault aborted the run
    Aborted { reason: String },
}

/// Terminal aggregate of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub kind: OperationKind,
    pub total: usize,
    pub counts: ItemCounts,
    pub elapsed_ms: i64,
    pub outcome: RunOutcome,
    pub items: Vec<ExecutionItem>,
}

impl RunReport {
    /// Success + Failed + Skipped == total, with nothing left in flight
    pub fn is_consistent(&self) -> bool {
        self.counts.terminal() == self.total
            && self.counts.pending == 0
            && self.counts.running == 0
            && self.items.len() == self.total
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped of {} ({:.1}s)",
            self.counts.success,
            self.counts.failed,
            self.counts.skipped,
            self.total,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

/// Event delivered through the progress sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: RunId,
        kind: OperationKind,
        total: usize,
        workers: usize,
        started_at: i64,
    },
    /// One per item state transition
    ItemUpdated { item: ExecutionItem },
    /// Intermediate per-target status line
    Activity {
        index: usize,
        target_id: String,
        message: String,
    },
    Progress {
        completed: usize,
        total: usize,
        running: usize,
        percent: f64,
        message: String,
    },
    Fault { message: String },
    Completed { report: RunReport },
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Target;

    #[test]
    fn test_counts_reconcile() {
        let mut items: Vec<ExecutionItem> = (0..3)
            .map(|i| ExecutionItem::new(i, &Target::new(format!("AP-{}", i), None)))
            .collect();
        items[0].start(1).unwrap();
        items[0].succeed(2, "ok", serde_json::json!({})).unwrap();
        items[1].start(1).unwrap();
        items[1].fail(2, "down", None, None).unwrap();
        items[2].skip(2, "stopped").unwrap();

        let counts = ItemCounts::from_items(&items);
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.terminal(), 3);

        let report = RunReport {
            run_id: "run-1".to_string(),
            kind: OperationKind::Connectivity,
            total: 3,
            counts,
            elapsed_ms: 1500,
            outcome: RunOutcome::Finished,
            items,
        };
        assert!(report.is_consistent());
        assert!(report.summary().starts_with("1 succeeded, 1 failed, 1 skipped of 3"));
    }
}
