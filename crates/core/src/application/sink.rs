// Progress Sink - single-consumer run event channel

use crate::domain::{ExecutionItem, ItemCounts, ItemState, RunEvent, RunId, RunReport};
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// Create a connected publisher/sink pair
pub fn progress_channel() -> (ProgressPublisher, ProgressSink) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressPublisher { tx }, ProgressSink { rx })
}

/// Producer side, cloned into every worker
#[derive(Clone, Debug)]
pub struct ProgressPublisher {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ProgressPublisher {
    /// Never blocks; events are dropped once the sink is gone
    pub fn emit(&self, event: RunEvent) {
        if self.tx.send(event).is_err() {
            trace!("Progress sink closed, event dropped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, held by the observer
#[derive(Debug)]
pub struct ProgressSink {
    rx: mpsc::UnboundedReceiver<RunEvent>,
}

impl ProgressSink {
    /// Next event, or `None` once every publisher is gone
    pub async fn next(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<RunEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain until the terminal `Completed` event, applying everything to a table
    pub async fn into_table(mut self) -> ProgressTable {
        let mut table = ProgressTable::new();
        while let Some(event) = self.next().await {
            let terminal = event.is_terminal();
            table.apply(&event);
            if terminal {
                break;
            }
        }
        table
    }
}

impl Stream for ProgressSink {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        self.rx.poll_recv(cx)
    }
}

/// Per-target row of the observer's view
#[derive(Debug, Clone)]
pub struct ProgressRow {
    pub item: ExecutionItem,
    pub activity: Option<String>,
    pub running_transitions: usize,
    pub terminal_transitions: usize,
}

/// Observer-side view built from events in delivery order
///
/// Owned by the consumer; needs no locking.
#[derive(Debug, Default)]
pub struct ProgressTable {
    run_id: Option<RunId>,
    total: usize,
    rows: BTreeMap<usize, ProgressRow>,
    running: usize,
    max_running: usize,
    last_progress: Option<String>,
    faults: Vec<String>,
    report: Option<RunReport>,
    completion_order: Vec<String>,
    events: usize,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &RunEvent) {
        self.events += 1;
        match event {
            RunEvent::Started { run_id, total, .. } => {
                self.run_id = Some(run_id.clone());
                self.total = *total;
            }
            RunEvent::ItemUpdated { item } => self.apply_item(item),
            RunEvent::Activity { index, message, .. } => {
                if let Some(row) = self.rows.get_mut(index) {
                    row.activity = Some(message.clone());
                }
            }
            RunEvent::Progress { message, .. } => {
                self.last_progress = Some(message.clone());
            }
            RunEvent::Fault { message } => self.faults.push(message.clone()),
            RunEvent::Completed { report } => self.report = Some(report.clone()),
        }
    }

    fn apply_item(&mut self, item: &ExecutionItem) {
        let previous = self.rows.get(&item.index).map(|r| r.item.state);
        if previous == Some(ItemState::Running) {
            self.running = self.running.saturating_sub(1);
        }

        let row = self.rows.entry(item.index).or_insert_with(|| ProgressRow {
            item: item.clone(),
            activity: None,
            running_transitions: 0,
            terminal_transitions: 0,
        });
        row.item = item.clone();
        if item.state == ItemState::Running {
            row.running_transitions += 1;
            self.running += 1;
            self.max_running = self.max_running.max(self.running);
        } else if item.state.is_terminal() {
            row.terminal_transitions += 1;
            self.completion_order.push(item.target_id.clone());
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn counts(&self) -> ItemCounts {
        let mut counts = ItemCounts::from_items(self.rows.values().map(|r| &r.item));
        counts.pending += self.total.saturating_sub(self.rows.len());
        counts
    }

    pub fn rows(&self) -> impl Iterator<Item = &ProgressRow> {
        self.rows.values()
    }

    pub fn row(&self, index: usize) -> Option<&ProgressRow> {
        self.rows.get(&index)
    }

    /// Currently running items
    pub fn running(&self) -> usize {
        self.running
    }

    /// High-water mark of concurrently running items
    pub fn max_running(&self) -> usize {
        self.max_running
    }

    pub fn last_progress(&self) -> Option<&str> {
        self.last_progress.as_deref()
    }

    pub fn faults(&self) -> &[String] {
        &self.faults
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }

    pub fn event_count(&self) -> usize {
        self.events
    }

    /// Target ids in the order they reached a terminal state
    pub fn completion_order(&self) -> &[String] {
        &self.completion_order
    }

    pub fn is_complete(&self) -> bool {
        self.report.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OperationKind, Target};
    use futures::StreamExt;

    fn item(index: usize) -> ExecutionItem {
        ExecutionItem::new(index, &Target::new(format!("AP-{}", index), None))
    }

    #[tokio::test]
    async fn test_emit_never_blocks_after_sink_dropped() {
        let (publisher, sink) = progress_channel();
        drop(sink);
        publisher.emit(RunEvent::Fault {
            message: "nobody listening".to_string(),
        });
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn test_stream_ends_when_publishers_dropped() {
        let (publisher, sink) = progress_channel();
        publisher.emit(RunEvent::Fault {
            message: "one".to_string(),
        });
        drop(publisher);

        let events: Vec<_> = sink.collect::<Vec<_>>().await;
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_table_tracks_transitions() {
        let mut table = ProgressTable::new();
        table.apply(&RunEvent::Started {
            run_id: "run-1".to_string(),
            kind: OperationKind::Connectivity,
            total: 2,
            workers: 2,
            started_at: 0,
        });

        let mut a = item(0);
        let mut b = item(1);
        a.start(1).unwrap();
        table.apply(&RunEvent::ItemUpdated { item: a.clone() });
        b.start(1).unwrap();
        table.apply(&RunEvent::ItemUpdated { item: b.clone() });
        assert_eq!(table.running(), 2);

        a.succeed(2, "Online", serde_json::json!({})).unwrap();
        table.apply(&RunEvent::ItemUpdated { item: a });
        table.apply(&RunEvent::Activity {
            index: 1,
            target_id: "AP-1".to_string(),
            message: "Probe 1/4 lost".to_string(),
        });

        let counts = table.counts();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(table.running(), 1);
        assert_eq!(table.max_running(), 2);
        assert_eq!(
            table.row(1).unwrap().activity.as_deref(),
            Some("Probe 1/4 lost")
        );
        assert_eq!(table.row(0).unwrap().running_transitions, 1);
        assert_eq!(table.row(0).unwrap().terminal_transitions, 1);
    }

    #[test]
    fn test_unseen_items_count_as_pending() {
        let mut table = ProgressTable::new();
        table.apply(&RunEvent::Started {
            run_id: "run-1".to_string(),
            kind: OperationKind::RemoteCommand,
            total: 3,
            workers: 1,
            started_at: 0,
        });
        assert_eq!(table.counts().pending, 3);
    }
}
