// Worker - pulls items from the shared queue and drives the strategy

use super::panic_guard::{spawn_guarded, PanicGuardResult};
use crate::application::sink::ProgressPublisher;
use crate::application::strategy::{
    ActivityReporter, OperationStrategy, StrategyOutcome, TargetError, Verdict,
};
use crate::domain::{CancelToken, ExecutionItem, OperationConfig, RunEvent, Snapshot};
use crate::port::TimeProvider;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared FIFO of items not yet dispatched
///
/// Once closed, by a drain or by a dispatch that observed the stop, no item
/// leaves Pending through `dispatch` again.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    state: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<ExecutionItem>,
    closed: bool,
}

impl WorkQueue {
    pub fn new(items: Vec<ExecutionItem>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: items.into(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the next item and move it to Running, unless the run is stopping
    ///
    /// The stop check, the Running transition and its event happen under the
    /// queue lock, so they are ordered against `drain`.
    pub fn dispatch(
        &self,
        cancel: &CancelToken,
        now_millis: impl FnOnce() -> i64,
        publisher: &ProgressPublisher,
    ) -> Result<Option<ExecutionItem>, String> {
        let mut state = self.lock();
        if state.closed || cancel.is_cancelled() {
            state.closed = true;
            return Ok(None);
        }
        let Some(mut item) = state.items.pop_front() else {
            return Ok(None);
        };
        item.start(now_millis()).map_err(|e| e.to_string())?;
        publisher.emit(RunEvent::ItemUpdated { item: item.clone() });
        Ok(Some(item))
    }

    /// Close the queue and take everything still Pending
    pub fn drain(&self) -> Vec<ExecutionItem> {
        let mut state = self.lock();
        state.closed = true;
        state.items.drain(..).collect()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Worker -> coordinator notifications
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Started(ExecutionItem),
    Finished(ExecutionItem),
    Fault(String),
}

pub(crate) struct Worker {
    pub id: usize,
    pub queue: Arc<WorkQueue>,
    pub snapshot: Snapshot,
    pub strategy: Arc<dyn OperationStrategy>,
    pub config: Arc<OperationConfig>,
    pub cancel: CancelToken,
    pub publisher: ProgressPublisher,
    pub done: mpsc::UnboundedSender<WorkerMessage>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub budget: Option<Duration>,
}

impl Worker {
    pub async fn run(self) {
        debug!(worker = self.id, "Worker started");
        loop {
            // Cooperative stop: checked between strategy invocations
            let dispatched = self.queue.dispatch(
                &self.cancel,
                || self.time_provider.now_millis(),
                &self.publisher,
            );
            let item = match dispatched {
                Ok(Some(item)) => item,
                Ok(None) => {
                    debug!(worker = self.id, "Queue closed or empty");
                    break;
                }
                Err(message) => {
                    self.fault(message);
                    break;
                }
            };
            if let Err(message) = self.process(item).await {
                self.fault(message);
                break;
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }

    fn fault(&self, message: String) {
        error!(worker = self.id, fault = %message, "Worker fault");
        let _ = self.done.send(WorkerMessage::Fault(message));
    }

    async fn process(&self, mut item: ExecutionItem) -> Result<(), String> {
        let target = self
            .snapshot
            .get(item.index)
            .cloned()
            .ok_or_else(|| format!("no snapshot target at index {}", item.index))?;

        let _ = self.done.send(WorkerMessage::Started(item.clone()));

        info!(target_id = %item.target_id, worker = self.id, "Processing target");
        let result = self.invoke(target, item.index).await;
        let now = self.time_provider.now_millis();

        let transition = match result {
            Ok(StrategyOutcome {
                verdict: Verdict::Pass,
                reason,
                payload,
            }) => item.succeed(now, reason, payload),
            Ok(StrategyOutcome {
                verdict: Verdict::Fail,
                reason,
                payload,
            }) => {
                let payload = (!payload.is_null()).then_some(payload);
                item.fail(now, reason, None, payload)
            }
            Ok(StrategyOutcome {
                verdict: Verdict::Skipped,
                reason,
                ..
            }) => item.skip(now, reason),
            Err(err) => {
                warn!(target_id = %item.target_id, error = %err, "Target failed");
                item.fail(now, err.to_string(), Some(err.code().to_string()), None)
            }
        };
        transition.map_err(|e| e.to_string())?;

        info!(
            target_id = %item.target_id,
            state = %item.state,
            duration_ms = item.duration_ms().unwrap_or_default(),
            "Target finished"
        );
        // Emit and notify share no await point, so an abort cannot split them
        self.publisher.emit(RunEvent::ItemUpdated { item: item.clone() });
        let _ = self.done.send(WorkerMessage::Finished(item));
        Ok(())
    }

    /// One strategy call on its own task, under the optional item budget
    async fn invoke(
        &self,
        target: Arc<crate::domain::Target>,
        index: usize,
    ) -> Result<StrategyOutcome, TargetError> {
        let strategy = Arc::clone(&self.strategy);
        let config = Arc::clone(&self.config);
        let cancel = self.cancel.clone();
        let activity = ActivityReporter::new(self.publisher.clone(), index, target.id.clone());

        let call = async move { strategy.execute(&target, &config, &cancel, &activity).await };

        let task = spawn_guarded(call);
        let abort = task.abort_handle();

        let outcome = match self.budget {
            Some(budget) => match tokio::time::timeout(budget, task.join()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    abort.abort();
                    return Err(TargetError::Timeout(budget.as_millis() as u64));
                }
            },
            None => task.join().await,
        };

        match outcome {
            PanicGuardResult::Success(result) => result,
            PanicGuardResult::Panicked(message) => Err(TargetError::Panicked(message)),
            PanicGuardResult::Aborted => {
                Err(TargetError::Internal("strategy task aborted".to_string()))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sink::progress_channel;
    use crate::domain::{stop_channel, Target};

    fn queue(n: usize) -> WorkQueue {
        WorkQueue::new(
            (0..n)
                .map(|i| ExecutionItem::new(i, &Target::new(format!("AP-{}", i), None)))
                .collect(),
        )
    }

    #[test]
    fn test_dispatch_marks_running_in_order() {
        let queue = queue(2);
        let (publisher, mut sink) = progress_channel();
        let cancel = CancelToken::never();

        let first = queue.dispatch(&cancel, || 7, &publisher).unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.started_at, Some(7));
        assert!(matches!(
            sink.try_next(),
            Some(RunEvent::ItemUpdated { item }) if item.index == 0
        ));
        assert_eq!(queue.dispatch(&cancel, || 8, &publisher).unwrap().unwrap().index, 1);
        assert!(queue.dispatch(&cancel, || 9, &publisher).unwrap().is_none());
    }

    #[test]
    fn test_drain_closes_queue() {
        let queue = queue(3);
        let (publisher, _sink) = progress_channel();

        assert_eq!(queue.drain().len(), 3);
        assert!(queue.is_closed());
        assert!(queue
            .dispatch(&CancelToken::never(), || 0, &publisher)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_dispatch_after_stop_leaves_items_pending() {
        let queue = queue(3);
        let (publisher, mut sink) = progress_channel();
        let (stop, cancel) = stop_channel();
        stop.stop();

        assert!(queue.dispatch(&cancel, || 0, &publisher).unwrap().is_none());
        assert!(queue.is_closed());
        assert!(sink.try_next().is_none());

        let pending = queue.drain();
        assert_eq!(pending.len(), 3);
        assert!(pending.iter().all(|i| i.started_at.is_none()));
    }

    #[test]
    fn test_dispatch_rejects_non_pending_item() {
        let mut started = ExecutionItem::new(0, &Target::new("AP-0", None));
        started.start(1).unwrap();
        let queue = WorkQueue::new(vec![started]);
        let (publisher, _sink) = progress_channel();

        assert!(queue.dispatch(&CancelToken::never(), || 2, &publisher).is_err());
    }
}
