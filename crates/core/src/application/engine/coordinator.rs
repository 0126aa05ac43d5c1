// Coordinator - owns the run: status, ledger, stop handling and the report

use super::constants::{FAULT_ERROR_CODE, FAULT_REASON_PREFIX, STOPPED_BEFORE_START};
use super::ledger::RunLedger;
use super::worker::{WorkQueue, Worker, WorkerMessage};
use crate::application::sink::ProgressPublisher;
use crate::application::strategy::OperationStrategy;
use crate::domain::{
    CancelToken, ExecutionItem, OperationConfig, RunEvent, RunId, RunOutcome, RunReport,
    RunStatus, Snapshot, StopHandle,
};
use crate::error::AppError;
use crate::port::TimeProvider;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub(crate) struct Coordinator {
    pub run_id: RunId,
    pub snapshot: Snapshot,
    pub strategy: Arc<dyn OperationStrategy>,
    pub config: Arc<OperationConfig>,
    pub stop: StopHandle,
    pub cancel: CancelToken,
    pub publisher: ProgressPublisher,
    pub status: watch::Sender<RunStatus>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub items: Vec<ExecutionItem>,
}

impl Coordinator {
    pub async fn run(self) -> RunReport {
        let Coordinator {
            run_id,
            snapshot,
            strategy,
            config,
            stop,
            cancel,
            publisher,
            status,
            time_provider,
            items,
        } = self;

        let total = items.len();
        let workers = config.parallelism.min(total);
        let started_at = time_provider.now_millis();
        let kind = strategy.kind();

        let _ = status.send_replace(RunStatus::Running);
        info!(run_id = %run_id, kind = %kind, total, workers, "Run started");
        publisher.emit(RunEvent::Started {
            run_id: run_id.clone(),
            kind,
            total,
            workers,
            started_at,
        });

        let mut ledger = RunLedger::new(&items);
        let queue = Arc::new(WorkQueue::new(items));
        let mut run = RunState {
            run_id: &run_id,
            ledger: &mut ledger,
            queue: &queue,
            publisher: &publisher,
            time_provider: time_provider.as_ref(),
            status: &status,
        };

        let outcome = if cancel.is_cancelled() {
            // Stop requested before any dispatch: nothing ever runs
            run.stop_requested();
            RunOutcome::Stopped
        } else {
            let (done_tx, done_rx) = mpsc::unbounded_channel();
            let budget = strategy.item_budget(&config);
            let mut pool = JoinSet::new();
            for id in 0..workers {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&queue),
                    snapshot: snapshot.clone(),
                    strategy: Arc::clone(&strategy),
                    config: Arc::clone(&config),
                    cancel: cancel.clone(),
                    publisher: publisher.clone(),
                    done: done_tx.clone(),
                    time_provider: Arc::clone(&time_provider),
                    budget,
                };
                pool.spawn(worker.run());
            }
            drop(done_tx);

            run.supervise(pool, done_rx, &config, &cancel, &stop).await
        };

        let counts = ledger.counts();
        let elapsed_ms = time_provider.now_millis() - started_at;
        let report = RunReport {
            run_id: run_id.clone(),
            kind,
            total,
            counts,
            elapsed_ms,
            outcome,
            items: ledger.into_items(),
        };

        let _ = status.send_replace(RunStatus::Completed);
        info!(
            run_id = %run_id,
            success = counts.success,
            failed = counts.failed,
            skipped = counts.skipped,
            elapsed_ms,
            outcome = ?report.outcome,
            "Run completed"
        );
        publisher.emit(RunEvent::Completed {
            report: report.clone(),
        });
        report
    }
}

/// Mutable run bookkeeping borrowed by the supervision loop
struct RunState<'a> {
    run_id: &'a str,
    ledger: &'a mut RunLedger,
    queue: &'a WorkQueue,
    publisher: &'a ProgressPublisher,
    time_provider: &'a dyn TimeProvider,
    status: &'a watch::Sender<RunStatus>,
}

impl RunState<'_> {
    async fn supervise(
        &mut self,
        mut pool: JoinSet<()>,
        mut done_rx: mpsc::UnboundedReceiver<WorkerMessage>,
        config: &OperationConfig,
        cancel: &CancelToken,
        stop: &StopHandle,
    ) -> RunOutcome {
        let mut heartbeat = tokio::time::interval(config.progress_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        let mut stopping = false;
        let fault = loop {
            tokio::select! {
                message = done_rx.recv() => {
                    let Some(message) = message else {
                        // Every worker has exited
                        break None;
                    };
                    if let Err(fault) = self.handle(message) {
                        break Some(fault);
                    }
                }
                joined = pool.join_next(), if !pool.is_empty() => {
                    if let Some(Err(join_err)) = joined {
                        break Some(AppError::EngineFault(format!("worker crashed: {}", join_err)));
                    }
                }
                _ = cancel.cancelled(), if !stopping => {
                    stopping = true;
                    self.stop_requested();
                }
                _ = heartbeat.tick() => self.progress(),
            }
        };

        if let Some(fault) = fault {
            return self.abort(fault, pool, done_rx, stop).await;
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(join_err) = joined {
                let fault = AppError::EngineFault(format!("worker crashed: {}", join_err));
                return self.abort(fault, pool, done_rx, stop).await;
            }
        }

        if !self.ledger.is_complete() {
            let fault = AppError::EngineFault(format!(
                "{} item(s) never reached a terminal state",
                self.ledger.total() - self.ledger.completed()
            ));
            return self.abort(fault, pool, done_rx, stop).await;
        }

        if stopping || cancel.is_cancelled() {
            RunOutcome::Stopped
        } else {
            RunOutcome::Finished
        }
    }

    fn handle(&mut self, message: WorkerMessage) -> Result<(), AppError> {
        match message {
            WorkerMessage::Started(item) => {
                self.ledger.mark_running(item)?;
            }
            WorkerMessage::Finished(item) => {
                self.ledger.record(item)?;
                self.progress();
            }
            WorkerMessage::Fault(message) => return Err(AppError::EngineFault(message)),
        }
        Ok(())
    }

    /// Skip everything still queued; running items finish on their own
    fn stop_requested(&mut self) {
        let _ = self.status.send_replace(RunStatus::Stopping);
        let queued = self.queue.drain();
        info!(run_id = %self.run_id, skipped = queued.len(), "Stop requested");

        let now = self.time_provider.now_millis();
        for mut item in queued {
            if let Err(e) = item.skip(now, STOPPED_BEFORE_START) {
                warn!(target_id = %item.target_id, error = %e, "Could not skip queued item");
                continue;
            }
            self.publisher.emit(RunEvent::ItemUpdated { item: item.clone() });
            if let Err(e) = self.ledger.record(item) {
                warn!(error = %e, "Ledger rejected skipped item");
            }
        }
        self.progress();
    }

    fn progress(&self) {
        let completed = self.ledger.completed();
        let total = self.ledger.total();
        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        self.publisher.emit(RunEvent::Progress {
            completed,
            total,
            running: self.ledger.running(),
            percent,
            message: format!("Processed {} of {}", completed, total),
        });
    }

    /// Fail every unfinished item and end the run
    async fn abort(
        &mut self,
        fault: AppError,
        mut pool: JoinSet<()>,
        mut done_rx: mpsc::UnboundedReceiver<WorkerMessage>,
        stop: &StopHandle,
    ) -> RunOutcome {
        let message = fault.to_string();
        error!(run_id = %self.run_id, fault = %message, "Run aborted by engine fault");
        stop.stop();

        pool.abort_all();
        while pool.join_next().await.is_some() {}

        // Results already published by workers must not be failed twice
        while let Ok(late) = done_rx.try_recv() {
            if let WorkerMessage::Finished(item) = late {
                let _ = self.ledger.record(item);
            }
        }
        self.queue.drain();

        let now = self.time_provider.now_millis();
        let reason = format!("{}: {}", FAULT_REASON_PREFIX, message);
        for mut item in self.ledger.unfinished() {
            if item
                .fail(now, reason.clone(), Some(FAULT_ERROR_CODE.to_string()), None)
                .is_err()
            {
                continue;
            }
            self.publisher.emit(RunEvent::ItemUpdated { item: item.clone() });
            let _ = self.ledger.record(item);
        }

        self.publisher.emit(RunEvent::Fault {
            message: message.clone(),
        });
        self.progress();
        RunOutcome::Aborted { reason: message }
    }
}
