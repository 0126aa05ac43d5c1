// Execution Engine - bounded fan-out of one strategy over a snapshot

pub mod constants;
mod coordinator;
mod ledger;
mod panic_guard;
mod worker;


pub use panic_guard::{execute_guarded, panic_message, spawn_guarded, GuardedTask, PanicGuardResult};

use crate::application::sink::{progress_channel, ProgressSink};
use crate::application::strategy::OperationStrategy;
use crate::domain::{
    stop_channel, CancelToken, ExecutionItem, OperationConfig, RunId, RunReport, RunStatus,
    Snapshot, StopHandle,
};
use crate::error::{AppError, Result};
use crate::port::id_provider::UuidProvider;
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{IdProvider, TimeProvider};
use coordinator::Coordinator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// Execution Engine
pub struct ExecutionEngine {
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemTimeProvider), Arc::new(UuidProvider))
    }
}

impl ExecutionEngine {
    pub fn new(time_provider: Arc<dyn TimeProvider>, id_provider: Arc<dyn IdProvider>) -> Self {
        Self {
            time_provider,
            id_provider,
        }
    }

    /// Start a run with a fresh stop channel
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(
        &self,
        snapshot: Snapshot,
        strategy: Arc<dyn OperationStrategy>,
        config: OperationConfig,
    ) -> Result<RunHandle> {
        let (stop, cancel) = stop_channel();
        self.run_with_stop(snapshot, strategy, config, stop, cancel)
    }

    /// Start a run driven by a caller-owned stop channel
    ///
    /// Configuration errors are returned before any worker starts. A token
    /// that is already cancelled yields a run where every item is skipped.
    pub fn run_with_stop(
        &self,
        snapshot: Snapshot,
        strategy: Arc<dyn OperationStrategy>,
        config: OperationConfig,
        stop: StopHandle,
        cancel: CancelToken,
    ) -> Result<RunHandle> {
        validate_run(&snapshot, strategy.as_ref(), &config)?;

        let run_id = self.id_provider.generate_id();
        let items: Vec<ExecutionItem> = snapshot
            .iter()
            .enumerate()
            .map(|(index, target)| ExecutionItem::new(index, target))
            .collect();

        let (publisher, sink) = progress_channel();
        let (status_tx, status_rx) = watch::channel(RunStatus::Confirmed);

        let coordinator = Coordinator {
            run_id: run_id.clone(),
            snapshot,
            strategy,
            config: Arc::new(config),
            stop: stop.clone(),
            cancel,
            publisher,
            status: status_tx,
            time_provider: Arc::clone(&self.time_provider),
            items,
        };
        let join = tokio::spawn(coordinator.run());

        Ok(RunHandle {
            run_id,
            sink: Some(sink),
            stop,
            status: status_rx,
            join,
        })
    }
}

/// Reject a run before anything is spawned
pub fn validate_run(
    snapshot: &Snapshot,
    strategy: &dyn OperationStrategy,
    config: &OperationConfig,
) -> Result<()> {
    if snapshot.is_empty() {
        return Err(AppError::Config("No targets selected".to_string()));
    }
    strategy.validate(config)?;
    if let Some(risk) = strategy.assess_risk(config) {
        if !config.acknowledge_high_risk {
            warn!(summary = %risk.summary, "High-risk operation not acknowledged");
            return Err(AppError::Config(format!(
                "High-risk operation requires explicit acknowledgement: {}",
                risk.summary
            )));
        }
    }
    Ok(())
}

/// Caller's handle on one in-flight run
pub struct RunHandle {
    run_id: RunId,
    sink: Option<ProgressSink>,
    stop: StopHandle,
    status: watch::Receiver<RunStatus>,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Take the event stream; only one consumer exists per run
    pub fn take_sink(&mut self) -> Option<ProgressSink> {
        self.sink.take()
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Wait for the terminal report
    pub async fn wait(self) -> Result<RunReport> {
        self.join
            .await
            .map_err(|e| AppError::EngineFault(format!("coordinator task failed: {}", e)))
    }
}
