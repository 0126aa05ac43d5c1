// Run Controller - operator-facing run lifecycle (confirm, start, stop)

use crate::application::engine::{ExecutionEngine, RunHandle};
use crate::application::strategy::{OperationStrategy, RiskAssessment};
use crate::domain::{stop_channel, CancelToken, OperationConfig, RunId, RunStatus, Snapshot, StopHandle};
use crate::error::{AppError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// What the operator must agree to before a run starts
#[derive(Debug, Clone)]
pub enum Confirmation {
    Ready { description: String },
    HighRisk { description: String, risk: RiskAssessment },
}

impl Confirmation {
    pub fn description(&self) -> &str {
        match self {
            Confirmation::Ready { description } | Confirmation::HighRisk { description, .. } => {
                description
            }
        }
    }

    pub fn requires_acknowledgement(&self) -> bool {
        matches!(self, Confirmation::HighRisk { .. })
    }
}

struct PendingRun {
    strategy: Arc<dyn OperationStrategy>,
    config: OperationConfig,
    risk: Option<RiskAssessment>,
    stop: StopHandle,
    cancel: CancelToken,
}

struct ActiveRun {
    run_id: RunId,
    stop: StopHandle,
    status: watch::Receiver<RunStatus>,
}

enum ControllerState {
    Idle,
    Confirmed(PendingRun),
    Active(ActiveRun),
}

/// Drives at most one run at a time
pub struct RunController {
    engine: ExecutionEngine,
    state: ControllerState,
}

impl RunController {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self {
            engine,
            state: ControllerState::Idle,
        }
    }

    /// Run-level status as the operator sees it
    pub fn status(&self) -> RunStatus {
        match &self.state {
            ControllerState::Idle => RunStatus::Idle,
            ControllerState::Confirmed(_) => RunStatus::Confirmed,
            ControllerState::Active(active) => *active.status.borrow(),
        }
    }

    pub fn active_run_id(&self) -> Option<&str> {
        match &self.state {
            ControllerState::Active(active) => Some(&active.run_id),
            _ => None,
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.status(), RunStatus::Running | RunStatus::Stopping)
    }

    /// Validate a strategy and config and hold them for `start`
    pub fn confirm(
        &mut self,
        strategy: Arc<dyn OperationStrategy>,
        config: OperationConfig,
    ) -> Result<Confirmation> {
        if self.is_busy() {
            return Err(AppError::InvalidState(
                "A run is already in progress".to_string(),
            ));
        }
        strategy.validate(&config)?;

        let description = strategy.describe(&config);
        let risk = strategy.assess_risk(&config);
        let confirmation = match &risk {
            Some(risk) => Confirmation::HighRisk {
                description,
                risk: risk.clone(),
            },
            None => Confirmation::Ready { description },
        };

        let (stop, cancel) = stop_channel();
        self.state = ControllerState::Confirmed(PendingRun {
            strategy,
            config,
            risk,
            stop,
            cancel,
        });
        Ok(confirmation)
    }

    /// Second confirmation for a high-risk run
    pub fn acknowledge_high_risk(&mut self) -> Result<()> {
        match &mut self.state {
            ControllerState::Confirmed(pending) => {
                if let Some(risk) = &pending.risk {
                    info!(summary = %risk.summary, "High-risk operation acknowledged");
                }
                pending.config.acknowledge_high_risk = true;
                Ok(())
            }
            _ => Err(AppError::InvalidState(
                "Nothing to acknowledge: no confirmed run".to_string(),
            )),
        }
    }

    /// Start the confirmed run over `snapshot`
    ///
    /// A rejected start leaves the run confirmed so the operator can
    /// acknowledge and retry.
    pub fn start(&mut self, snapshot: Snapshot) -> Result<RunHandle> {
        let pending = match std::mem::replace(&mut self.state, ControllerState::Idle) {
            ControllerState::Confirmed(pending) => pending,
            other => {
                self.state = other;
                return Err(AppError::InvalidState(
                    "Run must be confirmed before it starts".to_string(),
                ));
            }
        };

        let started = self.engine.run_with_stop(
            snapshot,
            Arc::clone(&pending.strategy),
            pending.config.clone(),
            pending.stop.clone(),
            pending.cancel.clone(),
        );
        match started {
            Ok(handle) => {
                self.state = ControllerState::Active(ActiveRun {
                    run_id: handle.run_id().to_string(),
                    stop: pending.stop,
                    status: handle.status_watch(),
                });
                Ok(handle)
            }
            Err(e) => {
                self.state = ControllerState::Confirmed(pending);
                Err(e)
            }
        }
    }

    /// Request a stop; a confirmed run that has not started will skip everything
    pub fn stop(&self) {
        match &self.state {
            ControllerState::Idle => {}
            ControllerState::Confirmed(pending) => pending.stop.stop(),
            ControllerState::Active(active) => {
                info!(run_id = %active.run_id, "Stop requested by operator");
                active.stop.stop();
            }
        }
    }

    /// Drop a confirmed run without starting it
    pub fn cancel(&mut self) {
        if let ControllerState::Confirmed(_) = self.state {
            self.state = ControllerState::Idle;
        }
    }
}
