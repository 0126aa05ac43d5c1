// Mock strategy for engine and controller tests

use super::risk::RiskAssessment;
use super::{ActivityReporter, OperationStrategy, StrategyOutcome, TargetError};
use crate::domain::{CancelToken, OperationConfig, OperationKind, Target};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Barrier, Semaphore};

/// Mock strategy behavior per target
#[derive(Debug, Clone)]
pub enum ScriptedBehavior {
    Pass,
    Fail(String),
    Error(String),
    /// Panic with message (for panic isolation testing)
    Panic(String),
}

/// Configurable strategy recording how the engine drives it
pub struct ScriptedStrategy {
    kind: OperationKind,
    delay: Duration,
    delays: HashMap<String, Duration>,
    behaviors: HashMap<String, ScriptedBehavior>,
    honour_cancel: bool,
    gate: Option<Arc<Semaphore>>,
    barrier: Option<Arc<Barrier>>,
    risk: Option<RiskAssessment>,
    budget: Option<Duration>,
    reject: Option<String>,

    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    calls: AtomicUsize,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
}

impl ScriptedStrategy {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            delays: HashMap::new(),
            behaviors: HashMap::new(),
            honour_cancel: true,
            gate: None,
            barrier: None,
            risk: None,
            budget: None,
            reject: None,
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_target_delay(mut self, target_id: &str, delay: Duration) -> Self {
        self.delays.insert(target_id.to_string(), delay);
        self
    }

    pub fn with_behavior(mut self, target_id: &str, behavior: ScriptedBehavior) -> Self {
        self.behaviors.insert(target_id.to_string(), behavior);
        self
    }

    pub fn failing(self, ids: &[&str]) -> Self {
        ids.iter().fold(self, |s, id| {
            s.with_behavior(id, ScriptedBehavior::Fail("scripted failure".to_string()))
        })
    }

    /// Keep running even after cancel (models a call that cannot be interrupted)
    pub fn ignoring_cancel(mut self) -> Self {
        self.honour_cancel = false;
        self
    }

    /// Each call holds until it acquires a permit from `gate`
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Each call waits on `barrier` before finishing
    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn with_risk(mut self, summary: &str) -> Self {
        self.risk = Some(RiskAssessment {
            matched: vec![summary.to_string()],
            summary: summary.to_string(),
        });
        self
    }

    pub fn with_item_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    /// `validate` rejects every config with `message`
    pub fn rejecting(mut self, message: &str) -> Self {
        self.reject = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn started_order(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished_order(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

/// Decrements the concurrency gauge even when the call panics
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OperationStrategy for ScriptedStrategy {
    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn validate(&self, config: &OperationConfig) -> crate::Result<()> {
        if let Some(message) = &self.reject {
            return Err(crate::AppError::Config(message.clone()));
        }
        config.validate()
    }

    fn assess_risk(&self, _config: &OperationConfig) -> Option<RiskAssessment> {
        self.risk.clone()
    }

    fn item_budget(&self, _config: &OperationConfig) -> Option<Duration> {
        self.budget
    }

    fn describe(&self, _config: &OperationConfig) -> String {
        format!("Scripted {} run", self.kind)
    }

    async fn execute(
        &self,
        target: &Target,
        _config: &OperationConfig,
        cancel: &CancelToken,
        activity: &ActivityReporter,
    ) -> Result<StrategyOutcome, TargetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.honour_cancel && cancel.is_cancelled() {
            return Ok(StrategyOutcome::skipped("Stopped before start"));
        }

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.current);
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        self.started.lock().unwrap().push(target.id.clone());
        activity.report(format!("Working on {}", target.id));

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        if let Some(gate) = &self.gate {
            let acquire = gate.acquire();
            if self.honour_cancel {
                tokio::select! {
                    permit = acquire => { if let Ok(p) = permit { p.forget(); } }
                    _ = cancel.cancelled() => {
                        self.finished.lock().unwrap().push(target.id.clone());
                        return Ok(StrategyOutcome::fail("Aborted by stop request", serde_json::Value::Null));
                    }
                }
            } else if let Ok(p) = acquire.await {
                p.forget();
            }
        }

        let delay = self.delays.get(&target.id).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let behavior = self
            .behaviors
            .get(&target.id)
            .cloned()
            .unwrap_or(ScriptedBehavior::Pass);
        self.finished.lock().unwrap().push(target.id.clone());

        match behavior {
            ScriptedBehavior::Pass => Ok(StrategyOutcome::pass(
                "ok",
                serde_json::json!({"target": target.id}),
            )),
            ScriptedBehavior::Fail(reason) => {
                Ok(StrategyOutcome::fail(reason, serde_json::Value::Null))
            }
            ScriptedBehavior::Error(message) => Err(TargetError::Internal(message)),
            ScriptedBehavior::Panic(message) => panic!("{}", message),
        }
    }
}
