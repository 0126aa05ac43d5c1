// Execution Item Domain Model

use super::error::{DomainError, Result};
use super::target::{Target, TargetId};
use serde::{Deserialize, Serialize};

/// Per-target state (strict state machine)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemState::Success | ItemState::Failed | ItemState::Skipped
        )
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Pending => write!(f, "PENDING"),
            ItemState::Running => write!(f, "RUNNING"),
            ItemState::Success => write!(f, "SUCCESS"),
            ItemState::Failed => write!(f, "FAILED"),
            ItemState::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Per-target run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionItem {
    /// Position in the run snapshot
    pub index: usize,
    pub target_id: TargetId,
    pub address: Option<String>,
    pub state: ItemState,

    /// Human-readable reason, always set once terminal
    pub reason: Option<String>,
    /// Strategy-defined result payload
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,

    pub started_at: Option<i64>, // epoch ms
    pub finished_at: Option<i64>,
}

impl ExecutionItem {
    pub fn new(index: usize, target: &Target) -> Self {
        Self {
            index,
            target_id: target.id.clone(),
            address: target.address().map(str::to_string),
            state: ItemState::Pending,
            reason: None,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn invalid(&self, to: ItemState) -> DomainError {
        DomainError::InvalidStateTransition {
            target: self.target_id.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Pending -> Running, exactly once per run
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != ItemState::Pending {
            return Err(self.invalid(ItemState::Running));
        }
        self.state = ItemState::Running;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Running -> Success
    pub fn succeed(
        &mut self,
        now_millis: i64,
        reason: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<()> {
        if self.state != ItemState::Running {
            return Err(self.invalid(ItemState::Success));
        }
        self.state = ItemState::Success;
        self.reason = Some(reason.into());
        self.result = Some(payload);
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Pending | Running -> Failed
    ///
    /// Pending items only fail when a run is aborted by an engine fault.
    pub fn fail(
        &mut self,
        now_millis: i64,
        reason: impl Into<String>,
        error: Option<String>,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(ItemState::Failed));
        }
        self.state = ItemState::Failed;
        self.reason = Some(reason.into());
        self.error = error;
        self.result = payload;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Pending | Running -> Skipped
    pub fn skip(&mut self, now_millis: i64, reason: impl Into<String>) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid(ItemState::Skipped));
        }
        self.state = ItemState::Skipped;
        self.reason = Some(reason.into());
        self.finished_at = Some(now_millis);
        Ok(())
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
