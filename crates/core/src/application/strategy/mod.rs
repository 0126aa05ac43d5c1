// Operation Strategies - one concrete action applied to one target

pub mod browser_action;
pub mod connectivity;
pub mod mocks;
pub mod remote_command;
pub mod risk;
pub mod tab_batches;

pub use browser_action::BrowserAction;
pub use connectivity::ConnectivityProbe;
pub use remote_command::{RemoteCommand, PRESET_COMMANDS};
pub use risk::{RiskAssessment, RiskPolicy, DEFAULT_RISK_PATTERNS};
pub use tab_batches::TabBatches;

use crate::application::sink::ProgressPublisher;
use crate::domain::{CancelToken, OperationConfig, OperationKind, RunEvent, Target};
use crate::error::{AppError, Result};
use crate::port::{BrowserError, CredentialError, ProbeError, ShellError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Strategy-level judgement of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// Stop was requested before the strategy acted
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub verdict: Verdict,
    pub reason: String,
    pub payload: serde_json::Value,
}

impl StrategyOutcome {
    pub fn pass(reason: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            verdict: Verdict::Pass,
            reason: reason.into(),
            payload,
        }
    }

    pub fn fail(reason: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            verdict: Verdict::Fail,
            reason: reason.into(),
            payload,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Skipped,
            reason: reason.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Per-target failure, recorded on the item and never fatal to the run
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("No IP address")]
    MissingAddress,

    #[error("{0}")]
    MissingCredential(&'static str),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("SSH error: {0}")]
    Shell(#[from] ShellError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Strategy panicked: {0}")]
    Panicked(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TargetError {
    /// Stable machine-readable code stored on the item
    pub fn code(&self) -> &'static str {
        match self {
            TargetError::MissingAddress => "missing_address",
            TargetError::MissingCredential(_) => "missing_credential",
            TargetError::Credential(_) => "credential",
            TargetError::Timeout(_) => "timeout",
            TargetError::Probe(_) => "probe",
            TargetError::Shell(ShellError::AuthenticationFailed) => "auth_failed",
            TargetError::Shell(_) => "shell",
            TargetError::Browser(_) => "browser",
            TargetError::Panicked(_) => "panicked",
            TargetError::Internal(_) => "internal",
        }
    }
}

/// Publishes intermediate status lines for one target
#[derive(Clone, Debug)]
pub struct ActivityReporter {
    publisher: Option<ProgressPublisher>,
    index: usize,
    target_id: String,
}

impl ActivityReporter {
    pub fn new(publisher: ProgressPublisher, index: usize, target_id: impl Into<String>) -> Self {
        Self {
            publisher: Some(publisher),
            index,
            target_id: target_id.into(),
        }
    }

    /// Reporter that drops every line
    pub fn detached() -> Self {
        Self {
            publisher: None,
            index: 0,
            target_id: String::new(),
        }
    }

    pub fn report(&self, message: impl Into<String>) {
        if let Some(publisher) = &self.publisher {
            publisher.emit(RunEvent::Activity {
                index: self.index,
                target_id: self.target_id.clone(),
                message: message.into(),
            });
        }
    }
}

/// Contract every operation kind implements
#[async_trait]
pub trait OperationStrategy: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Common checks plus settings kind; override to add strategy-specific rules
    fn validate(&self, config: &OperationConfig) -> Result<()> {
        config.validate()?;
        if config.kind() != self.kind() {
            return Err(AppError::Config(format!(
                "{} settings cannot drive a {} run",
                config.kind(),
                self.kind()
            )));
        }
        Ok(())
    }

    fn assess_risk(&self, _config: &OperationConfig) -> Option<RiskAssessment> {
        None
    }

    /// Engine-side guard around one `execute` call
    fn item_budget(&self, config: &OperationConfig) -> Option<Duration>;

    /// Confirmation text shown before the run starts
    fn describe(&self, config: &OperationConfig) -> String;

    async fn execute(
        &self,
        target: &Target,
        config: &OperationConfig,
        cancel: &CancelToken,
        activity: &ActivityReporter,
    ) -> std::result::Result<StrategyOutcome, TargetError>;
}

/// Closed set of production strategies
pub enum Strategy {
    Connectivity(ConnectivityProbe),
    RemoteCommand(RemoteCommand),
    Browser(BrowserAction),
}

impl Strategy {
    fn inner(&self) -> &dyn OperationStrategy {
        match self {
            Strategy::Connectivity(s) => s as &dyn OperationStrategy,
            Strategy::RemoteCommand(s) => s as &dyn OperationStrategy,
            Strategy::Browser(s) => s as &dyn OperationStrategy,
        }
    }
}

#[async_trait]
impl OperationStrategy for Strategy {
    fn kind(&self) -> OperationKind {
        self.inner().kind()
    }

    fn validate(&self, config: &OperationConfig) -> Result<()> {
        self.inner().validate(config)
    }

    fn assess_risk(&self, config: &OperationConfig) -> Option<RiskAssessment> {
        self.inner().assess_risk(config)
    }

    fn item_budget(&self, config: &OperationConfig) -> Option<Duration> {
        self.inner().item_budget(config)
    }

    fn describe(&self, config: &OperationConfig) -> String {
        self.inner().describe(config)
    }

    async fn execute(
        &self,
        target: &Target,
        config: &OperationConfig,
        cancel: &CancelToken,
        activity: &ActivityReporter,
    ) -> std::result::Result<StrategyOutcome, TargetError> {
        self.inner().execute(target, config, cancel, activity).await
    }
}

impl From<ConnectivityProbe> for Strategy {
    fn from(s: ConnectivityProbe) -> Self {
        Strategy::Connectivity(s)
    }
}

impl From<RemoteCommand> for Strategy {
    fn from(s: RemoteCommand) -> Self {
        Strategy::RemoteCommand(s)
    }
}

impl From<BrowserAction> for Strategy {
    fn from(s: BrowserAction) -> Self {
        Strategy::Browser(s)
    }
}

/// Truncate to `max` characters, appending `...` when cut
pub(crate) fn preview(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("  short  ", 100), "short");
        let long = "é".repeat(120);
        let cut = preview(&long, 100);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 103);
    }

    #[test]
    fn test_target_error_reasons() {
        assert_eq!(TargetError::MissingAddress.to_string(), "No IP address");
        assert_eq!(
            TargetError::MissingCredential("No SSH password configured").to_string(),
            "No SSH password configured"
        );
        assert_eq!(
            TargetError::Shell(ShellError::AuthenticationFailed).code(),
            "auth_failed"
        );
    }
}
