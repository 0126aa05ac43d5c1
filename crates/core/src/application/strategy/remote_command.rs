// Remote Command Strategy

use super::risk::{RiskAssessment, RiskPolicy};
use super::{preview, ActivityReporter, OperationStrategy, StrategyOutcome, TargetError};
use crate::application::engine::constants::{ITEM_BUDGET_GRACE, STOPPED_BEFORE_START, STOP_ABORT_REASON};
use crate::domain::{CancelToken, OperationConfig, OperationKind, OperationSettings, Target};
use crate::port::{CredentialStore, RemoteShell, ShellError, ShellRequest};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Characters of output kept in reason strings; payloads keep everything
pub const OUTPUT_PREVIEW_CHARS: usize = 100;

/// Quick commands offered to operators (label, command)
pub const PRESET_COMMANDS: &[(&str, &str)] = &[
    ("Uptime", "uptime"),
    ("Network interfaces", "ifconfig"),
    ("Processes", "ps aux"),
    ("Disk usage", "df -h"),
    ("Memory", "free -m"),
    ("SSH service status", "systemctl status ssh"),
    ("Restart networking", "systemctl restart networking"),
];

pub struct RemoteCommand {
    shell: Arc<dyn RemoteShell>,
    credentials: Arc<dyn CredentialStore>,
    risk: RiskPolicy,
}

impl RemoteCommand {
    pub fn new(shell: Arc<dyn RemoteShell>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            shell,
            credentials,
            risk: RiskPolicy::default(),
        }
    }

    pub fn with_risk_policy(mut self, risk: RiskPolicy) -> Self {
        self.risk = risk;
        self
    }

    fn command(config: &OperationConfig) -> Option<&str> {
        match &config.settings {
            OperationSettings::RemoteCommand { command } => Some(command.as_str()),
            _ => None,
        }
    }
}

#[async_trait]
impl OperationStrategy for RemoteCommand {
    fn kind(&self) -> OperationKind {
        OperationKind::RemoteCommand
    }

    fn assess_risk(&self, config: &OperationConfig) -> Option<RiskAssessment> {
        Self::command(config).and_then(|cmd| self.risk.assess(cmd))
    }

    fn item_budget(&self, config: &OperationConfig) -> Option<Duration> {
        Some(config.timeout + ITEM_BUDGET_GRACE)
    }

    fn describe(&self, config: &OperationConfig) -> String {
        format!(
            "Execute '{}' over SSH on all marked APs ({}s timeout, {} in parallel)",
            Self::command(config).unwrap_or_default(),
            config.timeout.as_secs_f64(),
            config.parallelism
        )
    }

    async fn execute(
        &self,
        target: &Target,
        config: &OperationConfig,
        cancel: &CancelToken,
        activity: &ActivityReporter,
    ) -> Result<StrategyOutcome, TargetError> {
        if cancel.is_cancelled() {
            return Ok(StrategyOutcome::skipped(STOPPED_BEFORE_START));
        }
        let command = Self::command(config).ok_or_else(|| {
            TargetError::Internal("remote command strategy given foreign settings".to_string())
        })?;
        let address = target.address().ok_or(TargetError::MissingAddress)?;
        let handle = target
            .ssh_credential
            .as_ref()
            .ok_or(TargetError::MissingCredential("No SSH password configured"))?;

        // Resolved per call, never cached
        let credential = self.credentials.resolve(handle).await?;

        activity.report(format!("Connecting to {}:{}", address, target.ssh_port));
        let request = ShellRequest {
            target_id: target.id.clone(),
            address: address.to_string(),
            port: target.ssh_port,
            credential,
            command: command.to_string(),
            timeout: config.timeout,
        };

        let output = match self.shell.run(&request, cancel).await {
            Ok(output) => output,
            Err(ShellError::Cancelled) => {
                info!(target_id = %target.id, "SSH session aborted by stop request");
                return Ok(StrategyOutcome::fail(STOP_ABORT_REASON, serde_json::Value::Null));
            }
            Err(ShellError::Timeout(ms)) => return Err(TargetError::Timeout(ms)),
            Err(e) => return Err(e.into()),
        };

        debug!(
            target_id = %target.id,
            exit_code = output.exit_code,
            duration_ms = output.duration_ms,
            "Remote command finished"
        );

        let payload = json!({
            "exit_code": output.exit_code,
            "stdout": output.stdout,
            "stderr": output.stderr,
            "duration_ms": output.duration_ms,
        });

        if output.exit_code == 0 {
            let reason = if output.stdout.trim().is_empty() {
                "Command executed successfully (no output)".to_string()
            } else {
                preview(&output.stdout, OUTPUT_PREVIEW_CHARS)
            };
            Ok(StrategyOutcome::pass(reason, payload))
        } else {
            let detail = if output.stderr.trim().is_empty() {
                "Command failed".to_string()
            } else {
                preview(&output.stderr, OUTPUT_PREVIEW_CHARS)
            };
            Ok(StrategyOutcome::fail(
                format!("Exit code {}: {}", output.exit_code, detail),
                payload,
            ))
        }
    }
}
