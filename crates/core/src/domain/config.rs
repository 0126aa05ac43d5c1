// Operation Config Domain Model

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for the worker pool of a single run
pub const MAX_PARALLELISM: usize = 50;

/// Upper bound for reachability probes per target
pub const MAX_PROBE_COUNT: u32 = 10;

/// Upper bound for concurrently open browser tabs
pub const MAX_TAB_BUDGET: usize = 15;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Closed set of operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Connectivity,
    RemoteCommand,
    Browser,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Connectivity => write!(f, "connectivity probe"),
            OperationKind::RemoteCommand => write!(f, "remote command"),
            OperationKind::Browser => write!(f, "browser action"),
        }
    }
}

/// Web-interface actions supported by the browser strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserActionKind {
    EnableSsh,
    DisableSsh,
    Reboot,
    CheckStatus,
    ReadConfig,
}

impl BrowserActionKind {
    pub const ALL: [BrowserActionKind; 5] = [
        BrowserActionKind::EnableSsh,
        BrowserActionKind::DisableSsh,
        BrowserActionKind::Reboot,
        BrowserActionKind::CheckStatus,
        BrowserActionKind::ReadConfig,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BrowserActionKind::EnableSsh => "enable_ssh",
            BrowserActionKind::DisableSsh => "disable_ssh",
            BrowserActionKind::Reboot => "reboot",
            BrowserActionKind::CheckStatus => "check_status",
            BrowserActionKind::ReadConfig => "read_config",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BrowserActionKind::EnableSsh => "Enable SSH server on all marked APs",
            BrowserActionKind::DisableSsh => "Disable SSH server on all marked APs",
            BrowserActionKind::Reboot => "Reboot all marked APs via web interface",
            BrowserActionKind::CheckStatus => "Check status of all marked APs",
            BrowserActionKind::ReadConfig => "Read configuration from all marked APs",
        }
    }
}

impl std::fmt::Display for BrowserActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserActionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| AppError::Config(format!("Unknown browser action: {}", s)))
    }
}

/// Operation-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationSettings {
    Connectivity { probe_count: u32 },
    RemoteCommand { command: String },
    Browser {
        action: BrowserActionKind,
        tab_budget: usize,
    },
}

impl OperationSettings {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationSettings::Connectivity { .. } => OperationKind::Connectivity,
            OperationSettings::RemoteCommand { .. } => OperationKind::RemoteCommand,
            OperationSettings::Browser { .. } => OperationKind::Browser,
        }
    }
}

/// Caller-supplied parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct OperationConfig {
    /// Worker pool bound
    pub parallelism: usize,
    /// Per-target timeout, enforced by the strategy
    pub timeout: Duration,
    /// Heartbeat period for progress events
    pub progress_interval: Duration,
    /// Explicit operator confirmation for high-risk operations
    pub acknowledge_high_risk: bool,
    pub settings: OperationSettings,
}

impl OperationConfig {
    pub fn new(settings: OperationSettings) -> Self {
        let (parallelism, timeout) = match &settings {
            OperationSettings::Connectivity { .. } => (10, Duration::from_secs(2)),
            OperationSettings::RemoteCommand { .. } => (10, Duration::from_secs(30)),
            OperationSettings::Browser { tab_budget, .. } => {
                ((*tab_budget).max(1), Duration::from_secs(30))
            }
        };
        Self {
            parallelism,
            timeout,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            acknowledge_high_risk: false,
            settings,
        }
    }

    pub fn connectivity(probe_count: u32) -> Self {
        Self::new(OperationSettings::Connectivity { probe_count })
    }

    pub fn remote_command(command: impl Into<String>) -> Self {
        Self::new(OperationSettings::RemoteCommand {
            command: command.into(),
        })
    }

    pub fn browser(action: BrowserActionKind, tab_budget: usize) -> Self {
        Self::new(OperationSettings::Browser { action, tab_budget })
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn acknowledge_high_risk(mut self) -> Self {
        self.acknowledge_high_risk = true;
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.settings.kind()
    }

    /// Reject invalid values; nothing is clamped
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(AppError::Config("parallelism must be at least 1".to_string()));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(AppError::Config(format!(
                "parallelism {} exceeds maximum of {}",
                self.parallelism, MAX_PARALLELISM
            )));
        }
        if self.timeout.is_zero() {
            return Err(AppError::Config("timeout must be greater than zero".to_string()));
        }
        if self.progress_interval.is_zero() {
            return Err(AppError::Config(
                "progress interval must be greater than zero".to_string(),
            ));
        }

        match &self.settings {
            OperationSettings::Connectivity { probe_count } => {
                if *probe_count == 0 || *probe_count > MAX_PROBE_COUNT {
                    return Err(AppError::Config(format!(
                        "probe count must be between 1 and {}, got {}",
                        MAX_PROBE_COUNT, probe_count
                    )));
                }
            }
            OperationSettings::RemoteCommand { command } => {
                if command.trim().is_empty() {
                    return Err(AppError::Config("command cannot be empty".to_string()));
                }
            }
            OperationSettings::Browser { tab_budget, .. } => {
                if *tab_budget == 0 || *tab_budget > MAX_TAB_BUDGET {
                    return Err(AppError::Config(format!(
                        "tab budget must be between 1 and {}, got {}",
                        MAX_TAB_BUDGET, tab_budget
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        tokio_test::assert_ok!(OperationConfig::connectivity(4).validate());
        tokio_test::assert_ok!(OperationConfig::remote_command("uptime").validate());
        tokio_test::assert_ok!(OperationConfig::browser(BrowserActionKind::CheckStatus, 9).validate());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let err = OperationConfig::connectivity(4)
            .with_parallelism(0)
            .validate()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_parallelism_not_clamped() {
        let err = OperationConfig::connectivity(4)
            .with_parallelism(MAX_PARALLELISM + 1)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = OperationConfig::remote_command("uptime")
            .with_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_settings_ranges() {
        assert!(OperationConfig::connectivity(0).validate().is_err());
        assert!(OperationConfig::connectivity(MAX_PROBE_COUNT + 1)
            .validate()
            .is_err());
        assert!(OperationConfig::remote_command("   ").validate().is_err());
        assert!(OperationConfig::browser(BrowserActionKind::Reboot, 0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_browser_action_parse() {
        assert_eq!(
            "enable-ssh".parse::<BrowserActionKind>().unwrap(),
            BrowserActionKind::EnableSsh
        );
        assert_eq!(
            "CHECK_STATUS".parse::<BrowserActionKind>().unwrap(),
            BrowserActionKind::CheckStatus
        );
        assert!("format".parse::<BrowserActionKind>().is_err());
    }
}
