// Browser Driver Port
// Automation of AP web interfaces in a shared browser, one tab per target

use super::credential_store::Credential;
use crate::domain::BrowserActionKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Driver-assigned tab handle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub String);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one web-interface action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReport {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ActionReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Page load timeout after {0}ms")]
    PageTimeout(u64),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open `url` in a new tab of the shared session
    async fn open_tab(&self, url: &str, timeout: Duration) -> Result<TabId, BrowserError>;

    /// Login when prompted, then perform `action` on the loaded page
    async fn perform(
        &self,
        tab: &TabId,
        action: BrowserActionKind,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<ActionReport, BrowserError>;

    async fn close_tab(&self, tab: &TabId) -> Result<(), BrowserError>;
}

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory browser tracking open tabs
    #[derive(Default)]
    pub struct MockBrowser {
        next_tab: AtomicUsize,
        urls: Mutex<HashMap<TabId, String>>,
        open: Mutex<HashSet<TabId>>,
        max_open: AtomicUsize,
        closed: AtomicUsize,
        unreachable: HashSet<String>,
        failing: HashSet<String>,
        action_delay: Duration,
    }

    impl MockBrowser {
        pub fn new() -> Self {
            Self::default()
        }

        /// `open_tab` fails for urls containing `host`
        pub fn unreachable(mut self, host: &str) -> Self {
            self.unreachable.insert(host.to_string());
            self
        }

        /// `perform` reports failure for urls containing `host`
        pub fn failing(mut self, host: &str) -> Self {
            self.failing.insert(host.to_string());
            self
        }

        pub fn with_action_delay(mut self, delay: Duration) -> Self {
            self.action_delay = delay;
            self
        }

        pub fn open_count(&self) -> usize {
            self.open.lock().unwrap().len()
        }

        pub fn max_open(&self) -> usize {
            self.max_open.load(Ordering::SeqCst)
        }

        pub fn closed_count(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrowserDriver for MockBrowser {
        async fn open_tab(&self, url: &str, timeout: Duration) -> Result<TabId, BrowserError> {
            if self.unreachable.iter().any(|h| url.contains(h.as_str())) {
                return Err(BrowserError::PageTimeout(timeout.as_millis() as u64));
            }
            let tab = TabId(format!(
                "tab-{}",
                self.next_tab.fetch_add(1, Ordering::SeqCst) + 1
            ));
            self.urls.lock().unwrap().insert(tab.clone(), url.to_string());
            let open = {
                let mut open = self.open.lock().unwrap();
                open.insert(tab.clone());
                open.len()
            };
            self.max_open.fetch_max(open, Ordering::SeqCst);
            Ok(tab)
        }

        async fn perform(
            &self,
            tab: &TabId,
            action: BrowserActionKind,
            _credential: &Credential,
            _timeout: Duration,
        ) -> Result<ActionReport, BrowserError> {
            if !self.action_delay.is_zero() {
                tokio::time::sleep(self.action_delay).await;
            }
            let url = self
                .urls
                .lock()
                .unwrap()
                .get(tab)
                .cloned()
                .ok_or_else(|| BrowserError::Driver(format!("no such window: {}", tab)))?;

            if self.failing.iter().any(|h| url.contains(h.as_str())) {
                return Ok(ActionReport::failed("Could not find SSH settings page"));
            }
            Ok(match action {
                BrowserActionKind::EnableSsh => ActionReport::ok("SSH server enabled"),
                BrowserActionKind::DisableSsh => ActionReport::ok("SSH server disabled"),
                BrowserActionKind::Reboot => ActionReport::ok("Reboot initiated"),
                BrowserActionKind::CheckStatus => ActionReport::ok("Status: Online"),
                BrowserActionKind::ReadConfig => ActionReport::ok("Configuration read")
                    .with_details(serde_json::json!({"page_title": "AP Configuration"})),
            })
        }

        async fn close_tab(&self, tab: &TabId) -> Result<(), BrowserError> {
            if self.open.lock().unwrap().remove(tab) {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }
}
