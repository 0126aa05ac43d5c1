// Browser Action Strategy

use super::risk::RiskAssessment;
use super::tab_batches::{BatchCloser, TabBatches};
use super::{ActivityReporter, OperationStrategy, StrategyOutcome, TargetError};
use crate::application::engine::constants::STOPPED_BEFORE_START;
use crate::domain::{
    BrowserActionKind, CancelToken, OperationConfig, OperationKind, OperationSettings, Target,
};
use crate::port::{ActionReport, BrowserDriver, Credential, CredentialStore, TabId};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct BrowserAction {
    driver: Arc<dyn BrowserDriver>,
    credentials: Arc<dyn CredentialStore>,
    scheme: &'static str,
    batches: Mutex<Option<Arc<TabBatches>>>,
}

impl BrowserAction {
    pub fn new(driver: Arc<dyn BrowserDriver>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            driver,
            credentials,
            scheme: "http",
            batches: Mutex::new(None),
        }
    }

    /// Open web interfaces over https instead of http
    pub fn with_https(mut self, https: bool) -> Self {
        self.scheme = if https { "https" } else { "http" };
        self
    }

    fn settings(config: &OperationConfig) -> Option<(BrowserActionKind, usize)> {
        match config.settings {
            OperationSettings::Browser { action, tab_budget } => Some((action, tab_budget)),
            _ => None,
        }
    }

    /// Pool shared by every target of the run; rebuilt if the budget changes
    fn pool(&self, budget: usize) -> Arc<TabBatches> {
        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        match batches.as_ref() {
            Some(pool) if pool.budget() == budget => Arc::clone(pool),
            _ => {
                let pool = TabBatches::new(budget);
                *batches = Some(Arc::clone(&pool));
                pool
            }
        }
    }

    async fn open_and_perform(
        &self,
        slot_tab: &mut Option<TabId>,
        url: &str,
        action: BrowserActionKind,
        credential: &Credential,
        page_timeout: Duration,
    ) -> Result<ActionReport, TargetError> {
        let timeout_ms = page_timeout.as_millis() as u64;

        let tab = timeout(page_timeout, self.driver.open_tab(url, page_timeout))
            .await
            .map_err(|_| TargetError::Timeout(timeout_ms))??;
        *slot_tab = Some(tab.clone());

        let report = timeout(
            page_timeout,
            self.driver.perform(&tab, action, credential, page_timeout),
        )
        .await
        .map_err(|_| TargetError::Timeout(timeout_ms))??;
        Ok(report)
    }

    async fn close_batch(&self, closer: BatchCloser) {
        debug!(batch = closer.batch(), tabs = closer.tabs().len(), "Closing tab batch");
        let closes = closer.tabs().iter().map(|tab| self.driver.close_tab(tab));
        for (tab, result) in closer.tabs().iter().zip(futures::future::join_all(closes).await) {
            if let Err(e) = result {
                warn!(tab = %tab, error = %e, "Failed to close browser tab");
            }
        }
        // Dropping the closer admits the next batch
        drop(closer);
    }
}

#[async_trait]
impl OperationStrategy for BrowserAction {
    fn kind(&self) -> OperationKind {
        OperationKind::Browser
    }

    fn assess_risk(&self, config: &OperationConfig) -> Option<RiskAssessment> {
        match Self::settings(config) {
            Some((BrowserActionKind::Reboot, _)) => Some(RiskAssessment {
                matched: vec![BrowserActionKind::Reboot.as_str().to_string()],
                summary: "Rebooting interrupts service on every marked AP".to_string(),
            }),
            _ => None,
        }
    }

    /// Tab admission can wait on other targets, so there is no fixed guard
    fn item_budget(&self, _config: &OperationConfig) -> Option<Duration> {
        None
    }

    fn describe(&self, config: &OperationConfig) -> String {
        match Self::settings(config) {
            Some((action, budget)) => format!(
                "{} (at most {} browser tab(s) at a time, {}s page timeout)",
                action.description(),
                budget,
                config.timeout.as_secs_f64()
            ),
            None => "Browser action".to_string(),
        }
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
        let (action, budget) = Self::settings(config).ok_or_else(|| {
            TargetError::Internal("browser strategy given foreign settings".to_string())
        })?;
        let address = target.address().ok_or(TargetError::MissingAddress)?;
        let handle = target
            .web_credential
            .as_ref()
            .ok_or(TargetError::MissingCredential("No password configured"))?;
        let credential = self.credentials.resolve(handle).await?;

        let pool = self.pool(budget);
        activity.report("Waiting for browser tab");
        let Some(slot) = pool.admit(cancel).await else {
            return Ok(StrategyOutcome::skipped("Stopped while waiting for a browser tab"));
        };

        let url = format!("{}://{}", self.scheme, address);
        activity.report(format!("Opening {} (batch {})", url, slot.batch() + 1));

        let mut tab = None;
        let result = self
            .open_and_perform(&mut tab, &url, action, &credential, config.timeout)
            .await;
        if let Some(tab) = tab {
            slot.register_tab(tab);
        }

        if let Some(closer) = slot.finish() {
            self.close_batch(closer).await;
        }

        let report = result?;
        let payload = serde_json::json!({
            "action": action.as_str(),
            "url": url,
            "details": report.details,
        });
        if report.success {
            Ok(StrategyOutcome::pass(report.message, payload))
        } else {
            Ok(StrategyOutcome::fail(report.message, payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategy::Verdict;
    use crate::domain::CredentialHandle;
    use crate::port::browser::mocks::MockBrowser;
    use crate::port::credential_store::mocks::StaticCredentialStore;

    fn strategy(browser: MockBrowser) -> (Arc<BrowserAction>, Arc<MockBrowser>) {
        let browser = Arc::new(browser);
        let creds = StaticCredentialStore::new().with("web/default", "admin", "pw");
        (
            Arc::new(BrowserAction::new(browser.clone(), Arc::new(creds))),
            browser,
        )
    }

    fn ap(n: usize) -> Target {
        Target::new(format!("AP-{}", n), Some(format!("10.2.0.{}", n)))
            .with_web_credential(CredentialHandle::new("web/default"))
    }

    #[tokio::test]
    async fn test_enable_ssh_and_close_tab() {
        let (s, browser) = strategy(MockBrowser::new());
        let config = OperationConfig::browser(BrowserActionKind::EnableSsh, 3);

        let outcome = s
            .execute(&ap(1), &config, &CancelToken::never(), &ActivityReporter::detached())
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.reason, "SSH server enabled");
        assert_eq!(outcome.payload["url"], "http://10.2.0.1");
        // Sole member of its batch closes its own tab
        assert_eq!(browser.open_count(), 0);
        assert_eq!(browser.closed_count(), 1);
    }

    #[tokio::test]
    async fn test_tab_budget_never_exceeded() {
        let (s, browser) =
            strategy(MockBrowser::new().with_action_delay(Duration::from_millis(15)));
        let config = OperationConfig::browser(BrowserActionKind::CheckStatus, 3);

        let mut tasks = Vec::new();
        for n in 0..8 {
            let s = Arc::clone(&s);
            let config = config.clone();
            tasks.push(tokio::spawn(async move {
                s.execute(&ap(n), &config, &CancelToken::never(), &ActivityReporter::detached())
                    .await
            }));
        }
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.verdict, Verdict::Pass);
        }

        assert!(browser.max_open() <= 3, "max open {}", browser.max_open());
        assert_eq!(browser.open_count(), 0);
        assert_eq!(browser.closed_count(), 8);
    }

    #[tokio::test]
    async fn test_unreachable_page_is_target_error_and_batch_advances() {
        let (s, _) = strategy(MockBrowser::new().unreachable("10.2.0.1"));
        let config = OperationConfig::browser(BrowserActionKind::Reboot, 1);

        let err = s
            .execute(&ap(1), &config, &CancelToken::never(), &ActivityReporter::detached())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "browser");

        let outcome = s
            .execute(&ap(2), &config, &CancelToken::never(), &ActivityReporter::detached())
            .await
            .unwrap();
        assert_eq!(outcome.reason, "Reboot initiated");
    }

    #[tokio::test]
    async fn test_action_failure_is_fail_verdict() {
        let (s, _) = strategy(MockBrowser::new().failing("10.2.0.4"));
        let outcome = s
            .execute(
                &ap(4),
                &OperationConfig::browser(BrowserActionKind::DisableSsh, 2),
                &CancelToken::never(),
                &ActivityReporter::detached(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_missing_web_credential() {
        let (s, browser) = strategy(MockBrowser::new());
        let target = Target::new("AP-5", Some("10.2.0.5".to_string()));
        let err = s
            .execute(
                &target,
                &OperationConfig::browser(BrowserActionKind::CheckStatus, 2),
                &CancelToken::never(),
                &ActivityReporter::detached(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No password configured");
        assert_eq!(browser.max_open(), 0);
    }

    #[test]
    fn test_reboot_is_high_risk() {
        let (s, _) = strategy(MockBrowser::new());
        assert!(s
            .assess_risk(&OperationConfig::browser(BrowserActionKind::Reboot, 9))
            .is_some());
        assert!(s
            .assess_risk(&OperationConfig::browser(BrowserActionKind::ReadConfig, 9))
            .is_none());
        assert!(s
            .item_budget(&OperationConfig::browser(BrowserActionKind::ReadConfig, 9))
            .is_none());
    }
}
