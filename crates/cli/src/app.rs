// Composition root: adapters wired over one SQLite pool

use crate::config::AppConfig;
use anyhow::{Context, Result};
use apbatch_core::application::{
    BrowserAction, ConnectivityProbe, RemoteCommand, RiskPolicy, Strategy,
};
use apbatch_core::domain::{CredentialHandle, SelectionSet, Target};
use apbatch_core::port::time_provider::SystemTimeProvider;
use apbatch_core::port::{Credential, TargetQuery, TargetRegistry, TimeProvider};
use apbatch_infra_sqlite::{
    create_pool, run_migrations, SqliteCredentialStore, SqliteDeviceStatus, SqliteTargetRegistry,
};
use apbatch_infra_system::{
    SshOptions, SubprocessProber, SubprocessShell, WebDriverBrowser, WebDriverConfig,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Inventory file accepted by `apbatch import`
#[derive(Debug, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub access_points: Vec<Target>,
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialRecord {
    pub handle: String,
    pub username: String,
    pub secret: String,
}

pub struct App {
    pub config: AppConfig,
    registry: SqliteTargetRegistry,
    credentials: Arc<SqliteCredentialStore>,
    status: Arc<SqliteDeviceStatus>,
}

impl App {
    pub async fn open(config: AppConfig, database_override: Option<&Path>) -> Result<Self> {
        let db_path = match database_override {
            Some(path) => path.to_path_buf(),
            None => config.database_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        info!(db_path = %db_path.display(), "Opening inventory database");

        let pool = create_pool(&db_path.to_string_lossy())
            .await
            .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
        run_migrations(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        Ok(Self {
            registry: SqliteTargetRegistry::new(pool.clone(), time_provider.clone()),
            credentials: Arc::new(SqliteCredentialStore::new(pool.clone(), time_provider.clone())),
            status: Arc::new(SqliteDeviceStatus::new(pool, time_provider)),
            config,
        })
    }

    pub async fn search(&self, text: &str, limit: Option<usize>) -> Result<Vec<Target>> {
        let mut query = TargetQuery::text(text);
        query.limit = limit;
        self.registry
            .search(&query)
            .await
            .with_context(|| format!("Search for '{}' failed", text))
    }

    /// Every match of every query, marked once
    pub async fn select(&self, queries: &[String]) -> Result<SelectionSet> {
        let mut selection = SelectionSet::new();
        for text in queries {
            let found = self.search(text, None).await?;
            let added = selection.mark(found);
            info!(query = %text, added, selected = selection.len(), "Selection updated");
        }
        Ok(selection)
    }

    /// Returns (access points, credentials) written
    pub async fn import(&self, inventory: &InventoryFile) -> Result<(usize, usize)> {
        let imported = self
            .registry
            .import(&inventory.access_points)
            .await
            .map_err(|e| anyhow::anyhow!("Import failed: {}", e))?;
        for record in &inventory.credentials {
            self.credentials
                .store(
                    &CredentialHandle::new(&record.handle),
                    &Credential::new(&record.username, &record.secret),
                )
                .await
                .map_err(|e| anyhow::anyhow!("Storing credential {} failed: {}", record.handle, e))?;
        }
        Ok((imported, inventory.credentials.len()))
    }

    pub fn connectivity(&self) -> Strategy {
        let prober = Arc::new(SubprocessProber::new(&self.config.ping.program));
        Strategy::Connectivity(ConnectivityProbe::new(prober, self.status.clone()))
    }

    pub fn remote_command(&self) -> Strategy {
        let ssh = &self.config.ssh;
        let shell = Arc::new(SubprocessShell::new(SshOptions {
            ssh_program: ssh.ssh_program.clone(),
            sshpass_program: ssh.sshpass_program.clone(),
            connect_timeout: Duration::from_secs(ssh.connect_timeout_secs),
            strict_host_keys: ssh.strict_host_keys,
        }));
        let risk = RiskPolicy::new(self.config.risk_patterns.iter().cloned());
        Strategy::RemoteCommand(
            RemoteCommand::new(shell, self.credentials.clone()).with_risk_policy(risk),
        )
    }

    /// The driver is returned too so the session can be closed after the run
    pub fn browser(&self) -> (Strategy, Arc<WebDriverBrowser>) {
        let browser = &self.config.browser;
        let driver = Arc::new(WebDriverBrowser::new(WebDriverConfig {
            url: browser.webdriver_url.clone(),
            headless: browser.headless,
            ..WebDriverConfig::default()
        }));
        let strategy = BrowserAction::new(driver.clone(), self.credentials.clone())
            .with_https(browser.use_https);
        (Strategy::Browser(strategy), driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_file_parses_minimal_records() {
        let inventory: InventoryFile = serde_json::from_str(
            r#"{
                "access_points": [
                    {"id": "AP-1", "address": "10.0.0.1", "store_id": "S-100",
                     "ssh_credential": "store-ssh"},
                    {"id": "AP-2"}
                ],
                "credentials": [
                    {"handle": "store-ssh", "username": "admin", "secret": "pw"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(inventory.access_points.len(), 2);
        assert_eq!(inventory.access_points[0].ssh_port, 22);
        assert_eq!(
            inventory.access_points[0].ssh_credential,
            Some(CredentialHandle::new("store-ssh"))
        );
        assert!(inventory.access_points[1].address.is_none());
        assert_eq!(inventory.credentials[0].username, "admin");
    }

    #[tokio::test]
    async fn test_import_then_select_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("fleet.db");
        let app = App::open(AppConfig::default(), Some(&db)).await.unwrap();

        let inventory = InventoryFile {
            access_points: vec![
                Target::new("AP-1", Some("10.0.0.1".into())).with_store("S-100"),
                Target::new("AP-2", Some("10.0.0.2".into())).with_store("S-100"),
                Target::new("AP-3", Some("10.0.1.3".into())).with_store("S-200"),
            ],
            credentials: vec![CredentialRecord {
                handle: "h".into(),
                username: "admin".into(),
                secret: "pw".into(),
            }],
        };
        assert_eq!(app.import(&inventory).await.unwrap(), (3, 1));

        // Overlapping queries do not duplicate AP-1
        let selection = app
            .select(&["S-100".to_string(), "AP-1".to_string(), "10.0.1.".to_string()])
            .await
            .unwrap();
        let ids: Vec<_> = selection.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["AP-1", "AP-2", "AP-3"]);
    }
}
