// SQLite TargetRegistry Implementation

use crate::map_sqlx_error;
use apbatch_core::domain::target::DEFAULT_SSH_PORT;
use apbatch_core::domain::{CredentialHandle, Target, TargetId};
use apbatch_core::error::Result;
use apbatch_core::port::{RegistryError, TargetQuery, TargetRegistry, TimeProvider};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

const TARGET_COLUMNS: &str = "ap_id, store_id, store_alias, retail_chain, ip_address, \
     mac_address, ssh_port, ssh_credential, web_credential";

const UPSERT_SQL: &str = r#"
    INSERT INTO access_points (
        ap_id, store_id, store_alias, retail_chain, ip_address,
        mac_address, ssh_port, ssh_credential, web_credential, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(ap_id) DO UPDATE SET
        store_id = excluded.store_id,
        store_alias = excluded.store_alias,
        retail_chain = excluded.retail_chain,
        ip_address = excluded.ip_address,
        mac_address = excluded.mac_address,
        ssh_port = excluded.ssh_port,
        ssh_credential = excluded.ssh_credential,
        web_credential = excluded.web_credential,
        updated_at = excluded.updated_at
"#;

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_target<'q>(query: SqliteQuery<'q>, target: &'q Target, now: i64) -> SqliteQuery<'q> {
    query
        .bind(&target.id)
        .bind(&target.store_id)
        .bind(&target.store_alias)
        .bind(&target.retail_chain)
        .bind(&target.address)
        .bind(&target.mac_address)
        .bind(i64::from(target.ssh_port))
        .bind(target.ssh_credential.as_ref().map(CredentialHandle::as_str))
        .bind(target.web_credential.as_ref().map(CredentialHandle::as_str))
        .bind(now)
}

pub struct SqliteTargetRegistry {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteTargetRegistry {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Insert or replace the inventory fields of one access point
    ///
    /// Status columns are left untouched on update.
    pub async fn upsert(&self, target: &Target) -> Result<()> {
        bind_target(sqlx::query(UPSERT_SQL), target, self.time_provider.now_millis())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Upsert many records in one transaction; returns how many were written
    pub async fn import(&self, targets: &[Target]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let now = self.time_provider.now_millis();

        for target in targets {
            bind_target(sqlx::query(UPSERT_SQL), target, now)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        info!(count = targets.len(), "Imported access points");
        Ok(targets.len())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM access_points")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

fn unavailable(err: sqlx::Error) -> RegistryError {
    RegistryError::Unavailable(map_sqlx_error(err).to_string())
}

/// Escape LIKE wildcards so operator input matches literally
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl TargetRegistry for SqliteTargetRegistry {
    async fn search(&self, query: &TargetQuery) -> std::result::Result<Vec<Target>, RegistryError> {
        let pattern = like_pattern(query.text.trim());
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        debug!(query = %query.text, limit, "Searching access points");

        let sql = format!(
            r#"
            SELECT {TARGET_COLUMNS} FROM access_points
            WHERE ap_id LIKE ?1 ESCAPE '\'
               OR ip_address LIKE ?1 ESCAPE '\'
               OR mac_address LIKE ?1 ESCAPE '\'
               OR store_id LIKE ?1 ESCAPE '\'
               OR store_alias LIKE ?1 ESCAPE '\'
            ORDER BY ap_id
            LIMIT ?2
            "#
        );
        let rows = sqlx::query_as::<_, TargetRow>(&sql)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(rows.into_iter().map(TargetRow::into_target).collect())
    }

    async fn find(&self, id: &TargetId) -> std::result::Result<Option<Target>, RegistryError> {
        let sql = format!("SELECT {TARGET_COLUMNS} FROM access_points WHERE ap_id = ?");
        let row = sqlx::query_as::<_, TargetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        Ok(row.map(TargetRow::into_target))
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    ap_id: String,
    store_id: Option<String>,
    store_alias: Option<String>,
    retail_chain: Option<String>,
    ip_address: Option<String>,
    mac_address: Option<String>,
    ssh_port: i64,
    ssh_credential: Option<String>,
    web_credential: Option<String>,
}

impl TargetRow {
    fn into_target(self) -> Target {
        Target {
            id: self.ap_id,
            address: self.ip_address,
            store_id: self.store_id,
            store_alias: self.store_alias,
            retail_chain: self.retail_chain,
            mac_address: self.mac_address,
            ssh_port: u16::try_from(self.ssh_port).unwrap_or(DEFAULT_SSH_PORT),
            ssh_credential: self.ssh_credential.map(CredentialHandle::new),
            web_credential: self.web_credential.map(CredentialHandle::new),
        }
    }
}
