// SQLite CredentialStore Implementation

use crate::map_sqlx_error;
use apbatch_core::domain::CredentialHandle;
use apbatch_core::error::Result;
use apbatch_core::port::{Credential, CredentialError, CredentialStore, TimeProvider};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

// Secrets are stored in plaintext
pub struct SqliteCredentialStore {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    pub async fn store(&self, handle: &CredentialHandle, credential: &Credential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (handle, username, secret, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET
                username = excluded.username,
                secret = excluded.secret,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(handle.as_str())
        .bind(&credential.username)
        .bind(&credential.secret)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(handle = %handle, "Stored credential");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn resolve(
        &self,
        handle: &CredentialHandle,
    ) -> std::result::Result<Credential, CredentialError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT username, secret FROM credentials WHERE handle = ?")
                .bind(handle.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CredentialError::Unavailable(map_sqlx_error(e).to_string()))?;

        row.map(|(username, secret)| Credential::new(username, secret))
            .ok_or_else(|| CredentialError::NotFound(handle.to_string()))
    }
}
