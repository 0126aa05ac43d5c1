// SQLite DeviceStatusReporter - status/last_seen/last_ping_ms columns

use crate::map_sqlx_error;
use apbatch_core::domain::TargetId;
use apbatch_core::error::Result;
use apbatch_core::port::{DeviceStatus, DeviceStatusReporter, StatusReport, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored status columns of one access point
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredStatus {
    pub status: String,
    pub last_seen: Option<i64>,
    pub last_ping_ms: Option<f64>,
}

#[derive(Clone)]
pub struct SqliteDeviceStatus {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteDeviceStatus {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Write one report; `last_seen` only moves forward on an online report
    pub async fn record(&self, report: &StatusReport) -> Result<()> {
        let now = self.time_provider.now_millis();
        let result = match report.status {
            DeviceStatus::Online => {
                sqlx::query(
                    "UPDATE access_points SET status = ?, last_seen = ?, last_ping_ms = ? WHERE ap_id = ?",
                )
                .bind(report.status.as_str())
                .bind(now)
                .bind(report.latency_ms)
                .bind(&report.target_id)
                .execute(&self.pool)
                .await
            }
            DeviceStatus::Offline => {
                sqlx::query("UPDATE access_points SET status = ?, last_ping_ms = NULL WHERE ap_id = ?")
                    .bind(report.status.as_str())
                    .bind(&report.target_id)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            debug!(target_id = %report.target_id, "Status report for unknown access point");
        }
        Ok(())
    }

    pub async fn current(&self, target_id: &TargetId) -> Result<Option<StoredStatus>> {
        sqlx::query_as::<_, StoredStatus>(
            "SELECT status, last_seen, last_ping_ms FROM access_points WHERE ap_id = ?",
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

impl DeviceStatusReporter for SqliteDeviceStatus {
    fn report_status(&self, report: StatusReport) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(target_id = %report.target_id, "No runtime for status write, report dropped");
            return;
        };
        let writer = self.clone();
        runtime.spawn(async move {
            if let Err(e) = writer.record(&report).await {
                warn!(target_id = %report.target_id, error = %e, "Device status write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteTargetRegistry};
    use apbatch_core::domain::Target;
    use apbatch_core::port::time_provider::mocks::ManualClock;
    use std::time::Duration;

    async fn setup() -> (SqliteDeviceStatus, Arc<ManualClock>) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        SqliteTargetRegistry::new(pool.clone(), clock.clone())
            .import(&[Target::new("AP-1", Some("10.0.0.1".into()))])
            .await
            .unwrap();
        (SqliteDeviceStatus::new(pool, clock.clone()), clock)
    }

    fn report(status: DeviceStatus, latency_ms: Option<f64>) -> StatusReport {
        StatusReport {
            target_id: "AP-1".to_string(),
            status,
            latency_ms,
        }
    }

    #[tokio::test]
    async fn test_new_ap_status_unknown() {
        let (status, _) = setup().await;
        let stored = status.current(&"AP-1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, "unknown");
        assert!(stored.last_seen.is_none());
    }

    #[tokio::test]
    async fn test_online_then_offline_keeps_last_seen() {
        let (status, clock) = setup().await;
        status
            .record(&report(DeviceStatus::Online, Some(2.5)))
            .await
            .unwrap();
        clock.advance(60_000);
        status
            .record(&report(DeviceStatus::Offline, None))
            .await
            .unwrap();

        let stored = status.current(&"AP-1".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.status, "offline");
        assert_eq!(stored.last_seen, Some(1_000));
        assert_eq!(stored.last_ping_ms, None);
    }

    #[tokio::test]
    async fn test_report_status_writes_in_background() {
        let (status, _) = setup().await;
        status.report_status(report(DeviceStatus::Online, Some(4.0)));

        let mut stored = None;
        for _ in 0..50 {
            let current = status.current(&"AP-1".to_string()).await.unwrap().unwrap();
            if current.status == "online" {
                stored = Some(current);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stored = stored.expect("status never written");
        assert_eq!(stored.last_ping_ms, Some(4.0));
    }

    #[tokio::test]
    async fn test_unknown_ap_is_ignored() {
        let (status, _) = setup().await;
        let mut ghost = report(DeviceStatus::Online, Some(1.0));
        ghost.target_id = "AP-404".into();
        assert!(status.record(&ghost).await.is_ok());
    }
}
