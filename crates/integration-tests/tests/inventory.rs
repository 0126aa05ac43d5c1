//! Inventory persistence: registry, credentials and device status over SQLite

use std::sync::Arc;

use apbatch_core::domain::{CredentialHandle, Target};
use apbatch_core::port::time_provider::SystemTimeProvider;
use apbatch_core::port::{
    Credential, CredentialError, CredentialStore, DeviceStatus, StatusReport, TargetQuery,
    TargetRegistry,
};
use apbatch_infra_sqlite::{
    create_pool, run_migrations, SqliteCredentialStore, SqliteDeviceStatus, SqliteTargetRegistry,
};

fn fleet(n: usize) -> Vec<Target> {
    (0..n)
        .map(|i| {
            let mut t = Target::new(format!("AP-{:03}", i), Some(format!("10.1.{}.{}", i / 250, i % 250 + 1)))
                .with_store(format!("S-{}", 100 + i / 10))
                .with_ssh_credential(CredentialHandle::new("ssh/default"));
            t.store_alias = Some(format!("Store {}", 100 + i / 10));
            t.mac_address = Some(format!("00:11:22:33:{:02x}:{:02x}", i / 256, i % 256));
            t
        })
        .collect()
}

/// Imported fleet survives a pool restart
#[tokio::test]
async fn test_inventory_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("inventory.db");
    let db_path = db_path.to_str().unwrap();

    {
        let pool = create_pool(db_path).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let registry = SqliteTargetRegistry::new(pool.clone(), Arc::new(SystemTimeProvider));
        let credentials = SqliteCredentialStore::new(pool, Arc::new(SystemTimeProvider));

        assert_eq!(registry.import(&fleet(120)).await.unwrap(), 120);
        credentials
            .store(
                &CredentialHandle::new("ssh/default"),
                &Credential::new("admin", "s3cret"),
            )
            .await
            .unwrap();
    }

    {
        let pool = create_pool(db_path).await.unwrap();
        // Re-running migrations is a no-op
        run_migrations(&pool).await.unwrap();
        let registry = SqliteTargetRegistry::new(pool.clone(), Arc::new(SystemTimeProvider));
        let credentials = SqliteCredentialStore::new(pool, Arc::new(SystemTimeProvider));

        assert_eq!(registry.count().await.unwrap(), 120);
        let ap = registry.find(&"AP-042".to_string()).await.unwrap().unwrap();
        assert_eq!(ap.store_id.as_deref(), Some("S-104"));
        assert_eq!(ap.ssh_port, 22);

        let credential = credentials
            .resolve(&CredentialHandle::new("ssh/default"))
            .await
            .unwrap();
        assert_eq!(credential.username, "admin");
    }

    println!("✅ Inventory persisted across restart");
}

/// Search covers every identifying column and orders by AP id
#[tokio::test]
async fn test_search_semantics() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let registry = SqliteTargetRegistry::new(pool, Arc::new(SystemTimeProvider));
    registry.import(&fleet(30)).await.unwrap();

    let by_store = registry.search(&TargetQuery::text("s-101")).await.unwrap();
    let ids: Vec<_> = by_store.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), 10);
    assert_eq!(ids.first(), Some(&"AP-010"));
    assert_eq!(ids.last(), Some(&"AP-019"));

    let by_mac = registry
        .search(&TargetQuery::text("33:00:1d"))
        .await
        .unwrap();
    assert_eq!(by_mac.len(), 1);
    assert_eq!(by_mac[0].id, "AP-029");

    let by_alias = registry.search(&TargetQuery::text("Store 102")).await.unwrap();
    assert_eq!(by_alias.len(), 10);

    let limited = registry
        .search(&TargetQuery::text("AP-").with_limit(5))
        .await
        .unwrap();
    assert_eq!(limited.len(), 5);

    // Wildcards are literal
    let none = registry.search(&TargetQuery::text("AP_0%")).await.unwrap();
    assert!(none.is_empty());

    println!("✅ Search matches id, store, alias and MAC");
}

/// Re-import updates descriptive fields but keeps recorded status
#[tokio::test]
async fn test_reimport_keeps_status() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let registry = SqliteTargetRegistry::new(pool.clone(), Arc::new(SystemTimeProvider));
    let status = SqliteDeviceStatus::new(pool, Arc::new(SystemTimeProvider));

    registry.import(&fleet(3)).await.unwrap();
    status
        .record(&StatusReport {
            target_id: "AP-001".to_string(),
            status: DeviceStatus::Online,
            latency_ms: Some(4.5),
        })
        .await
        .unwrap();

    let mut moved = fleet(3);
    moved[1].address = Some("10.9.9.9".to_string());
    registry.import(&moved).await.unwrap();

    let ap = registry.find(&"AP-001".to_string()).await.unwrap().unwrap();
    assert_eq!(ap.address.as_deref(), Some("10.9.9.9"));
    let stored = status.current(&"AP-001".to_string()).await.unwrap().unwrap();
    assert_eq!(stored.status, "online");
    assert_eq!(stored.last_ping_ms, Some(4.5));

    println!("✅ Re-import keeps device status");
}

#[tokio::test]
async fn test_unknown_credential_handle() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let credentials = SqliteCredentialStore::new(pool, Arc::new(SystemTimeProvider));

    let err = credentials
        .resolve(&CredentialHandle::new("web/missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::NotFound(ref h) if h == "web/missing"));

    println!("✅ Unknown credential handle is NotFound");
}
