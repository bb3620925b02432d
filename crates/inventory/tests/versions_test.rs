//! Integration tests for ConfigVersionManager over the in-memory store

use inventory::{
    ConfigVersionManager, Configuration, ConfigurationRepository, DeviceId, DeviceRepository,
    MemoryStore, VersionError,
};
use std::sync::Arc;

fn setup() -> (Arc<MemoryStore>, Arc<ConfigVersionManager>) {
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(ConfigVersionManager::new(store.clone(), store.clone()));
    (store, manager)
}

/// Check every invariant of one device's history
async fn assert_invariants(store: &MemoryStore, device_id: DeviceId) {
    let mut history: Vec<Configuration> = store.list_for_device(device_id).await.unwrap();
    history.sort_by_key(|c| c.version);

    let versions: Vec<u32> = history.iter().map(|c| c.version).collect();
    let expected: Vec<u32> = (1..=history.len() as u32).collect();
    assert_eq!(versions, expected, "versions must be 1..N without gaps");

    let current: Vec<&Configuration> = history.iter().filter(|c| c.is_current).collect();
    let device = DeviceRepository::find_by_id(store, device_id).await.unwrap();

    if history.is_empty() {
        assert!(current.is_empty());
        assert_eq!(device.current_configuration, None);
    } else {
        assert_eq!(current.len(), 1, "exactly one current configuration");
        assert_eq!(device.current_configuration, Some(current[0].id));
    }
}

#[tokio::test]
async fn test_push_produces_sequential_versions() {
    let (store, manager) = setup();
    let device = store.add_device("core-rtr", Some("10.0.0.1".into()));

    for i in 1..=5u32 {
        let config = manager
            .push_configuration(device.id, format!("hostname core-{}", i), Some("alice"))
            .await
            .unwrap();
        assert_eq!(config.version, i);
        assert!(config.is_current);
        assert_eq!(config.pushed_by, "alice");
        assert_invariants(&store, device.id).await;
    }
}

#[tokio::test]
async fn test_push_defaults_author() {
    let (store, manager) = setup();
    let device = store.add_device("core-rtr", None);

    let config = manager.push_configuration(device.id, "a", None).await.unwrap();
    assert_eq!(config.pushed_by, "System");

    let config = manager.push_configuration(device.id, "b", Some("  ")).await.unwrap();
    assert_eq!(config.pushed_by, "System");
}

#[tokio::test]
async fn test_push_unknown_device() {
    let (_store, manager) = setup();
    let err = manager.push_configuration(404, "a", None).await.unwrap_err();
    assert_eq!(err, VersionError::DeviceNotFound(404));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_push_then_revert_scenario() {
    let (store, manager) = setup();
    let device = store.add_device("edge-fw", Some("10.0.0.2".into()));

    let v1 = manager.push_configuration(device.id, "A", None).await.unwrap();
    assert_eq!(v1.version, 1);
    assert!(v1.is_current);

    let v2 = manager.push_configuration(device.id, "B", None).await.unwrap();
    assert_eq!(v2.version, 2);
    assert!(v2.is_current);
    assert!(!ConfigurationRepository::find_by_id(&*store, v1.id).await.unwrap().is_current);

    let reverted = manager.set_current(device.id, v1.id).await.unwrap();
    assert_eq!(reverted.id, v1.id);
    assert!(reverted.is_current);

    assert!(ConfigurationRepository::find_by_id(&*store, v1.id).await.unwrap().is_current);
    assert!(!ConfigurationRepository::find_by_id(&*store, v2.id).await.unwrap().is_current);
    let device = DeviceRepository::find_by_id(&*store, device.id).await.unwrap();
    assert_eq!(device.current_configuration, Some(v1.id));
    assert_invariants(&store, device.id).await;

    // A push after a revert still appends at the end
    let v3 = manager.push_configuration(device.id, "C", None).await.unwrap();
    assert_eq!(v3.version, 3);
    assert_invariants(&store, device.id).await;
}

#[tokio::test]
async fn test_set_current_rejects_foreign_configuration() {
    let (store, manager) = setup();
    let a = store.add_device("a", None);
    let b = store.add_device("b", None);

    let a1 = manager.push_configuration(a.id, "a1", None).await.unwrap();
    let b1 = manager.push_configuration(b.id, "b1", None).await.unwrap();
    let b2 = manager.push_configuration(b.id, "b2", None).await.unwrap();

    let mut before_a = store.list_for_device(a.id).await.unwrap();
    let mut before_b = store.list_for_device(b.id).await.unwrap();

    let err = manager.set_current(a.id, b1.id).await.unwrap_err();
    assert_eq!(err, VersionError::ConfigurationNotFound(b1.id));

    let mut after_a = store.list_for_device(a.id).await.unwrap();
    let mut after_b = store.list_for_device(b.id).await.unwrap();
    for list in [&mut before_a, &mut before_b, &mut after_a, &mut after_b] {
        list.sort_by_key(|c| c.id);
    }
    assert_eq!(before_a, after_a);
    assert_eq!(before_b, after_b);

    let device_a = DeviceRepository::find_by_id(&*store, a.id).await.unwrap();
    let device_b = DeviceRepository::find_by_id(&*store, b.id).await.unwrap();
    assert_eq!(device_a.current_configuration, Some(a1.id));
    assert_eq!(device_b.current_configuration, Some(b2.id));
}

#[tokio::test]
async fn test_set_current_unknown_configuration() {
    let (store, manager) = setup();
    let device = store.add_device("a", None);

    let err = manager.set_current(device.id, 999).await.unwrap_err();
    assert_eq!(err, VersionError::ConfigurationNotFound(999));
    assert_invariants(&store, device.id).await;
}

#[tokio::test]
async fn test_list_configurations_newest_first() {
    let (store, manager) = setup();
    let device = store.add_device("a", None);
    for content in ["one", "two", "three"] {
        manager.push_configuration(device.id, content, None).await.unwrap();
    }

    let history = manager.list_configurations(device.id).await.unwrap();
    let versions: Vec<u32> = history.iter().map(|c| c.version).collect();
    assert_eq!(versions, vec![3, 2, 1]);
    assert_eq!(history[0].content, "three");

    assert_eq!(
        manager.list_configurations(77).await.unwrap_err(),
        VersionError::DeviceNotFound(77)
    );
}

#[tokio::test]
async fn test_get_configuration() {
    let (store, manager) = setup();
    let device = store.add_device("a", None);
    let pushed = manager.push_configuration(device.id, "one", None).await.unwrap();

    assert_eq!(manager.get_configuration(pushed.id).await.unwrap(), pushed);
    assert_eq!(
        manager.get_configuration(pushed.id + 100).await.unwrap_err(),
        VersionError::ConfigurationNotFound(pushed.id + 100)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pushes_keep_versions_contiguous() {
    let (store, manager) = setup();
    let device_id = store.add_device("busy", None).id;

    let pushes = (0..40).map(|i| {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager
                .push_configuration(device_id, format!("config {}", i), None)
                .await
        })
    });

    for result in futures::future::join_all(pushes).await {
        assert!(result.unwrap().is_ok(), "push must not conflict under the device lock");
    }

    assert_eq!(store.find_latest_version(device_id).await.unwrap(), Some(40));
    assert_invariants(&store, device_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_push_and_revert_keep_single_current() {
    let (store, manager) = setup();
    let device_id = store.add_device("flappy", None).id;

    let seed = manager.push_configuration(device_id, "seed", None).await.unwrap();

    let tasks = (0..60u64).map(|i| {
        let manager = manager.clone();
        let store = store.clone();
        tokio::spawn(async move {
            if i % 3 == 0 {
                manager
                    .push_configuration(device_id, format!("push {}", i), None)
                    .await
                    .map(|_| ())
            } else {
                // Revert to a pseudo-random existing version
                let history = store.list_for_device(device_id).await.unwrap();
                let pick = history[(i as usize * 7) % history.len()].id;
                manager.set_current(device_id, pick).await.map(|_| ())
            }
        })
    });

    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(seed.version, 1);
    assert_invariants(&store, device_id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_devices_do_not_block_each_other() {
    let (store, manager) = setup();
    let ids: Vec<DeviceId> = (0..5)
        .map(|i| store.add_device(format!("dev-{}", i), None).id)
        .collect();

    let mut tasks = Vec::new();
    for &id in &ids {
        for i in 0..10 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.push_configuration(id, format!("{}", i), None).await
            }));
        }
    }

    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().is_ok());
    }

    for id in ids {
        assert_eq!(store.find_latest_version(id).await.unwrap(), Some(10));
        assert_invariants(&store, id).await;
    }
}
