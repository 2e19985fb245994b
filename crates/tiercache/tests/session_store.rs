//! Integration tests for tiered session persistence.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tiercache::{
    CacheRegistry, CacheSettings, DurableTier, ManualClock, MemoryDurableTier, SessionSettings,
    TieredSessionStore,
};
use tiercache_api::{Session, SessionIdGenerator, SessionStore, UuidSessionIdGenerator};

struct SequentialIds(std::sync::atomic::AtomicU64);

impl SessionIdGenerator for SequentialIds {
    fn generate(&self, _session: &Session) -> String {
        let n = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("sid-{n}")
    }
}

struct Harness {
    registry: Arc<CacheRegistry<String, String>>,
    store: Arc<TieredSessionStore>,
    durable: Arc<MemoryDurableTier>,
    clock: Arc<ManualClock>,
}

fn harness(flush_interval_ms: u64) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let durable = Arc::new(MemoryDurableTier::with_clock(clock.clone()));
    let settings = CacheSettings {
        key_prefix: "app".to_string(),
        flush_interval_ms,
        ..CacheSettings::default()
    };
    let registry = Arc::new(CacheRegistry::<String, String>::with_clock(
        durable.clone(),
        settings,
        clock.clone(),
    ));
    let store = registry.session_store(
        &SessionSettings::default(),
        Arc::new(SequentialIds(Default::default())),
    );
    Harness {
        registry,
        store,
        durable,
        clock,
    }
}

#[tokio::test]
async fn test_create_assigns_id_and_reads_back() {
    let h = harness(0);
    let mut session = Session::new().with_host("10.0.0.7");
    session.set_attribute("user", json!("alice"));

    let id = h.store.create(&mut session).await.unwrap();
    assert_eq!(id, "sid-0");
    assert_eq!(session.id(), Some("sid-0"));

    let read = h.store.read(&id).await.unwrap().expect("session stored");
    assert_eq!(read, session);
    assert!(h.durable.get("app:session:sid-0").await.unwrap().is_some());
}

#[tokio::test]
async fn test_durable_ttl_follows_session_timeout() {
    let h = harness(0);

    let mut short = Session::new().with_timeout_ms(90_000);
    let short_id = h.store.create(&mut short).await.unwrap();
    assert_eq!(
        h.durable.ttl_of(&format!("app:session:{short_id}")),
        Some(Some(Duration::from_secs(90)))
    );

    let mut forever = Session::new().with_timeout_ms(-1);
    let forever_id = h.store.create(&mut forever).await.unwrap();
    assert_eq!(
        h.durable.ttl_of(&format!("app:session:{forever_id}")),
        Some(None)
    );
}

#[tokio::test]
async fn test_update_overwrites_and_refreshes_ttl() {
    let h = harness(0);
    let mut session = Session::new().with_timeout_ms(60_000);
    let id = h.store.create(&mut session).await.unwrap();

    h.clock.advance(Duration::from_secs(50));
    session.set_attribute("role", json!("admin"));
    session.touch();
    h.store.update(&session).await.unwrap();

    h.clock.advance(Duration::from_secs(30));
    h.store.cache().local().invalidate_all();

    let read = h.store.read(&id).await.unwrap().expect("still alive");
    assert_eq!(read.attribute("role"), Some(&json!("admin")));
}

#[tokio::test]
async fn test_update_without_id_fails_without_io() {
    let h = harness(0);
    let err = h.store.update(&Session::new()).await.unwrap_err();
    assert!(err.is_missing_identity());
    assert_eq!(h.durable.op_counts().total(), 0);
}

#[tokio::test]
async fn test_delete_removes_both_tiers() {
    let h = harness(0);
    let mut session = Session::new();
    let id = h.store.create(&mut session).await.unwrap();

    h.store.delete(&session).await.unwrap();

    assert_eq!(h.store.read(&id).await.unwrap(), None);
    assert_eq!(
        h.durable.get(&format!("app:session:{id}")).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_active_sessions_prefer_local_then_durable() {
    let h = harness(0);
    for _ in 0..3 {
        h.store.create(&mut Session::new()).await.unwrap();
    }

    assert_eq!(h.store.active_sessions().await.unwrap().len(), 3);

    h.store.cache().local().invalidate_all();
    let mut ids: Vec<String> = h
        .store
        .active_sessions()
        .await
        .unwrap()
        .iter()
        .filter_map(|s| s.id().map(str::to_string))
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["sid-0", "sid-1", "sid-2"]);
}

#[tokio::test]
async fn test_unflushed_session_is_local_only() {
    let h = harness(60_000);
    let mut session = Session::new();
    let id = h.store.create(&mut session).await.unwrap();

    assert!(h.store.read(&id).await.unwrap().is_some());
    assert!(h.durable.is_empty());

    h.store.cache().flush().await.unwrap();
    assert!(h.durable.get(&format!("app:session:{id}")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_sessions_do_not_leak_into_named_caches() {
    let clock = Arc::new(ManualClock::new());
    let durable = Arc::new(MemoryDurableTier::with_clock(clock.clone()));
    let settings = CacheSettings {
        key_prefix: "app".to_string(),
        flush_interval_ms: 0,
        ..CacheSettings::default()
    };
    let registry = CacheRegistry::<String, String>::with_clock(durable.clone(), settings, clock);
    let sessions =
        registry.session_store(&SessionSettings::default(), Arc::new(UuidSessionIdGenerator));

    sessions.create(&mut Session::new()).await.unwrap();
    let users = registry.get_or_create("users").unwrap();
    users.put("u1".into(), "Alice".into()).await.unwrap();

    users.clear().await.unwrap();
    assert_eq!(sessions.active_sessions().await.unwrap().len(), 1);
    assert_eq!(durable.len(), 1);
}

#[tokio::test]
async fn test_registry_hands_out_one_session_store() {
    let h = harness(60_000);
    let again = h
        .registry
        .session_store(&SessionSettings::default(), Arc::new(UuidSessionIdGenerator));
    assert!(Arc::ptr_eq(&h.store, &again));

    let id = again.create(&mut Session::new()).await.unwrap();
    assert!(h.store.read(&id).await.unwrap().is_some());
    assert!(h.durable.is_empty());

    assert_eq!(h.registry.flush_all().await.unwrap(), 1);
    assert!(h.durable.get(&format!("app:session:{id}")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_maintenance_task_flushes_sessions() {
    let h = harness(3_600_000);
    let id = h.store.create(&mut Session::new()).await.unwrap();
    assert_eq!(h.store.cache().pending_len(), 1);

    let task = Arc::clone(&h.registry).spawn_maintenance(Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    task.abort();

    assert_eq!(h.store.cache().pending_len(), 0);
    assert!(h.durable.get(&format!("app:session:{id}")).await.unwrap().is_some());
}
