use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use blob_chat::common::{Document, StoredMessage};
use blob_chat::storage::{MemoryStore, RemoteStore};
use blob_chat::sync::{
    CleanupSweeper, EngineConfig, GovernorConfig, RequestGovernor, RetryPolicy, SyncEngine,
};
use blob_chat::{StoreError, SyncError};

fn engine(store: Arc<dyn RemoteStore>, username: &str) -> SyncEngine {
    let governor = RequestGovernor::new(GovernorConfig {
        min_interval: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
        },
    });
    SyncEngine::new(store, governor, EngineConfig::new(username))
}

fn stored(id: &str, text: &str, timestamp: i64) -> StoredMessage {
    StoredMessage {
        id: id.to_string(),
        text: text.to_string(),
        timestamp,
    }
}

/// Lets the first write land, then immediately overwrites it with a rival
/// writer's document that never saw it.
struct ClobberOnce {
    inner: Arc<MemoryStore>,
    rival: Document,
    armed: AtomicBool,
}

#[async_trait]
impl RemoteStore for ClobberOnce {
    async fn read(&self) -> Result<Option<Document>, StoreError> {
        self.inner.read().await
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        self.inner.write(document).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.inner.put(self.rival.clone()).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn single_writer_round_trip() {
    let store = MemoryStore::new();
    let alice = engine(store.clone(), "A");

    alice.send_stored(stored("a1", "hi", 100)).await.unwrap();

    let document = store.snapshot().await.unwrap();
    assert_eq!(document.messages_of("A"), &[stored("a1", "hi", 100)]);

    alice.fetch().await.unwrap();
    let mirror = alice.mirror().await;
    assert_eq!(mirror.len(), 1);
    assert_eq!((mirror[0].username.as_str(), mirror[0].text.as_str()), ("A", "hi"));
}

#[tokio::test]
async fn two_writers_both_survive_under_their_own_keys() {
    let store = MemoryStore::new();
    let alice = engine(store.clone(), "A");
    let bob = engine(store.clone(), "B");

    alice.send_stored(stored("a1", "from a", 1)).await.unwrap();
    bob.send_stored(stored("b1", "from b", 2)).await.unwrap();

    let document = store.snapshot().await.unwrap();
    assert!(document.contains("A", "a1"));
    assert!(document.contains("B", "b1"));
    assert_eq!(document.len(), 2);

    let lines = alice.fetch().await.unwrap();
    let texts: Vec<_> = lines.iter().map(|line| line.text.as_str()).collect();
    assert_eq!(texts, ["from a", "from b"]);
}

#[tokio::test]
async fn concurrent_writers_both_survive_under_their_own_keys() {
    let store = MemoryStore::new();
    let alice = engine(store.clone(), "A");
    let bob = engine(store.clone(), "B");

    let (from_alice, from_bob) = tokio::join!(
        alice.send_stored(stored("a1", "from a", 1)),
        bob.send_stored(stored("b1", "from b", 1)),
    );
    from_alice.unwrap();
    from_bob.unwrap();

    let document = store.snapshot().await.unwrap();
    assert!(document.contains("A", "a1"));
    assert!(document.contains("B", "b1"));
    assert_eq!(document.len(), 2);
}

#[tokio::test]
async fn burst_of_local_sends_loses_nothing() {
    let store = MemoryStore::new();
    let alice = Arc::new(engine(store.clone(), "A"));

    let burst: Vec<_> = (0..5)
        .map(|index| {
            let alice = Arc::clone(&alice);
            tokio::spawn(async move {
                alice
                    .send_stored(stored(&format!("a{index}"), "burst", index))
                    .await
            })
        })
        .collect();
    for handle in burst {
        assert_eq!(handle.await.unwrap().unwrap().attempts, 1);
    }

    let document = store.snapshot().await.unwrap();
    assert_eq!(document.messages_of("A").len(), 5);

    alice.fetch().await.unwrap();
    assert_eq!(alice.mirror().await.len(), 5);
}

#[tokio::test]
async fn clobbered_write_is_detected_and_retried() {
    let inner = MemoryStore::new();
    let rival = Document::new().with_appended("B", stored("b1", "rival", 1));
    let store = Arc::new(ClobberOnce {
        inner: inner.clone(),
        rival,
        armed: AtomicBool::new(true),
    });
    let alice = engine(store, "A");

    let receipt = alice.send_stored(stored("a1", "mine", 2)).await.unwrap();
    assert_eq!(receipt.attempts, 2);

    let document = inner.snapshot().await.unwrap();
    assert!(document.contains("A", "a1"));
    assert!(document.contains("B", "b1"));
    assert_eq!(document.messages_of("A").len(), 1);
}

#[tokio::test]
async fn lost_send_is_reported_and_leaves_mirror_alone() {
    let store = MemoryStore::new();
    store.discard_writes(true);
    let alice = engine(store.clone(), "A");

    let result = alice.send_message("never lands").await;
    match result {
        Err(SyncError::SendFailed { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected SendFailed, got {other:?}"),
    }
    assert!(alice.mirror().await.is_empty());

    // The session stays usable afterwards.
    store.discard_writes(false);
    assert!(alice.send_message("second try").await.unwrap().is_some());
}

#[tokio::test]
async fn transient_backend_errors_are_absorbed() {
    let store = MemoryStore::new();
    store
        .inject_failures([StoreError::RateLimited(429), StoreError::Network("reset".into())])
        .await;
    let alice = engine(store.clone(), "A");

    let receipt = alice.send_stored(stored("a1", "hi", 1)).await.unwrap();
    assert_eq!(receipt.attempts, 1);
    assert!(store.snapshot().await.unwrap().contains("A", "a1"));
}

#[tokio::test]
async fn sweep_then_fetch_shows_only_retained_messages() {
    let store = MemoryStore::new();
    let alice = engine(store.clone(), "A");
    let bob = engine(store.clone(), "B");

    for index in 0..5 {
        alice
            .send_stored(stored(&format!("a{index}"), "a", index * 2))
            .await
            .unwrap();
        bob.send_stored(stored(&format!("b{index}"), "b", index * 2 + 1))
            .await
            .unwrap();
    }

    let before = store.snapshot().await.unwrap().flatten();
    let outcome = CleanupSweeper::new(6).sweep(&alice).await.unwrap();
    assert_eq!(outcome.removed(), 4);

    let after = store.snapshot().await.unwrap().flatten();
    assert_eq!(after, before[4..]);

    alice.fetch().await.unwrap();
    assert_eq!(alice.mirror().await, after);
}
