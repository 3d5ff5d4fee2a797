use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;
use crate::models::{CategoryId, EntityKey, NoteId};
use crate::store::{ChangeKind, Mutation, NoteFilter, NotesSortKey};

fn coordinator(gateway: &Arc<MemoryGateway>) -> SyncCoordinator {
    let store = Arc::new(tokio::sync::Mutex::new(EntityStore::new()));
    let gateway: Arc<dyn RemoteGateway> = gateway.clone();
    SyncCoordinator::new(store, gateway, SyncSettings::default())
}

async fn create_note(coordinator: &SyncCoordinator, content: &str) -> NoteId {
    coordinator
        .store()
        .lock()
        .await
        .apply(Mutation::CreateNote {
            content: content.to_string(),
            category: None,
        })
        .unwrap()
        .note_id()
        .unwrap()
}

#[tokio::test]
async fn first_sync_publishes_local_state() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    let id = create_note(&coordinator, "hello").await;

    let report = coordinator.request_sync().await.unwrap();

    assert!(report.pushed);
    assert_eq!(report.remote_version, 1);
    let published = gateway.snapshot().unwrap();
    assert!(published.note(&id).is_some());
    assert!(coordinator.store().lock().await.pending_changes().is_empty());

    let status = coordinator.status();
    assert_eq!(status.state, SyncState::Idle);
    assert_eq!(status.last_error, None);
    assert_eq!(status.last_synced_at, Some(report.finished_at));
}

#[tokio::test]
async fn second_sync_without_changes_skips_push() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    coordinator.request_sync().await.unwrap();

    let report = coordinator.request_sync().await.unwrap();

    assert!(!report.pushed);
    assert_eq!(report.remote_version, 1);
    assert_eq!(gateway.push_count(), 1);
}

#[tokio::test]
async fn push_then_fetch_from_another_replica_matches() {
    let gateway = Arc::new(MemoryGateway::new());
    let first = coordinator(&gateway);
    let second = coordinator(&gateway);

    let id = create_note(&first, "shared").await;
    first
        .store()
        .lock()
        .await
        .apply(Mutation::AddCategory {
            name: "Work".into(),
        })
        .unwrap();
    first.request_sync().await.unwrap();
    second.request_sync().await.unwrap();
    first.request_sync().await.unwrap();

    let second_store = second.store();
    let second_store = second_store.lock().await;
    assert_eq!(second_store.note(&id).unwrap().content, "shared");
    assert!(second_store.category(&CategoryId::from_raw("work")).is_some());

    let published = gateway.snapshot().unwrap();
    let first_store = first.store();
    let first_store = first_store.lock().await;
    for note in &published.notes {
        assert_eq!(first_store.note(&note.id), Some(note));
        assert_eq!(second_store.note(&note.id), Some(note));
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_attempt() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.set_fetch_delay(Some(Duration::from_millis(50)));
    let coordinator = coordinator(&gateway);
    create_note(&coordinator, "hello").await;

    let (a, b, c) = tokio::join!(
        coordinator.request_sync(),
        coordinator.request_sync(),
        coordinator.request_sync()
    );

    assert_eq!(gateway.fetch_count(), 1);
    assert_eq!(gateway.push_count(), 1);
    let a = a.unwrap();
    assert_eq!(b.unwrap(), a);
    assert_eq!(c.unwrap(), a);
}

#[tokio::test]
async fn fetch_failure_leaves_store_untouched() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    create_note(&coordinator, "offline edit").await;
    let before = coordinator.store().lock().await.clone();

    gateway.fail_next_fetch(SyncError::Network("connection refused".into()));
    let error = coordinator.request_sync().await.unwrap_err();

    assert_eq!(error, SyncError::Network("connection refused".into()));
    assert_eq!(*coordinator.store().lock().await, before);
    let status = coordinator.status();
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.last_error.unwrap().contains("connection refused"));
    assert_eq!(status.last_synced_at, None);
}

#[tokio::test]
async fn rejected_push_keeps_pending_changes() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    create_note(&coordinator, "will retry").await;
    let before = coordinator.store().lock().await.clone();

    gateway.fail_next_push(SyncError::version_mismatch(0, 3));
    let error = coordinator.request_sync().await.unwrap_err();

    assert!(matches!(error, SyncError::Conflict(_)));
    assert_eq!(*coordinator.store().lock().await, before);
    assert!(gateway.snapshot().is_none());

    // The next attempt succeeds with the same changes.
    coordinator.request_sync().await.unwrap();
    assert!(coordinator.store().lock().await.pending_changes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_remote_times_out() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.set_fetch_delay(Some(Duration::from_secs(60)));
    let coordinator = coordinator(&gateway);
    let before = coordinator.store().lock().await.clone();

    let error = coordinator.request_sync().await.unwrap_err();

    assert_eq!(error, SyncError::Timeout(15));
    assert_eq!(*coordinator.store().lock().await, before);
}

#[tokio::test(start_paused = true)]
async fn edits_made_during_sync_stay_pending() {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.set_push_delay(Some(Duration::from_millis(100)));
    let coordinator = coordinator(&gateway);
    let id = create_note(&coordinator, "first draft").await;

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.request_sync().await })
    };
    // Let the sync capture and reach the slow push.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(coordinator.status().is_syncing());
    coordinator
        .store()
        .lock()
        .await
        .apply(Mutation::UpdateNoteContent {
            id,
            content: "second draft".into(),
        })
        .unwrap();

    running.await.unwrap().unwrap();

    let store = coordinator.store();
    let store = store.lock().await;
    assert_eq!(store.note(&id).unwrap().content, "second draft");
    let pending = store.pending_changes();
    let entry = pending.get(&EntityKey::Note(id)).unwrap();
    assert_eq!(entry.kind, ChangeKind::Updated);
    let published = gateway.snapshot().unwrap();
    assert_eq!(published.note(&id).unwrap().content, "first draft");
    assert_eq!(
        entry.base.as_deref(),
        Some(published.note(&id).unwrap().fingerprint().as_str())
    );
}

#[tokio::test]
async fn same_category_name_on_two_replicas() {
    let gateway = Arc::new(MemoryGateway::new());
    let first = coordinator(&gateway);
    let second = coordinator(&gateway);

    first
        .store()
        .lock()
        .await
        .apply_at(
            Mutation::AddCategory {
                name: "Work".into(),
            },
            1_000,
        )
        .unwrap();
    let (later_note, later_category) = {
        let store = second.store();
        let mut store = store.lock().await;
        let category = store
            .apply_at(
                Mutation::AddCategory {
                    name: "Work".into(),
                },
                2_000,
            )
            .unwrap()
            .category_id()
            .unwrap();
        let note = store
            .apply_at(
                Mutation::CreateNote {
                    content: "standup".into(),
                    category: Some(category.clone()),
                },
                2_001,
            )
            .unwrap()
            .note_id()
            .unwrap();
        (note, category)
    };
    assert_eq!(later_category, CategoryId::from_raw("work"));

    first.request_sync().await.unwrap();
    second.request_sync().await.unwrap();
    first.request_sync().await.unwrap();

    for replica in [&first, &second] {
        let store = replica.store();
        let store = store.lock().await;
        let names = store
            .categories()
            .into_iter()
            .map(|category| (category.id.as_str().to_string(), category.name.clone()))
            .collect::<Vec<_>>();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&("work".to_string(), "Work".to_string())));
        assert!(names.contains(&("work-2".to_string(), "Work 2".to_string())));
        assert_eq!(
            store.note(&later_note).unwrap().category,
            Some(CategoryId::from_raw("work-2"))
        );
    }
}

#[tokio::test]
async fn remote_category_delete_empties_category_views() {
    let gateway = Arc::new(MemoryGateway::new());
    let first = coordinator(&gateway);
    let second = coordinator(&gateway);
    let work = {
        let store = first.store();
        let mut store = store.lock().await;
        let work = store
            .apply_at(
                Mutation::AddCategory {
                    name: "Work".into(),
                },
                1_000,
            )
            .unwrap()
            .category_id()
            .unwrap();
        store
            .apply_at(
                Mutation::CreateNote {
                    content: "filed".into(),
                    category: Some(work.clone()),
                },
                1_001,
            )
            .unwrap();
        work
    };
    first.request_sync().await.unwrap();
    second.request_sync().await.unwrap();

    second
        .store()
        .lock()
        .await
        .apply_at(Mutation::DeleteCategory { id: work.clone() }, 5_000)
        .unwrap();
    second.request_sync().await.unwrap();
    first.request_sync().await.unwrap();

    let store = first.store();
    let store = store.lock().await;
    assert!(store.category(&work).is_none());
    assert!(store
        .notes_view(&NoteFilter::Category(work), NotesSortKey::default())
        .is_empty());
}

#[tokio::test]
async fn conflicts_are_logged_and_reported() {
    let gateway = Arc::new(MemoryGateway::new());
    let first = coordinator(&gateway);
    let second = coordinator(&gateway);
    let id = first
        .store()
        .lock()
        .await
        .apply_at(
            Mutation::CreateNote {
                content: "base".into(),
                category: None,
            },
            1_000,
        )
        .unwrap()
        .note_id()
        .unwrap();
    first.request_sync().await.unwrap();
    second.request_sync().await.unwrap();

    first
        .store()
        .lock()
        .await
        .apply_at(
            Mutation::UpdateNoteContent {
                id,
                content: "first".into(),
            },
            3_000,
        )
        .unwrap();
    second
        .store()
        .lock()
        .await
        .apply_at(
            Mutation::UpdateNoteContent {
                id,
                content: "second".into(),
            },
            2_000,
        )
        .unwrap();
    second.request_sync().await.unwrap();
    let report = first.request_sync().await.unwrap();

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(first.conflicts(), report.conflicts);
    let published = gateway.snapshot().unwrap();
    assert_eq!(published.note(&id).unwrap().content, "first");
}

fn rejoin(coordinator: &SyncCoordinator, gateway: &Arc<MemoryGateway>) -> SyncCoordinator {
    let gateway: Arc<dyn RemoteGateway> = gateway.clone();
    SyncCoordinator::new(coordinator.store(), gateway, SyncSettings::default())
}

#[tokio::test]
async fn vanished_remote_gets_local_state_back() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    let id = create_note(&coordinator, "hello").await;
    coordinator.request_sync().await.unwrap();

    let fresh = Arc::new(MemoryGateway::new());
    let moved = rejoin(&coordinator, &fresh);
    let report = moved.request_sync().await.unwrap();

    assert_eq!(report.removed, 0);
    assert!(report.conflicts.is_empty());
    assert!(report.pushed);
    assert_eq!(report.remote_version, 1);
    assert_eq!(
        moved.store().lock().await.note(&id).unwrap().content,
        "hello"
    );
    let published = fresh.snapshot().unwrap();
    assert_eq!(published.note(&id).unwrap().content, "hello");
    assert!(published.notes.iter().any(|note| note.scratchpad));
}

#[tokio::test]
async fn older_remote_snapshot_does_not_drop_newer_entities() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    let kept = create_note(&coordinator, "in both").await;
    coordinator.request_sync().await.unwrap();
    let stale = gateway.snapshot().unwrap();

    let newer = create_note(&coordinator, "only in the newer snapshot").await;
    let report = coordinator.request_sync().await.unwrap();
    assert_eq!(report.remote_version, 2);
    assert_eq!(coordinator.store().lock().await.remote_version(), Some(2));

    let restored = Arc::new(MemoryGateway::with_snapshot(stale));
    let rolled_back = rejoin(&coordinator, &restored);
    let report = rolled_back.request_sync().await.unwrap();

    assert_eq!(report.removed, 0);
    assert!(report.pushed);
    let store = rolled_back.store();
    let store = store.lock().await;
    assert!(store.note(&kept).is_some());
    assert!(store.note(&newer).is_some());
    assert!(restored.snapshot().unwrap().note(&newer).is_some());
}

/// Panics on the first fetch, then behaves like the wrapped gateway
struct PanicOnce {
    inner: MemoryGateway,
    armed: std::sync::atomic::AtomicBool,
}

#[async_trait::async_trait]
impl RemoteGateway for PanicOnce {
    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, SyncError> {
        if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
            panic!("gateway bug");
        }
        self.inner.fetch_snapshot().await
    }

    async fn push_snapshot(
        &self,
        snapshot: &SyncSnapshot,
        expected_version: u64,
    ) -> Result<(), SyncError> {
        self.inner.push_snapshot(snapshot, expected_version).await
    }

    fn describe(&self) -> String {
        "panics once".to_string()
    }
}

#[tokio::test]
async fn coordinator_recovers_after_a_panicking_job() {
    let gateway: Arc<dyn RemoteGateway> = Arc::new(PanicOnce {
        inner: MemoryGateway::new(),
        armed: std::sync::atomic::AtomicBool::new(true),
    });
    let store = Arc::new(tokio::sync::Mutex::new(EntityStore::new()));
    let coordinator = SyncCoordinator::new(Arc::clone(&store), gateway, SyncSettings::default());
    let id = create_note(&coordinator, "survives").await;

    let error = coordinator.request_sync().await.unwrap_err();
    assert!(matches!(error, SyncError::Network(_)));
    let status = coordinator.status();
    assert_eq!(status.state, SyncState::Idle);
    assert!(status.last_error.is_some());
    assert!(store.lock().await.note(&id).is_some());

    let report = coordinator.request_sync().await.unwrap();
    assert!(report.pushed);
    assert_eq!(coordinator.status().state, SyncState::Idle);
    assert!(store.lock().await.pending_changes().is_empty());
}

#[tokio::test]
async fn coordinator_recovers_after_a_failed_job() {
    let gateway = Arc::new(MemoryGateway::new());
    let coordinator = coordinator(&gateway);
    create_note(&coordinator, "retry me").await;

    gateway.fail_next_fetch(SyncError::Unauthorized("bad token".into()));
    coordinator.request_sync().await.unwrap_err();
    assert_eq!(coordinator.status().state, SyncState::Idle);

    let report = coordinator.request_sync().await.unwrap();
    assert!(report.pushed);
    assert_eq!(coordinator.status().last_error, None);
}
