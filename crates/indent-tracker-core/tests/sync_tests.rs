//! Multi-client synchronization tests.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use indent_tracker_core::config_store::{AppInfoDocument, CONFIG};
use indent_tracker_core::repository::{IndentRepository, RepositoryError, INDENTS};
use indent_tracker_core::store::{CollectionPath, DocPath, RemoteStore, SqliteStore};
use indent_tracker_core::{
    AppInfo, FeedHealth, IndentStatus, NewIndent, TrackerError, TrackerSession, TrackerState,
    TransitionError, ViewQuery,
};

use common::{CountingStore, FaultyStore};

async fn settle(session: &TrackerSession, check: impl Fn(&TrackerState) -> bool) {
    let mut rx = session.changes();
    tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| check(s)))
        .await
        .expect("replica settled in time")
        .unwrap();
}

async fn ready_session(store: Arc<dyn RemoteStore>) -> TrackerSession {
    let session = TrackerSession::start(store);
    session.ready().await.unwrap();
    session
}

#[tokio::test]
async fn test_remove_many_partial_failure_is_not_rolled_back() {
    let store = FaultyStore::new();
    let repo = IndentRepository::new(Arc::new(store.clone()));

    let mut ids = Vec::new();
    for ward in ["1A", "2A", "3A", "4A"] {
        let indent = NewIndent::new("Farmasi Satelit 1", ward, "", "Floor Stock").unwrap();
        ids.push(repo.add(indent, Utc::now()).await.unwrap());
    }
    store.fail_delete_of(&ids[2]);

    let err = repo.remove_many(ids.clone()).await.unwrap_err();
    match err {
        RepositoryError::PartialBatch { deleted, failed } => {
            assert_eq!(deleted, 3);
            assert_eq!(failed.len(), 1);
            assert_eq!(failed[0].0, ids[2]);
        }
        other => panic!("expected a partial batch, got {other}"),
    }

    for (n, id) in ids.iter().enumerate() {
        let present = store.inner.get(&DocPath::new(INDENTS, id.as_str())).unwrap().is_some();
        assert_eq!(present, n == 2, "indent {id}");
    }
}

#[tokio::test]
async fn test_absent_app_info_written_once_and_delivered_once() {
    let store = CountingStore::new();
    let app = AppInfoDocument::new(Arc::new(store.clone()));
    let mut sub = app.subscribe().await.unwrap();

    let first = sub.next().await.unwrap().unwrap();
    assert_eq!(first, AppInfo::builtin());

    // The echo of the initializing write must not come through as a second value.
    let second = tokio::time::timeout(Duration::from_millis(300), sub.next()).await;
    assert!(second.is_err(), "unexpected second value: {second:?}");
    assert_eq!(store.sets.load(Ordering::SeqCst), 1);

    let stored = store.inner.get(&DocPath::new(CONFIG, "appInfo")).unwrap().unwrap();
    assert_eq!(stored["name"], "AiPharmHSNI-Indent Tracking");
}

#[tokio::test]
async fn test_present_config_is_not_rewritten() {
    let store = CountingStore::new();
    store
        .inner
        .set(
            &DocPath::new(CONFIG, "appInfo"),
            serde_json::json!({"name": "Farmasi HSNI"}).as_object().cloned().unwrap(),
        )
        .await
        .unwrap();

    let session = ready_session(Arc::new(store.clone())).await;
    assert_eq!(session.app_info().name, "Farmasi HSNI");
    // Only the units document was absent.
    assert_eq!(store.sets.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_two_clients_converge() {
    let store = SqliteStore::open_in_memory("ward").unwrap();
    let pharmacy = ready_session(Arc::new(store.clone())).await;
    let ward = ready_session(Arc::new(store.clone())).await;

    let id = ward
        .add_indent("Farmasi Stor Pukal 3", "5b", "nurul", "IV Drip")
        .await
        .unwrap();
    settle(&pharmacy, |s| s.find(&id).is_some()).await;

    pharmacy.mark_ready(&id).await.unwrap();
    settle(&ward, |s| s.find(&id).is_some_and(|i| i.status == IndentStatus::Done)).await;

    ward.annotate(&id, "ambil di kaunter 2").await.unwrap();
    settle(&pharmacy, |s| s.find(&id).is_some_and(|i| i.note == "AMBIL DI KAUNTER 2")).await;

    let view = pharmacy.view(&ViewQuery::all().search("5B"));
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].staff, "NURUL");
    assert_eq!(view[0].status, IndentStatus::Done);
}

#[tokio::test]
async fn test_concurrent_unit_saves_last_write_wins() {
    let store = SqliteStore::open_in_memory("ward").unwrap();
    let a = ready_session(Arc::new(store.clone())).await;
    let b = ready_session(Arc::new(store.clone())).await;

    // Both clients edit from the same starting map.
    let base = a.units();
    let from_a = base.with_unit("Farmasi Klinik", "Vaksin").unwrap();
    let from_b = base.with_unit("Farmasi Wad", "Troli Ubat").unwrap();
    a.save_units(&from_a).await.unwrap();
    b.save_units(&from_b).await.unwrap();

    // A's unit is lost: the later whole-document save replaced it.
    for session in [&a, &b] {
        settle(session, |s| s.units == from_b).await;
        assert!(session.units().categories("Farmasi Klinik").is_none());
    }
}

#[tokio::test]
async fn test_blank_collector_issues_no_write() {
    let store = CountingStore::new();
    let session = ready_session(Arc::new(store.clone())).await;
    let id = session
        .add_indent("Farmasi Pengeluaran", "8c", "", "Special Drip")
        .await
        .unwrap();
    settle(&session, |s| s.find(&id).is_some()).await;
    session.mark_ready(&id).await.unwrap();
    settle(&session, |s| s.find(&id).is_some_and(|i| i.status == IndentStatus::Done)).await;

    let before = store.writes();
    let err = session.confirm_pickup(&id, "   ").await.unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Transition(TransitionError::MissingCollector)
    ));
    assert_eq!(store.writes(), before);
    assert_eq!(session.indent(&id).unwrap().status, IndentStatus::Done);
}

#[tokio::test]
async fn test_failed_feed_recovers_after_resubscribe() {
    let store = FaultyStore::new();
    store.fail_next_subscriptions(1);
    let session = TrackerSession::start(Arc::new(store.clone()));

    let err = session.ready().await.unwrap_err();
    let TrackerError::FeedFailed { feed, .. } = err else {
        panic!("expected a feed failure, got {err}");
    };
    assert!(matches!(session.feed_health(feed), FeedHealth::Failed(_)));

    assert_eq!(session.resubscribe(), vec![feed]);
    session.ready().await.unwrap();
    assert_eq!(session.feed_health(feed), FeedHealth::Live);
}

#[tokio::test]
async fn test_dropped_session_leaves_store_usable() {
    let store = SqliteStore::open_in_memory("ward").unwrap();
    let session = ready_session(Arc::new(store.clone())).await;
    let id = session
        .add_indent("Farmasi Satelit 2", "2a", "", "Troli Ubat")
        .await
        .unwrap();
    drop(session);

    let repo = IndentRepository::new(Arc::new(store.clone()));
    repo.remove(&id).await.unwrap();
    assert_eq!(store.count(&CollectionPath::new(INDENTS)).unwrap(), 0);
}
