//! Session store integration tests: lazy expiry, eager eviction by the
//! background scheduler, the one-session-per-user rule and shutdown.

use std::sync::Arc;
use std::time::Duration;

use prp::identity::SessionStore;
use prp::uid::{Uid, UidGenerator};

fn fixture() -> (SessionStore, Arc<UidGenerator>) {
    let gen = Arc::new(UidGenerator::new());
    (SessionStore::new(Arc::clone(&gen)), gen)
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let (sessions, gen) = fixture();
    let user = gen.next();

    let created = sessions.create(user, Duration::from_secs(60)).unwrap();
    let fetched = sessions.get(created.uuid).unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.user, user);
    assert_eq!(sessions.len(), 1);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (sessions, gen) = fixture();
    let err = sessions.get(gen.next()).unwrap_err();
    assert_eq!(err.code_str(), "session-not-found");
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn expired_session_is_invisible_to_get() {
    let (sessions, gen) = fixture();
    let created = sessions.create(gen.next(), Duration::from_millis(50)).unwrap();

    // Wall-clock expiry decides liveness on the read path, whether or not
    // the scheduler got to the record first.
    tokio::time::sleep(Duration::from_millis(80)).await;

    let err = sessions.get(created.uuid).unwrap_err();
    assert_eq!(err.code_str(), "session-not-found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduler_physically_evicts_expired_sessions() {
    let (sessions, gen) = fixture();
    sessions.create(gen.next(), Duration::from_millis(40)).unwrap();
    sessions.create(gen.next(), Duration::from_millis(60)).unwrap();
    assert_eq!(sessions.len(), 2);

    // Generous grace so the test is robust on a loaded machine.
    for _ in 0..100 {
        if sessions.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("scheduler did not evict within 5s, store still holds {}", sessions.len());
}

#[tokio::test]
async fn at_most_one_session_per_user() {
    let (sessions, gen) = fixture();
    let user = gen.next();

    let first = sessions.create(user, Duration::from_secs(60)).unwrap();
    let second = sessions.create(user, Duration::from_secs(60)).unwrap();
    assert_ne!(first.uuid, second.uuid);
    assert_eq!(sessions.len(), 1);

    // The predecessor is gone; only the replacement resolves.
    assert!(sessions.get(first.uuid).is_err());
    assert_eq!(sessions.get(second.uuid).unwrap().user, user);
}

#[tokio::test]
async fn distinct_users_coexist() {
    let (sessions, gen) = fixture();
    let a = sessions.create(gen.next(), Duration::from_secs(60)).unwrap();
    let b = sessions.create(gen.next(), Duration::from_secs(60)).unwrap();

    assert_eq!(sessions.len(), 2);
    assert!(sessions.get(a.uuid).is_ok());
    assert!(sessions.get(b.uuid).is_ok());
}

#[tokio::test]
async fn delete_is_a_no_op_on_unknown_ids() {
    let (sessions, gen) = fixture();
    let created = sessions.create(gen.next(), Duration::from_secs(60)).unwrap();

    assert!(sessions.delete(created.uuid));
    assert!(!sessions.delete(created.uuid));
    assert!(!sessions.delete(Uid::NIL));
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn delete_repoints_the_moved_records_indices() {
    let (sessions, gen) = fixture();
    let users: Vec<Uid> = (0..4).map(|_| gen.next()).collect();
    let entities: Vec<_> = users
        .iter()
        .map(|&u| sessions.create(u, Duration::from_secs(60)).unwrap())
        .collect();

    // Middle deletion swaps the tail record into the hole.
    assert!(sessions.delete(entities[1].uuid));
    assert_eq!(sessions.len(), 3);

    for entity in [&entities[0], &entities[2], &entities[3]] {
        let found = sessions.get(entity.uuid).unwrap();
        assert_eq!(found.user, entity.user);
    }

    // The moved record replaces its user's session if recreated.
    let replacement = sessions.create(users[3], Duration::from_secs(60)).unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.get(entities[3].uuid).is_err());
    assert!(sessions.get(replacement.uuid).is_ok());
}

#[tokio::test]
async fn rejects_out_of_range_max_age() {
    let (sessions, gen) = fixture();
    let err = sessions.create(gen.next(), Duration::from_secs(u64::MAX)).unwrap_err();
    assert_eq!(err.code_str(), "bad-max-age");

    // Representable as a duration, but the resulting expiry instant would
    // overflow the timestamp range. Must be an error, not a panic.
    let err = sessions
        .create(gen.next(), Duration::from_secs(4_000_000_000_000_000))
        .unwrap_err();
    assert_eq!(err.code_str(), "bad-max-age");
    assert!(sessions.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_stops_eager_eviction_but_not_lazy_expiry() {
    let (sessions, gen) = fixture();
    sessions.shutdown();
    // Idempotent.
    sessions.shutdown();

    let created = sessions.create(gen.next(), Duration::from_millis(30)).unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    // Nothing evicted it, but the read path still reports it gone.
    assert_eq!(sessions.len(), 1);
    assert!(sessions.get(created.uuid).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_logins_for_one_user_keep_a_single_session() {
    let (sessions, gen) = fixture();
    let sessions = Arc::new(sessions);
    let user = gen.next();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sessions = Arc::clone(&sessions);
        handles.push(tokio::spawn(async move {
            sessions.create(user, Duration::from_secs(60)).unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(sessions.len(), 1);
}
