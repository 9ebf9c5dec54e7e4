//!
//! Session store and eviction scheduler
//! ------------------------------------
//! Concurrent in-memory repository for login sessions, same arena-plus-
//! indices shape as the user store: a dense `Vec<Session>` with identifier
//! and owning-user indices behind one reader/writer lock. At most one live
//! session exists per user; creating a new one deletes any predecessor.
//!
//! Expiry is enforced twice. Lazily: `get` treats a session whose expiry has
//! passed as absent, making the read path the authority on liveness.
//! Eagerly: one background task per store owns a min-heap of (session,
//! expiry) entries, sleeps until the earliest is due, and evicts it from
//! storage. New entries arrive over a buffered channel so producers never
//! block, and the task takes the store's writer lock only for the brief
//! eviction step, never across a sleep. An entry whose session is already
//! gone (re-login, logout) evicts as a no-op.
//!
//! The scheduler is cancelled through [`SessionStore::shutdown`], wired to
//! server teardown, and as a backstop when the store is dropped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::uid::{Uid, UidGenerator};

use super::session::{Session, SessionEntity};

/// Burst buffer for expiry handoff; producers stay non-blocking up to this
/// many in-flight entries.
const EXPIRY_CHANNEL_CAPACITY: usize = 32;

pub struct SessionStore {
    inner: Arc<RwLock<Inner>>,
    gen: Arc<UidGenerator>,
    expiries: mpsc::Sender<ExpiryEntry>,
    reaper: Mutex<Reaper>,
}

struct Inner {
    records: Vec<Session>,
    by_uid: HashMap<Uid, usize>,
    by_user: HashMap<Uid, usize>,
}

struct Reaper {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Heap entry ordering: earliest expiry first (via `Reverse`), identifier as
/// tie-breaker for a total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryEntry {
    expires: DateTime<Utc>,
    session: Uid,
}

fn session_not_found() -> AppError {
    AppError::not_found("session-not-found", "session not found")
}

impl SessionStore {
    /// Create the store and spawn its eviction task. Must be called from
    /// within a tokio runtime.
    pub fn new(gen: Arc<UidGenerator>) -> SessionStore {
        let inner = Arc::new(RwLock::new(Inner {
            records: Vec::new(),
            by_uid: HashMap::new(),
            by_user: HashMap::new(),
        }));

        let (tx, rx) = mpsc::channel(EXPIRY_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(reap(Arc::clone(&inner), rx, cancel_rx));

        SessionStore {
            inner,
            gen,
            expiries: tx,
            reaper: Mutex::new(Reaper { cancel: Some(cancel_tx), task: Some(task) }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a session for `user`, invalidating any prior one, and hand
    /// the expiry to the scheduler.
    pub fn create(&self, user: Uid, max_age: Duration) -> AppResult<SessionEntity> {
        let out_of_range =
            || AppError::invalid("bad-max-age", "session max age is out of range");

        // Two bounds apply: the duration type's own range, and the timestamp
        // range an expiry instant must still fit in.
        let max_age = chrono::Duration::from_std(max_age).map_err(|_| out_of_range())?;
        let expires = Utc::now().checked_add_signed(max_age).ok_or_else(out_of_range)?;

        let entity = {
            let mut inner = self.inner.write();

            if let Some(&pos) = inner.by_user.get(&user) {
                let prior = inner.records[pos].uid;
                delete_in(&mut inner, prior);
                debug!(target: "sessions", session = %prior, "session.replace");
            }

            let uid = self.gen.next();
            let session = Session { uid, user, expires };

            let pos = inner.records.len();
            inner.by_uid.insert(uid, pos);
            inner.by_user.insert(user, pos);
            inner.records.push(session);

            session.entity()
        };

        // Handoff happens after the lock is released. A full buffer only
        // costs eager eviction; the read path still expires the session.
        let handoff = ExpiryEntry { expires: entity.expires, session: entity.uuid };
        if self.expiries.try_send(handoff).is_err() {
            warn!(target: "sessions", session = %entity.uuid, "expiry buffer full, relying on lazy expiry");
        }

        debug!(target: "sessions", session = %entity.uuid, user = %user, "session.create");
        Ok(entity)
    }

    /// Look up a live session. A session at or past its expiry is reported
    /// absent even if the scheduler has not evicted it yet.
    pub fn get(&self, uid: Uid) -> AppResult<SessionEntity> {
        let inner = self.inner.read();
        let &pos = inner.by_uid.get(&uid).ok_or_else(session_not_found)?;

        let session = &inner.records[pos];
        if Utc::now() >= session.expires {
            return Err(session_not_found());
        }
        Ok(session.entity())
    }

    /// Remove a session. Removing an unknown identifier is a no-op, which
    /// is what makes an eviction racing a re-login safe.
    pub fn delete(&self, uid: Uid) -> bool {
        let mut inner = self.inner.write();
        delete_in(&mut inner, uid)
    }

    /// Stop the eviction task. One-shot and terminal: after this no further
    /// evictions occur; expired sessions stay invisible through `get`.
    pub fn shutdown(&self) {
        let mut reaper = self.reaper.lock();
        if let Some(cancel) = reaper.cancel.take() {
            let _ = cancel.send(());
        }
        // Detaching the handle is enough: the loop exits on the signal.
        reaper.task.take();
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Remove `uid` and both index entries, swap-compacting the arena and
/// repointing the moved record's entries in the same step.
fn delete_in(inner: &mut Inner, uid: Uid) -> bool {
    let Some(&pos) = inner.by_uid.get(&uid) else {
        return false;
    };

    inner.by_uid.remove(&uid);
    let user = inner.records[pos].user;
    inner.by_user.remove(&user);

    inner.records.swap_remove(pos);
    relocate(inner, pos);
    true
}

/// Repoint the indices of the record that swap-remove moved into `pos`.
/// Invoked exactly once per deletion; a no-op when the removed record was
/// the last one.
fn relocate(inner: &mut Inner, pos: usize) {
    if pos >= inner.records.len() {
        return;
    }
    let moved = inner.records[pos];
    inner.by_uid.insert(moved.uid, pos);
    inner.by_user.insert(moved.user, pos);
}

/// The eviction loop. Each iteration computes the wait until the earliest
/// expiry (when the heap is non-empty) and races cancellation, a new entry
/// and that deadline. A new entry re-loops without evicting so the wait is
/// recomputed; the deadline pops exactly one entry and evicts it.
async fn reap(
    inner: Arc<RwLock<Inner>>,
    mut expiries: mpsc::Receiver<ExpiryEntry>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut heap: BinaryHeap<Reverse<ExpiryEntry>> = BinaryHeap::new();

    loop {
        let deadline = heap.peek().map(|Reverse(entry)| entry.expires);

        tokio::select! {
            _ = &mut cancel => break,

            entry = expiries.recv() => match entry {
                Some(entry) => heap.push(Reverse(entry)),
                // All senders gone: the store itself is being torn down.
                None => break,
            },

            _ = sleep_until_due(deadline), if deadline.is_some() => {
                if let Some(Reverse(due)) = heap.pop() {
                    let evicted = {
                        let mut inner = inner.write();
                        delete_in(&mut inner, due.session)
                    };
                    if evicted {
                        debug!(target: "sessions", session = %due.session, "session.evict");
                    }
                }
            }
        }
    }

    debug!(target: "sessions", "eviction scheduler stopped");
}

async fn sleep_until_due(deadline: Option<DateTime<Utc>>) {
    // Only polled when the guard saw Some; an elapsed deadline sleeps zero.
    let Some(at) = deadline else { return };
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}
