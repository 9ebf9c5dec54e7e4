//!
//! User store
//! ----------
//! Concurrent in-memory repository for user accounts. Records live in one
//! dense arena (`Vec<User>`); two secondary indices map the identifier and
//! the login name to integer storage positions. A single reader/writer lock
//! guards all of it, and every index mutation for a logical update happens
//! under one writer acquisition, so an index entry can never be observed
//! dangling or pointing at a mismatched record.
//!
//! Deletion uses swap-remove compaction: the last record moves into the
//! freed slot, and the moved record's index entries are repointed by a
//! single relocate step inside the same operation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::auth::Level;
use crate::credential::{self, CredentialHash};
use crate::error::{AppError, AppResult};
use crate::uid::{Uid, UidGenerator};

use super::user::{
    validate_credential, validate_login, validate_name, User, UserEntity, UserPage, UserPatch,
};

pub struct UserStore {
    inner: RwLock<Inner>,
    gen: Arc<UidGenerator>,
}

struct Inner {
    records: Vec<User>,
    by_uid: HashMap<Uid, usize>,
    by_login: HashMap<String, usize>,
}

fn user_not_found() -> AppError {
    AppError::not_found("user-not-found", "user not found")
}

impl UserStore {
    pub fn new(gen: Arc<UidGenerator>) -> UserStore {
        UserStore {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                by_uid: HashMap::new(),
                by_login: HashMap::new(),
            }),
            gen,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A contiguous page of records in storage order. The window is clamped
    /// to the arena; a degenerate window yields an empty page, not an error.
    pub fn list(&self, offset: usize, limit: usize) -> UserPage {
        let inner = self.inner.read();
        let total = inner.records.len();

        let lo = offset.min(total);
        let hi = offset.saturating_add(limit).min(total);
        if lo >= hi {
            return UserPage { offset: lo, records: Vec::new(), total_records: total };
        }

        UserPage {
            offset: lo,
            records: inner.records[lo..hi].iter().map(User::entity).collect(),
            total_records: total,
        }
    }

    pub fn get(&self, uid: Uid) -> AppResult<UserEntity> {
        let inner = self.inner.read();
        let &pos = inner.by_uid.get(&uid).ok_or_else(user_not_found)?;
        Ok(inner.records[pos].entity())
    }

    pub fn get_by_login(&self, login: &str) -> AppResult<UserEntity> {
        let inner = self.inner.read();
        let &pos = inner.by_login.get(login).ok_or_else(user_not_found)?;
        Ok(inner.records[pos].entity())
    }

    /// Validate every supplied field, hash the credential, then commit. The
    /// uniqueness check runs only after field validation passes, just before
    /// the record is inserted.
    pub fn create(
        &self,
        name: &str,
        login: &str,
        credential: &str,
        level: Level,
    ) -> AppResult<UserEntity> {
        let mut violations = Vec::new();
        if let Err(v) = validate_name(name) {
            violations.push(v);
        }
        if let Err(v) = validate_login(login) {
            violations.push(v);
        }
        if let Err(v) = validate_credential(credential) {
            violations.push(v);
        }
        if !violations.is_empty() {
            return Err(AppError::invalid_many(violations));
        }

        // Hashing is slow; keep it outside the writer lock. A digest failure
        // aborts creation entirely.
        let digest = hash_credential(credential)?;

        let mut inner = self.inner.write();
        if inner.by_login.contains_key(login) {
            return Err(AppError::conflict("login-in-use", "login already taken"));
        }

        let uid = self.gen.next();
        let pos = inner.records.len();
        inner.by_uid.insert(uid, pos);
        inner.by_login.insert(login.to_owned(), pos);
        inner.records.push(User {
            uid,
            name: name.to_owned(),
            login: login.to_owned(),
            credential: digest,
            level,
        });

        debug!(target: "users", %uid, login, "user.create");
        Ok(inner.records[pos].entity())
    }

    /// Apply the present fields of a patch. All supplied fields are
    /// validated up front and violations aggregated; on a login change the
    /// login index moves old to new under the same writer acquisition.
    pub fn patch(&self, uid: Uid, patch: UserPatch) -> AppResult<UserEntity> {
        let mut violations = Vec::new();
        if let Some(name) = patch.name.as_deref() {
            if let Err(v) = validate_name(name) {
                violations.push(v);
            }
        }
        if let Some(login) = patch.login.as_deref() {
            if let Err(v) = validate_login(login) {
                violations.push(v);
            }
        }
        if let Some(cred) = patch.credential.as_deref() {
            if let Err(v) = validate_credential(cred) {
                violations.push(v);
            }
        }
        if !violations.is_empty() {
            return Err(AppError::invalid_many(violations));
        }

        let digest = match patch.credential.as_deref() {
            Some(cred) => Some(hash_credential(cred)?),
            None => None,
        };

        let mut inner = self.inner.write();
        let &pos = inner.by_uid.get(&uid).ok_or_else(user_not_found)?;

        if let Some(login) = patch.login.as_deref() {
            // A login move must not steal another record's login.
            if let Some(&other) = inner.by_login.get(login) {
                if other != pos {
                    return Err(AppError::conflict("login-in-use", "login already taken"));
                }
            }
            let old = std::mem::replace(&mut inner.records[pos].login, login.to_owned());
            inner.by_login.remove(&old);
            inner.by_login.insert(login.to_owned(), pos);
        }
        if let Some(name) = patch.name {
            inner.records[pos].name = name;
        }
        if let Some(digest) = digest {
            inner.records[pos].credential = digest;
        }

        debug!(target: "users", %uid, "user.patch");
        Ok(inner.records[pos].entity())
    }

    /// Remove the record and both its index entries, compacting the arena.
    pub fn delete(&self, uid: Uid) -> AppResult<()> {
        let mut inner = self.inner.write();
        let &pos = inner.by_uid.get(&uid).ok_or_else(user_not_found)?;

        inner.by_uid.remove(&uid);
        let login = inner.records[pos].login.clone();
        inner.by_login.remove(&login);

        inner.records.swap_remove(pos);
        relocate(&mut inner, pos);

        debug!(target: "users", %uid, "user.delete");
        Ok(())
    }

    /// Check a login/credential pair. Unknown logins and wrong credentials
    /// are indistinguishable to the caller.
    pub fn verify_credentials(&self, login: &str, candidate: &str) -> AppResult<UserEntity> {
        let incorrect =
            || AppError::unauthorized("incorrect-credentials", "incorrect login or credential");

        // Clone the digest out so verification runs without the lock held.
        let (entity, digest) = {
            let inner = self.inner.read();
            let &pos = inner.by_login.get(login).ok_or_else(incorrect)?;
            (inner.records[pos].entity(), inner.records[pos].credential.clone())
        };

        if !credential::verify(&digest, candidate) {
            return Err(incorrect());
        }
        Ok(entity)
    }
}

fn hash_credential(cred: &str) -> AppResult<CredentialHash> {
    credential::hash(cred).map_err(|e| {
        tracing::error!(target: "users", error = %e, "credential digest failure");
        AppError::internal("hash-failure", "failed to hash the credential")
    })
}

/// Repoint the indices of the record that swap-remove moved into `pos`.
/// Invoked exactly once per deletion; a no-op when the removed record was
/// the last one.
fn relocate(inner: &mut Inner, pos: usize) {
    if pos >= inner.records.len() {
        return;
    }
    let moved_uid = inner.records[pos].uid;
    let moved_login = inner.records[pos].login.clone();
    inner.by_uid.insert(moved_uid, pos);
    inner.by_login.insert(moved_login, pos);
}
