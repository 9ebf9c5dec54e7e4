//! Session record and entity shape. Sessions are immutable once created.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// A login session: its own identifier, the owning user and the instant it
/// stops being live. A session is live iff `now < expires` and it has not
/// been removed.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub(crate) uid: Uid,
    pub(crate) user: Uid,
    pub(crate) expires: DateTime<Utc>,
}

impl Session {
    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn user(&self) -> Uid {
        self.user
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn entity(&self) -> SessionEntity {
        SessionEntity { uuid: self.uid, user: self.user, expires: self.expires }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntity {
    pub uuid: Uid,
    pub user: Uid,
    pub expires: DateTime<Utc>,
}
