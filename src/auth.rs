//! Permission levels, caller context and the authorization gate.
//!
//! Authorization is a set-membership check: each operation carries the set
//! of permission levels it accepts, and a caller passes when their level is
//! in that set. Two explicit extra allow paths exist and are kept visibly
//! separate rules rather than side effects of enum ordering:
//!
//! - a set containing [`Level::Unlogged`] is open to everyone;
//! - operations targeting the caller's own record bypass the level check,
//!   decided before the set is ever consulted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// Closed set of permission levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Unlogged,
    User,
    Admin,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Unlogged => "unlogged",
            Level::User => "user",
            Level::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// The caller's authentication context: who they are and at which level.
/// An unlogged context carries the nil identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    user: Uid,
    level: Level,
}

impl Context {
    pub fn logged(user: Uid, level: Level) -> Context {
        Context { user, level }
    }

    pub fn unlogged() -> Context {
        Context { user: Uid::NIL, level: Level::Unlogged }
    }

    pub fn user(&self) -> Uid {
        self.user
    }

    pub fn level(&self) -> Level {
        self.level
    }
}

/// The set of permission levels an operation accepts.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    accepted: &'static [Level],
}

impl Gate {
    pub const fn new(accepted: &'static [Level]) -> Gate {
        Gate { accepted }
    }

    /// Level check only: the caller's level is in the set, or the set
    /// contains the open-to-everyone sentinel.
    pub fn allows(&self, ctx: &Context) -> bool {
        if self.accepted.contains(&ctx.level()) {
            return true;
        }
        self.accepted.contains(&Level::Unlogged)
    }

    /// Full check for an operation on a specific record: self-access is a
    /// distinct allow path and is decided before the level check.
    pub fn allows_on(&self, ctx: &Context, target: Uid) -> bool {
        if !ctx.user().is_nil() && ctx.user() == target {
            return true;
        }
        self.allows(ctx)
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, level) in self.accepted.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{level}")?;
        }
        write!(f, "]")
    }
}
