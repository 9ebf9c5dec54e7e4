//! User accounts and login sessions over the in-memory repository layer.
//! Keep the public surface thin and split implementation across sub-modules.

mod session;
mod sessions;
mod user;
mod users;

pub use session::{Session, SessionEntity};
pub use sessions::SessionStore;
pub use user::{User, UserEntity, UserPage, UserPatch};
pub use users::UserStore;
