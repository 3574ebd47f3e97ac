//! Orchestration between the local user store and the remote directory.
//!
//! The directory is authoritative: every operation that changes an account's
//! activation writes to the media server first and touches the local row only
//! after that write succeeded. Local state may lag the remote by one failed
//! call, never lead it.

mod accounts;
mod lifecycle;
mod sync;

pub use accounts::{create_user, delete_user};
pub use lifecycle::{sweep_expired, toggle_status, update_expiry};
pub use sync::{sync_users, SyncError, SyncOutcome};

use thiserror::Error;

use crate::media::MediaError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
