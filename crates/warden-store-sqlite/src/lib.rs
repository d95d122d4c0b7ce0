//! SQLite backend for the Warden authorization store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated threads
//! without blocking the async runtime. The database holds the local
//! relationship projection and the cached consistency token; the relationship
//! graph itself lives in the external engine.

mod encode;
mod lock;
mod projection;
mod schema;
mod session;
mod store;
mod token;

pub mod error;

pub use error::{Error, Result};
pub use lock::{AdvisoryLocks, LockKey, LockMode};
pub use projection::Projection;
pub use session::Session;
pub use store::SqliteAuthzStore;
pub use token::ConsistencyTokenStore;
