//! Transaction-scoped advisory locks.
//!
//! SQLite has no advisory locks of its own, so the lock table lives in the
//! process: one reader/writer lock per [`LockKey`], shared by every session
//! opened from the same [`AdvisoryLocks`] handle. A [`Session`](crate::Session)
//! owns the guard it acquired and gives it up when its transaction ends.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use sha2::{Digest, Sha256};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// A 64-bit advisory lock key, derived from a well-known name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey(i64);

impl LockKey {
  /// First 8 bytes of the name's SHA-256 digest, big-endian.
  pub fn derive(name: &str) -> Self {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Self(i64::from_be_bytes(bytes))
  }

  pub fn value(self) -> i64 { self.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  /// Held by readers; compatible with other shared holders.
  Shared,
  /// Held by a single writer; excludes every other holder.
  Exclusive,
}

/// A guard for one key, held by a session until its transaction ends.
#[derive(Debug)]
pub(crate) enum HeldLock {
  Shared(OwnedRwLockReadGuard<()>),
  Exclusive(OwnedRwLockWriteGuard<()>),
}

impl HeldLock {
  pub(crate) fn mode(&self) -> LockMode {
    match self {
      Self::Shared(_) => LockMode::Shared,
      Self::Exclusive(_) => LockMode::Exclusive,
    }
  }
}

/// Registry of advisory locks, keyed by [`LockKey`].
///
/// Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryLocks {
  locks: Arc<Mutex<HashMap<LockKey, Arc<RwLock<()>>>>>,
}

impl AdvisoryLocks {
  pub fn new() -> Self { Self::default() }

  fn entry(&self, key: LockKey) -> Arc<RwLock<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
  }

  /// Wait until `key` can be held in `mode`.
  pub(crate) async fn acquire(&self, key: LockKey, mode: LockMode) -> HeldLock {
    let lock = self.entry(key);
    match mode {
      LockMode::Shared => HeldLock::Shared(lock.read_owned().await),
      LockMode::Exclusive => HeldLock::Exclusive(lock.write_owned().await),
    }
  }
}
