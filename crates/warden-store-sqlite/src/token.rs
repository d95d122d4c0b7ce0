//! [`ConsistencyTokenStore`]: the cached engine token and the advisory lock
//! that orders writers against readers.

use rusqlite::OptionalExtension as _;
use warden_core::model::ConsistencyToken;

use crate::{
  Error, Result, Session,
  lock::{AdvisoryLocks, LockKey, LockMode},
};

const LOCK_NAME: &str = "zed_token_lock_key";

/// Persists the most recent consistency token in the `zed_token` table and
/// hands out the single advisory lock guarding it.
///
/// Cloning shares the underlying lock registry.
#[derive(Debug, Clone)]
pub struct ConsistencyTokenStore {
  key:   LockKey,
  locks: AdvisoryLocks,
}

impl ConsistencyTokenStore {
  pub fn new(locks: AdvisoryLocks) -> Self { Self { key: LockKey::derive(LOCK_NAME), locks } }

  pub fn lock_key(&self) -> LockKey { self.key }

  /// The stored token, or `None` when no write has been recorded yet.
  pub async fn read(&self, session: &mut Session) -> Result<Option<ConsistencyToken>> {
    let token: Option<String> = session
      .call(|conn| {
        let token = conn
          .query_row("SELECT token FROM zed_token WHERE id = 1", [], |r| r.get(0))
          .optional()?;
        Ok(token)
      })
      .await?;
    Ok(token.filter(|t| !t.is_empty()).map(ConsistencyToken::new))
  }

  pub async fn write(&self, session: &mut Session, token: &ConsistencyToken) -> Result<()> {
    let token_str = token.as_str().to_owned();
    session
      .call(move |conn| {
        conn.execute(
          "INSERT INTO zed_token (id, token) VALUES (1, ?1)
           ON CONFLICT(id) DO UPDATE SET token = excluded.token",
          rusqlite::params![token_str],
        )?;
        Ok(())
      })
      .await?;
    tracing::debug!(token = %token, "stored consistency token");
    Ok(())
  }

  /// Block until this session holds the lock exclusively. Released when the
  /// session's transaction ends.
  ///
  /// Also takes the database write lock, so writers on other connections to
  /// the same file queue behind this one even when they use another lock
  /// registry. Fails with [`Error::LockUpgrade`] if the session already holds
  /// the shared lock.
  pub async fn acquire_exclusive_lock(&self, session: &mut Session) -> Result<()> {
    if self.acquire(session, LockMode::Exclusive).await? {
      self.reserve(session).await?;
    }
    Ok(())
  }

  /// Block until this session holds the lock in shared mode. Released when
  /// the session's transaction ends.
  pub async fn acquire_shared_lock(&self, session: &mut Session) -> Result<()> {
    self.acquire(session, LockMode::Shared).await.map(|_| ())
  }

  /// Returns whether the lock was newly taken.
  async fn acquire(&self, session: &mut Session, mode: LockMode) -> Result<bool> {
    session.ensure_transaction()?;
    match (session.held_lock(), mode) {
      (Some(LockMode::Exclusive), _) | (Some(LockMode::Shared), LockMode::Shared) => {
        return Ok(false);
      }
      (Some(LockMode::Shared), LockMode::Exclusive) => return Err(Error::LockUpgrade),
      (None, _) => {}
    }
    tracing::debug!(key = self.key.value(), ?mode, "waiting for advisory lock");
    let held = self.locks.acquire(self.key, mode).await;
    session.hold(held);
    tracing::debug!(key = self.key.value(), ?mode, "advisory lock acquired");
    Ok(true)
  }

  /// A write that changes nothing, leaving the transaction holding SQLite's
  /// write lock. Waits out other writers up to the session's busy timeout.
  async fn reserve(&self, session: &mut Session) -> Result<()> {
    session
      .call(|conn| {
        conn.execute(
          "INSERT INTO zed_token (id, token) VALUES (1, '')
           ON CONFLICT(id) DO UPDATE SET token = token",
          [],
        )?;
        Ok(())
      })
      .await?;
    tracing::debug!(key = self.key.value(), "database write lock reserved");
    Ok(())
  }
}
