//! [`Session`]: one database connection and the transaction running on it.

use std::{path::Path, time::Duration};

use crate::{
  Error, Result,
  lock::{HeldLock, LockMode},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A dedicated connection to the store database.
///
/// Operations of the authorization store run inside the session's
/// transaction, and the advisory lock they take is owned by the session until
/// that transaction ends. Dropping a session mid-transaction rolls it back
/// before the lock is released.
pub struct Session {
  conn:           tokio_rusqlite::Connection,
  in_transaction: bool,
  lock:           Option<HeldLock>,
}

impl Session {
  pub(crate) async fn open(path: &Path) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, in_transaction: false, lock: None })
  }

  pub fn in_transaction(&self) -> bool { self.in_transaction }

  /// The advisory lock mode currently held, if any.
  pub fn held_lock(&self) -> Option<LockMode> { self.lock.as_ref().map(HeldLock::mode) }

  pub async fn begin(&mut self) -> Result<()> {
    if self.in_transaction {
      return Err(Error::TransactionActive);
    }
    self.execute_batch("BEGIN").await?;
    self.in_transaction = true;
    Ok(())
  }

  /// Commit the open transaction and release the advisory lock.
  pub async fn commit(&mut self) -> Result<()> { self.finish("COMMIT").await }

  /// Roll back the open transaction and release the advisory lock.
  pub async fn rollback(&mut self) -> Result<()> { self.finish("ROLLBACK").await }

  async fn finish(&mut self, statement: &'static str) -> Result<()> {
    if !self.in_transaction {
      return Err(Error::NoTransaction);
    }
    self.execute_batch(statement).await?;
    self.in_transaction = false;
    self.lock = None;
    Ok(())
  }

  pub(crate) fn ensure_transaction(&self) -> Result<()> {
    if self.in_transaction { Ok(()) } else { Err(Error::NoTransaction) }
  }

  pub(crate) fn hold(&mut self, lock: HeldLock) { self.lock = Some(lock); }

  /// Run `function` on the session's connection thread.
  pub(crate) async fn call<F, R>(&self, function: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    Ok(self.conn.call(function).await?)
  }

  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    if !self.in_transaction {
      return;
    }
    let lock = self.lock.take();
    let conn = self.conn.clone();
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
      return;
    };
    handle.spawn(async move {
      let rolled_back = conn
        .call(|conn| {
          conn.execute_batch("ROLLBACK")?;
          Ok(())
        })
        .await;
      if let Err(e) = rolled_back {
        tracing::warn!(error = %e, "rollback of abandoned session failed");
      }
      drop(lock);
    });
  }
}
