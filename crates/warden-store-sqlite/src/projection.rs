//! [`Projection`]: the local relational copy of assessment relationships.

use std::path::{Path, PathBuf};

use uuid::Uuid;
use warden_core::model::Relationship;

use crate::{
  Result, Session,
  encode::RawRelationship,
  lock::AdvisoryLocks,
  schema::SCHEMA,
  token::ConsistencyTokenStore,
};

/// The database half of the authorization store.
///
/// Holds no connection pool: every [`Session`] opens its own connection to
/// `path`. For in-memory databases an anchor connection keeps the shared
/// cache alive for as long as the projection exists.
pub struct Projection {
  path:    PathBuf,
  tokens:  ConsistencyTokenStore,
  _anchor: tokio_rusqlite::Connection,
}

impl Projection {
  /// Open (or create) the database at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_at(path.as_ref().to_path_buf()).await
  }

  /// Open a private in-memory database, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let uri = format!("file:warden-{}?mode=memory&cache=shared", Uuid::new_v4());
    Self::open_at(PathBuf::from(uri)).await
  }

  async fn open_at(path: PathBuf) -> Result<Self> {
    let anchor = tokio_rusqlite::Connection::open(&path).await?;
    anchor
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      path,
      tokens: ConsistencyTokenStore::new(AdvisoryLocks::new()),
      _anchor: anchor,
    })
  }

  pub fn tokens(&self) -> &ConsistencyTokenStore { &self.tokens }

  /// A new session without an open transaction.
  pub async fn session(&self) -> Result<Session> { Session::open(&self.path).await }

  /// A new session with its transaction already begun.
  pub async fn begin(&self) -> Result<Session> {
    let mut session = self.session().await?;
    session.begin().await?;
    Ok(session)
  }

  // ── Rows ──────────────────────────────────────────────────────────────

  /// Insert the row, replacing one with the same relation id.
  pub async fn upsert_relationship(
    &self,
    session: &mut Session,
    relationship: &Relationship,
  ) -> Result<()> {
    session.ensure_transaction()?;
    let raw = RawRelationship::from_relationship(relationship);
    session
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO relationships (
             relation_id, assessment_id, created_at,
             relation_type, subject_id, subject_type
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            raw.relation_id,
            raw.assessment_id,
            raw.created_at,
            raw.relation_type,
            raw.subject_id,
            raw.subject_type,
          ],
        )?;
        Ok(())
      })
      .await
  }

  /// Returns whether a row was removed.
  pub async fn delete_relationship(&self, session: &mut Session, relation_id: &str) -> Result<bool> {
    session.ensure_transaction()?;
    let relation_id = relation_id.to_owned();
    session
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM relationships WHERE relation_id = ?1",
          rusqlite::params![relation_id],
        )?;
        Ok(n > 0)
      })
      .await
  }

  /// Delete the rows of one assessment, or of every assessment when
  /// `assessment_id` is `None`. Returns the number of rows removed.
  pub async fn delete_assessment_relationships(
    &self,
    session: &mut Session,
    assessment_id: Option<&str>,
  ) -> Result<usize> {
    session.ensure_transaction()?;
    let assessment_id = assessment_id.map(str::to_owned);
    session
      .call(move |conn| {
        let n = match assessment_id {
          Some(id) => conn.execute(
            "DELETE FROM relationships WHERE assessment_id = ?1",
            rusqlite::params![id],
          )?,
          None => conn.execute("DELETE FROM relationships WHERE assessment_id IS NOT NULL", [])?,
        };
        Ok(n)
      })
      .await
  }

  /// Rows of one assessment, oldest first.
  pub async fn list_relationships(
    &self,
    session: &mut Session,
    assessment_id: &str,
  ) -> Result<Vec<Relationship>> {
    session.ensure_transaction()?;
    let assessment_id = assessment_id.to_owned();
    let raws: Vec<RawRelationship> = session
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT relation_id, assessment_id, created_at,
                  relation_type, subject_id, subject_type
           FROM relationships
           WHERE assessment_id = ?1
           ORDER BY created_at, relation_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![assessment_id], RawRelationship::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }
}
