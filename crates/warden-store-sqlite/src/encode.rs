//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microseconds. Relation
//! and subject types use the graph engine's names (`owner`, `org`, …).

use chrono::{DateTime, SecondsFormat, Utc};
use warden_core::model::{ObjectType, RelationKind, Relationship, Subject, SubjectKind};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that text order matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Relation / subject types ────────────────────────────────────────────────

pub fn decode_relation(s: &str) -> Result<RelationKind> {
  s.parse()
    .map_err(|_| warden_core::Error::UnknownRelation(s.to_owned()).into())
}

pub fn decode_subject_kind(s: &str) -> Result<SubjectKind> {
  s.parse::<ObjectType>()
    .ok()
    .and_then(SubjectKind::from_object_type)
    .ok_or_else(|| warden_core::Error::UnknownSubjectType(s.to_owned()).into())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column values for one `relationships` row.
pub struct RawRelationship {
  pub relation_id:   String,
  pub assessment_id: Option<String>,
  pub created_at:    String,
  pub relation_type: String,
  pub subject_id:    String,
  pub subject_type:  String,
}

impl RawRelationship {
  pub fn from_relationship(rel: &Relationship) -> Self {
    Self {
      relation_id:   rel.id.clone(),
      assessment_id: rel.assessment_id.clone(),
      created_at:    encode_dt(rel.created_at),
      relation_type: rel.kind.to_string(),
      subject_id:    rel.subject_id().to_owned(),
      subject_type:  rel.subject_type().to_string(),
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      relation_id:   row.get(0)?,
      assessment_id: row.get(1)?,
      created_at:    row.get(2)?,
      relation_type: row.get(3)?,
      subject_id:    row.get(4)?,
      subject_type:  row.get(5)?,
    })
  }

  pub fn into_relationship(self) -> Result<Relationship> {
    let kind = decode_subject_kind(&self.subject_type)?;
    Ok(Relationship {
      id:            self.relation_id,
      created_at:    decode_dt(&self.created_at)?,
      assessment_id: self.assessment_id,
      kind:          decode_relation(&self.relation_type)?,
      subject:       Subject::new(kind, self.subject_id),
    })
  }
}
