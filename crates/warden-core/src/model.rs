//! The relationship model: subjects, resources, relations and permissions.
//!
//! Everything here mirrors objects of the external graph engine. Subjects and
//! non-assessment resources are addressed in the engine by a generated id
//! derived from their caller-facing id; assessments keep their own id.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumString};

/// Number of hex characters kept from the SHA-256 digest of an id.
pub const GENERATED_ID_LEN: usize = 12;

/// Derive the engine-side object id for a caller-facing id.
pub fn generate_id(raw: &str) -> String {
  let digest = Sha256::digest(raw.as_bytes());
  let mut id = hex::encode(digest);
  id.truncate(GENERATED_ID_LEN);
  id
}

// ─── Object types ────────────────────────────────────────────────────────────

/// Object type names known to the graph engine schema.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
  Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ObjectType {
  User,
  #[serde(rename = "org")]
  #[strum(serialize = "org")]
  Organization,
  Assessment,
  Platform,
}

// ─── Subjects ────────────────────────────────────────────────────────────────

/// The kind of entity a subject represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
  User,
  Organization,
  Platform,
}

impl SubjectKind {
  pub fn object_type(self) -> ObjectType {
    match self {
      Self::User => ObjectType::User,
      Self::Organization => ObjectType::Organization,
      Self::Platform => ObjectType::Platform,
    }
  }

  pub fn from_object_type(object_type: ObjectType) -> Option<Self> {
    match object_type {
      ObjectType::User => Some(Self::User),
      ObjectType::Organization => Some(Self::Organization),
      ObjectType::Platform => Some(Self::Platform),
      ObjectType::Assessment => None,
    }
  }
}

/// Someone (or something) relationships are granted to.
///
/// Immutable once constructed: the generated id is always the digest of the
/// raw id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Subject {
  kind:         SubjectKind,
  id:           String,
  generated_id: String,
}

impl Subject {
  pub fn new(kind: SubjectKind, id: impl Into<String>) -> Self {
    let id = id.into();
    let generated_id = generate_id(&id);
    Self { kind, id, generated_id }
  }

  pub fn user(id: impl Into<String>) -> Self { Self::new(SubjectKind::User, id) }

  pub fn organization(id: impl Into<String>) -> Self {
    Self::new(SubjectKind::Organization, id)
  }

  pub fn platform(id: impl Into<String>) -> Self {
    Self::new(SubjectKind::Platform, id)
  }

  pub fn kind(&self) -> SubjectKind { self.kind }

  /// The caller-facing id.
  pub fn id(&self) -> &str { &self.id }

  /// The id under which the engine knows this subject.
  pub fn generated_id(&self) -> &str { &self.generated_id }

  pub fn object_type(&self) -> ObjectType { self.kind.object_type() }
}

// ─── Resources ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
  Assessment,
  Platform,
  Organization,
}

impl ResourceType {
  pub fn object_type(self) -> ObjectType {
    match self {
      Self::Assessment => ObjectType::Assessment,
      Self::Platform => ObjectType::Platform,
      Self::Organization => ObjectType::Organization,
    }
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.object_type().as_ref())
  }
}

/// An object relationships attach to.
///
/// An empty `id` designates every resource of `resource_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
  resource_type: ResourceType,
  id:            String,
  generated_id:  String,
}

impl Resource {
  /// Assessment ids are UUIDs the engine accepts verbatim, so they are not
  /// hashed.
  pub fn assessment(id: impl Into<String>) -> Self {
    let id = id.into();
    Self { resource_type: ResourceType::Assessment, generated_id: id.clone(), id }
  }

  pub fn platform(id: impl Into<String>) -> Self {
    Self::hashed(ResourceType::Platform, id.into())
  }

  pub fn organization(id: impl Into<String>) -> Self {
    Self::hashed(ResourceType::Organization, id.into())
  }

  /// Every resource of the given type.
  pub fn all(resource_type: ResourceType) -> Self {
    Self { resource_type, id: String::new(), generated_id: String::new() }
  }

  fn hashed(resource_type: ResourceType, id: String) -> Self {
    let generated_id = if id.is_empty() { String::new() } else { generate_id(&id) };
    Self { resource_type, id, generated_id }
  }

  pub fn resource_type(&self) -> ResourceType { self.resource_type }

  pub fn id(&self) -> &str { &self.id }

  pub fn generated_id(&self) -> &str { &self.generated_id }

  pub fn is_all(&self) -> bool { self.id.is_empty() }
}

// ─── Relations and permissions ───────────────────────────────────────────────

/// Relations that can be recorded against assessments and organizations.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RelationKind {
  Owner,
  Viewer,
  Editor,
  Org,
  Parent,
  Member,
}

/// Roles held by users on a platform. They only take effect on assessments
/// through the `parent` relation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PlatformRole {
  Admin,
  Editor,
  Viewer,
}

/// A capability derived by the engine; never stored.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
  Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
  Read,
  Edit,
  Share,
  Delete,
}

impl Permission {
  /// The exhaustive permission set, in check order.
  pub const ALL: [Permission; 4] =
    [Permission::Read, Permission::Edit, Permission::Share, Permission::Delete];
}

/// How a built relationship is reflected in the local projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipOp {
  /// Persist (or replace) locally.
  Update,
  /// Remove locally.
  Delete,
  /// Upserted in the engine, not tracked locally.
  Touch,
  /// Engine only; never shown in any per-assessment view.
  Ignore,
}

// ─── Consistency token ───────────────────────────────────────────────────────

/// Opaque write watermark returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsistencyToken(String);

impl ConsistencyToken {
  pub fn new(token: impl Into<String>) -> Self { Self(token.into()) }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for ConsistencyToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<String> for ConsistencyToken {
  fn from(token: String) -> Self { Self(token) }
}

// ─── Relationship ────────────────────────────────────────────────────────────

/// One edge of the authorization graph, as recorded locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
  /// Relation key: digest of the engine tuple. Stable across writes of the
  /// same edge.
  pub id:            String,
  pub created_at:    DateTime<Utc>,
  /// Set when the edge hangs off an assessment.
  pub assessment_id: Option<String>,
  pub kind:          RelationKind,
  pub subject:       Subject,
}

impl Relationship {
  pub fn new(
    resource_type: ObjectType,
    resource_id: &str,
    kind: RelationKind,
    subject: Subject,
  ) -> Self {
    let tuple = tuple_string(resource_type, resource_id, kind, &subject);
    Self {
      id: generate_id(&tuple),
      created_at: Utc::now(),
      assessment_id: (resource_type == ObjectType::Assessment)
        .then(|| resource_id.to_owned()),
      kind,
      subject,
    }
  }

  pub fn subject_type(&self) -> ObjectType { self.subject.object_type() }

  pub fn subject_id(&self) -> &str { self.subject.id() }
}

/// Render an edge in engine tuple notation, e.g.
/// `assessment:123#owner@user:4f2a9c0d1e7b`.
fn tuple_string(
  resource_type: ObjectType,
  resource_id: &str,
  kind: RelationKind,
  subject: &Subject,
) -> String {
  let subject_part = match subject.kind() {
    SubjectKind::Organization => format!(
      "{}:{}#{}",
      ObjectType::Organization,
      subject.generated_id(),
      RelationKind::Member
    ),
    _ => format!("{}:{}", subject.object_type(), subject.generated_id()),
  };
  format!("{resource_type}:{resource_id}#{kind}@{subject_part}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generated_id_is_deterministic_and_fixed_length() {
    let a = Subject::user("alice");
    let b = Subject::user("alice");
    assert_eq!(a.generated_id(), b.generated_id());
    assert_eq!(a.generated_id().len(), GENERATED_ID_LEN);
    assert_ne!(a.generated_id(), Subject::user("bob").generated_id());
  }

  #[test]
  fn assessment_ids_are_not_hashed() {
    let r = Resource::assessment("0b6f5f7e-1111-4c1c-9c57-3bbd0c1a2f10");
    assert_eq!(r.generated_id(), r.id());

    let p = Resource::platform("redhat");
    assert_eq!(p.generated_id(), generate_id("redhat"));
  }

  #[test]
  fn all_resources_have_no_id() {
    let r = Resource::all(ResourceType::Platform);
    assert!(r.is_all());
    assert!(r.generated_id().is_empty());
  }

  #[test]
  fn relation_key_depends_on_the_edge_only() {
    let first = Relationship::new(
      ObjectType::Assessment,
      "a1",
      RelationKind::Owner,
      Subject::user("u1"),
    );
    let again = Relationship::new(
      ObjectType::Assessment,
      "a1",
      RelationKind::Owner,
      Subject::user("u1"),
    );
    let other = Relationship::new(
      ObjectType::Assessment,
      "a1",
      RelationKind::Viewer,
      Subject::user("u1"),
    );
    assert_eq!(first.id, again.id);
    assert_ne!(first.id, other.id);
    assert_eq!(first.assessment_id.as_deref(), Some("a1"));
  }

  #[test]
  fn string_forms_match_engine_schema() {
    assert_eq!(ObjectType::Organization.to_string(), "org");
    assert_eq!(RelationKind::Org.as_ref(), "org");
    assert_eq!("share".parse::<Permission>().unwrap(), Permission::Share);
    assert_eq!(ResourceType::Assessment.to_string(), "assessment");
    assert!("superuser".parse::<PlatformRole>().is_err());
  }
}
