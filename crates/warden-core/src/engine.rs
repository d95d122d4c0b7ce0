//! The RPC contract of the external graph-authorization engine.
//!
//! The engine is an opaque collaborator: this module only describes the
//! requests Warden issues and the responses it expects. Implementations wrap
//! a network client (or, for tests and local development, the
//! [`MemoryEngine`](crate::memory::MemoryEngine)).

use std::future::Future;

use crate::model::{
  ConsistencyToken, ObjectType, Permission, RelationKind, Subject, SubjectKind,
};

// ─── References ──────────────────────────────────────────────────────────────

/// An engine object: `<type>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
  pub object_type: ObjectType,
  pub object_id:   String,
}

impl ObjectRef {
  pub fn new(object_type: ObjectType, object_id: impl Into<String>) -> Self {
    Self { object_type, object_id: object_id.into() }
  }
}

/// The subject side of a relationship, optionally narrowed to a relation of
/// the subject object (e.g. `org:acme#member`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectRef {
  pub object:            ObjectRef,
  pub optional_relation: Option<String>,
}

impl From<&Subject> for SubjectRef {
  fn from(subject: &Subject) -> Self {
    Self {
      object:            ObjectRef::new(subject.object_type(), subject.generated_id()),
      optional_relation: None,
    }
  }
}

impl SubjectRef {
  /// Reference to a user subject by caller-facing id.
  pub fn user(user_id: &str) -> Self { Self::from(&Subject::user(user_id)) }

  pub fn is_user(&self) -> bool {
    SubjectKind::from_object_type(self.object.object_type) == Some(SubjectKind::User)
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOperation {
  /// Upsert: create the relationship, or keep it if it already exists.
  Touch,
  Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipUpdate {
  pub operation: UpdateOperation,
  pub resource:  ObjectRef,
  /// Relation name on the resource; a [`RelationKind`] or a platform role.
  pub relation:  String,
  pub subject:   SubjectRef,
}

impl RelationshipUpdate {
  pub fn touch(resource: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
    Self { operation: UpdateOperation::Touch, resource, relation: relation.into(), subject }
  }

  pub fn delete(resource: ObjectRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
    Self { operation: UpdateOperation::Delete, resource, relation: relation.into(), subject }
  }

  pub fn is_relation(&self, kind: RelationKind) -> bool { self.relation == kind.as_ref() }
}

/// Selects relationships for deletion: every relationship on resources of
/// `resource_type`, optionally narrowed to one resource id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipFilter {
  pub resource_type:        ObjectType,
  pub optional_resource_id: Option<String>,
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Freshness requirement for a read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Consistency {
  /// Whatever the engine can answer fastest.
  #[default]
  MinimizeLatency,
  /// At least as fresh as the write that produced the token.
  AtLeastAsFresh(ConsistencyToken),
}

impl Consistency {
  pub fn from_token(token: Option<ConsistencyToken>) -> Self {
    token.map_or(Self::MinimizeLatency, Self::AtLeastAsFresh)
  }
}

/// Reverse lookup: every resource of a type on which the subject holds the
/// permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResourcesRequest {
  pub resource_type: ObjectType,
  pub permission:    Permission,
  pub subject:       SubjectRef,
  pub consistency:   Consistency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckItem {
  pub resource:   ObjectRef,
  pub permission: Permission,
  pub subject:    SubjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckBulkPermissionsRequest {
  pub items:       Vec<CheckItem>,
  pub consistency: Consistency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissionship {
  HasPermission,
  NoPermission,
  /// Depends on caveat context the request did not supply.
  Conditional,
}

/// Outcome of one item of a bulk check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
  Checked(Permissionship),
  /// The engine could not answer this item.
  Failed(String),
}

/// One response pair; the engine echoes the request item it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckBulkPair {
  pub request: CheckItem,
  pub outcome: CheckOutcome,
}

impl CheckBulkPair {
  pub fn is_held(&self) -> bool {
    matches!(self.outcome, CheckOutcome::Checked(Permissionship::HasPermission))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Client side of the graph-authorization engine.
///
/// All methods return `Send` futures so engines can be shared across tasks of
/// a multi-threaded runtime.
pub trait GraphEngine: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Apply every update atomically; returns the write watermark.
  fn write_relationships(
    &self,
    updates: Vec<RelationshipUpdate>,
  ) -> impl Future<Output = Result<ConsistencyToken, Self::Error>> + Send + '_;

  /// Delete every relationship matching `filter`; returns the write
  /// watermark.
  fn delete_relationships(
    &self,
    filter: RelationshipFilter,
  ) -> impl Future<Output = Result<ConsistencyToken, Self::Error>> + Send + '_;

  /// Collect the ids streamed back by a reverse lookup.
  fn lookup_resources(
    &self,
    request: LookupResourcesRequest,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Check every item; the response preserves request order.
  fn check_bulk_permissions(
    &self,
    request: CheckBulkPermissionsRequest,
  ) -> impl Future<Output = Result<Vec<CheckBulkPair>, Self::Error>> + Send + '_;

  /// Whether `error` is the transient "unavailable" transport condition that
  /// the retry layer may re-attempt.
  fn is_unavailable(_error: &Self::Error) -> bool { false }
}
