//! The `AuthzStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `warden-store-sqlite`)
//! that pair a [`GraphEngine`](crate::engine::GraphEngine) with a local
//! relational projection. Higher layers ([`AuthzService`](crate::service::AuthzService))
//! depend on this abstraction, not on any concrete backend.

use std::{collections::HashMap, future::Future};

use crate::{
  builder::RelationshipBuilder,
  model::{Permission, Relationship, Resource, ResourceType},
};

/// Resource id → permissions held on it.
pub type PermissionMap = HashMap<String, Vec<Permission>>;

/// Abstraction over an authorization store backend.
///
/// Every operation runs inside the caller's session, which must have an open
/// transaction: writes serialize on an exclusive advisory lock, reads take the
/// shared one, and both locks are held until the transaction ends.
///
/// Dropping a session without committing rolls its transaction back and
/// releases its lock.
pub trait AuthzStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  type Session: Send;

  /// Open a session with a transaction already begun.
  fn begin(&self) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send + '_;

  /// Commit the session's transaction, releasing its lock.
  fn commit(
    &self,
    session: Self::Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Writes (exclusive lock) ───────────────────────────────────────────

  /// Apply every builder in one engine batch and mirror the tracked edges
  /// locally. An empty list succeeds without locking or calling the engine.
  fn write_relationships<'a>(
    &'a self,
    session: &'a mut Self::Session,
    relationships: &'a [RelationshipBuilder],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Drop every relationship of `resource` (or of every resource of its type
  /// when its id is empty).
  fn delete_relationships<'a>(
    &'a self,
    session: &'a mut Self::Session,
    resource: &'a Resource,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Reads (shared lock) ───────────────────────────────────────────────

  /// Ids of every resource of `resource_type` on which the user holds
  /// `permission`.
  fn list_resources<'a>(
    &'a self,
    session: &'a mut Self::Session,
    user_id: &'a str,
    permission: Permission,
    resource_type: ResourceType,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  /// Permissions the user holds on each assessment. Assessments with no held
  /// permission are absent from the map.
  fn get_permissions<'a>(
    &'a self,
    session: &'a mut Self::Session,
    assessment_ids: &'a [String],
    user_id: &'a str,
  ) -> impl Future<Output = Result<PermissionMap, Self::Error>> + Send + 'a;

  /// Locally tracked relationships of an assessment, oldest first.
  fn list_relationships<'a>(
    &'a self,
    session: &'a mut Self::Session,
    assessment_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Relationship>, Self::Error>> + Send + 'a;
}
