//! An in-process graph engine implementing the assessment schema.
//!
//! Used by the test suites and for local development without an external
//! engine. Revisions are counted per write; tokens have the form `r<n>`.
//!
//! Permissions on an assessment:
//!
//! | permission | granted by |
//! |---|---|
//! | read   | owner, editor, viewer, org→member, parent→(admin, editor, viewer) |
//! | edit   | owner, editor, org→member, parent→(admin, editor) |
//! | share  | owner, parent→admin |
//! | delete | owner, parent→admin |

use std::{
  collections::{BTreeSet, HashSet},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use thiserror::Error;

use crate::{
  engine::{
    CheckBulkPair, CheckBulkPermissionsRequest, CheckItem, CheckOutcome, Consistency,
    GraphEngine, LookupResourcesRequest, ObjectRef, Permissionship, RelationshipFilter,
    RelationshipUpdate, SubjectRef, UpdateOperation,
  },
  model::{ConsistencyToken, ObjectType, Permission, PlatformRole, RelationKind},
};

#[derive(Debug, Error)]
pub enum MemoryEngineError {
  #[error("engine unavailable")]
  Unavailable,

  #[error("consistency token {0:?} is not valid for this engine")]
  InvalidToken(String),

  #[error("no permissions are defined on {0} objects")]
  UnsupportedResourceType(ObjectType),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Tuple {
  resource: ObjectRef,
  relation: String,
  subject:  SubjectRef,
}

#[derive(Debug, Default)]
struct State {
  tuples:         BTreeSet<Tuple>,
  revision:       u64,
  failures:       u32,
  failing_checks: HashSet<String>,
}

/// Cloning yields another handle onto the same relationship set.
#[derive(Debug, Clone, Default)]
pub struct MemoryEngine {
  state: Arc<Mutex<State>>,
}

impl MemoryEngine {
  pub fn new() -> Self { Self::default() }

  /// Token of the latest write.
  pub fn current_token(&self) -> ConsistencyToken { token_for(self.state().revision) }

  pub fn relationship_count(&self) -> usize { self.state().tuples.len() }

  pub fn has_relationship(
    &self,
    resource: &ObjectRef,
    relation: &str,
    subject: &SubjectRef,
  ) -> bool {
    self.state().has(resource, relation, &subject.object)
  }

  /// Make the next `calls` engine calls fail as unavailable.
  pub fn fail_next(&self, calls: u32) { self.state().failures = calls; }

  /// Make every bulk-check item on `resource_id` fail individually.
  pub fn fail_checks_for(&self, resource_id: impl Into<String>) {
    self.state().failing_checks.insert(resource_id.into());
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn write_sync(
    &self,
    updates: Vec<RelationshipUpdate>,
  ) -> Result<ConsistencyToken, MemoryEngineError> {
    let mut state = self.state();
    state.take_failure()?;
    for update in updates {
      let tuple = Tuple {
        resource: update.resource,
        relation: update.relation,
        subject:  update.subject,
      };
      match update.operation {
        UpdateOperation::Touch => {
          state.tuples.insert(tuple);
        }
        UpdateOperation::Delete => {
          state.tuples.remove(&tuple);
        }
      }
    }
    Ok(state.bump())
  }

  fn delete_sync(
    &self,
    filter: RelationshipFilter,
  ) -> Result<ConsistencyToken, MemoryEngineError> {
    let mut state = self.state();
    state.take_failure()?;
    state.tuples.retain(|t| {
      let same_type = t.resource.object_type == filter.resource_type;
      let same_id = filter
        .optional_resource_id
        .as_deref()
        .is_none_or(|id| t.resource.object_id == id);
      !(same_type && same_id)
    });
    Ok(state.bump())
  }

  fn lookup_sync(
    &self,
    request: LookupResourcesRequest,
  ) -> Result<Vec<String>, MemoryEngineError> {
    let mut state = self.state();
    state.take_failure()?;
    state.check_consistency(&request.consistency)?;
    if request.resource_type != ObjectType::Assessment {
      return Err(MemoryEngineError::UnsupportedResourceType(request.resource_type));
    }

    let candidates: BTreeSet<&ObjectRef> = state
      .tuples
      .iter()
      .map(|t| &t.resource)
      .filter(|r| r.object_type == ObjectType::Assessment)
      .collect();

    Ok(
      candidates
        .into_iter()
        .filter(|r| state.check(r, request.permission, &request.subject.object))
        .map(|r| r.object_id.clone())
        .collect(),
    )
  }

  fn check_bulk_sync(
    &self,
    request: CheckBulkPermissionsRequest,
  ) -> Result<Vec<CheckBulkPair>, MemoryEngineError> {
    let mut state = self.state();
    state.take_failure()?;
    state.check_consistency(&request.consistency)?;

    Ok(
      request
        .items
        .into_iter()
        .map(|item| {
          let outcome = state.check_item(&item);
          CheckBulkPair { request: item, outcome }
        })
        .collect(),
    )
  }
}

fn token_for(revision: u64) -> ConsistencyToken { ConsistencyToken::new(format!("r{revision}")) }

impl State {
  fn take_failure(&mut self) -> Result<(), MemoryEngineError> {
    if self.failures > 0 {
      self.failures -= 1;
      return Err(MemoryEngineError::Unavailable);
    }
    Ok(())
  }

  fn bump(&mut self) -> ConsistencyToken {
    self.revision += 1;
    token_for(self.revision)
  }

  fn check_consistency(&self, consistency: &Consistency) -> Result<(), MemoryEngineError> {
    let Consistency::AtLeastAsFresh(token) = consistency else {
      return Ok(());
    };
    match token.as_str().strip_prefix('r').and_then(|n| n.parse::<u64>().ok()) {
      Some(revision) if revision <= self.revision => Ok(()),
      _ => Err(MemoryEngineError::InvalidToken(token.to_string())),
    }
  }

  fn check_item(&self, item: &CheckItem) -> CheckOutcome {
    if self.failing_checks.contains(&item.resource.object_id) {
      return CheckOutcome::Failed(format!("check failed for {}", item.resource.object_id));
    }
    if item.resource.object_type != ObjectType::Assessment {
      return CheckOutcome::Failed(
        MemoryEngineError::UnsupportedResourceType(item.resource.object_type).to_string(),
      );
    }
    let permissionship = if self.check(&item.resource, item.permission, &item.subject.object) {
      Permissionship::HasPermission
    } else {
      Permissionship::NoPermission
    };
    CheckOutcome::Checked(permissionship)
  }

  fn has(&self, resource: &ObjectRef, relation: &str, subject: &ObjectRef) -> bool {
    self
      .tuples
      .iter()
      .any(|t| &t.resource == resource && t.relation == relation && &t.subject.object == subject)
  }

  /// Whether `subject` holds any of `relations` on an object reached from
  /// `resource` through `via`.
  fn through(
    &self,
    resource: &ObjectRef,
    via: RelationKind,
    relations: &[&str],
    subject: &ObjectRef,
  ) -> bool {
    self
      .tuples
      .iter()
      .filter(|t| &t.resource == resource && t.relation == via.as_ref())
      .any(|t| relations.iter().any(|r| self.has(&t.subject.object, r, subject)))
  }

  fn check(&self, resource: &ObjectRef, permission: Permission, user: &ObjectRef) -> bool {
    let direct =
      |relations: &[RelationKind]| relations.iter().any(|r| self.has(resource, r.as_ref(), user));
    let org_member = || self.through(resource, RelationKind::Org, &[RelationKind::Member.as_ref()], user);
    let platform = |roles: &[PlatformRole]| {
      let roles: Vec<&str> = roles.iter().map(AsRef::as_ref).collect();
      self.through(resource, RelationKind::Parent, &roles, user)
    };

    match permission {
      Permission::Read => {
        direct(&[RelationKind::Owner, RelationKind::Editor, RelationKind::Viewer])
          || org_member()
          || platform(&[PlatformRole::Admin, PlatformRole::Editor, PlatformRole::Viewer])
      }
      Permission::Edit => {
        direct(&[RelationKind::Owner, RelationKind::Editor])
          || org_member()
          || platform(&[PlatformRole::Admin, PlatformRole::Editor])
      }
      Permission::Share | Permission::Delete => {
        direct(&[RelationKind::Owner]) || platform(&[PlatformRole::Admin])
      }
    }
  }
}

impl GraphEngine for MemoryEngine {
  type Error = MemoryEngineError;

  async fn write_relationships(
    &self,
    updates: Vec<RelationshipUpdate>,
  ) -> Result<ConsistencyToken, Self::Error> {
    self.write_sync(updates)
  }

  async fn delete_relationships(
    &self,
    filter: RelationshipFilter,
  ) -> Result<ConsistencyToken, Self::Error> {
    self.delete_sync(filter)
  }

  async fn lookup_resources(
    &self,
    request: LookupResourcesRequest,
  ) -> Result<Vec<String>, Self::Error> {
    self.lookup_sync(request)
  }

  async fn check_bulk_permissions(
    &self,
    request: CheckBulkPermissionsRequest,
  ) -> Result<Vec<CheckBulkPair>, Self::Error> {
    self.check_bulk_sync(request)
  }

  fn is_unavailable(error: &Self::Error) -> bool {
    matches!(error, MemoryEngineError::Unavailable)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::{builder::*, model::Subject};

  async fn write(engine: &MemoryEngine, builders: &[RelationshipBuilder]) -> ConsistencyToken {
    let mut updates = Vec::new();
    for b in builders {
      b.apply(&mut updates);
    }
    engine.write_relationships(updates).await.unwrap()
  }

  async fn held(engine: &MemoryEngine, assessment: &str, user: &str) -> Vec<Permission> {
    let items = Permission::ALL
      .iter()
      .map(|p| CheckItem {
        resource:   ObjectRef::new(ObjectType::Assessment, assessment),
        permission: *p,
        subject:    SubjectRef::user(user),
      })
      .collect();
    let request = CheckBulkPermissionsRequest { items, consistency: Consistency::default() };
    engine
      .check_bulk_permissions(request)
      .await
      .unwrap()
      .into_iter()
      .filter(CheckBulkPair::is_held)
      .map(|p| p.request.permission)
      .collect()
  }

  #[tokio::test]
  async fn tokens_advance_per_write() {
    let engine = MemoryEngine::new();
    let first = write(&engine, &[with_owner_relationship("a1", Subject::user("u1"))]).await;
    let second = write(&engine, &[with_viewer_relationship("a1", Subject::user("u2"))]).await;
    assert_eq!(first.as_str(), "r1");
    assert_eq!(second.as_str(), "r2");
  }

  #[tokio::test]
  async fn relation_semantics() {
    let engine = MemoryEngine::new();
    let platform = Subject::platform("redhat");
    write(&engine, &[
      with_owner_relationship("a1", Subject::user("owner")),
      with_editor_relationship("a1", Subject::user("editor")),
      with_viewer_relationship("a1", Subject::user("viewer")),
      with_member_relationship(Subject::user("member"), Subject::organization("o1")),
      with_organization_relationship("a1", Subject::organization("o1")),
      with_parent_relationship("a1", platform.clone()),
      with_platform_relationship(
        platform,
        BTreeMap::from([
          (PlatformRole::Admin, vec![Subject::user("admin")]),
          (PlatformRole::Editor, vec![Subject::user("p-editor")]),
          (PlatformRole::Viewer, vec![Subject::user("p-viewer")]),
        ]),
      ),
    ])
    .await;

    use Permission::*;
    assert_eq!(held(&engine, "a1", "owner").await, vec![Read, Edit, Share, Delete]);
    assert_eq!(held(&engine, "a1", "editor").await, vec![Read, Edit]);
    assert_eq!(held(&engine, "a1", "viewer").await, vec![Read]);
    assert_eq!(held(&engine, "a1", "member").await, vec![Read, Edit]);
    assert_eq!(held(&engine, "a1", "admin").await, vec![Read, Edit, Share, Delete]);
    assert_eq!(held(&engine, "a1", "p-editor").await, vec![Read, Edit]);
    assert_eq!(held(&engine, "a1", "p-viewer").await, vec![Read]);
    assert!(held(&engine, "a1", "stranger").await.is_empty());
  }

  #[tokio::test]
  async fn delete_by_filter() {
    let engine = MemoryEngine::new();
    write(&engine, &[
      with_owner_relationship("a1", Subject::user("u1")),
      with_owner_relationship("a2", Subject::user("u1")),
      with_member_relationship(Subject::user("u1"), Subject::organization("o1")),
    ])
    .await;

    engine
      .delete_relationships(RelationshipFilter {
        resource_type:        ObjectType::Assessment,
        optional_resource_id: Some("a1".into()),
      })
      .await
      .unwrap();
    assert_eq!(engine.relationship_count(), 2);

    engine
      .delete_relationships(RelationshipFilter {
        resource_type:        ObjectType::Assessment,
        optional_resource_id: None,
      })
      .await
      .unwrap();
    assert_eq!(engine.relationship_count(), 1);
  }

  #[tokio::test]
  async fn future_tokens_are_rejected() {
    let engine = MemoryEngine::new();
    let request = CheckBulkPermissionsRequest {
      items:       vec![],
      consistency: Consistency::AtLeastAsFresh(ConsistencyToken::new("r5")),
    };
    let err = engine.check_bulk_permissions(request).await.unwrap_err();
    assert!(matches!(err, MemoryEngineError::InvalidToken(_)));
  }

  #[tokio::test]
  async fn failing_checks_are_reported_per_item() {
    let engine = MemoryEngine::new();
    write(&engine, &[with_owner_relationship("a1", Subject::user("u1"))]).await;
    engine.fail_checks_for("a1");

    let request = CheckBulkPermissionsRequest {
      items:       vec![CheckItem {
        resource:   ObjectRef::new(ObjectType::Assessment, "a1"),
        permission: Permission::Read,
        subject:    SubjectRef::user("u1"),
      }],
      consistency: Consistency::default(),
    };
    let pairs = engine.check_bulk_permissions(request).await.unwrap();
    assert!(matches!(pairs[0].outcome, CheckOutcome::Failed(_)));
  }
}
