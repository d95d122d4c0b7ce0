//! Authorization use cases for the assessment service.
//!
//! Each method runs in a transaction of its own: begin, one or more store
//! operations, commit. An early return drops the session, which rolls back.

use std::{
  collections::{BTreeMap, HashMap},
  sync::Arc,
};

use crate::{
  builder::{
    AssessmentRelation, Direction, RelationshipBuilder, with_member_relationship,
    with_owner_relationship, with_parent_relationship, with_platform_relationship,
  },
  model::{Permission, PlatformRole, Relationship, Resource, ResourceType, Subject},
  store::{AuthzStore, PermissionMap},
};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub username:     String,
  pub organization: String,
}

impl User {
  pub fn new(username: impl Into<String>, organization: impl Into<String>) -> Self {
    Self { username: username.into(), organization: organization.into() }
  }

  pub fn subject(&self) -> Subject { Subject::user(&self.username) }
}

/// One sharing entry of an assessment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
  pub assessment_id: String,
  pub relation:      AssessmentRelation,
  pub subject:       Subject,
}

impl Grant {
  fn builder(&self, direction: Direction) -> RelationshipBuilder {
    RelationshipBuilder::Assessment {
      assessment_id: self.assessment_id.clone(),
      relation: self.relation,
      subject: self.subject.clone(),
      direction,
    }
  }
}

pub struct AuthzService<S> {
  store:    Arc<S>,
  platform: String,
}

impl<S> Clone for AuthzService<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), platform: self.platform.clone() }
  }
}

impl<S: AuthzStore> AuthzService<S> {
  /// `platform` is the platform every assessment is parented to.
  pub fn new(store: Arc<S>, platform: impl Into<String>) -> Self {
    Self { store, platform: platform.into() }
  }

  pub fn store(&self) -> &S { &self.store }

  async fn write(&self, relationships: &[RelationshipBuilder]) -> Result<(), S::Error> {
    let mut session = self.store.begin().await?;
    self.store.write_relationships(&mut session, relationships).await?;
    self.store.commit(session).await
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Record the user's organization membership.
  pub async fn create_user(&self, user: &User) -> Result<(), S::Error> {
    self
      .write(&[with_member_relationship(
        user.subject(),
        Subject::organization(&user.organization),
      )])
      .await
  }

  /// Make `user` the owner of a new assessment and attach it to the
  /// platform.
  pub async fn create_assessment_relationships(
    &self,
    assessment_id: &str,
    user: &User,
  ) -> Result<(), S::Error> {
    self
      .write(&[
        with_owner_relationship(assessment_id, user.subject()),
        with_parent_relationship(assessment_id, Subject::platform(&self.platform)),
      ])
      .await
  }

  /// Replace the platform's role assignments. `users` maps a role name
  /// (`admin`, `editor`, `viewer`) to user ids; unknown roles are skipped.
  pub async fn initialize_platform(
    &self,
    users: &HashMap<String, Vec<String>>,
  ) -> Result<(), S::Error> {
    let mut roles: BTreeMap<PlatformRole, Vec<Subject>> = BTreeMap::new();
    for (role, user_ids) in users {
      if user_ids.is_empty() {
        continue;
      }
      let Ok(role) = role.parse::<PlatformRole>() else {
        tracing::debug!(role = %role, "unknown platform role");
        continue;
      };
      roles
        .entry(role)
        .or_default()
        .extend(user_ids.iter().map(Subject::user));
    }

    let mut session = self.store.begin().await?;
    self
      .store
      .delete_relationships(&mut session, &Resource::platform(&self.platform))
      .await?;
    self
      .store
      .write_relationships(&mut session, &[with_platform_relationship(
        Subject::platform(&self.platform),
        roles,
      )])
      .await?;
    self.store.commit(session).await
  }

  pub async fn share(&self, grants: &[Grant]) -> Result<(), S::Error> {
    let builders: Vec<_> = grants.iter().map(|g| g.builder(Direction::Grant)).collect();
    self.write(&builders).await
  }

  pub async fn unshare(&self, grants: &[Grant]) -> Result<(), S::Error> {
    let builders: Vec<_> = grants.iter().map(|g| g.builder(Direction::Revoke)).collect();
    self.write(&builders).await
  }

  /// Forget every relationship of an assessment (used when it is deleted).
  pub async fn delete_all_relationships(&self, assessment_id: &str) -> Result<(), S::Error> {
    let mut session = self.store.begin().await?;
    self
      .store
      .delete_relationships(&mut session, &Resource::assessment(assessment_id))
      .await?;
    self.store.commit(session).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Assessments the user can at least read.
  pub async fn list_assessments(&self, user: &User) -> Result<Vec<String>, S::Error> {
    let mut session = self.store.begin().await?;
    let ids = self
      .store
      .list_resources(&mut session, &user.username, Permission::Read, ResourceType::Assessment)
      .await?;
    self.store.commit(session).await?;
    Ok(ids)
  }

  pub async fn get_bulk_permissions(
    &self,
    assessment_ids: &[String],
    user: &User,
  ) -> Result<PermissionMap, S::Error> {
    let mut session = self.store.begin().await?;
    let permissions = self
      .store
      .get_permissions(&mut session, assessment_ids, &user.username)
      .await?;
    self.store.commit(session).await?;
    Ok(permissions)
  }

  pub async fn get_permissions(
    &self,
    assessment_id: &str,
    user: &User,
  ) -> Result<Vec<Permission>, S::Error> {
    let mut permissions = self
      .get_bulk_permissions(&[assessment_id.to_owned()], user)
      .await?;
    Ok(permissions.remove(assessment_id).unwrap_or_default())
  }

  pub async fn has_permission(
    &self,
    assessment_id: &str,
    user: &User,
    permission: Permission,
  ) -> Result<bool, S::Error> {
    Ok(self.get_permissions(assessment_id, user).await?.contains(&permission))
  }

  pub async fn list_relationships(
    &self,
    assessment_id: &str,
  ) -> Result<Vec<Relationship>, S::Error> {
    let mut session = self.store.begin().await?;
    let relationships = self
      .store
      .list_relationships(&mut session, assessment_id)
      .await?;
    self.store.commit(session).await?;
    Ok(relationships)
  }
}
