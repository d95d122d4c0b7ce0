//! Relationship builder functions.
//!
//! Each `with_*` / `without_*` function binds a resource and a subject into a
//! [`RelationshipBuilder`]. Applying a builder appends the engine update it
//! stands for to a batch and returns the locally-recorded form of the edge
//! together with its [`RelationshipOp`] tag.
//!
//! A builder whose subject has the wrong kind for its relation is a no-op: it
//! appends nothing and reports [`RelationshipOp::Ignore`]. Heterogeneous lists
//! of builders can therefore be written in one batch without the caller
//! checking subject kinds first.
//!
//! ```
//! use warden_core::{builder::*, model::Subject};
//!
//! let alice = Subject::user("alice");
//! let acme = Subject::organization("acme");
//! let batch = [
//!   with_member_relationship(alice.clone(), acme.clone()),
//!   with_owner_relationship("a1", alice),
//!   with_organization_relationship("a1", acme),
//! ];
//! let mut updates = Vec::new();
//! for builder in &batch {
//!   builder.apply(&mut updates);
//! }
//! assert_eq!(updates.len(), 3);
//! ```

use std::collections::BTreeMap;

use crate::{
  engine::{ObjectRef, RelationshipUpdate, SubjectRef},
  model::{
    ObjectType, PlatformRole, RelationKind, Relationship, RelationshipOp, Subject,
    SubjectKind,
  },
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// Whether a builder adds or removes its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
  Grant,
  Revoke,
}

impl Direction {
  fn update(self, resource: ObjectRef, relation: &str, subject: SubjectRef) -> RelationshipUpdate {
    match self {
      Self::Grant => RelationshipUpdate::touch(resource, relation, subject),
      Self::Revoke => RelationshipUpdate::delete(resource, relation, subject),
    }
  }
}

/// Relations shown in an assessment's sharing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssessmentRelation {
  Owner,
  Viewer,
  Editor,
  Org,
}

impl AssessmentRelation {
  pub fn kind(self) -> RelationKind {
    match self {
      Self::Owner => RelationKind::Owner,
      Self::Viewer => RelationKind::Viewer,
      Self::Editor => RelationKind::Editor,
      Self::Org => RelationKind::Org,
    }
  }

  /// The only subject kind the relation accepts.
  pub fn subject_kind(self) -> SubjectKind {
    match self {
      Self::Org => SubjectKind::Organization,
      Self::Owner | Self::Viewer | Self::Editor => SubjectKind::User,
    }
  }

  pub fn from_kind(kind: RelationKind) -> Option<Self> {
    match kind {
      RelationKind::Owner => Some(Self::Owner),
      RelationKind::Viewer => Some(Self::Viewer),
      RelationKind::Editor => Some(Self::Editor),
      RelationKind::Org => Some(Self::Org),
      RelationKind::Parent | RelationKind::Member => None,
    }
  }
}

/// A relationship write bound to its resource and subject(s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipBuilder {
  Assessment {
    assessment_id: String,
    relation:      AssessmentRelation,
    subject:       Subject,
    direction:     Direction,
  },
  Parent {
    assessment_id: String,
    platform:      Subject,
  },
  Member {
    user:      Subject,
    org:       Subject,
    direction: Direction,
  },
  PlatformRoles {
    platform: Subject,
    roles:    BTreeMap<PlatformRole, Vec<Subject>>,
  },
}

/// What applying a builder produced, besides engine updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Built {
  pub op:           RelationshipOp,
  pub relationship: Option<Relationship>,
}

impl Built {
  /// The no-op result.
  pub fn ignored() -> Self { Self { op: RelationshipOp::Ignore, relationship: None } }

  fn new(op: RelationshipOp, relationship: Relationship) -> Self {
    Self { op, relationship: Some(relationship) }
  }
}

// ─── Apply ───────────────────────────────────────────────────────────────────

impl RelationshipBuilder {
  /// Append this builder's engine updates to `updates`.
  pub fn apply(&self, updates: &mut Vec<RelationshipUpdate>) -> Built {
    match self {
      Self::Assessment { assessment_id, relation, subject, direction } => {
        if subject.kind() != relation.subject_kind() {
          return Built::ignored();
        }
        let kind = relation.kind();
        let mut subject_ref = SubjectRef::from(subject);
        if *relation == AssessmentRelation::Org {
          // Organizations are granted through their member set.
          subject_ref.optional_relation = Some(RelationKind::Member.to_string());
        }
        updates.push(direction.update(
          ObjectRef::new(ObjectType::Assessment, assessment_id.as_str()),
          kind.as_ref(),
          subject_ref,
        ));
        let op = match direction {
          Direction::Grant => RelationshipOp::Update,
          Direction::Revoke => RelationshipOp::Delete,
        };
        Built::new(
          op,
          Relationship::new(ObjectType::Assessment, assessment_id, kind, subject.clone()),
        )
      }

      Self::Parent { assessment_id, platform } => {
        if platform.kind() != SubjectKind::Platform {
          return Built::ignored();
        }
        updates.push(RelationshipUpdate::touch(
          ObjectRef::new(ObjectType::Assessment, assessment_id.as_str()),
          RelationKind::Parent.as_ref(),
          SubjectRef::from(platform),
        ));
        // Platform cascades are not part of any assessment's sharing view.
        Built::new(
          RelationshipOp::Ignore,
          Relationship::new(
            ObjectType::Assessment,
            assessment_id,
            RelationKind::Parent,
            platform.clone(),
          ),
        )
      }

      Self::Member { user, org, direction } => {
        if user.kind() != SubjectKind::User || org.kind() != SubjectKind::Organization {
          return Built::ignored();
        }
        updates.push(direction.update(
          ObjectRef::new(ObjectType::Organization, org.generated_id()),
          RelationKind::Member.as_ref(),
          SubjectRef::from(user),
        ));
        let op = match direction {
          Direction::Grant => RelationshipOp::Touch,
          Direction::Revoke => RelationshipOp::Delete,
        };
        Built::new(
          op,
          Relationship::new(
            ObjectType::Organization,
            org.generated_id(),
            RelationKind::Member,
            user.clone(),
          ),
        )
      }

      Self::PlatformRoles { platform, roles } => {
        if platform.kind() != SubjectKind::Platform {
          return Built::ignored();
        }
        let resource = ObjectRef::new(ObjectType::Platform, platform.generated_id());
        for (role, subjects) in roles {
          for subject in subjects.iter().filter(|s| s.kind() == SubjectKind::User) {
            updates.push(RelationshipUpdate::touch(
              resource.clone(),
              role.as_ref(),
              SubjectRef::from(subject),
            ));
          }
        }
        Built::ignored()
      }
    }
  }
}

// ─── Grants ──────────────────────────────────────────────────────────────────

fn assessment(
  assessment_id: impl Into<String>,
  relation: AssessmentRelation,
  subject: Subject,
  direction: Direction,
) -> RelationshipBuilder {
  RelationshipBuilder::Assessment {
    assessment_id: assessment_id.into(),
    relation,
    subject,
    direction,
  }
}

/// Owner: read, edit, share and delete. Users only.
pub fn with_owner_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Owner, subject, Direction::Grant)
}

/// Viewer: read. Users only.
pub fn with_viewer_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Viewer, subject, Direction::Grant)
}

/// Editor: read and edit. Users only.
pub fn with_editor_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Editor, subject, Direction::Grant)
}

/// Org: read and edit for every member of the organization.
pub fn with_organization_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Org, subject, Direction::Grant)
}

/// Parent: cascades the platform's roles onto the assessment.
pub fn with_parent_relationship(
  assessment_id: impl Into<String>,
  platform: Subject,
) -> RelationshipBuilder {
  RelationshipBuilder::Parent { assessment_id: assessment_id.into(), platform }
}

/// Organization membership.
pub fn with_member_relationship(user: Subject, org: Subject) -> RelationshipBuilder {
  RelationshipBuilder::Member { user, org, direction: Direction::Grant }
}

/// Platform roles, keyed by role. Non-user subjects are skipped.
pub fn with_platform_relationship(
  platform: Subject,
  roles: BTreeMap<PlatformRole, Vec<Subject>>,
) -> RelationshipBuilder {
  RelationshipBuilder::PlatformRoles { platform, roles }
}

// ─── Revocations ─────────────────────────────────────────────────────────────

pub fn without_owner_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Owner, subject, Direction::Revoke)
}

pub fn without_viewer_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Viewer, subject, Direction::Revoke)
}

pub fn without_editor_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Editor, subject, Direction::Revoke)
}

pub fn without_organization_relationship(
  assessment_id: impl Into<String>,
  subject: Subject,
) -> RelationshipBuilder {
  assessment(assessment_id, AssessmentRelation::Org, subject, Direction::Revoke)
}

pub fn without_member_relationship(user: Subject, org: Subject) -> RelationshipBuilder {
  RelationshipBuilder::Member { user, org, direction: Direction::Revoke }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::UpdateOperation;

  fn apply(builder: RelationshipBuilder) -> (Vec<RelationshipUpdate>, Built) {
    let mut updates = Vec::new();
    let built = builder.apply(&mut updates);
    (updates, built)
  }

  #[test]
  fn owner_grant_is_tracked() {
    let (updates, built) = apply(with_owner_relationship("a1", Subject::user("u1")));

    assert_eq!(updates.len(), 1);
    let update = &updates[0];
    assert_eq!(update.operation, UpdateOperation::Touch);
    assert_eq!(update.resource, ObjectRef::new(ObjectType::Assessment, "a1"));
    assert!(update.is_relation(RelationKind::Owner));
    assert_eq!(update.subject, SubjectRef::user("u1"));

    assert_eq!(built.op, RelationshipOp::Update);
    let rel = built.relationship.unwrap();
    assert_eq!(rel.assessment_id.as_deref(), Some("a1"));
    assert_eq!(rel.kind, RelationKind::Owner);
    assert_eq!(rel.subject_id(), "u1");
    assert_eq!(rel.subject_type(), ObjectType::User);
  }

  #[test]
  fn revocation_deletes_the_same_edge() {
    let (_, grant) = apply(with_viewer_relationship("a1", Subject::user("u1")));
    let (updates, revoke) = apply(without_viewer_relationship("a1", Subject::user("u1")));

    assert_eq!(updates[0].operation, UpdateOperation::Delete);
    assert_eq!(revoke.op, RelationshipOp::Delete);
    assert_eq!(grant.relationship.unwrap().id, revoke.relationship.unwrap().id);
  }

  #[test]
  fn mismatched_subject_kind_is_a_no_op() {
    let cases = [
      with_owner_relationship("a1", Subject::organization("o1")),
      with_editor_relationship("a1", Subject::platform("p1")),
      with_organization_relationship("a1", Subject::user("u1")),
      with_parent_relationship("a1", Subject::user("u1")),
      with_member_relationship(Subject::organization("o1"), Subject::user("u1")),
      without_owner_relationship("a1", Subject::organization("o1")),
      with_platform_relationship(Subject::user("u1"), BTreeMap::new()),
    ];
    for builder in cases {
      let (updates, built) = apply(builder.clone());
      assert!(updates.is_empty(), "{builder:?} appended an update");
      assert_eq!(built, Built::ignored());
    }
  }

  #[test]
  fn organization_grant_targets_the_organization() {
    let org = Subject::organization("o1");
    let (updates, built) = apply(with_organization_relationship("a2", org.clone()));

    assert_eq!(
      updates[0].subject.object,
      ObjectRef::new(ObjectType::Organization, org.generated_id())
    );
    assert_eq!(updates[0].subject.optional_relation.as_deref(), Some("member"));
    assert_eq!(built.op, RelationshipOp::Update);
    assert_eq!(built.relationship.unwrap().subject_type(), ObjectType::Organization);
  }

  #[test]
  fn member_is_touched_not_tracked() {
    let org = Subject::organization("o1");
    let (updates, built) = apply(with_member_relationship(Subject::user("u2"), org.clone()));

    assert_eq!(updates[0].resource, ObjectRef::new(ObjectType::Organization, org.generated_id()));
    assert!(updates[0].is_relation(RelationKind::Member));
    assert_eq!(built.op, RelationshipOp::Touch);
    assert_eq!(built.relationship.unwrap().assessment_id, None);

    let (_, revoke) = apply(without_member_relationship(Subject::user("u2"), org));
    assert_eq!(revoke.op, RelationshipOp::Delete);
  }

  #[test]
  fn parent_is_sent_but_ignored_locally() {
    let (updates, built) = apply(with_parent_relationship("a1", Subject::platform("redhat")));
    assert_eq!(updates.len(), 1);
    assert_eq!(built.op, RelationshipOp::Ignore);
    assert!(built.relationship.is_some());
  }

  #[test]
  fn platform_roles_skip_non_users() {
    let roles = BTreeMap::from([
      (PlatformRole::Admin, vec![Subject::user("root"), Subject::organization("o1")]),
      (PlatformRole::Viewer, vec![Subject::user("v1"), Subject::user("v2")]),
    ]);
    let (updates, built) = apply(with_platform_relationship(Subject::platform("redhat"), roles));

    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|u| u.subject.is_user()));
    assert!(updates.iter().all(|u| u.resource.object_type == ObjectType::Platform));
    assert_eq!(built, Built::ignored());
  }
}
