//! [`SqliteAuthzStore`]: the SQLite implementation of [`AuthzStore`].

use std::{collections::HashSet, path::Path, sync::Arc};

use warden_core::{
  builder::{Built, RelationshipBuilder},
  engine::{
    CheckBulkPermissionsRequest, CheckItem, Consistency, GraphEngine, LookupResourcesRequest,
    ObjectRef, RelationshipFilter, SubjectRef,
  },
  model::{ObjectType, Permission, Relationship, RelationshipOp, Resource, ResourceType},
  store::{AuthzStore, PermissionMap},
};

use crate::{Error, Projection, Result, Session};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An authorization store: a graph engine for decisions plus a SQLite
/// projection for the relationship views and the consistency token.
///
/// Cloning is cheap; clones share the projection, its lock registry and the
/// engine.
pub struct SqliteAuthzStore<E> {
  projection: Arc<Projection>,
  engine:     Arc<E>,
}

impl<E> Clone for SqliteAuthzStore<E> {
  fn clone(&self) -> Self {
    Self { projection: Arc::clone(&self.projection), engine: Arc::clone(&self.engine) }
  }
}

impl<E: GraphEngine> SqliteAuthzStore<E> {
  pub fn new(projection: Projection, engine: E) -> Self {
    Self { projection: Arc::new(projection), engine: Arc::new(engine) }
  }

  /// Open (or create) a store whose projection lives at `path`.
  pub async fn open(path: impl AsRef<Path>, engine: E) -> Result<Self> {
    Ok(Self::new(Projection::open(path).await?, engine))
  }

  /// Open a store over a private in-memory projection, useful for testing.
  pub async fn open_in_memory(engine: E) -> Result<Self> {
    Ok(Self::new(Projection::open_in_memory().await?, engine))
  }

  pub fn projection(&self) -> &Projection { &self.projection }

  pub fn engine(&self) -> &E { &self.engine }

  /// Mirror the builders' tracked edges into the projection.
  async fn persist(&self, session: &mut Session, built: Vec<Built>) -> Result<()> {
    for Built { op, relationship } in built {
      let Some(relationship) = relationship else { continue };
      match op {
        RelationshipOp::Update => {
          self.projection.upsert_relationship(session, &relationship).await?;
        }
        RelationshipOp::Delete => {
          self.projection.delete_relationship(session, &relationship.id).await?;
        }
        RelationshipOp::Touch | RelationshipOp::Ignore => {}
      }
    }
    Ok(())
  }
}

/// Bulk-check items for every (assessment, permission) pair, in the order the
/// response is expected to follow. Repeated ids are checked once.
fn check_items(assessment_ids: &[String], user_id: &str) -> Vec<CheckItem> {
  let subject = SubjectRef::user(user_id);
  let mut seen = HashSet::new();
  assessment_ids
    .iter()
    .filter(|id| seen.insert(*id))
    .flat_map(|id| {
      let subject = subject.clone();
      Permission::ALL.into_iter().map(move |permission| CheckItem {
        resource: ObjectRef::new(ObjectType::Assessment, id.clone()),
        permission,
        subject: subject.clone(),
      })
    })
    .collect()
}

// ─── AuthzStore impl ─────────────────────────────────────────────────────────

impl<E: GraphEngine> AuthzStore for SqliteAuthzStore<E> {
  type Error = Error;
  type Session = Session;

  async fn begin(&self) -> Result<Session> { self.projection.begin().await }

  async fn commit(&self, mut session: Session) -> Result<()> { session.commit().await }

  // ── Writes ────────────────────────────────────────────────────────────

  async fn write_relationships<'a>(
    &'a self,
    session: &'a mut Session,
    relationships: &'a [RelationshipBuilder],
  ) -> Result<()> {
    if relationships.is_empty() {
      return Ok(());
    }

    let tokens = self.projection.tokens();
    tokens.acquire_exclusive_lock(session).await?;

    let mut updates = Vec::with_capacity(relationships.len());
    let built: Vec<Built> = relationships.iter().map(|b| b.apply(&mut updates)).collect();
    let update_count = updates.len();

    let token = self.engine.write_relationships(updates).await.map_err(|e| {
      tracing::error!(error = %e, "engine rejected relationship write");
      Error::engine(e)
    })?;
    tracing::debug!(updates = update_count, token = %token, "relationships written to engine");

    // The engine has already applied the batch; a failure here leaves the
    // projection behind it and must reach the caller.
    if let Err(e) = self.persist(session, built).await {
      tracing::error!(error = %e, token = %token, "failed to mirror relationships locally");
      return Err(e);
    }

    tokens.write(session, &token).await
  }

  async fn delete_relationships<'a>(
    &'a self,
    session: &'a mut Session,
    resource: &'a Resource,
  ) -> Result<()> {
    let tokens = self.projection.tokens();
    tokens.acquire_exclusive_lock(session).await?;

    let filter = RelationshipFilter {
      resource_type:        resource.resource_type().object_type(),
      optional_resource_id: (!resource.is_all()).then(|| resource.generated_id().to_owned()),
    };
    let token = self.engine.delete_relationships(filter).await.map_err(|e| {
      tracing::error!(
        error = %e,
        resource_type = %resource.resource_type(),
        "engine rejected relationship delete",
      );
      Error::engine(e)
    })?;
    tracing::debug!(
      resource_type = %resource.resource_type(),
      resource_id = resource.id(),
      token = %token,
      "relationships deleted from engine",
    );

    if resource.resource_type() == ResourceType::Assessment {
      let assessment_id = (!resource.is_all()).then(|| resource.id());
      match self.projection.delete_assessment_relationships(session, assessment_id).await {
        Ok(n) => tracing::debug!(rows = n, "local assessment relationships removed"),
        Err(e) => tracing::warn!(
          error = %e,
          assessment_id = resource.id(),
          "failed to remove local assessment relationships",
        ),
      }
    }

    tokens.write(session, &token).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  async fn list_resources<'a>(
    &'a self,
    session: &'a mut Session,
    user_id: &'a str,
    permission: Permission,
    resource_type: ResourceType,
  ) -> Result<Vec<String>> {
    let tokens = self.projection.tokens();
    tokens.acquire_shared_lock(session).await?;
    let token = tokens.read(session).await?;

    let request = LookupResourcesRequest {
      resource_type: resource_type.object_type(),
      permission,
      subject: SubjectRef::user(user_id),
      consistency: Consistency::from_token(token),
    };
    self.engine.lookup_resources(request).await.map_err(|e| {
      tracing::error!(error = %e, %permission, %resource_type, "engine lookup failed");
      Error::engine(e)
    })
  }

  async fn get_permissions<'a>(
    &'a self,
    session: &'a mut Session,
    assessment_ids: &'a [String],
    user_id: &'a str,
  ) -> Result<PermissionMap> {
    if assessment_ids.is_empty() {
      return Ok(PermissionMap::new());
    }

    let tokens = self.projection.tokens();
    tokens.acquire_shared_lock(session).await?;
    let token = tokens.read(session).await?;

    let items = check_items(assessment_ids, user_id);
    let request = CheckBulkPermissionsRequest {
      items:       items.clone(),
      consistency: Consistency::from_token(token),
    };
    let pairs = self.engine.check_bulk_permissions(request).await.map_err(|e| {
      tracing::error!(error = %e, "engine bulk check failed");
      Error::engine(e)
    })?;

    if pairs.len() != items.len() {
      return Err(Error::BulkCheckMismatch(format!(
        "expected {} pairs, got {}",
        items.len(),
        pairs.len()
      )));
    }

    let mut permissions = PermissionMap::new();
    for (item, pair) in items.into_iter().zip(pairs) {
      if pair.request != item {
        return Err(Error::BulkCheckMismatch(format!(
          "pair for {}:{} answers {}:{}",
          item.resource.object_id,
          item.permission,
          pair.request.resource.object_id,
          pair.request.permission,
        )));
      }
      if pair.is_held() {
        permissions.entry(item.resource.object_id).or_default().push(item.permission);
      }
    }
    Ok(permissions)
  }

  async fn list_relationships<'a>(
    &'a self,
    session: &'a mut Session,
    assessment_id: &'a str,
  ) -> Result<Vec<Relationship>> {
    self.projection.tokens().acquire_shared_lock(session).await?;
    self.projection.list_relationships(session, assessment_id).await
  }
}
