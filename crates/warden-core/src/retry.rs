//! Transport retry layer for graph-engine calls.
//!
//! Only the transient "unavailable" condition is retried, a fixed number of
//! times, with bounded exponential backoff. Everything else is returned to the
//! caller on the first failure.

use std::{future::Future, time::Duration};

use serde::Deserialize;

use crate::{
  engine::{
    CheckBulkPair, CheckBulkPermissionsRequest, GraphEngine, LookupResourcesRequest,
    RelationshipFilter, RelationshipUpdate,
  },
  model::ConsistencyToken,
};

/// Retry settings, deserialisable from configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts:       u32,
  pub initial_backoff_ms: u64,
  pub max_backoff_ms:     u64,
  pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts:       3,
      initial_backoff_ms: 100,
      max_backoff_ms:     1_000,
      backoff_multiplier: 1.0,
    }
  }
}

impl RetryPolicy {
  /// Delay before retry number `retry` (1-based).
  pub fn backoff(&self, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1) as i32;
    let millis = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
    Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
  }
}

/// Wraps an engine and re-attempts calls that fail as unavailable.
#[derive(Debug, Clone)]
pub struct RetryingEngine<E> {
  inner:  E,
  policy: RetryPolicy,
}

impl<E: GraphEngine> RetryingEngine<E> {
  pub fn new(inner: E, policy: RetryPolicy) -> Self { Self { inner, policy } }

  pub fn inner(&self) -> &E { &self.inner }

  async fn run<T, F, Fut>(&self, method: &'static str, mut call: F) -> Result<T, E::Error>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E::Error>>,
  {
    let mut attempt = 1;
    loop {
      match call().await {
        Err(e) if E::is_unavailable(&e) && attempt < self.policy.max_attempts => {
          let delay = self.policy.backoff(attempt);
          tracing::debug!(method, attempt, ?delay, error = %e, "engine unavailable, retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        result => return result,
      }
    }
  }
}

impl<E: GraphEngine> GraphEngine for RetryingEngine<E> {
  type Error = E::Error;

  async fn write_relationships(
    &self,
    updates: Vec<RelationshipUpdate>,
  ) -> Result<ConsistencyToken, Self::Error> {
    self
      .run("write_relationships", || self.inner.write_relationships(updates.clone()))
      .await
  }

  async fn delete_relationships(
    &self,
    filter: RelationshipFilter,
  ) -> Result<ConsistencyToken, Self::Error> {
    self
      .run("delete_relationships", || self.inner.delete_relationships(filter.clone()))
      .await
  }

  async fn lookup_resources(
    &self,
    request: LookupResourcesRequest,
  ) -> Result<Vec<String>, Self::Error> {
    self
      .run("lookup_resources", || self.inner.lookup_resources(request.clone()))
      .await
  }

  async fn check_bulk_permissions(
    &self,
    request: CheckBulkPermissionsRequest,
  ) -> Result<Vec<CheckBulkPair>, Self::Error> {
    self
      .run("check_bulk_permissions", || self.inner.check_bulk_permissions(request.clone()))
      .await
  }

  fn is_unavailable(error: &Self::Error) -> bool { E::is_unavailable(error) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    builder::with_owner_relationship,
    memory::{MemoryEngine, MemoryEngineError},
    model::Subject,
  };

  fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_backoff_ms: 1, max_backoff_ms: 2, ..Default::default() }
  }

  fn owner_update() -> Vec<RelationshipUpdate> {
    let mut updates = Vec::new();
    with_owner_relationship("a1", Subject::user("u1")).apply(&mut updates);
    updates
  }

  #[test]
  fn backoff_is_bounded() {
    let policy = RetryPolicy {
      max_attempts:       5,
      initial_backoff_ms: 100,
      max_backoff_ms:     300,
      backoff_multiplier: 2.0,
    };
    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(300));
    assert_eq!(policy.backoff(9), Duration::from_millis(300));
  }

  #[tokio::test]
  async fn retries_unavailable_until_success() {
    let engine = MemoryEngine::new();
    engine.fail_next(2);
    let retrying = RetryingEngine::new(engine, fast_policy(3));

    let token = retrying.write_relationships(owner_update()).await.unwrap();
    assert_eq!(token, retrying.inner().current_token());
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let engine = MemoryEngine::new();
    engine.fail_next(3);
    let retrying = RetryingEngine::new(engine, fast_policy(3));

    let err = retrying.write_relationships(owner_update()).await.unwrap_err();
    assert!(matches!(err, MemoryEngineError::Unavailable));
    assert_eq!(retrying.inner().relationship_count(), 0);
  }

  #[tokio::test]
  async fn other_errors_are_not_retried() {
    let engine = MemoryEngine::new();
    let retrying = RetryingEngine::new(engine, fast_policy(3));

    let request = LookupResourcesRequest {
      resource_type: crate::model::ObjectType::Assessment,
      permission:    crate::model::Permission::Read,
      subject:       crate::engine::SubjectRef::user("u1"),
      consistency:   crate::engine::Consistency::AtLeastAsFresh(ConsistencyToken::new("r99")),
    };
    let err = retrying.lookup_resources(request).await.unwrap_err();
    assert!(matches!(err, MemoryEngineError::InvalidToken(_)));
  }
}
