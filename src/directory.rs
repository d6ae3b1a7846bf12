//! Department directory boundary. The engine only needs to know which of
//! the decree targets exist and are active; everything else about
//! departments lives elsewhere.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

#[async_trait]
pub trait DepartmentDirectory: Send + Sync {
    /// Subset of `ids` that exist and are active.
    async fn active(&self, ids: &[Uuid]) -> Result<BTreeSet<Uuid>>;
}

/// Fixed in-memory directory for tests and single-process wiring.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    active: BTreeSet<Uuid>,
}

impl StaticDirectory {
    pub fn new<I: IntoIterator<Item = Uuid>>(active: I) -> Self {
        Self {
            active: active.into_iter().collect(),
        }
    }
}

#[async_trait]
impl DepartmentDirectory for StaticDirectory {
    async fn active(&self, ids: &[Uuid]) -> Result<BTreeSet<Uuid>> {
        Ok(ids
            .iter()
            .filter(|id| self.active.contains(id))
            .copied()
            .collect())
    }
}
