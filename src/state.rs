//! Entity-state lookup consumed by the dispatcher.
//!
//! The dispatcher binds every call to an [`EntityStateHandle`] obtained from
//! an [`EntityStateLookup`]. Real deployments plug in their own store; the
//! in-memory [`EntityStateStore`] keeps one partition per
//! `(EntityType, StateType)` and has no persistence.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::action::{EntityType, StateType};
use crate::error::{DispatchError, Result};

/// Resolves the state partition an action is scoped to.
pub trait EntityStateLookup: Send + Sync + 'static {
    /// Look up the partition for an entity type and optional state type.
    ///
    /// Implementations must tolerate `state_type == None`.
    fn entity_state(
        &self,
        entity_type: EntityType,
        state_type: Option<StateType>,
    ) -> Result<EntityStateHandle>;
}

impl<T: EntityStateLookup> EntityStateLookup for Arc<T> {
    fn entity_state(
        &self,
        entity_type: EntityType,
        state_type: Option<StateType>,
    ) -> Result<EntityStateHandle> {
        (**self).entity_state(entity_type, state_type)
    }
}

struct Partition {
    entity_type: EntityType,
    state_type: StateType,
    entities: RwLock<HashMap<String, Value>>,
}

/// Shared handle to one entity-state partition.
///
/// Cheap to clone; clones refer to the same partition.
#[derive(Clone)]
pub struct EntityStateHandle {
    inner: Arc<Partition>,
}

impl EntityStateHandle {
    /// Create an empty, standalone partition.
    pub fn new(entity_type: EntityType, state_type: StateType) -> Self {
        Self {
            inner: Arc::new(Partition {
                entity_type,
                state_type,
                entities: RwLock::new(HashMap::new()),
            }),
        }
    }

    #[inline]
    pub fn entity_type(&self) -> EntityType {
        self.inner.entity_type
    }

    #[inline]
    pub fn state_type(&self) -> StateType {
        self.inner.state_type
    }

    /// Whether both handles point at the same partition.
    pub fn same_partition(&self, other: &EntityStateHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get an entity by id.
    pub async fn get(&self, id: &str) -> Option<Value> {
        self.inner.entities.read().await.get(id).cloned()
    }

    /// Insert or replace an entity, returning the previous value.
    pub async fn put(&self, id: impl Into<String>, value: Value) -> Option<Value> {
        self.inner.entities.write().await.insert(id.into(), value)
    }

    /// Remove an entity, returning it if present.
    pub async fn remove(&self, id: &str) -> Option<Value> {
        self.inner.entities.write().await.remove(id)
    }

    /// Ids currently stored, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.entities.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.inner.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entities.read().await.is_empty()
    }
}

impl std::fmt::Debug for EntityStateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStateHandle")
            .field("entity_type", &self.inner.entity_type)
            .field("state_type", &self.inner.state_type)
            .finish_non_exhaustive()
    }
}

/// In-memory entity-state store with a partition per entity/state pair.
pub struct EntityStateStore {
    partitions: HashMap<(EntityType, StateType), EntityStateHandle>,
}

impl EntityStateStore {
    /// Create a store with an empty partition for every entity/state pair.
    pub fn new() -> Self {
        let mut partitions = HashMap::new();
        for entity_type in EntityType::ALL {
            for state_type in StateType::ALL {
                partitions.insert(
                    (entity_type, state_type),
                    EntityStateHandle::new(entity_type, state_type),
                );
            }
        }
        Self { partitions }
    }

    /// Create a store that only knows the given pairs.
    pub fn with_partitions(pairs: impl IntoIterator<Item = (EntityType, StateType)>) -> Self {
        let partitions = pairs
            .into_iter()
            .map(|key| (key, EntityStateHandle::new(key.0, key.1)))
            .collect();
        Self { partitions }
    }
}

impl Default for EntityStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStateLookup for EntityStateStore {
    /// Absent state types resolve to [`StateType::Persistent`].
    fn entity_state(
        &self,
        entity_type: EntityType,
        state_type: Option<StateType>,
    ) -> Result<EntityStateHandle> {
        let resolved = state_type.unwrap_or(StateType::Persistent);
        self.partitions
            .get(&(entity_type, resolved))
            .cloned()
            .ok_or(DispatchError::StateUnavailable {
                entity_type,
                state_type,
            })
    }
}
