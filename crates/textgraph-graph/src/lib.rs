//! textgraph Graph - Graph store abstraction
//!
//! Provides the store primitives the reconciler is written against, an
//! in-memory backend and a SurrealDB backend.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use textgraph_core::{EntityCandidate, GraphEntity, GraphRelationship, Result};
use uuid::Uuid;

/// Result of a conditional relationship insert
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// No edge existed; this one was stored
    Created(GraphRelationship),
    /// An edge with the same (source, target, type) was already stored
    Existing(GraphRelationship),
}

/// Trait for graph database operations
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Find an entity by exact (label, type)
    async fn find_entity(&self, label: &str, entity_type: &str) -> Result<Option<GraphEntity>>;

    /// Resolve a label (case-folded, alias-aware) to the best matching entity.
    ///
    /// With no type, any type matches and the highest confidence wins.
    async fn resolve_entity(
        &self,
        label: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<GraphEntity>>;

    /// Insert or replace an entity by id.
    ///
    /// Fails if another id already holds the same (label, type).
    async fn put_entity(&self, entity: &GraphEntity) -> Result<()>;

    /// Merge a candidate into the entity with its exact (label, type), or
    /// create one. Lookup and write are atomic for that single key.
    async fn upsert_entity(&self, candidate: &EntityCandidate) -> Result<GraphEntity>;

    /// Find an edge by (source id, target id, type)
    async fn find_relationship(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: &str,
    ) -> Result<Option<GraphRelationship>>;

    /// Store an edge unless one with the same (source, target, type) exists
    async fn create_relationship_if_absent(
        &self,
        relationship: GraphRelationship,
    ) -> Result<Insertion>;

    /// Delete every relationship, returning how many were removed
    async fn delete_all_relationships(&self) -> Result<usize>;

    /// Delete every entity, returning how many were removed
    async fn delete_all_entities(&self) -> Result<usize>;

    async fn list_entities(&self) -> Result<Vec<GraphEntity>>;

    async fn list_relationships(&self) -> Result<Vec<GraphRelationship>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

pub mod memory_store;
pub mod reconciler;
pub mod surrealdb_store;

pub use memory_store::MemoryGraphStore;
pub use reconciler::{ClearReport, GraphReconciler, RelationshipOutcome, RelationshipRequest};
pub use surrealdb_store::SurrealDbStore;
