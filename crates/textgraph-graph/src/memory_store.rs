//! In-memory graph store
//!
//! Default backend and the one used by tests. Entities are keyed by id with a
//! secondary (label, type) index; edges are keyed by (source, target, type).

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{GraphStore, Insertion};
use textgraph_core::{EntityCandidate, GraphEntity, GraphError, GraphRelationship, Result};

type EdgeKey = (Uuid, Uuid, String);

#[derive(Default)]
struct Graph {
    entities: HashMap<Uuid, GraphEntity>,
    by_key: HashMap<(String, String), Uuid>,
    relationships: HashMap<EdgeKey, GraphRelationship>,
}

/// Graph store held in process memory
#[derive(Default)]
pub struct MemoryGraphStore {
    graph: RwLock<Graph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn find_entity(&self, label: &str, entity_type: &str) -> Result<Option<GraphEntity>> {
        let graph = self.graph.read().await;
        Ok(graph
            .by_key
            .get(&(label.to_string(), entity_type.to_string()))
            .and_then(|id| graph.entities.get(id))
            .cloned())
    }

    async fn resolve_entity(
        &self,
        label: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<GraphEntity>> {
        let graph = self.graph.read().await;
        Ok(graph
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| e.answers_to(label))
            .max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| b.label.cmp(&a.label))
            })
            .cloned())
    }

    async fn put_entity(&self, entity: &GraphEntity) -> Result<()> {
        let mut graph = self.graph.write().await;
        let key = (entity.label.clone(), entity.entity_type.clone());
        if let Some(holder) = graph.by_key.get(&key).filter(|&&id| id != entity.id) {
            return Err(GraphError::Database(format!(
                "entity ({}, {}) is already stored as {holder}",
                entity.label, entity.entity_type
            )));
        }
        if let Some(previous) = graph.entities.insert(entity.id, entity.clone()) {
            graph
                .by_key
                .remove(&(previous.label, previous.entity_type));
        }
        graph.by_key.insert(key, entity.id);
        Ok(())
    }

    async fn upsert_entity(&self, candidate: &EntityCandidate) -> Result<GraphEntity> {
        let mut graph = self.graph.write().await;
        let Graph {
            entities, by_key, ..
        } = &mut *graph;

        let key = (candidate.label.clone(), candidate.entity_type.clone());
        if let Some(existing) = by_key.get(&key).and_then(|id| entities.get_mut(id)) {
            existing.merge(candidate);
            return Ok(existing.clone());
        }

        let created = GraphEntity::from_candidate(candidate);
        by_key.insert(key, created.id);
        entities.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_relationship(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: &str,
    ) -> Result<Option<GraphRelationship>> {
        let graph = self.graph.read().await;
        Ok(graph
            .relationships
            .get(&(source_id, target_id, relation_type.to_string()))
            .cloned())
    }

    async fn create_relationship_if_absent(
        &self,
        relationship: GraphRelationship,
    ) -> Result<Insertion> {
        let mut graph = self.graph.write().await;
        let key = (
            relationship.source_id,
            relationship.target_id,
            relationship.relation_type.clone(),
        );
        if let Some(existing) = graph.relationships.get(&key) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        graph.relationships.insert(key, relationship.clone());
        Ok(Insertion::Created(relationship))
    }

    async fn delete_all_relationships(&self) -> Result<usize> {
        let mut graph = self.graph.write().await;
        let removed = graph.relationships.len();
        graph.relationships.clear();
        Ok(removed)
    }

    async fn delete_all_entities(&self) -> Result<usize> {
        let mut graph = self.graph.write().await;
        let removed = graph.entities.len();
        graph.entities.clear();
        graph.by_key.clear();
        Ok(removed)
    }

    async fn list_entities(&self) -> Result<Vec<GraphEntity>> {
        Ok(self.graph.read().await.entities.values().cloned().collect())
    }

    async fn list_relationships(&self) -> Result<Vec<GraphRelationship>> {
        Ok(self
            .graph
            .read()
            .await
            .relationships
            .values()
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textgraph_core::{EntityCandidate, Properties};

    fn entity(label: &str, entity_type: &str, confidence: f32) -> GraphEntity {
        GraphEntity::from_candidate(&EntityCandidate::new(label, entity_type, confidence))
    }

    #[tokio::test]
    async fn test_find_entity_is_exact() {
        let store = MemoryGraphStore::new();
        store.put_entity(&entity("Apple", "ORGANIZATION", 0.85)).await.unwrap();

        assert!(store.find_entity("Apple", "ORGANIZATION").await.unwrap().is_some());
        assert!(store.find_entity("Apple", "FOOD").await.unwrap().is_none());
        assert!(store.find_entity("apple", "ORGANIZATION").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_prefers_highest_confidence() {
        let store = MemoryGraphStore::new();
        store.put_entity(&entity("Apple", "FOOD", 0.6)).await.unwrap();
        store.put_entity(&entity("Apple", "ORGANIZATION", 0.85)).await.unwrap();

        let any = store.resolve_entity("APPLE", None).await.unwrap().unwrap();
        assert_eq!(any.entity_type, "ORGANIZATION");

        let food = store.resolve_entity("apple", Some("FOOD")).await.unwrap().unwrap();
        assert_eq!(food.entity_type, "FOOD");
    }

    #[tokio::test]
    async fn test_resolve_by_alias() {
        let store = MemoryGraphStore::new();
        let candidate = EntityCandidate::new("Apple", "ORGANIZATION", 0.85).with_alias("Apple Inc");
        store
            .put_entity(&GraphEntity::from_candidate(&candidate))
            .await
            .unwrap();

        let found = store.resolve_entity("apple inc", None).await.unwrap();
        assert_eq!(found.map(|e| e.label), Some("Apple".to_string()));
    }

    #[tokio::test]
    async fn test_put_entity_replaces_by_id() {
        let store = MemoryGraphStore::new();
        let mut apple = entity("Apple", "ORGANIZATION", 0.7);
        store.put_entity(&apple).await.unwrap();

        apple.confidence = 0.9;
        store.put_entity(&apple).await.unwrap();

        let all = store.list_entities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_put_entity_rejects_second_id_for_key() {
        let store = MemoryGraphStore::new();
        store.put_entity(&entity("Apple", "ORGANIZATION", 0.85)).await.unwrap();

        let err = store
            .put_entity(&entity("Apple", "ORGANIZATION", 0.9))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Database(_)));

        let all = store.list_entities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.85);
    }

    #[tokio::test]
    async fn test_upsert_entity_merges_on_key() {
        let store = MemoryGraphStore::new();
        let first = store
            .upsert_entity(&EntityCandidate::new("Apple", "ORGANIZATION", 0.7))
            .await
            .unwrap();
        let second = store
            .upsert_entity(&EntityCandidate::new("Apple", "ORGANIZATION", 0.9).with_alias("Apple Inc"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.confidence, 0.9);
        assert!(second.aliases.contains("Apple Inc"));

        let other_type = store
            .upsert_entity(&EntityCandidate::new("Apple", "FOOD", 0.85))
            .await
            .unwrap();
        assert_ne!(other_type.id, first.id);
        assert_eq!(store.list_entities().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_keep_one_node() {
        let store = std::sync::Arc::new(MemoryGraphStore::new());
        let tasks: Vec<_> = [0.6_f32, 0.9, 0.7, 0.8, 0.6, 0.9, 0.7, 0.8]
            .into_iter()
            .map(|confidence| {
                let store = store.clone();
                tokio::spawn(async move {
                    let candidate = EntityCandidate::new("Apple", "ORGANIZATION", confidence);
                    store.upsert_entity(&candidate).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let all = store.list_entities().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn test_conditional_relationship_create() {
        let store = MemoryGraphStore::new();
        let a = entity("Apple", "ORGANIZATION", 0.85);
        let b = entity("Steve Jobs", "PERSON", 0.7);

        let first = GraphRelationship::new(&a, &b, "FOUNDED_BY", Properties::new(), 0.9);
        let second = GraphRelationship::new(&a, &b, "FOUNDED_BY", Properties::new(), 0.5);

        let created = store.create_relationship_if_absent(first.clone()).await.unwrap();
        assert_eq!(created, Insertion::Created(first.clone()));

        let existing = store.create_relationship_if_absent(second).await.unwrap();
        assert_eq!(existing, Insertion::Existing(first.clone()));

        let found = store.find_relationship(a.id, b.id, "FOUNDED_BY").await.unwrap();
        assert_eq!(found, Some(first));
        assert!(store.find_relationship(b.id, a.id, "FOUNDED_BY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = MemoryGraphStore::new();
        let a = entity("Apple", "ORGANIZATION", 0.85);
        let b = entity("Tesla", "ORGANIZATION", 0.85);
        store.put_entity(&a).await.unwrap();
        store.put_entity(&b).await.unwrap();
        store
            .create_relationship_if_absent(GraphRelationship::new(
                &a,
                &b,
                "KNOWS",
                Properties::new(),
                0.75,
            ))
            .await
            .unwrap();

        assert_eq!(store.delete_all_relationships().await.unwrap(), 1);
        assert_eq!(store.delete_all_entities().await.unwrap(), 2);
        assert_eq!(store.delete_all_entities().await.unwrap(), 0);
        assert!(store.list_entities().await.unwrap().is_empty());
        assert!(store.find_entity("Apple", "ORGANIZATION").await.unwrap().is_none());
    }
}
