//! Graph reconciliation
//!
//! Merges candidates into the store: idempotent entity upserts keyed on
//! (label, type), duplicate-safe relationship creation, clear and snapshot.

use std::sync::Arc;

use serde::Serialize;

use crate::{GraphStore, Insertion};
use textgraph_core::{
    fold_label, EntityCandidate, GraphEntity, GraphError, GraphRelationship, GraphSnapshot,
    Properties, RelationshipCandidate, Result,
};

/// Confidence used when a request carries none
pub const DEFAULT_RELATIONSHIP_CONFIDENCE: f32 = 0.8;

/// A relationship to reconcile, addressed by endpoint labels
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRequest {
    pub source_label: String,
    pub source_type: Option<String>,
    pub target_label: String,
    pub target_type: Option<String>,
    pub relation_type: String,
    pub properties: Properties,
    pub confidence: Option<f32>,
}

impl RelationshipRequest {
    pub fn new(
        source_label: impl Into<String>,
        relation_type: impl Into<String>,
        target_label: impl Into<String>,
    ) -> Self {
        Self {
            source_label: source_label.into(),
            source_type: None,
            target_label: target_label.into(),
            target_type: None,
            relation_type: relation_type.into(),
            properties: Properties::new(),
            confidence: None,
        }
    }

    /// Pin endpoint types
    pub fn with_types(
        mut self,
        source_type: Option<String>,
        target_type: Option<String>,
    ) -> Self {
        self.source_type = source_type;
        self.target_type = target_type;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Request for an extracted candidate. The context snippet is kept as a
    /// `context` property when the candidate has one.
    pub fn from_candidate(candidate: &RelationshipCandidate) -> Self {
        let mut properties = candidate.properties.clone();
        if !candidate.context.is_empty() {
            properties.insert(
                "context".to_string(),
                serde_json::Value::String(candidate.context.clone()),
            );
        }
        Self {
            source_label: candidate.source.clone(),
            source_type: None,
            target_label: candidate.target.clone(),
            target_type: None,
            relation_type: candidate.relation_type.clone(),
            properties,
            confidence: Some(candidate.confidence),
        }
    }
}

/// What `create_relationship` did
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipOutcome {
    /// A new edge was stored
    Created(GraphRelationship),
    /// An identical edge already existed and was left unchanged
    Existing(GraphRelationship),
    /// An endpoint could not be resolved; nothing was stored
    NotFound { label: String },
    /// Both endpoints name the same entity; nothing was stored
    SelfLoop,
}

/// Counts removed by [`GraphReconciler::clear_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub relationships_deleted: usize,
    pub entities_deleted: usize,
}

/// Reconciles candidates into a [`GraphStore`]
#[derive(Clone)]
pub struct GraphReconciler {
    store: Arc<dyn GraphStore>,
    default_confidence: f32,
}

impl GraphReconciler {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            default_confidence: DEFAULT_RELATIONSHIP_CONFIDENCE,
        }
    }

    /// Override the confidence given to requests that carry none
    pub fn with_default_confidence(mut self, confidence: f32) -> Self {
        self.default_confidence = confidence;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Insert or merge an entity keyed on exact (label, type)
    pub async fn upsert_entity(&self, candidate: &EntityCandidate) -> Result<GraphEntity> {
        let label = candidate.label.trim();
        if label.chars().count() <= 1 {
            return Err(GraphError::Validation(format!(
                "entity label too short: {:?}",
                candidate.label
            )));
        }
        if candidate.entity_type.trim().is_empty() {
            return Err(GraphError::Validation(format!(
                "entity {label:?} has no type"
            )));
        }

        let entity = if label == candidate.label {
            self.store.upsert_entity(candidate).await?
        } else {
            let mut trimmed = candidate.clone();
            trimmed.label = label.to_string();
            self.store.upsert_entity(&trimmed).await?
        };

        tracing::debug!(label = %entity.label, id = %entity.id, "Upserted entity");
        Ok(entity)
    }

    /// Create a relationship between two existing entities unless it exists
    pub async fn create_relationship(
        &self,
        request: &RelationshipRequest,
    ) -> Result<RelationshipOutcome> {
        if fold_label(&request.source_label) == fold_label(&request.target_label) {
            tracing::debug!(label = %request.source_label, "Skipping self-loop");
            return Ok(RelationshipOutcome::SelfLoop);
        }

        let Some(source) = self
            .store
            .resolve_entity(&request.source_label, request.source_type.as_deref())
            .await?
        else {
            return Ok(RelationshipOutcome::NotFound {
                label: request.source_label.clone(),
            });
        };
        let Some(target) = self
            .store
            .resolve_entity(&request.target_label, request.target_type.as_deref())
            .await?
        else {
            return Ok(RelationshipOutcome::NotFound {
                label: request.target_label.clone(),
            });
        };

        if source.id == target.id {
            tracing::debug!(label = %source.label, "Skipping self-loop after alias resolution");
            return Ok(RelationshipOutcome::SelfLoop);
        }

        let relationship = GraphRelationship::new(
            &source,
            &target,
            request.relation_type.clone(),
            request.properties.clone(),
            request.confidence.unwrap_or(self.default_confidence),
        );

        match self.store.create_relationship_if_absent(relationship).await? {
            Insertion::Created(edge) => {
                tracing::debug!(
                    source = %edge.source_label,
                    relation = %edge.relation_type,
                    target = %edge.target_label,
                    "Created relationship"
                );
                Ok(RelationshipOutcome::Created(edge))
            }
            Insertion::Existing(edge) => Ok(RelationshipOutcome::Existing(edge)),
        }
    }

    /// Delete all relationships, then all entities
    pub async fn clear_all(&self) -> Result<ClearReport> {
        let relationships_deleted = self.store.delete_all_relationships().await?;
        let entities_deleted = self.store.delete_all_entities().await?;

        tracing::info!(
            store = self.store.name(),
            relationships_deleted,
            entities_deleted,
            "Graph cleared"
        );

        Ok(ClearReport {
            relationships_deleted,
            entities_deleted,
        })
    }

    /// Read the whole graph in canonical order
    pub async fn snapshot(&self) -> Result<GraphSnapshot> {
        let entities = self.store.list_entities().await?;
        let relationships = self.store.list_relationships().await?;
        Ok(GraphSnapshot::ordered(entities, relationships))
    }
}
