//! textgraph Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout textgraph:
//! - Candidate models (transient extraction output)
//! - Graph models (persisted entities and relationships)
//! - Entity and relationship type tags
//! - Common error types
//! - The generative-model client trait
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;

pub use config::{
    AppConfig, ConfigError, DatabaseConfig, ExtractionConfig, GraphBackend, LlmConfig,
    LlmProvider, LoggingConfig,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Counts of what a request did and did not persist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistCounts {
    pub entities_persisted: usize,
    pub entities_failed: usize,
    pub relationships_persisted: usize,
    pub relationships_failed: usize,
}

impl std::fmt::Display for PersistCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "entities persisted={} failed={}, relationships persisted={} failed={}",
            self.entities_persisted,
            self.entities_failed,
            self.relationships_persisted,
            self.relationships_failed
        )
    }
}

/// Core error types for textgraph operations
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Store error: {message} ({counts})")]
    Store {
        message: String,
        counts: PersistCounts,
    },

    #[error("Request cancelled ({counts})")]
    Cancelled { counts: PersistCounts },

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Type Tags
// ============================================================================

/// Entity type tags known to the extractors.
///
/// Candidates carry their type as a string, so a configured tag list for the
/// model-backed strategy can go beyond the tags listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Food,
    Technology,
    Object,
    Concept,
    Event,
}

impl EntityType {
    /// All known tags, in prompt order
    pub const ALL: [EntityType; 8] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Food,
        Self::Technology,
        Self::Object,
        Self::Concept,
        Self::Event,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Organization => "ORGANIZATION",
            Self::Location => "LOCATION",
            Self::Food => "FOOD",
            Self::Technology => "TECHNOLOGY",
            Self::Object => "OBJECT",
            Self::Concept => "CONCEPT",
            Self::Event => "EVENT",
        }
    }

    /// Get from string
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship type tags known to the extractors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    FoundedBy,
    Founded,
    CeoOf,
    Owns,
    WorksFor,
    LocatedIn,
    LivesIn,
    Created,
    Uses,
    Eats,
    Likes,
    Knows,
    PartOf,
    IsA,
    RelatedTo,
}

impl RelationType {
    /// All known tags, in prompt order
    pub const ALL: [RelationType; 15] = [
        Self::FoundedBy,
        Self::Founded,
        Self::CeoOf,
        Self::Owns,
        Self::WorksFor,
        Self::LocatedIn,
        Self::LivesIn,
        Self::Created,
        Self::Uses,
        Self::Eats,
        Self::Likes,
        Self::Knows,
        Self::PartOf,
        Self::IsA,
        Self::RelatedTo,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FoundedBy => "FOUNDED_BY",
            Self::Founded => "FOUNDED",
            Self::CeoOf => "CEO_OF",
            Self::Owns => "OWNS",
            Self::WorksFor => "WORKS_FOR",
            Self::LocatedIn => "LOCATED_IN",
            Self::LivesIn => "LIVES_IN",
            Self::Created => "CREATED",
            Self::Uses => "USES",
            Self::Eats => "EATS",
            Self::Likes => "LIKES",
            Self::Knows => "KNOWS",
            Self::PartOf => "PART_OF",
            Self::IsA => "IS_A",
            Self::RelatedTo => "RELATED_TO",
        }
    }

    /// Get from string
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Case-folded, trimmed form of a label
pub fn fold_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Clamp a confidence score into [0, 1], mapping NaN to 0
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Candidate Models
// ============================================================================

/// Property map shared by candidates and persisted items
pub type Properties = HashMap<String, serde_json::Value>;

/// A transient entity extracted from text, before persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCandidate {
    /// Label as found in the text
    pub label: String,

    /// Type tag (see [`EntityType`])
    pub entity_type: String,

    /// Open property map (always includes provenance for pattern hits)
    #[serde(default)]
    pub properties: Properties,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Alternative surface forms
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl EntityCandidate {
    /// Create a new candidate
    pub fn new(label: impl Into<String>, entity_type: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            entity_type: entity_type.into(),
            properties: HashMap::new(),
            confidence: clamp_confidence(confidence),
            aliases: BTreeSet::new(),
        }
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Add an alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.insert(alias.into());
        self
    }

    /// In-memory dedup identity (type-agnostic)
    pub fn dedup_key(&self) -> String {
        fold_label(&self.label)
    }
}

/// A transient relationship between two candidate labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipCandidate {
    /// Source entity label
    pub source: String,

    /// Target entity label
    pub target: String,

    /// Type tag (see [`RelationType`])
    pub relation_type: String,

    /// Open property map
    #[serde(default)]
    pub properties: Properties,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// Provenance snippet
    #[serde(default)]
    pub context: String,
}

impl RelationshipCandidate {
    /// Create a new relationship candidate
    pub fn new(
        source: impl Into<String>,
        relation_type: impl Into<String>,
        target: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.into(),
            properties: HashMap::new(),
            confidence: clamp_confidence(confidence),
            context: String::new(),
        }
    }

    /// Set the provenance snippet
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Add a property value
    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// True when source and target fold to the same label
    pub fn is_self_loop(&self) -> bool {
        fold_label(&self.source) == fold_label(&self.target)
    }
}

/// Which strategy produced an extraction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    /// Generative-model-backed strategy
    External,
    /// Rule-based strategy
    Local,
}

impl ProcessingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filtered candidates produced by one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<EntityCandidate>,
    pub relationships: Vec<RelationshipCandidate>,
    pub method: ProcessingMethod,
}

impl ExtractionResult {
    /// Create an empty result for a method
    pub fn empty(method: ProcessingMethod) -> Self {
        Self {
            entities: Vec::new(),
            relationships: Vec::new(),
            method,
        }
    }

    /// True when neither entities nor relationships were found
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// ============================================================================
// Graph Models
// ============================================================================

/// An entity persisted in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEntity {
    /// Store-assigned identifier
    pub id: Uuid,

    pub label: String,

    pub entity_type: String,

    pub properties: Properties,

    /// Highest confidence seen for this (label, type)
    pub confidence: f32,

    pub aliases: BTreeSet<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl GraphEntity {
    /// First write of a candidate
    pub fn from_candidate(candidate: &EntityCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            label: candidate.label.clone(),
            entity_type: candidate.entity_type.clone(),
            properties: candidate.properties.clone(),
            confidence: clamp_confidence(candidate.confidence),
            aliases: candidate.aliases.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a later write for the same (label, type).
    ///
    /// Confidence only rises, aliases are unioned and incoming properties
    /// overwrite stored ones key by key.
    pub fn merge(&mut self, incoming: &EntityCandidate) {
        self.confidence = self.confidence.max(clamp_confidence(incoming.confidence));
        self.aliases.extend(incoming.aliases.iter().cloned());
        for (key, value) in &incoming.properties {
            self.properties.insert(key.clone(), value.clone());
        }
        self.updated_at = Utc::now();
    }

    /// True if `label` folds to this entity's label or one of its aliases
    pub fn answers_to(&self, label: &str) -> bool {
        let folded = fold_label(label);
        fold_label(&self.label) == folded || self.aliases.iter().any(|a| fold_label(a) == folded)
    }
}

/// A directed, typed edge between two persisted entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub source_label: String,
    pub target_label: String,
    pub relation_type: String,
    pub properties: Properties,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
}

impl GraphRelationship {
    /// Create a new edge between two resolved entities
    pub fn new(
        source: &GraphEntity,
        target: &GraphEntity,
        relation_type: impl Into<String>,
        properties: Properties,
        confidence: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_id: source.id,
            target_id: target.id,
            source_label: source.label.clone(),
            target_label: target.label.clone(),
            relation_type: relation_type.into(),
            properties,
            confidence: clamp_confidence(confidence),
            created_at: Utc::now(),
        }
    }
}

/// Full read of the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<GraphRelationship>,
}

impl GraphSnapshot {
    /// Build a snapshot in canonical order: entities by confidence
    /// descending then label, relationships by confidence descending.
    pub fn ordered(
        mut entities: Vec<GraphEntity>,
        mut relationships: Vec<GraphRelationship>,
    ) -> Self {
        entities.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.label.cmp(&b.label))
        });
        relationships.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self {
            entities,
            relationships,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for generative-model clients.
///
/// The only capability consumed is single-shot text generation; transport
/// and authentication live in the implementation.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
