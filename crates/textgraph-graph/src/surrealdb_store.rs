//! SurrealDB implementation for graph storage
//!
//! Entities live in the `entity` table keyed by their UUID; relationships are
//! graph edges in the `relates` table created with `RELATE`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use uuid::Uuid;

use crate::{GraphStore, Insertion};
use textgraph_core::{
    fold_label, DatabaseConfig, EntityCandidate, GraphEntity, GraphError, GraphRelationship,
    Properties, Result,
};

/// SurrealDB graph store implementation
pub struct SurrealDbStore {
    client: Surreal<Client>,
}

impl SurrealDbStore {
    /// Create a new SurrealDB connection
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // The ws engine adds the scheme itself
        let url = config
            .surrealdb_url
            .strip_prefix("ws://")
            .or_else(|| config.surrealdb_url.strip_prefix("wss://"))
            .unwrap_or(&config.surrealdb_url);

        let client = Surreal::new::<Ws>(url)
            .await
            .map_err(|e| db_error("SurrealDB connection failed", e))?;

        client
            .signin(Root {
                username: &config.surrealdb_user,
                password: &config.surrealdb_pass,
            })
            .await
            .map_err(|e| db_error("SurrealDB auth failed", e))?;

        client
            .use_ns(&config.surrealdb_namespace)
            .use_db(&config.surrealdb_database)
            .await
            .map_err(|e| db_error("SurrealDB namespace error", e))?;

        tracing::info!(
            url = %config.surrealdb_url,
            namespace = %config.surrealdb_namespace,
            database = %config.surrealdb_database,
            "Connected to SurrealDB"
        );

        Ok(Self { client })
    }

    /// Initialize schema (run once on setup)
    pub async fn init_schema(&self) -> Result<()> {
        self.client
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS entity SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_entity_key ON entity FIELDS label, entity_type UNIQUE;
                DEFINE INDEX IF NOT EXISTS idx_entity_folded ON entity FIELDS folded_label;
                DEFINE TABLE IF NOT EXISTS relates SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_relates_key ON relates FIELDS source_id, target_id, relation_type UNIQUE;
            "#,
            )
            .await
            .map_err(|e| db_error("Schema init failed", e))?
            .check()
            .map_err(|e| db_error("Schema init failed", e))?;

        Ok(())
    }
}

impl SurrealDbStore {
    async fn merge_into(
        &self,
        mut existing: GraphEntity,
        candidate: &EntityCandidate,
    ) -> Result<GraphEntity> {
        existing.merge(candidate);
        self.put_entity(&existing).await?;
        Ok(existing)
    }
}

fn db_error(context: &str, e: surrealdb::Error) -> GraphError {
    GraphError::Database(format!("{context}: {e}"))
}

// ============================================================================
// Records
// ============================================================================

/// Entity record for SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntityRecord {
    entity_id: String,
    label: String,
    folded_label: String,
    entity_type: String,
    properties: Properties,
    confidence: f32,
    aliases: Vec<String>,
    folded_aliases: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<&GraphEntity> for EntityRecord {
    fn from(entity: &GraphEntity) -> Self {
        Self {
            entity_id: entity.id.to_string(),
            label: entity.label.clone(),
            folded_label: fold_label(&entity.label),
            entity_type: entity.entity_type.clone(),
            properties: entity.properties.clone(),
            confidence: entity.confidence,
            aliases: entity.aliases.iter().cloned().collect(),
            folded_aliases: entity.aliases.iter().map(|a| fold_label(a)).collect(),
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

impl TryFrom<EntityRecord> for GraphEntity {
    type Error = GraphError;

    fn try_from(record: EntityRecord) -> Result<Self> {
        Ok(Self {
            id: parse_id(&record.entity_id)?,
            label: record.label,
            entity_type: record.entity_type,
            properties: record.properties,
            confidence: record.confidence,
            aliases: record.aliases.into_iter().collect::<BTreeSet<_>>(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

/// Relationship record for SurrealDB (edge content; `in`/`out` are set by RELATE)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationRecord {
    relationship_id: String,
    source_id: String,
    target_id: String,
    source_label: String,
    target_label: String,
    relation_type: String,
    properties: Properties,
    confidence: f32,
    created_at: DateTime<Utc>,
}

impl From<&GraphRelationship> for RelationRecord {
    fn from(rel: &GraphRelationship) -> Self {
        Self {
            relationship_id: rel.id.to_string(),
            source_id: rel.source_id.to_string(),
            target_id: rel.target_id.to_string(),
            source_label: rel.source_label.clone(),
            target_label: rel.target_label.clone(),
            relation_type: rel.relation_type.clone(),
            properties: rel.properties.clone(),
            confidence: rel.confidence,
            created_at: rel.created_at,
        }
    }
}

impl TryFrom<RelationRecord> for GraphRelationship {
    type Error = GraphError;

    fn try_from(record: RelationRecord) -> Result<Self> {
        Ok(Self {
            id: parse_id(&record.relationship_id)?,
            source_id: parse_id(&record.source_id)?,
            target_id: parse_id(&record.target_id)?,
            source_label: record.source_label,
            target_label: record.target_label,
            relation_type: record.relation_type,
            properties: record.properties,
            confidence: record.confidence,
            created_at: record.created_at,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| GraphError::Database(format!("Invalid record id {raw}: {e}")))
}

fn into_entities(records: Vec<EntityRecord>) -> Result<Vec<GraphEntity>> {
    records.into_iter().map(GraphEntity::try_from).collect()
}

fn into_relationships(records: Vec<RelationRecord>) -> Result<Vec<GraphRelationship>> {
    records.into_iter().map(GraphRelationship::try_from).collect()
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl GraphStore for SurrealDbStore {
    async fn find_entity(&self, label: &str, entity_type: &str) -> Result<Option<GraphEntity>> {
        let records: Vec<EntityRecord> = self
            .client
            .query("SELECT * FROM entity WHERE label = $label AND entity_type = $entity_type LIMIT 1")
            .bind(("label", label.to_string()))
            .bind(("entity_type", entity_type.to_string()))
            .await
            .map_err(|e| db_error("Query failed", e))?
            .take(0)
            .map_err(|e| db_error("Result extraction failed", e))?;

        Ok(into_entities(records)?.into_iter().next())
    }

    async fn resolve_entity(
        &self,
        label: &str,
        entity_type: Option<&str>,
    ) -> Result<Option<GraphEntity>> {
        let sql = match entity_type {
            Some(_) => {
                "SELECT * FROM entity \
                 WHERE (folded_label = $folded OR folded_aliases CONTAINS $folded) \
                 AND entity_type = $entity_type \
                 ORDER BY confidence DESC, label ASC LIMIT 1"
            }
            None => {
                "SELECT * FROM entity \
                 WHERE folded_label = $folded OR folded_aliases CONTAINS $folded \
                 ORDER BY confidence DESC, label ASC LIMIT 1"
            }
        };

        let records: Vec<EntityRecord> = self
            .client
            .query(sql)
            .bind(("folded", fold_label(label)))
            .bind(("entity_type", entity_type.unwrap_or_default().to_string()))
            .await
            .map_err(|e| db_error("Query failed", e))?
            .take(0)
            .map_err(|e| db_error("Result extraction failed", e))?;

        Ok(into_entities(records)?.into_iter().next())
    }

    async fn put_entity(&self, entity: &GraphEntity) -> Result<()> {
        let _: Option<EntityRecord> = self
            .client
            .upsert(("entity", entity.id.to_string()))
            .content(EntityRecord::from(entity))
            .await
            .map_err(|e| db_error("Failed to store entity", e))?;

        Ok(())
    }

    async fn upsert_entity(&self, candidate: &EntityCandidate) -> Result<GraphEntity> {
        if let Some(existing) = self
            .find_entity(&candidate.label, &candidate.entity_type)
            .await?
        {
            return self.merge_into(existing, candidate).await;
        }

        let created = GraphEntity::from_candidate(candidate);
        let inserted: std::result::Result<Option<EntityRecord>, surrealdb::Error> = self
            .client
            .create(("entity", created.id.to_string()))
            .content(EntityRecord::from(&created))
            .await;

        match inserted {
            Ok(_) => Ok(created),
            Err(e) => {
                // Lost a race on the (label, type) index: merge into the winner
                match self
                    .find_entity(&candidate.label, &candidate.entity_type)
                    .await?
                {
                    Some(existing) => self.merge_into(existing, candidate).await,
                    None => Err(db_error("Failed to create entity", e)),
                }
            }
        }
    }

    async fn find_relationship(
        &self,
        source_id: Uuid,
        target_id: Uuid,
        relation_type: &str,
    ) -> Result<Option<GraphRelationship>> {
        let records: Vec<RelationRecord> = self
            .client
            .query(
                "SELECT * FROM relates WHERE source_id = $source AND target_id = $target \
                 AND relation_type = $relation_type LIMIT 1",
            )
            .bind(("source", source_id.to_string()))
            .bind(("target", target_id.to_string()))
            .bind(("relation_type", relation_type.to_string()))
            .await
            .map_err(|e| db_error("Query failed", e))?
            .take(0)
            .map_err(|e| db_error("Result extraction failed", e))?;

        Ok(into_relationships(records)?.into_iter().next())
    }

    async fn create_relationship_if_absent(
        &self,
        relationship: GraphRelationship,
    ) -> Result<Insertion> {
        if let Some(existing) = self
            .find_relationship(
                relationship.source_id,
                relationship.target_id,
                &relationship.relation_type,
            )
            .await?
        {
            return Ok(Insertion::Existing(existing));
        }

        let result = self
            .client
            .query(
                "LET $from = type::thing('entity', $source); \
                 LET $to = type::thing('entity', $target); \
                 RELATE $from->relates->$to CONTENT $content;",
            )
            .bind(("source", relationship.source_id.to_string()))
            .bind(("target", relationship.target_id.to_string()))
            .bind(("content", RelationRecord::from(&relationship)))
            .await
            .map_err(|e| db_error("Failed to store relationship", e))?
            .check();

        match result {
            Ok(_) => Ok(Insertion::Created(relationship)),
            Err(e) => {
                // Lost a race on the unique index: report the winner
                let existing = self
                    .find_relationship(
                        relationship.source_id,
                        relationship.target_id,
                        &relationship.relation_type,
                    )
                    .await?;
                existing
                    .map(Insertion::Existing)
                    .ok_or_else(|| db_error("Failed to store relationship", e))
            }
        }
    }

    async fn delete_all_relationships(&self) -> Result<usize> {
        let removed: Vec<RelationRecord> = self
            .client
            .delete("relates")
            .await
            .map_err(|e| db_error("Failed to delete relationships", e))?;

        Ok(removed.len())
    }

    async fn delete_all_entities(&self) -> Result<usize> {
        let removed: Vec<EntityRecord> = self
            .client
            .delete("entity")
            .await
            .map_err(|e| db_error("Failed to delete entities", e))?;

        Ok(removed.len())
    }

    async fn list_entities(&self) -> Result<Vec<GraphEntity>> {
        let records: Vec<EntityRecord> = self
            .client
            .select("entity")
            .await
            .map_err(|e| db_error("Failed to list entities", e))?;

        into_entities(records)
    }

    async fn list_relationships(&self) -> Result<Vec<GraphRelationship>> {
        let records: Vec<RelationRecord> = self
            .client
            .select("relates")
            .await
            .map_err(|e| db_error("Failed to list relationships", e))?;

        into_relationships(records)
    }

    fn name(&self) -> &str {
        "surrealdb"
    }
}
