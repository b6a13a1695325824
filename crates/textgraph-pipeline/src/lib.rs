//! textgraph Pipeline - Text-to-graph request orchestration
//!
//! One call per request:
//! 1. Validate the raw input
//! 2. Normalize it
//! 3. Extract candidates (external strategy, falling back to local)
//! 4. Reconcile entities, then relationships, in request order
//!
//! Author: hephaex@gmail.com

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use textgraph_core::{
    fold_label, AppConfig, ExtractionResult, GraphEntity, GraphError, GraphRelationship,
    GraphSnapshot, LlmClient, PersistCounts, ProcessingMethod, Result,
};
use textgraph_extractor::{
    normalize, ExternalConfig, ExternalExtractionStrategy, ExtractionCoordinator,
    LocalExtractionStrategy,
};
use textgraph_graph::{
    ClearReport, GraphReconciler, GraphStore, RelationshipOutcome, RelationshipRequest,
};

pub mod llm;

pub use llm::{create_llm_client, OllamaClient, OpenAiClient};

// ============================================================================
// Report
// ============================================================================

/// Outcome of processing one text
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    /// Strategy whose candidates were reconciled
    pub method: ProcessingMethod,

    /// Entities persisted (created or merged)
    pub entity_count: usize,

    /// Relationships persisted or found already present
    pub relationship_count: usize,

    pub entities: Vec<GraphEntity>,

    pub relationships: Vec<GraphRelationship>,

    /// Entities whose store write failed
    pub entities_failed: usize,

    /// Relationships whose store write failed
    pub relationships_failed: usize,

    /// Relationships dropped for an unknown endpoint or a self-loop
    pub relationships_skipped: usize,

    /// Relationships that already existed
    pub relationships_existing: usize,

    /// Wall time in milliseconds
    pub processing_time_ms: u64,
}

impl ProcessReport {
    fn empty(method: ProcessingMethod) -> Self {
        Self {
            method,
            entity_count: 0,
            relationship_count: 0,
            entities: Vec::new(),
            relationships: Vec::new(),
            entities_failed: 0,
            relationships_failed: 0,
            relationships_skipped: 0,
            relationships_existing: 0,
            processing_time_ms: 0,
        }
    }

    fn counts(&self) -> PersistCounts {
        PersistCounts {
            entities_persisted: self.entity_count,
            entities_failed: self.entities_failed,
            relationships_persisted: self.relationship_count,
            relationships_failed: self.relationships_failed,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Text-to-graph pipeline
#[derive(Clone)]
pub struct Pipeline {
    coordinator: ExtractionCoordinator,
    reconciler: GraphReconciler,
    max_input_bytes: usize,
}

impl Pipeline {
    /// Default input bound (1 MiB)
    pub const DEFAULT_MAX_INPUT_BYTES: usize = 1024 * 1024;

    pub fn new(coordinator: ExtractionCoordinator, reconciler: GraphReconciler) -> Self {
        Self {
            coordinator,
            reconciler,
            max_input_bytes: Self::DEFAULT_MAX_INPUT_BYTES,
        }
    }

    /// Wire a pipeline from configuration, a store and an optional model client
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn GraphStore>,
        llm_client: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let mut coordinator =
            ExtractionCoordinator::new(None, Arc::new(LocalExtractionStrategy::new()));
        if let Some(client) = llm_client {
            tracing::info!(client = client.name(), "External extraction enabled");
            let external = ExternalExtractionStrategy::new(
                client,
                ExternalConfig::from_settings(&config.llm, &config.extraction),
            );
            coordinator = coordinator.with_external(Arc::new(external));
        }

        let reconciler = GraphReconciler::new(store)
            .with_default_confidence(config.extraction.default_relationship_confidence);

        Self::new(coordinator, reconciler).with_max_input_bytes(config.extraction.max_input_bytes)
    }

    /// Set the input bound
    pub fn with_max_input_bytes(mut self, max_input_bytes: usize) -> Self {
        self.max_input_bytes = max_input_bytes;
        self
    }

    pub fn reconciler(&self) -> &GraphReconciler {
        &self.reconciler
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(GraphError::Validation("input text is empty".to_string()));
        }
        if text.len() > self.max_input_bytes {
            return Err(GraphError::Validation(format!(
                "input is {} bytes, limit is {}",
                text.len(),
                self.max_input_bytes
            )));
        }
        Ok(())
    }

    /// Validate, normalize and extract without touching the store
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult> {
        self.validate(text)?;
        let normalized = normalize(text);
        if normalized.is_empty() {
            return Ok(ExtractionResult::empty(ProcessingMethod::Local));
        }
        Ok(self.coordinator.extract(&normalized).await)
    }

    /// Process one text into the graph
    pub async fn process(&self, text: &str, cancel: &CancellationToken) -> Result<ProcessReport> {
        let start = Instant::now();

        // 1. Validate
        self.validate(text)?;

        // 2. Normalize
        let normalized = normalize(text);
        if normalized.is_empty() {
            tracing::info!("Nothing to extract after normalization");
            return Ok(ProcessReport::empty(ProcessingMethod::Local));
        }

        // 3. Extract
        let extraction = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(GraphError::Cancelled { counts: PersistCounts::default() });
            }
            result = self.coordinator.extract(&normalized) => result,
        };
        tracing::info!(
            method = %extraction.method,
            entities = extraction.entities.len(),
            relationships = extraction.relationships.len(),
            "Extraction complete"
        );

        // 4. Reconcile
        let mut report = ProcessReport::empty(extraction.method);
        self.reconcile(extraction, cancel, &mut report).await?;

        report.processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            entities = report.entity_count,
            relationships = report.relationship_count,
            entities_failed = report.entities_failed,
            relationships_failed = report.relationships_failed,
            skipped = report.relationships_skipped,
            elapsed_ms = report.processing_time_ms,
            "Request processed"
        );

        let failed = report.entities_failed + report.relationships_failed;
        let persisted = report.entity_count + report.relationship_count;
        if failed > 0 && persisted == 0 {
            return Err(GraphError::Store {
                message: "no item could be persisted".to_string(),
                counts: report.counts(),
            });
        }

        Ok(report)
    }

    async fn reconcile(
        &self,
        extraction: ExtractionResult,
        cancel: &CancellationToken,
        report: &mut ProcessReport,
    ) -> Result<()> {
        // Endpoint types for this request's relationships
        let mut types: HashMap<String, String> = HashMap::new();

        for candidate in &extraction.entities {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled {
                    counts: report.counts(),
                });
            }
            match self.reconciler.upsert_entity(candidate).await {
                Ok(entity) => {
                    types
                        .entry(fold_label(&entity.label))
                        .or_insert_with(|| entity.entity_type.clone());
                    report.entity_count += 1;
                    report.entities.push(entity);
                }
                Err(e) => {
                    tracing::warn!(label = %candidate.label, error = %e, "Entity upsert failed");
                    report.entities_failed += 1;
                }
            }
        }

        for candidate in &extraction.relationships {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled {
                    counts: report.counts(),
                });
            }
            let request = RelationshipRequest::from_candidate(candidate).with_types(
                types.get(&fold_label(&candidate.source)).cloned(),
                types.get(&fold_label(&candidate.target)).cloned(),
            );

            match self.reconciler.create_relationship(&request).await {
                Ok(RelationshipOutcome::Created(edge)) => {
                    report.relationship_count += 1;
                    report.relationships.push(edge);
                }
                Ok(RelationshipOutcome::Existing(edge)) => {
                    report.relationship_count += 1;
                    report.relationships_existing += 1;
                    report.relationships.push(edge);
                }
                Ok(RelationshipOutcome::NotFound { label }) => {
                    tracing::warn!(
                        label = %label,
                        relation = %candidate.relation_type,
                        "Relationship endpoint not found, skipping"
                    );
                    report.relationships_skipped += 1;
                }
                Ok(RelationshipOutcome::SelfLoop) => {
                    report.relationships_skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        source = %candidate.source,
                        relation = %candidate.relation_type,
                        target = %candidate.target,
                        error = %e,
                        "Relationship create failed"
                    );
                    report.relationships_failed += 1;
                }
            }
        }

        Ok(())
    }

    /// Remove every relationship and entity
    pub async fn clear_graph(&self) -> Result<ClearReport> {
        self.reconciler.clear_all().await
    }

    /// Read the whole graph
    pub async fn snapshot(&self) -> Result<GraphSnapshot> {
        self.reconciler.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textgraph_graph::MemoryGraphStore;

    fn pipeline() -> Pipeline {
        Pipeline::from_config(
            &AppConfig::default(),
            Arc::new(MemoryGraphStore::new()),
            None,
        )
    }

    #[test]
    fn test_validation() {
        let pipeline = pipeline().with_max_input_bytes(8);
        let cancel = CancellationToken::new();

        let empty = tokio_test::block_on(pipeline.process("   \n", &cancel));
        assert!(matches!(empty, Err(GraphError::Validation(_))));

        let large = tokio_test::block_on(pipeline.process("Apple owns Beats.", &cancel));
        assert!(matches!(large, Err(GraphError::Validation(_))));
    }

    #[test]
    fn test_symbols_only_is_empty_report() {
        let report = tokio_test::block_on(pipeline().process("*** ~~~", &CancellationToken::new()))
            .unwrap();

        assert_eq!(report.method, ProcessingMethod::Local);
        assert_eq!(report.entity_count, 0);
        assert!(report.entities.is_empty());
    }

    #[test]
    fn test_report_serializes() {
        let report = ProcessReport::empty(ProcessingMethod::External);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["method"], "external");
        assert_eq!(json["entity_count"], 0);
    }
}
