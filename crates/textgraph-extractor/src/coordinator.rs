//! Strategy selection
//!
//! External first when configured; Local when External is unavailable or
//! finds nothing. Results are never merged and nothing is retried.

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::CandidateFilter;
use crate::ner::PatternEntityExtractor;
use crate::relation::PatternRelationshipExtractor;
use crate::{EntityExtractor, ExtractionStrategy, RelationExtractor, StrategyOutcome};
use textgraph_core::{ExtractionResult, ProcessingMethod};

/// Property stamped on every locally extracted item
pub const EXTRACTION_METHOD_PROPERTY: &str = "extraction_method";

/// Rule-based strategy: pattern extractors followed by the candidate filter
pub struct LocalExtractionStrategy {
    entities: PatternEntityExtractor,
    relations: PatternRelationshipExtractor,
    filter: CandidateFilter,
}

impl LocalExtractionStrategy {
    pub fn new() -> Self {
        Self {
            entities: PatternEntityExtractor::new(),
            relations: PatternRelationshipExtractor::new(),
            filter: CandidateFilter::local(),
        }
    }

    /// Synchronous extraction, shared by the async trait impl
    pub fn extract_now(&self, text: &str) -> textgraph_core::Result<ExtractionResult> {
        let entities = self.entities.extract(text)?;
        let entities = self.filter.filter_entities(entities);
        let relationships = self.relations.extract(text, &entities)?;
        let relationships = self.filter.filter_relationships(relationships, &entities);

        let method = ProcessingMethod::Local;
        Ok(ExtractionResult {
            entities: entities
                .into_iter()
                .map(|e| e.with_property(EXTRACTION_METHOD_PROPERTY, method.as_str()))
                .collect(),
            relationships: relationships
                .into_iter()
                .map(|r| r.with_property(EXTRACTION_METHOD_PROPERTY, method.as_str()))
                .collect(),
            method,
        })
    }
}

impl Default for LocalExtractionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionStrategy for LocalExtractionStrategy {
    async fn extract(&self, text: &str) -> StrategyOutcome {
        match self.extract_now(text) {
            Ok(result) => StrategyOutcome::Extracted(result),
            Err(e) => StrategyOutcome::unavailable(e.to_string()),
        }
    }

    fn method(&self) -> ProcessingMethod {
        ProcessingMethod::Local
    }
}

/// Picks between the external and local strategies
#[derive(Clone)]
pub struct ExtractionCoordinator {
    external: Option<Arc<dyn ExtractionStrategy>>,
    local: Arc<dyn ExtractionStrategy>,
}

impl ExtractionCoordinator {
    /// Coordinator with only the local strategy
    pub fn local_only() -> Self {
        Self {
            external: None,
            local: Arc::new(LocalExtractionStrategy::new()),
        }
    }

    pub fn new(
        external: Option<Arc<dyn ExtractionStrategy>>,
        local: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        Self { external, local }
    }

    /// Set the external strategy
    pub fn with_external(mut self, external: Arc<dyn ExtractionStrategy>) -> Self {
        self.external = Some(external);
        self
    }

    pub fn has_external(&self) -> bool {
        self.external.is_some()
    }

    /// Extract from normalized text
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        if let Some(external) = &self.external {
            match external.extract(text).await.into_result() {
                Ok(result) if !result.is_empty() => {
                    tracing::debug!(
                        entities = result.entities.len(),
                        relationships = result.relationships.len(),
                        "Using external extraction"
                    );
                    return result;
                }
                Ok(_) => {
                    tracing::info!("External extraction found nothing, falling back to local");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to local extraction");
                }
            }
        }

        match self.local.extract(text).await.into_result() {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "Local extraction failed");
                ExtractionResult::empty(self.local.method())
            }
        }
    }
}

impl Default for ExtractionCoordinator {
    fn default() -> Self {
        Self::local_only()
    }
}
