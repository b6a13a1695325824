//! textgraph Extractor - Knowledge extraction pipeline
//!
//! Turns normalized text into filtered entity and relationship candidates.
//! Two interchangeable strategies sit behind [`ExtractionStrategy`]:
//! - Local: ordered pattern rules + candidate filtering
//! - External: a generative model behind [`textgraph_core::LlmClient`]
//!
//! [`coordinator::ExtractionCoordinator`] picks between them.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use textgraph_core::{
    EntityCandidate, ExtractionResult, GraphError, ProcessingMethod, RelationshipCandidate,
    Result,
};

/// Trait for entity extractors
pub trait EntityExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<Vec<EntityCandidate>>;
}

/// Trait for relation extractors
pub trait RelationExtractor: Send + Sync {
    fn extract(
        &self,
        text: &str,
        entities: &[EntityCandidate],
    ) -> Result<Vec<RelationshipCandidate>>;
}

/// Outcome of running one strategy over a text
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// Filtered candidates
    Extracted(ExtractionResult),
    /// The strategy could not produce a result (unreachable, timed out, unparseable)
    Unavailable { reason: String },
}

impl StrategyOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Unavailable becomes [`GraphError::ExtractionUnavailable`]
    pub fn into_result(self) -> Result<ExtractionResult> {
        match self {
            Self::Extracted(result) => Ok(result),
            Self::Unavailable { reason } => Err(GraphError::ExtractionUnavailable(reason)),
        }
    }
}

/// One extraction backend
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Extract candidates from normalized text
    async fn extract(&self, text: &str) -> StrategyOutcome;

    /// Method tag reported for this strategy's results
    fn method(&self) -> ProcessingMethod;
}

pub mod coordinator;
pub mod external;
pub mod filter;
pub mod ner;
pub mod normalize;
pub mod relation;

pub use coordinator::{ExtractionCoordinator, LocalExtractionStrategy};
pub use external::{ExternalConfig, ExternalExtractionStrategy};
pub use filter::CandidateFilter;
pub use ner::PatternEntityExtractor;
pub use normalize::{normalize, split_sentences};
pub use relation::PatternRelationshipExtractor;
