//! Candidate filtering
//!
//! Entity stage: dedup on case-folded label in discovery order, drop
//! generic tokens, stable sort by confidence descending.
//! Relationship stage: both endpoints must survive, no self-loops, and an
//! optional confidence floor (used by the model-backed strategy only).

use std::collections::HashSet;

use textgraph_core::{fold_label, EntityCandidate, ExtractionResult, RelationshipCandidate};

/// Function words never accepted as entity labels
const FUNCTION_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "else", "of", "in", "on", "at", "to",
    "for", "with", "by", "from", "as", "is", "are", "was", "were", "be", "been", "being", "am",
    "it", "its", "this", "that", "these", "those", "he", "she", "they", "we", "you", "i", "me",
    "him", "her", "them", "us", "my", "your", "his", "their", "our", "there", "here", "what",
    "which", "who", "whom", "whose", "when", "where", "why", "how", "not", "no", "yes", "so",
    "do", "does", "did", "has", "have", "had", "will", "would", "can", "could", "should", "may",
    "might", "must", "also", "very", "just", "all", "some", "any", "each", "every", "many",
    "much", "more", "most", "other", "such", "only", "own", "same", "than", "too", "into",
    "over", "under", "about", "after", "before", "up", "down", "out", "off",
];

/// True for labels that never make a useful entity: one character or less,
/// function words, pure numerals, or nothing alphanumeric at all.
pub fn is_generic_token(label: &str) -> bool {
    let folded = fold_label(label);
    if folded.chars().count() <= 1 {
        return true;
    }
    if FUNCTION_WORDS.contains(&folded.as_str()) {
        return true;
    }
    if !folded.chars().any(char::is_alphanumeric) {
        return true;
    }
    folded
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | ' ' | '-' | '+' | '%'))
        .all(|c| c.is_numeric())
}

/// Dedup/denylist/sort pipeline shared by both strategies
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateFilter {
    relationship_floor: Option<f32>,
}

impl CandidateFilter {
    /// Filter for the rule-based strategy (no relationship floor)
    pub fn local() -> Self {
        Self {
            relationship_floor: None,
        }
    }

    /// Filter for the model-backed strategy
    pub fn with_relationship_floor(floor: f32) -> Self {
        Self {
            relationship_floor: Some(floor),
        }
    }

    pub fn relationship_floor(&self) -> Option<f32> {
        self.relationship_floor
    }

    /// Dedup, drop generic tokens, and sort by confidence (stable on ties)
    pub fn filter_entities(&self, entities: Vec<EntityCandidate>) -> Vec<EntityCandidate> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept: Vec<EntityCandidate> = entities
            .into_iter()
            .filter(|e| {
                let key = e.dedup_key();
                !is_generic_token(&key) && seen.insert(key)
            })
            .collect();

        kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        kept
    }

    /// Keep relationships between surviving entities that are non-self and
    /// meet the floor, if any
    pub fn filter_relationships(
        &self,
        relationships: Vec<RelationshipCandidate>,
        entities: &[EntityCandidate],
    ) -> Vec<RelationshipCandidate> {
        let known: HashSet<String> = entities.iter().map(|e| e.dedup_key()).collect();

        relationships
            .into_iter()
            .filter(|r| {
                known.contains(&fold_label(&r.source))
                    && known.contains(&fold_label(&r.target))
                    && !r.is_self_loop()
                    && self.relationship_floor.map_or(true, |f| r.confidence >= f)
            })
            .collect()
    }

    /// Run both stages into an [`ExtractionResult`]
    pub fn apply(&self, mut result: ExtractionResult) -> ExtractionResult {
        result.entities = self.filter_entities(std::mem::take(&mut result.entities));
        result.relationships =
            self.filter_relationships(std::mem::take(&mut result.relationships), &result.entities);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use textgraph_core::ProcessingMethod;

    #[test]
    fn test_generic_tokens() {
        assert!(is_generic_token("The"));
        assert!(is_generic_token("x"));
        assert!(is_generic_token(" 2024 "));
        assert!(is_generic_token("1,000.50"));
        assert!(is_generic_token("--"));
        assert!(!is_generic_token("Apple"));
        assert!(!is_generic_token("R2D2"));
        assert!(!is_generic_token("AI"));
    }

    #[test]
    fn test_entity_dedup_keeps_first() {
        let filter = CandidateFilter::local();
        let entities = vec![
            EntityCandidate::new("Apple", "ORGANIZATION", 0.85),
            EntityCandidate::new("apple ", "FOOD", 0.85),
            EntityCandidate::new("the", "CONCEPT", 0.6),
        ];

        let kept = filter.filter_entities(entities);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].entity_type, "ORGANIZATION");
    }

    #[test]
    fn test_entity_sort_is_stable() {
        let filter = CandidateFilter::local();
        let entities = vec![
            EntityCandidate::new("family", "CONCEPT", 0.6),
            EntityCandidate::new("Steve Jobs", "PERSON", 0.7),
            EntityCandidate::new("Apple", "ORGANIZATION", 0.85),
            EntityCandidate::new("Elon Musk", "PERSON", 0.7),
            EntityCandidate::new("Tesla", "ORGANIZATION", 0.85),
        ];

        let labels: Vec<String> = filter
            .filter_entities(entities)
            .into_iter()
            .map(|e| e.label)
            .collect();
        assert_eq!(
            labels,
            vec!["Apple", "Tesla", "Steve Jobs", "Elon Musk", "family"]
        );
    }

    #[test]
    fn test_relationship_endpoints_must_survive() {
        let filter = CandidateFilter::local();
        let entities = vec![
            EntityCandidate::new("Apple", "ORGANIZATION", 0.85),
            EntityCandidate::new("Steve Jobs", "PERSON", 0.7),
        ];
        let relationships = vec![
            RelationshipCandidate::new("apple", "FOUNDED_BY", "steve jobs", 0.9),
            RelationshipCandidate::new("Apple", "OWNS", "Beats", 0.85),
            RelationshipCandidate::new("Apple", "IS_A", "APPLE", 0.7),
        ];

        let kept = filter.filter_relationships(relationships, &entities);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].relation_type, "FOUNDED_BY");
    }

    #[test]
    fn test_relationship_floor() {
        let entities = vec![
            EntityCandidate::new("Mary", "PERSON", 0.9),
            EntityCandidate::new("tea", "FOOD", 0.9),
        ];
        let relationships = vec![
            RelationshipCandidate::new("Mary", "LIKES", "tea", 0.69),
            RelationshipCandidate::new("Mary", "EATS", "tea", 0.7),
        ];

        let local = CandidateFilter::local().filter_relationships(relationships.clone(), &entities);
        assert_eq!(local.len(), 2);

        let external =
            CandidateFilter::with_relationship_floor(0.7).filter_relationships(relationships, &entities);
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].relation_type, "EATS");
    }

    #[test]
    fn test_apply_filters_relationships_against_filtered_entities() {
        let result = ExtractionResult {
            entities: vec![
                EntityCandidate::new("John", "PERSON", 0.7),
                EntityCandidate::new("it", "CONCEPT", 0.6),
            ],
            relationships: vec![RelationshipCandidate::new("John", "LIKES", "it", 0.75)],
            method: ProcessingMethod::Local,
        };

        let filtered = CandidateFilter::local().apply(result);
        assert_eq!(filtered.entities.len(), 1);
        assert!(filtered.relationships.is_empty());
        assert_eq!(filtered.method, ProcessingMethod::Local);
    }
}
