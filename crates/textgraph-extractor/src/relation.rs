//! Pattern-based relationship recognition
//!
//! Extracts subject–verb–object triples between already-recognized entities.
//! Rules are evaluated in a fixed order; each is bound to one relationship
//! type and a fixed confidence. The broad `is/are` rule comes last.

use std::collections::HashMap;

use regex::Regex;

use crate::normalize::split_sentences;
use crate::RelationExtractor;
use textgraph_core::{fold_label, EntityCandidate, RelationType, RelationshipCandidate, Result};

/// Subject capture: up to four words, shortest first, so the match starts as
/// close to the verb as the leftmost position allows
const SUBJECT: &str = r"((?:[\p{L}\p{N}][\p{L}\p{N}'&-]*\s+){0,3}?[\p{L}\p{N}][\p{L}\p{N}'&-]*)";

/// Object capture: up to four words
const OBJECT: &str = r"([\p{L}\p{N}][\p{L}\p{N}'&-]*(?:\s+[\p{L}\p{N}][\p{L}\p{N}'&-]*){0,3})";

/// Ordered (name, type, verb phrase, confidence) table
const RULES: &[(&str, RelationType, &str, f32)] = &[
    (
        "founded_by",
        RelationType::FoundedBy,
        r"(?:is|was|were)\s+(?:co-?)?founded\s+by",
        0.9,
    ),
    (
        "ceo_of",
        RelationType::CeoOf,
        r"(?:is|was)\s+(?:the\s+)?(?:ceo|chief\s+executive)\s+of",
        0.9,
    ),
    (
        "founded",
        RelationType::Founded,
        r"(?:co-?)?founded|started|established",
        0.9,
    ),
    (
        "owns",
        RelationType::Owns,
        r"owns|owned|acquired|bought|purchased",
        0.85,
    ),
    (
        "works_for",
        RelationType::WorksFor,
        r"(?:works|worked|working)\s+(?:for|at)",
        0.85,
    ),
    (
        "located_in",
        RelationType::LocatedIn,
        r"(?:is|are|was|were)\s+(?:located|based|headquartered)\s+in",
        0.85,
    ),
    (
        "lives_in",
        RelationType::LivesIn,
        r"(?:lives|lived|resides)\s+in",
        0.85,
    ),
    (
        "created",
        RelationType::Created,
        r"created|invented|developed|built|wrote|designed",
        0.8,
    ),
    (
        "uses",
        RelationType::Uses,
        r"uses|used|utilizes|programs\s+in",
        0.8,
    ),
    ("eats", RelationType::Eats, r"eats|ate|eat|eating", 0.8),
    (
        "likes",
        RelationType::Likes,
        r"likes|liked|loves|loved|enjoys|enjoyed|prefers",
        0.75,
    ),
    ("knows", RelationType::Knows, r"knows|knew|met|meets", 0.75),
    (
        "part_of",
        RelationType::PartOf,
        r"(?:is|are|was|were)\s+(?:a\s+)?part\s+of",
        0.75,
    ),
    (
        "is_a",
        RelationType::IsA,
        r"(?:is|are|was|were)(?:\s+(?:an?|the))?",
        0.7,
    ),
];

/// A compiled subject–verb–object rule
#[derive(Debug, Clone)]
pub struct RelationPattern {
    pub name: &'static str,
    pub relation: RelationType,
    pub confidence: f32,
    regex: Regex,
}

/// Rule-based relation extractor
pub struct PatternRelationshipExtractor {
    patterns: Vec<RelationPattern>,
}

impl PatternRelationshipExtractor {
    /// Create with the standard rule list
    pub fn new() -> Self {
        let patterns = RULES
            .iter()
            .filter_map(|&(name, relation, verb, confidence)| {
                let source = format!(r"(?i)\b{SUBJECT}\s+(?:{verb})\s+{OBJECT}");
                match Regex::new(&source) {
                    Ok(regex) => Some(RelationPattern {
                        name,
                        relation,
                        confidence,
                        regex,
                    }),
                    Err(e) => {
                        tracing::warn!(rule = name, error = %e, "Skipping invalid relation pattern");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    /// Rule names in evaluation order
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }

    fn find_pattern_relations(
        &self,
        sentence: &str,
        index: &HashMap<String, &str>,
        relations: &mut Vec<RelationshipCandidate>,
    ) {
        for pattern in &self.patterns {
            let mut pos = 0;

            while pos < sentence.len() {
                let Some(caps) = pattern.regex.captures_at(sentence, pos) else {
                    break;
                };
                let (Some(subject), Some(object)) = (caps.get(1), caps.get(2)) else {
                    break;
                };
                // Resume at the object so it can be the next subject
                pos = object.start();

                let Some(source) = longest_suffix_match(subject.as_str(), index) else {
                    continue;
                };
                let Some(target) = longest_prefix_match(object.as_str(), index) else {
                    continue;
                };
                if fold_label(source) == fold_label(target) {
                    tracing::debug!(rule = pattern.name, label = source, "Discarding self-loop");
                    continue;
                }

                relations.push(
                    RelationshipCandidate::new(
                        source,
                        pattern.relation.as_str(),
                        target,
                        pattern.confidence,
                    )
                    .with_context(sentence)
                    .with_property("rule", pattern.name),
                );
            }
        }
    }
}

impl Default for PatternRelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationExtractor for PatternRelationshipExtractor {
    fn extract(
        &self,
        text: &str,
        entities: &[EntityCandidate],
    ) -> Result<Vec<RelationshipCandidate>> {
        // First label wins for a folded key, matching extraction order
        let mut index: HashMap<String, &str> = HashMap::new();
        for entity in entities {
            index
                .entry(entity.dedup_key())
                .or_insert(entity.label.as_str());
        }

        let mut relations = Vec::new();
        if index.is_empty() {
            return Ok(relations);
        }

        for sentence in split_sentences(text) {
            self.find_pattern_relations(sentence, &index, &mut relations);
        }

        Ok(relations)
    }
}

/// Longest trailing word run of `capture` that names an entity
fn longest_suffix_match<'a>(capture: &str, index: &HashMap<String, &'a str>) -> Option<&'a str> {
    let words: Vec<&str> = capture.split_whitespace().collect();
    (0..words.len()).find_map(|start| index.get(&fold_label(&words[start..].join(" "))).copied())
}

/// Longest leading word run of `capture` that names an entity
fn longest_prefix_match<'a>(capture: &str, index: &HashMap<String, &'a str>) -> Option<&'a str> {
    let words: Vec<&str> = capture.split_whitespace().collect();
    (1..=words.len())
        .rev()
        .find_map(|end| index.get(&fold_label(&words[..end].join(" "))).copied())
}

// ============================================================================
// Tests
// ============================================================================
