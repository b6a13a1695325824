//! Pattern-based entity recognition
//!
//! A fixed, ordered battery of rule groups, one per entity type. Every group
//! scans the normalized text sentence by sentence, left to right. Claiming
//! happens afterwards in group order: the first group to claim a case-folded
//! label keeps it, and later groups never re-extract that label or text
//! already covered by a claimed match in the same sentence. A capitalized run
//! that only partly overlaps claimed text keeps its unclaimed word runs.
//!
//! Reordering [`RuleBattery::standard`] changes which type wins for
//! ambiguous tokens.

use std::collections::HashSet;

use regex::Regex;

use crate::normalize::split_sentences;
use crate::EntityExtractor;
use textgraph_core::{fold_label, EntityCandidate, EntityType, Result};

/// Confidence for lexicon and pattern hits
pub const PATTERN_CONFIDENCE: f32 = 0.85;
/// Confidence for the generic capitalized-word guess
pub const CAPITALIZED_CONFIDENCE: f32 = 0.70;
/// Confidence for the lowercase common-noun guess
pub const COMMON_NOUN_CONFIDENCE: f32 = 0.60;

// ============================================================================
// Lexicons
// ============================================================================

const HONORIFIC_PATTERN: &str =
    r"\b(?P<title>Mr|Mrs|Ms|Dr|Prof)\.?\s+(?P<label>\p{Lu}[\p{L}'-]*(?:\s+\p{Lu}[\p{L}'-]*)*)";

const CORPORATE_SUFFIX_PATTERN: &str = r"\b(?P<label>\p{Lu}[\p{L}&-]*(?:\s+\p{Lu}[\p{L}&-]*)*\s+(?:Inc|Corp|Corporation|Ltd|LLC|GmbH|Company|Group|University|Foundation))\b";

const CAPITALIZED_RUN_PATTERN: &str = r"\b\p{Lu}[\p{L}\p{N}'-]*(?:\s+\p{Lu}[\p{L}\p{N}'-]*)*";

const ORGANIZATIONS: &[&str] = &[
    "Apple", "Google", "Microsoft", "Amazon", "Tesla", "SpaceX", "Meta", "Facebook", "Netflix",
    "IBM", "Intel", "Nvidia", "OpenAI", "Twitter", "Samsung", "Sony", "Toyota", "Walmart",
    "Disney", "Oracle", "Adobe", "Uber", "Airbnb", "NASA", "United Nations",
];

const LOCATIONS: &[&str] = &[
    "Paris", "London", "New York", "Tokyo", "Berlin", "California", "Texas", "China", "Japan",
    "India", "France", "Germany", "Canada", "Mexico", "Brazil", "Europe", "Asia", "Africa",
    "America", "United States", "Cupertino", "Seattle", "San Francisco", "Silicon Valley",
];

const FOODS: &[&str] = &[
    "pizza", "pasta", "bread", "rice", "apple", "banana", "cheese", "chocolate", "coffee", "tea",
    "sushi", "burger", "salad", "soup", "cake", "sandwich", "chicken", "steak", "fish", "noodle",
    "ice cream",
];

const TECHNOLOGIES: &[&str] = &[
    "Python", "Rust", "JavaScript", "TypeScript", "Java", "Linux", "iPhone", "Android", "AI",
    "artificial intelligence", "machine learning", "blockchain", "Kubernetes", "Docker", "React",
    "SQL", "ChatGPT", "internet", "cloud computing",
];

const OBJECTS: &[&str] = &[
    "car", "book", "computer", "phone", "house", "table", "chair", "laptop", "bicycle", "camera",
    "guitar", "piano", "watch", "key", "door", "pen", "bag",
];

const COMMON_NOUNS: &[&str] = &[
    "company", "city", "country", "music", "science", "history", "money", "family", "friend",
    "team", "school", "university", "government", "market", "product", "people", "water",
    "energy", "health", "education", "art", "sport", "business", "research", "data",
];

const FIRST_NAMES: &[&str] = &[
    "John", "Mary", "Steve", "Elon", "Bill", "Jeff", "Mark", "Tim", "Larry", "Sergey", "Sarah",
    "Michael", "David", "James", "Robert", "Linda", "Emma", "Olivia", "Alice", "Bob", "Jane",
    "Tom", "Anna", "Peter", "Paul", "Maria", "Satya", "Sundar",
];

/// Verbs that mark the preceding capitalized run as a person
const PERSON_VERBS: &[&str] = &[
    "said", "says", "told", "thinks", "thought", "likes", "liked", "loves", "loved", "eats",
    "ate", "knows", "knew", "met", "founded", "works", "worked", "lives", "lived", "wrote",
    "believes", "wants",
];

const LOCATION_PREPOSITIONS: &[&str] = &["in", "at", "from", "near", "to"];

const ORGANIZATION_CUES: &[&str] = &["joined", "acquired", "for", "by"];

/// Words dropped from the front of a capitalized run
const LEADING_FUNCTION_WORDS: &[&str] = &[
    "The", "A", "An", "This", "That", "These", "Those", "In", "On", "At", "If", "When", "While",
    "After", "Before", "But", "And", "Or", "So", "Then", "It", "He", "She", "They", "We", "I",
    "You", "His", "Her", "Their", "Our", "My", "Its", "Mr", "Mrs", "Ms", "Dr", "Prof", "Many",
    "Some", "Most", "All", "Every", "Each", "There", "Here", "What", "Who", "How", "Why", "Where",
    "As", "For", "With", "From", "By", "To", "Of", "Not", "No", "Yes", "Yesterday", "Today",
    "Tomorrow", "CEO", "CTO", "CFO", "COO", "Chairman", "Chairwoman", "President", "Founder",
    "Co-founder", "Director",
];

// ============================================================================
// Rule battery
// ============================================================================

/// How a rule group assigns a type to its hits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Typing {
    Fixed(EntityType),
    /// Adjacent-word heuristics, defaulting to CONCEPT
    Inferred,
}

/// One named group in the ordered battery
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub name: &'static str,
    pub typing: Typing,
    pub confidence: f32,
    patterns: Vec<Regex>,
}

impl RuleGroup {
    fn new(name: &'static str, typing: Typing, confidence: f32, patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(group = name, error = %e, "Skipping invalid entity pattern");
                    None
                }
            })
            .collect();
        Self {
            name,
            typing,
            confidence,
            patterns,
        }
    }
}

/// Build a whole-word alternation over a lexicon, longest terms first so
/// multi-word entries win over their prefixes.
fn lexicon_pattern(terms: &[&str], case_sensitive: bool, plural: bool) -> String {
    let mut sorted: Vec<&str> = terms.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = sorted
        .iter()
        .map(|t| regex::escape(t).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    let flags = if case_sensitive { "" } else { "(?i)" };
    let suffix = if plural { "s?" } else { "" };
    format!(r"{flags}\b(?P<label>(?:{alternation}){suffix})\b")
}

/// The ordered list of (rule group, type, confidence)
#[derive(Debug, Clone)]
pub struct RuleBattery {
    groups: Vec<RuleGroup>,
}

impl RuleBattery {
    /// Standard battery. Order is significant:
    ///
    /// 1. honorific + name → PERSON
    /// 2. organization lexicon, corporate suffixes → ORGANIZATION
    /// 3. location lexicon → LOCATION
    /// 4. food lexicon → FOOD
    /// 5. technology lexicon → TECHNOLOGY
    /// 6. generic-object lexicon → OBJECT
    /// 7. capitalized words → inferred type
    /// 8. lowercase common nouns → CONCEPT
    pub fn standard() -> Self {
        let groups = vec![
            RuleGroup::new(
                "honorific",
                Typing::Fixed(EntityType::Person),
                PATTERN_CONFIDENCE,
                &[HONORIFIC_PATTERN.to_string()],
            ),
            RuleGroup::new(
                "organization",
                Typing::Fixed(EntityType::Organization),
                PATTERN_CONFIDENCE,
                &[
                    CORPORATE_SUFFIX_PATTERN.to_string(),
                    lexicon_pattern(ORGANIZATIONS, true, false),
                ],
            ),
            RuleGroup::new(
                "location",
                Typing::Fixed(EntityType::Location),
                PATTERN_CONFIDENCE,
                &[lexicon_pattern(LOCATIONS, true, false)],
            ),
            RuleGroup::new(
                "food",
                Typing::Fixed(EntityType::Food),
                PATTERN_CONFIDENCE,
                &[lexicon_pattern(FOODS, false, true)],
            ),
            RuleGroup::new(
                "technology",
                Typing::Fixed(EntityType::Technology),
                PATTERN_CONFIDENCE,
                &[lexicon_pattern(TECHNOLOGIES, false, false)],
            ),
            RuleGroup::new(
                "object",
                Typing::Fixed(EntityType::Object),
                PATTERN_CONFIDENCE,
                &[lexicon_pattern(OBJECTS, false, true)],
            ),
            RuleGroup::new(
                "capitalized",
                Typing::Inferred,
                CAPITALIZED_CONFIDENCE,
                &[CAPITALIZED_RUN_PATTERN.to_string()],
            ),
            RuleGroup::new(
                "common_noun",
                Typing::Fixed(EntityType::Concept),
                COMMON_NOUN_CONFIDENCE,
                &[lexicon_pattern(COMMON_NOUNS, true, true)],
            ),
        ];
        Self { groups }
    }

    /// Group names in evaluation order
    pub fn names(&self) -> Vec<&'static str> {
        self.groups.iter().map(|g| g.name).collect()
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// A match found by one group, before claiming
#[derive(Debug, Clone)]
struct Hit {
    sentence: usize,
    start: usize,
    end: usize,
    label: String,
    entity_type: EntityType,
    title: Option<String>,
}

/// Rule-based entity extractor
pub struct PatternEntityExtractor {
    battery: RuleBattery,
}

impl PatternEntityExtractor {
    /// Create an extractor with the standard battery
    pub fn new() -> Self {
        Self {
            battery: RuleBattery::standard(),
        }
    }

    /// Create with a custom battery
    pub fn with_battery(battery: RuleBattery) -> Self {
        Self { battery }
    }

    /// Scan every sentence with one group; reads only the immutable text
    fn scan_group(&self, group: &RuleGroup, sentences: &[&str]) -> Vec<Hit> {
        let mut hits = Vec::new();

        for (sentence_idx, sentence) in sentences.iter().enumerate() {
            let mut sentence_hits = Vec::new();

            for regex in &group.patterns {
                for caps in regex.captures_iter(sentence) {
                    let Some(mat) = caps.name("label").or_else(|| caps.get(0)) else {
                        continue;
                    };
                    let title = caps.name("title").map(|t| t.as_str().to_string());

                    let Some((offset, label)) = trim_run(mat.as_str()) else {
                        continue;
                    };
                    let start = mat.start() + offset;
                    let end = start + label.len();

                    let entity_type = match group.typing {
                        Typing::Fixed(t) => t,
                        Typing::Inferred => infer_type(sentence, start, end, label),
                    };

                    sentence_hits.push(Hit {
                        sentence: sentence_idx,
                        start,
                        end,
                        label: label.to_string(),
                        entity_type,
                        title,
                    });
                }
            }

            // Several patterns in one group: keep left-to-right order
            sentence_hits.sort_by_key(|h| h.start);
            hits.extend(sentence_hits);
        }

        tracing::debug!(group = group.name, hits = hits.len(), "Entity rule group scanned");
        hits
    }
}

impl Default for PatternEntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for PatternEntityExtractor {
    fn extract(&self, text: &str) -> Result<Vec<EntityCandidate>> {
        let sentences = split_sentences(text);

        // Scan first, claim afterwards in fixed group order
        let scans: Vec<(&RuleGroup, Vec<Hit>)> = self
            .battery
            .groups
            .iter()
            .map(|group| (group, self.scan_group(group, &sentences)))
            .collect();

        let mut claimed_labels: HashSet<String> = HashSet::new();
        let mut claimed_spans: Vec<(usize, usize, usize)> = Vec::new();
        let mut entities = Vec::new();

        for (group, hits) in scans {
            for hit in hits {
                let overlapping: Vec<(usize, usize)> = claimed_spans
                    .iter()
                    .filter(|&&(s, a, b)| s == hit.sentence && hit.start < b && a < hit.end)
                    .map(|&(_, a, b)| (a, b))
                    .collect();

                let pieces = if overlapping.is_empty() {
                    vec![hit]
                } else if group.typing == Typing::Inferred {
                    unclaimed_pieces(&hit, &overlapping, sentences[hit.sentence])
                } else {
                    continue;
                };

                for hit in pieces {
                    let key = fold_label(&hit.label);
                    if key.is_empty() || claimed_labels.contains(&key) {
                        continue;
                    }

                    claimed_labels.insert(key);
                    claimed_spans.push((hit.sentence, hit.start, hit.end));

                    let mut candidate =
                        EntityCandidate::new(hit.label, hit.entity_type.as_str(), group.confidence)
                            .with_property("sentence", sentences[hit.sentence])
                            .with_property("rule", group.name);
                    if let Some(title) = hit.title {
                        candidate = candidate.with_property("title", title);
                    }
                    entities.push(candidate);
                }
            }
        }

        Ok(entities)
    }
}

/// Drop leading function words and a trailing possessive from a match.
/// Returns the byte offset of the kept part within `run`.
fn trim_run(run: &str) -> Option<(usize, &str)> {
    let mut offset = 0;
    let mut rest = run;

    loop {
        let word_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if !LEADING_FUNCTION_WORDS.contains(&&rest[..word_end]) {
            break;
        }
        if word_end == rest.len() {
            return None;
        }
        let next = rest[word_end..].trim_start();
        offset += rest.len() - next.len();
        rest = next;
    }

    let rest = rest
        .strip_suffix("'s")
        .unwrap_or(rest)
        .trim_end_matches(|c: char| c == '\'' || c == '-');
    if rest.is_empty() {
        None
    } else {
        Some((offset, rest))
    }
}

/// Split a capitalized run around claimed spans and re-trim and re-type
/// each remainder. A run fully inside claimed text yields nothing.
fn unclaimed_pieces(hit: &Hit, claimed: &[(usize, usize)], sentence: &str) -> Vec<Hit> {
    let mut cuts = claimed.to_vec();
    cuts.sort_unstable();
    cuts.push((hit.end, hit.end));

    let mut pieces = Vec::new();
    let mut cursor = hit.start;
    for (a, b) in cuts {
        let segment_end = a.max(cursor).min(hit.end);
        if cursor < segment_end {
            if let Some((start, end)) = retrim(sentence, cursor, segment_end) {
                let label = &sentence[start..end];
                pieces.push(Hit {
                    sentence: hit.sentence,
                    start,
                    end,
                    label: label.to_string(),
                    entity_type: infer_type(sentence, start, end, label),
                    title: None,
                });
            }
        }
        cursor = cursor.max(b.min(hit.end));
    }
    pieces
}

/// Byte range of the capitalized words left in `sentence[start..end]`
fn retrim(sentence: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let segment = &sentence[start..end];
    let (first, _) = segment.char_indices().find(|&(i, c)| {
        c.is_uppercase() && (i == 0 || segment[..i].ends_with(char::is_whitespace))
    })?;
    let (offset, label) = trim_run(segment[first..].trim_end())?;
    let label_start = start + first + offset;
    Some((label_start, label_start + label.len()))
}

fn clean_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Guess the type of a capitalized run from its neighbours
fn infer_type(sentence: &str, start: usize, end: usize, label: &str) -> EntityType {
    let first = label.split_whitespace().next().unwrap_or_default();
    if FIRST_NAMES.contains(&first) {
        return EntityType::Person;
    }

    let next = sentence[end..].split_whitespace().next().map(clean_word);
    if next.is_some_and(|w| PERSON_VERBS.contains(&w.as_str())) {
        return EntityType::Person;
    }

    let prev = sentence[..start].split_whitespace().next_back().map(clean_word);
    match prev.as_deref() {
        Some(w) if LOCATION_PREPOSITIONS.contains(&w) => EntityType::Location,
        Some(w) if ORGANIZATION_CUES.contains(&w) => EntityType::Organization,
        _ => EntityType::Concept,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(entities: &'a [EntityCandidate], label: &str) -> Option<&'a EntityCandidate> {
        entities.iter().find(|e| e.label == label)
    }

    #[test]
    fn test_founders_example() {
        let ner = PatternEntityExtractor::new();
        let text = "Apple is founded by Steve Jobs. Elon Musk owns Tesla.";
        let entities = ner.extract(text).unwrap();

        let labels: Vec<&str> = entities.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Apple", "Tesla", "Steve Jobs", "Elon Musk"]);

        let apple = find(&entities, "Apple").unwrap();
        assert_eq!(apple.entity_type, "ORGANIZATION");
        assert_eq!(apple.confidence, PATTERN_CONFIDENCE);

        let jobs = find(&entities, "Steve Jobs").unwrap();
        assert_eq!(jobs.entity_type, "PERSON");
        assert_eq!(jobs.confidence, CAPITALIZED_CONFIDENCE);
        assert_eq!(
            jobs.properties["sentence"],
            serde_json::json!("Apple is founded by Steve Jobs.")
        );
    }

    #[test]
    fn test_first_group_wins() {
        let ner = PatternEntityExtractor::new();
        // "apple" is both an organization and a food; the organization group runs first
        let entities = ner.extract("Apple sells phones. I ate an apple.").unwrap();

        let apples: Vec<&EntityCandidate> = entities
            .iter()
            .filter(|e| e.dedup_key() == "apple")
            .collect();
        assert_eq!(apples.len(), 1);
        assert_eq!(apples[0].entity_type, "ORGANIZATION");
    }

    #[test]
    fn test_honorific_person() {
        let ner = PatternEntityExtractor::new();
        let entities = ner.extract("Dr. Jane Goodall studies chimpanzees.").unwrap();

        let jane = find(&entities, "Jane Goodall").unwrap();
        assert_eq!(jane.entity_type, "PERSON");
        assert_eq!(jane.confidence, PATTERN_CONFIDENCE);
        assert_eq!(jane.properties["title"], serde_json::json!("Dr"));
        assert!(find(&entities, "Dr").is_none());
    }

    #[test]
    fn test_corporate_suffix() {
        let ner = PatternEntityExtractor::new();
        let entities = ner.extract("She joined Initech Corp last year.").unwrap();

        let initech = find(&entities, "Initech Corp").unwrap();
        assert_eq!(initech.entity_type, "ORGANIZATION");
        assert!(find(&entities, "She").is_none());
    }

    #[test]
    fn test_capitalized_type_inference() {
        let ner = PatternEntityExtractor::new();
        let entities = ner
            .extract("Gandalf said hello. They moved to Rivendell. Zorblax is strange.")
            .unwrap();

        assert_eq!(find(&entities, "Gandalf").unwrap().entity_type, "PERSON");
        assert_eq!(find(&entities, "Rivendell").unwrap().entity_type, "LOCATION");
        assert_eq!(find(&entities, "Zorblax").unwrap().entity_type, "CONCEPT");
        assert!(find(&entities, "They").is_none());
    }

    #[test]
    fn test_common_nouns_and_lexicons() {
        let ner = PatternEntityExtractor::new();
        let entities = ner
            .extract("John eats pizza with his family and uses Python on a laptop.")
            .unwrap();

        assert_eq!(find(&entities, "pizza").unwrap().entity_type, "FOOD");
        assert_eq!(find(&entities, "Python").unwrap().entity_type, "TECHNOLOGY");
        assert_eq!(find(&entities, "laptop").unwrap().entity_type, "OBJECT");

        let family = find(&entities, "family").unwrap();
        assert_eq!(family.entity_type, "CONCEPT");
        assert_eq!(family.confidence, COMMON_NOUN_CONFIDENCE);
    }

    #[test]
    fn test_multi_word_lexicon_term() {
        let ner = PatternEntityExtractor::new();
        let entities = ner.extract("They opened an office in New York.").unwrap();

        let ny = find(&entities, "New York").unwrap();
        assert_eq!(ny.entity_type, "LOCATION");
        assert!(find(&entities, "York").is_none());
    }

    #[test]
    fn test_claimed_span_blocks_later_groups() {
        let ner = PatternEntityExtractor::new();
        let entities = ner
            .extract("The Apple Pie Foundation helps people.")
            .unwrap();

        let foundation = find(&entities, "Apple Pie Foundation").unwrap();
        assert_eq!(foundation.entity_type, "ORGANIZATION");
        // "Apple" sits inside the claimed span, so neither the lexicon nor the food group takes it
        assert!(entities.iter().all(|e| e.dedup_key() != "apple"));
        assert!(find(&entities, "people").is_some());
    }

    #[test]
    fn test_capitalized_run_keeps_unclaimed_words() {
        let ner = PatternEntityExtractor::new();

        let entities = ner.extract("Tesla CEO Elon Musk owns SpaceX.").unwrap();
        let labels: Vec<&str> = entities.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Tesla", "SpaceX", "Elon Musk"]);
        assert_eq!(find(&entities, "Elon Musk").unwrap().entity_type, "PERSON");
        assert!(find(&entities, "CEO").is_none());

        let entities = ner.extract("Apple CEO Tim Cook likes Paris.").unwrap();
        let cook = find(&entities, "Tim Cook").unwrap();
        assert_eq!(cook.entity_type, "PERSON");
        assert_eq!(cook.confidence, CAPITALIZED_CONFIDENCE);
        assert!(find(&entities, "Paris").is_some());
    }

    #[test]
    fn test_unclaimed_pieces_split_around_claims() {
        let sentence = "Acme Tesla Zorblax Group";
        let hit = Hit {
            sentence: 0,
            start: 0,
            end: sentence.len(),
            label: sentence.to_string(),
            entity_type: EntityType::Concept,
            title: None,
        };

        let pieces = unclaimed_pieces(&hit, &[(5, 10)], sentence);
        let labels: Vec<&str> = pieces.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Acme", "Zorblax Group"]);

        assert!(unclaimed_pieces(&hit, &[(0, sentence.len())], sentence).is_empty());
    }

    #[test]
    fn test_curly_possessive_keeps_lexicon_hit() {
        let ner = PatternEntityExtractor::new();
        let text = crate::normalize::normalize("Elon Musk runs Tesla\u{2019}s factory.");
        let entities = ner.extract(&text).unwrap();

        let tesla = find(&entities, "Tesla").unwrap();
        assert_eq!(tesla.entity_type, "ORGANIZATION");
        assert!(entities.iter().all(|e| e.label != "Teslas"));
    }

    #[test]
    fn test_battery_order() {
        assert_eq!(
            RuleBattery::standard().names(),
            vec![
                "honorific",
                "organization",
                "location",
                "food",
                "technology",
                "object",
                "capitalized",
                "common_noun"
            ]
        );
    }

    #[test]
    fn test_trim_run() {
        assert_eq!(trim_run("The Beatles"), Some((4, "Beatles")));
        assert_eq!(trim_run("The"), None);
        assert_eq!(trim_run("Tesla's"), Some((0, "Tesla")));
        assert_eq!(trim_run("CEO Tim Cook"), Some((4, "Tim Cook")));
    }
}
