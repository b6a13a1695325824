//! Model-backed extraction strategy
//!
//! Sends one bounded prompt to an injected [`LlmClient`], parses the strict
//! JSON reply and runs it through the same filtering as the local strategy,
//! plus a technical-vocabulary denylist and the relationship floor.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::filter::{is_generic_token, CandidateFilter};
use crate::{ExtractionStrategy, StrategyOutcome};
use textgraph_core::{
    fold_label, EntityCandidate, EntityType, ExtractionConfig, ExtractionResult, LlmClient,
    LlmConfig, ProcessingMethod, Properties, RelationType, RelationshipCandidate,
};

/// Labels describing documents and software rather than the text's subject
const TECHNICAL_TERMS: &[&str] = &[
    "pdf", "docx", "doc", "xlsx", "xls", "csv", "json", "xml", "yaml", "html", "txt", "file",
    "files", "document", "documents", "pipeline", "extraction", "extractor", "parser", "parsing",
    "llm", "prompt", "api", "endpoint", "entity", "entities", "relationship", "relationships",
    "node", "nodes", "edge", "edges", "graph", "knowledge graph", "schema", "database", "json object",
    "model", "token", "tokens", "text",
];

/// File extensions that mark a label as a file name
const FILE_EXTENSIONS: &[&str] = &[".pdf", ".docx", ".doc", ".xlsx", ".csv", ".json", ".txt"];

/// Confidence assumed when the model omits one
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.8;

/// Settings for [`ExternalExtractionStrategy`]
#[derive(Debug, Clone)]
pub struct ExternalConfig {
    /// Upper bound on the single generate call
    pub timeout: Duration,
    /// Input characters embedded in the prompt
    pub max_prompt_chars: usize,
    /// Allowed entity type tags
    pub entity_types: Vec<String>,
    /// Allowed relationship type tags
    pub relationship_types: Vec<String>,
    /// Relationships below this confidence are dropped
    pub confidence_floor: f32,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_prompt_chars: 12_000,
            entity_types: EntityType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            relationship_types: RelationType::ALL
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            confidence_floor: 0.7,
        }
    }
}

impl ExternalConfig {
    /// Build from application settings
    pub fn from_settings(llm: &LlmConfig, extraction: &ExtractionConfig) -> Self {
        Self {
            timeout: Duration::from_secs(llm.timeout_secs),
            max_prompt_chars: extraction.max_prompt_chars,
            confidence_floor: extraction.relationship_confidence_floor,
            ..Self::default()
        }
    }
}

// ============================================================================
// Reply format
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelReply {
    #[serde(default)]
    entities: Vec<ModelEntity>,
    #[serde(default)]
    relationships: Vec<ModelRelationship>,
}

#[derive(Debug, Deserialize)]
struct ModelEntity {
    label: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    aliases: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct ModelRelationship {
    source: String,
    target: String,
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    properties: Properties,
}

// ============================================================================
// Strategy
// ============================================================================

/// Extraction delegated to a generative model
pub struct ExternalExtractionStrategy {
    client: Arc<dyn LlmClient>,
    config: ExternalConfig,
    filter: CandidateFilter,
}

impl ExternalExtractionStrategy {
    pub fn new(client: Arc<dyn LlmClient>, config: ExternalConfig) -> Self {
        let filter = CandidateFilter::with_relationship_floor(config.confidence_floor);
        Self {
            client,
            config,
            filter,
        }
    }

    /// Build the extraction prompt for `text`
    pub fn build_prompt(&self, text: &str) -> String {
        let text = truncate_chars(text, self.config.max_prompt_chars);
        let mut prompt = String::new();

        prompt.push_str("<s>\n");
        prompt.push_str("You extract a knowledge graph from text.\n");
        prompt.push_str("Reply with a single JSON object and nothing else.\n");
        prompt.push_str("</s>\n\n");

        prompt.push_str("<types>\n");
        prompt.push_str(&format!(
            "Entity types: {}\n",
            self.config.entity_types.join(", ")
        ));
        prompt.push_str(&format!(
            "Relationship types: {}\n",
            self.config.relationship_types.join(", ")
        ));
        prompt.push_str("</types>\n\n");

        prompt.push_str("<text>\n");
        prompt.push_str(text);
        prompt.push_str("\n</text>\n\n");

        prompt.push_str("<instructions>\n");
        prompt.push_str("1. Only extract entities that are explicitly mentioned in the text.\n");
        prompt.push_str("2. Use only the listed type tags.\n");
        prompt.push_str("3. Do not extract file formats, documents or software components.\n");
        prompt.push_str("4. Every relationship must connect two extracted entity labels.\n");
        prompt.push_str("5. Confidence is a number between 0 and 1.\n");
        prompt.push_str(
            "6. Format: {\"entities\":[{\"label\":\"\",\"type\":\"\",\"confidence\":0.9,\
             \"properties\":{},\"aliases\":[]}],\"relationships\":[{\"source\":\"\",\
             \"target\":\"\",\"type\":\"\",\"confidence\":0.9,\"context\":\"\",\"properties\":{}}]}\n",
        );
        prompt.push_str("</instructions>\n");

        prompt
    }

    /// Parse and post-process a model reply
    pub fn parse_reply(&self, reply: &str) -> Result<ExtractionResult, String> {
        let body = strip_code_fences(reply);
        let parsed: ModelReply =
            serde_json::from_str(body).map_err(|e| format!("unparseable model reply: {e}"))?;

        let entities: Vec<EntityCandidate> = parsed
            .entities
            .into_iter()
            .filter_map(|e| {
                let label = e.label.trim().to_string();
                if is_generic_token(&label) || is_technical_term(&label) {
                    tracing::debug!(label = %label, "Dropping denylisted model entity");
                    return None;
                }
                let mut candidate = EntityCandidate::new(
                    label,
                    normalize_tag(
                        &e.entity_type,
                        &self.config.entity_types,
                        EntityType::Concept.as_str(),
                    ),
                    e.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE),
                );
                candidate.properties = e.properties;
                candidate.aliases = e
                    .aliases
                    .into_iter()
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                Some(candidate)
            })
            .collect();

        let relationships: Vec<RelationshipCandidate> = parsed
            .relationships
            .into_iter()
            .map(|r| {
                let mut candidate = RelationshipCandidate::new(
                    r.source.trim(),
                    normalize_tag(
                        &r.relation_type,
                        &self.config.relationship_types,
                        RelationType::RelatedTo.as_str(),
                    ),
                    r.target.trim(),
                    r.confidence.unwrap_or(DEFAULT_MODEL_CONFIDENCE),
                )
                .with_context(r.context);
                candidate.properties = r.properties;
                candidate
            })
            .collect();

        Ok(self.filter.apply(ExtractionResult {
            entities,
            relationships,
            method: ProcessingMethod::External,
        }))
    }
}

#[async_trait]
impl ExtractionStrategy for ExternalExtractionStrategy {
    async fn extract(&self, text: &str) -> StrategyOutcome {
        let prompt = self.build_prompt(text);
        tracing::debug!(
            client = self.client.name(),
            prompt_chars = prompt.chars().count(),
            "Calling model for extraction"
        );

        let reply = match tokio::time::timeout(self.config.timeout, self.client.generate(&prompt))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return StrategyOutcome::unavailable(format!("model call failed: {e}")),
            Err(_) => {
                return StrategyOutcome::unavailable(format!(
                    "model call timed out after {:?}",
                    self.config.timeout
                ))
            }
        };

        match self.parse_reply(&reply) {
            Ok(result) => {
                tracing::debug!(
                    entities = result.entities.len(),
                    relationships = result.relationships.len(),
                    "Model extraction parsed"
                );
                StrategyOutcome::Extracted(result)
            }
            Err(reason) => StrategyOutcome::unavailable(reason),
        }
    }

    fn method(&self) -> ProcessingMethod {
        ProcessingMethod::External
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Prefix of `text` holding at most `max_chars` characters
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json)
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// True for file names and document/software vocabulary
pub fn is_technical_term(label: &str) -> bool {
    let folded = fold_label(label);
    if TECHNICAL_TERMS.contains(&folded.as_str()) {
        return true;
    }
    if FILE_EXTENSIONS.iter().any(|ext| folded.ends_with(ext)) {
        return true;
    }
    folded
        .split_whitespace()
        .all(|word| TECHNICAL_TERMS.contains(&word))
}

/// Upper-case a type tag, joining words with underscores. Empty tags and
/// tags outside the allowed list become `fallback`.
fn normalize_tag(tag: &str, allowed: &[String], fallback: &str) -> String {
    let tag = tag
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase();
    if allowed.iter().any(|a| *a == tag) {
        tag
    } else {
        if !tag.is_empty() {
            tracing::debug!(tag = %tag, fallback, "Replacing unknown model type tag");
        }
        fallback.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use textgraph_core::{GraphError, Result};

    /// Scripted client: returns a fixed reply after an optional delay
    struct ScriptedClient {
        reply: std::result::Result<String, String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok("{}".to_string()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(GraphError::Llm)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn strategy(client: Arc<ScriptedClient>) -> ExternalExtractionStrategy {
        ExternalExtractionStrategy::new(client, ExternalConfig::default())
    }

    const FOUNDERS_REPLY: &str = r#"```json
{
  "entities": [
    {"label": "Apple", "type": "organization", "confidence": 0.95},
    {"label": "Steve Jobs", "type": "PERSON", "confidence": 0.9, "aliases": ["Jobs"]},
    {"label": "PDF", "type": "TECHNOLOGY", "confidence": 0.99}
  ],
  "relationships": [
    {"source": "Apple", "target": "Steve Jobs", "type": "founded by", "confidence": 0.92,
     "context": "Apple is founded by Steve Jobs."},
    {"source": "Apple", "target": "PDF", "type": "USES", "confidence": 0.9},
    {"source": "Steve Jobs", "target": "Apple", "type": "WORKS_FOR", "confidence": 0.5}
  ]
}
```"#;

    #[tokio::test]
    async fn test_fenced_reply_is_parsed_and_filtered() {
        let client = ScriptedClient::replying(FOUNDERS_REPLY);
        let outcome = strategy(client.clone())
            .extract("Apple is founded by Steve Jobs.")
            .await;

        let StrategyOutcome::Extracted(result) = outcome else {
            panic!("expected extraction, got {outcome:?}");
        };
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.method, ProcessingMethod::External);

        let labels: Vec<&str> = result.entities.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Apple", "Steve Jobs"]);
        assert_eq!(result.entities[0].entity_type, "ORGANIZATION");
        assert!(result.entities[1].aliases.contains("Jobs"));

        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].relation_type, "FOUNDED_BY");
        assert_eq!(result.relationships[0].context, "Apple is founded by Steve Jobs.");
    }

    #[tokio::test]
    async fn test_bad_json_is_unavailable() {
        let outcome = strategy(ScriptedClient::replying("Sure! Here are the entities: Apple"))
            .extract("Apple")
            .await;
        assert!(matches!(outcome, StrategyOutcome::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_is_unavailable() {
        let outcome = strategy(ScriptedClient::failing("connection refused"))
            .extract("Apple")
            .await;
        match outcome {
            StrategyOutcome::Unavailable { reason } => assert!(reason.contains("connection refused")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let config = ExternalConfig {
            timeout: Duration::from_millis(20),
            ..ExternalConfig::default()
        };
        let strategy =
            ExternalExtractionStrategy::new(ScriptedClient::slow(Duration::from_secs(5)), config);

        let outcome = strategy.extract("Apple").await;
        match outcome {
            StrategyOutcome::Unavailable { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_reply_is_extracted_but_empty() {
        let outcome = strategy(ScriptedClient::replying(r#"{"entities": [], "relationships": []}"#))
            .extract("Apple")
            .await;
        match outcome {
            StrategyOutcome::Extracted(result) => assert!(result.is_empty()),
            other => panic!("expected empty extraction, got {other:?}"),
        }
    }

    #[test]
    fn test_confidence_is_clamped_and_defaulted() {
        let strategy = strategy(ScriptedClient::replying("{}"));
        let result = strategy
            .parse_reply(
                r#"{"entities": [
                    {"label": "Rust", "type": "technology", "confidence": 3.5},
                    {"label": "Mozilla", "type": ""}
                ]}"#,
            )
            .unwrap();

        assert_eq!(result.entities[0].confidence, 1.0);
        assert_eq!(result.entities[1].entity_type, "CONCEPT");
        assert_eq!(result.entities[1].confidence, DEFAULT_MODEL_CONFIDENCE);
    }

    #[test]
    fn test_unknown_tags_fall_back() {
        let strategy = strategy(ScriptedClient::replying("{}"));
        let result = strategy
            .parse_reply(
                r#"{"entities": [
                    {"label": "Apple", "type": "company/brand", "confidence": 0.9},
                    {"label": "Steve Jobs", "type": "person", "confidence": 0.9}
                ],
                "relationships": [
                    {"source": "Apple", "target": "Steve Jobs", "type": "was started by", "confidence": 0.9},
                    {"source": "Steve Jobs", "target": "Apple", "type": "works for", "confidence": 0.9}
                ]}"#,
            )
            .unwrap();

        assert_eq!(result.entities[0].entity_type, "CONCEPT");
        assert_eq!(result.entities[1].entity_type, "PERSON");
        assert_eq!(result.relationships[0].relation_type, "RELATED_TO");
        assert_eq!(result.relationships[1].relation_type, "WORKS_FOR");
    }

    #[test]
    fn test_prompt_is_bounded_and_lists_types() {
        let config = ExternalConfig {
            max_prompt_chars: 5,
            ..ExternalConfig::default()
        };
        let strategy = ExternalExtractionStrategy::new(ScriptedClient::replying("{}"), config);
        let prompt = strategy.build_prompt("Zürich is lovely");

        assert!(prompt.contains("<text>\nZüric\n</text>"));
        assert!(prompt.contains("PERSON"));
        assert!(prompt.contains("FOUNDED_BY"));
        assert!(!prompt.contains("lovely"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_technical_terms() {
        assert!(is_technical_term("PDF"));
        assert!(is_technical_term("report.docx"));
        assert!(is_technical_term("Knowledge Graph"));
        assert!(is_technical_term("JSON parser"));
        assert!(!is_technical_term("Apple"));
        assert!(!is_technical_term("Graph Theory Society"));
    }
}
