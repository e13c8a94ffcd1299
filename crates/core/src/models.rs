use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OCR-extracted page. Immutable once produced by the extraction
/// pipeline; paragraph and sentence order is the reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub document_id: String,
    pub page_number: u32,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub paragraph_id: String,
    pub sentences: Vec<String>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.sentences.join(" ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hindi,
    Gujarati,
    Sanskrit,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Hindi => "hindi",
            Language::Gujarati => "gujarati",
            Language::Sanskrit => "sanskrit",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic retrievable unit. Splits occur between paragraphs, except
/// when a single paragraph exceeds the size budget, in which case it is
/// split at sentence boundaries. Never mutated after creation;
/// re-chunking replaces records by `chunk_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    /// Paragraph the chunk starts in.
    pub paragraph_id: String,
    /// Position among chunks beginning within the same paragraph.
    pub chunk_in_para_index: u32,
    pub text: String,
    pub detected_language: Language,
    /// Assigned by the indexing assembler; `None` until then, and kept
    /// `None` when the embedding provider failed for this chunk.
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Fixed,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct ChunkingOptions {
    pub strategy: ChunkStrategy,
    /// Character budget per chunk.
    pub chunk_size: usize,
    /// Tail carried forward between fixed-strategy chunks, in characters.
    pub chunk_overlap: usize,
    /// Dynamic strategy: start a new chunk when centroid similarity to the
    /// next paragraph drops below this.
    pub similarity_threshold: f32,
    /// Classification method used to tag each chunk.
    pub classify_method: ClassifyMethod,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::Fixed,
            chunk_size: 1_200,
            chunk_overlap: 120,
            similarity_threshold: 0.55,
            classify_method: ClassifyMethod::RuleBased,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassifyMethod {
    RuleBased,
    Fasttext,
    IndicBert,
    Hybrid,
}

impl std::fmt::Display for ClassifyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClassifyMethod::RuleBased => "rule_based",
            ClassifyMethod::Fasttext => "fasttext",
            ClassifyMethod::IndicBert => "indicbert",
            ClassifyMethod::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub text: String,
    pub language: Language,
    /// In [0, 1]; 0.5 means maximal uncertainty for a binary decision.
    pub confidence: f32,
    pub method: ClassifyMethod,
    pub details: MethodDetails,
}

/// Method-specific diagnostics carried alongside the label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum MethodDetails {
    RuleSignals {
        gujarati_char_ratio: f32,
        sanskrit_marker_ratio: f32,
        sanskrit_word_hits: usize,
        token_count: usize,
    },
    ModelScores {
        probabilities: Vec<(Language, f32)>,
    },
    HybridTrace {
        short_circuited: bool,
        consulted: Vec<ClassifyMethod>,
    },
}

/// A retrieval request as it arrives from the outer API surface.
///
/// Facet filters are ANDed across facets and ORed within one facet.
/// Pagination applies to the lexical channel only; the vector channel
/// always returns the full top-K set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    #[serde(default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub language: Option<Language>,
    /// 0 means exact phrase; N maps to a slop of N.
    #[serde(default)]
    pub proximity_distance: u32,
    #[serde(default)]
    pub allow_typos: bool,
    #[serde(default)]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalHit {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub paragraph_id: String,
    pub score: f64,
    /// Highlighted fragment with `<em>` markup around matched terms.
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub paragraph_id: String,
    pub language: Option<Language>,
    pub text: String,
    pub score: f64,
}

/// Two independent result channels, never fused into one ranked list:
/// the UI presents lexical and semantic matches separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResponse {
    pub lexical: Vec<LexicalHit>,
    /// Exact lexical match count across all pages.
    pub lexical_total: u64,
    pub vector: Vec<VectorHit>,
    pub vector_total: u64,
    /// Set when the vector sub-query failed and only the lexical channel
    /// is populated.
    pub degraded: bool,
}

/// A chunk mapped onto the backend record schema. Written with
/// upsert-by-id semantics keyed on `chunk_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub paragraph_id: String,
    pub chunk_in_para_index: u32,
    /// Language-neutral full-text field, always populated.
    pub text: String,
    /// Hindi-analyzed field; Sanskrit text is routed here as well.
    pub text_hi: Option<String>,
    pub text_gu: Option<String>,
    pub language: Language,
    pub embedding: Option<Vec<f32>>,
    pub metadata: BTreeMap<String, String>,
    pub indexed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_serializes_lowercase() {
        let value = serde_json::to_value(Language::Sanskrit).expect("serialize");
        assert_eq!(value, serde_json::json!("sanskrit"));
    }

    #[test]
    fn retrieval_request_defaults_apply() {
        let request: RetrievalRequest =
            serde_json::from_str(r#"{"query": "गीता"}"#).expect("deserialize");
        assert_eq!(request.page, 0);
        assert_eq!(request.page_size, 10);
        assert!(!request.allow_typos);
        assert_eq!(request.proximity_distance, 0);
        assert!(request.filters.is_empty());
    }
}
