use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{Language, RetrievalRequest, RetrievalResponse};
use crate::traits::SearchBackend;
use std::sync::Arc;

pub const DEFAULT_KNN_TOP_K: usize = 10;

/// One exact-match facet constraint: ANDed against the others, ORed
/// across its values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub field: String,
    pub values: Vec<String>,
}

/// The lexical sub-query, resolved from a request before it is handed
/// to the backend. Kept as plain data so the slop/fuzziness rules are
/// testable without a live backend.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalPlan {
    pub fields: Vec<String>,
    pub slop: u32,
    pub fuzziness: Option<String>,
    pub from: usize,
    pub size: usize,
    pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnPlan {
    pub k: usize,
    pub filters: Vec<FilterClause>,
}

fn filter_clauses(request: &RetrievalRequest) -> Vec<FilterClause> {
    let mut clauses: Vec<FilterClause> = request
        .filters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(facet, values)| FilterClause {
            field: format!("metadata.{facet}"),
            values: values.clone(),
        })
        .collect();

    if let Some(language) = request.language {
        clauses.push(FilterClause {
            field: "language".to_string(),
            values: vec![language.as_str().to_string()],
        });
    }

    clauses
}

fn query_fields(language: Option<Language>) -> Vec<String> {
    let mut fields = vec!["text".to_string()];
    match language {
        // Sanskrit is analyzed through the Hindi field.
        None => {
            fields.push("text_hi".to_string());
            fields.push("text_gu".to_string());
        }
        Some(Language::Hindi) | Some(Language::Sanskrit) => fields.push("text_hi".to_string()),
        Some(Language::Gujarati) => fields.push("text_gu".to_string()),
    }
    fields
}

/// Resolves the lexical sub-query. Typo tolerance and an exact-phrase
/// proximity of 0 are mutually exclusive; when a caller asks for both,
/// fuzziness wins and the slop is forced to a minimum of 1.
pub fn lexical_plan(request: &RetrievalRequest) -> LexicalPlan {
    let (slop, fuzziness) = if request.allow_typos {
        (request.proximity_distance.max(1), Some("AUTO".to_string()))
    } else {
        (request.proximity_distance, None)
    };

    LexicalPlan {
        fields: query_fields(request.language),
        slop,
        fuzziness,
        from: request.page.saturating_mul(request.page_size),
        size: request.page_size,
        filters: filter_clauses(request),
    }
}

pub fn knn_plan(request: &RetrievalRequest, top_k: usize) -> KnnPlan {
    KnnPlan {
        k: top_k,
        filters: filter_clauses(request),
    }
}

/// Issues the lexical and vector sub-queries concurrently and shapes
/// the two-channel response. The channels are never merged into one
/// ranked list: the UI presents them as separate tabs.
pub struct RetrievalEngine<B: SearchBackend> {
    backend: B,
    embedder: Arc<dyn Embedder>,
    knn_top_k: usize,
}

impl<B> RetrievalEngine<B>
where
    B: SearchBackend + Send + Sync,
{
    pub fn new(backend: B, embedder: Arc<dyn Embedder>, knn_top_k: usize) -> Self {
        Self {
            backend,
            embedder,
            knn_top_k,
        }
    }

    pub async fn search(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResponse, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::InvalidInput("query is empty".to_string()));
        }
        if request.page_size == 0 {
            return Err(SearchError::InvalidInput("page size is zero".to_string()));
        }

        let lexical = lexical_plan(request);
        let knn = knn_plan(request, self.knn_top_k);

        let lexical_future = self.backend.lexical_search(&request.query, &lexical);
        let vector_future = async {
            let vector = self
                .embedder
                .embed(&request.query)
                .await
                .map_err(|error| SearchError::BackendUnavailable {
                    backend: "embedder".to_string(),
                    details: error.to_string(),
                })?;
            self.backend.knn_search(&vector, &knn).await
        };

        let (lexical_outcome, vector_outcome) = tokio::join!(lexical_future, vector_future);

        // Without the lexical channel there is no page-accurate result
        // to present; the request fails outright.
        let mut page = lexical_outcome.map_err(|error| SearchError::BackendUnavailable {
            backend: "lexical".to_string(),
            details: error.to_string(),
        })?;

        page.hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk_id.cmp(&right.chunk_id))
        });

        // A failed vector sub-query degrades the response instead of
        // aborting it.
        let (vector_hits, degraded) = match vector_outcome {
            Ok(mut hits) => {
                hits.truncate(self.knn_top_k);
                (hits, false)
            }
            Err(_) => (Vec::new(), true),
        };

        Ok(RetrievalResponse {
            lexical: page.hits,
            lexical_total: page.total,
            vector_total: vector_hits.len() as u64,
            vector: vector_hits,
            degraded,
        })
    }
}
