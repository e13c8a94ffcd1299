use crate::error::SearchError;
use crate::models::{IndexRecord, LexicalHit, VectorHit};
use crate::retrieval::{KnnPlan, LexicalPlan};
use async_trait::async_trait;

/// One lexical result page plus the exact total across all pages.
#[derive(Debug, Clone)]
pub struct LexicalPage {
    pub hits: Vec<LexicalHit>,
    pub total: u64,
}

/// The external search backend. Writes are upserts keyed on `chunk_id`;
/// re-indexing a chunk replaces the stored record rather than
/// duplicating it.
#[async_trait]
pub trait SearchBackend {
    /// Idempotent index bootstrap: analyzers, knn mapping, facet object.
    async fn ensure_index(&self, dimensions: usize) -> Result<(), SearchError>;

    async fn index_records(&self, records: &[IndexRecord]) -> Result<(), SearchError>;

    async fn lexical_search(
        &self,
        query: &str,
        plan: &LexicalPlan,
    ) -> Result<LexicalPage, SearchError>;

    async fn knn_search(
        &self,
        vector: &[f32],
        plan: &KnnPlan,
    ) -> Result<Vec<VectorHit>, SearchError>;
}
