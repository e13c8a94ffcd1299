use crate::embeddings::Embedder;
use crate::models::{Chunk, IndexRecord, Language};
use chrono::Utc;
use std::collections::BTreeMap;

/// A chunk whose embedding could not be computed. The chunk is still
/// indexed for lexical search with a null vector; re-indexing it later
/// by the same `chunk_id` overwrites the record.
#[derive(Debug, Clone)]
pub struct EmbeddingFailure {
    pub chunk_id: String,
    pub details: String,
}

#[derive(Debug, Clone)]
pub struct AssemblyReport {
    pub records: Vec<IndexRecord>,
    pub embedding_failures: Vec<EmbeddingFailure>,
}

impl AssemblyReport {
    pub fn is_partial(&self) -> bool {
        !self.embedding_failures.is_empty()
    }
}

/// Maps chunker output onto the backend record schema: one embedding
/// per chunk and the language-routed text fields. Never talks to OCR or
/// the crawler; it is handed already-chunked pages.
pub struct IndexingAssembler<'a> {
    embedder: &'a dyn Embedder,
    metadata: BTreeMap<String, String>,
}

impl<'a> IndexingAssembler<'a> {
    pub fn new(embedder: &'a dyn Embedder, metadata: BTreeMap<String, String>) -> Self {
        Self { embedder, metadata }
    }

    pub async fn assemble(&self, chunks: &[Chunk]) -> AssemblyReport {
        let mut records = Vec::with_capacity(chunks.len());
        let mut embedding_failures = Vec::new();

        for chunk in chunks {
            let embedding = match self.embedder.embed(&chunk.text).await {
                Ok(vector) => Some(vector),
                Err(error) => {
                    embedding_failures.push(EmbeddingFailure {
                        chunk_id: chunk.chunk_id.clone(),
                        details: error.to_string(),
                    });
                    None
                }
            };

            // Sanskrit text goes through the Hindi analyzer.
            let (text_hi, text_gu) = match chunk.detected_language {
                Language::Hindi | Language::Sanskrit => (Some(chunk.text.clone()), None),
                Language::Gujarati => (None, Some(chunk.text.clone())),
            };

            records.push(IndexRecord {
                chunk_id: chunk.chunk_id.clone(),
                document_id: chunk.document_id.clone(),
                page_number: chunk.page_number,
                paragraph_id: chunk.paragraph_id.clone(),
                chunk_in_para_index: chunk.chunk_in_para_index,
                text: chunk.text.clone(),
                text_hi,
                text_gu,
                language: chunk.detected_language,
                embedding,
                metadata: self.metadata.clone(),
                indexed_at: Utc::now(),
            });
        }

        AssemblyReport {
            records,
            embedding_failures,
        }
    }
}
