pub mod assembler;
pub mod chunking;
pub mod classify;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod models;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use assembler::{AssemblyReport, EmbeddingFailure, IndexingAssembler};
pub use chunking::{make_chunk_id, split_sentences, SemanticChunker};
pub use classify::{
    ClassifierOptions, LanguageClassifier, RemoteScriptModel, ScriptModel,
};
pub use embeddings::{
    cosine_similarity, Embedder, HashedNgramEmbedder, RemoteEmbedder,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ClassifyError, IndexError, ModelError, SearchError};
pub use ingest::{
    discover_page_files, ingest_folder_chunks_best_effort, load_page_text, IngestionReport,
    SkippedPage,
};
pub use models::{
    ChunkStrategy, Chunk, ChunkingOptions, ClassificationResult, ClassifyMethod, IndexRecord,
    Language, LexicalHit, MethodDetails, PageText, Paragraph, RetrievalRequest,
    RetrievalResponse, VectorHit,
};
pub use retrieval::{
    knn_plan, lexical_plan, FilterClause, KnnPlan, LexicalPlan, RetrievalEngine,
    DEFAULT_KNN_TOP_K,
};
pub use stores::OpenSearchStore;
pub use traits::{LexicalPage, SearchBackend};
