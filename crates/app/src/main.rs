use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use granth_search_core::{
    ingest_folder_chunks_best_effort, ChunkStrategy, ChunkingOptions, ClassifierOptions,
    ClassifyMethod, Embedder, HashedNgramEmbedder, IndexingAssembler, Language,
    LanguageClassifier, OpenSearchStore, RemoteEmbedder, RemoteScriptModel, RetrievalEngine,
    RetrievalRequest, ScriptModel, SearchBackend, SemanticChunker, DEFAULT_EMBEDDING_DIMENSIONS,
    DEFAULT_KNN_TOP_K,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "granth-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL
    #[arg(long, env = "OPENSEARCH_URL", default_value = "http://localhost:9200")]
    opensearch_url: String,

    /// OpenSearch index name
    #[arg(long, env = "OPENSEARCH_INDEX", default_value = "granth_chunks")]
    opensearch_index: String,

    /// Embedding sidecar URL; falls back to the offline hashed-ngram
    /// embedder when unset.
    #[arg(long, env = "EMBEDDER_URL")]
    embedder_url: Option<String>,

    /// Embedding vector dimension
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Fasttext classifier sidecar URL
    #[arg(long, env = "FASTTEXT_URL")]
    fasttext_url: Option<String>,

    /// IndicBERT classifier sidecar URL
    #[arg(long, env = "INDICBERT_URL")]
    indicbert_url: Option<String>,

    /// Timeout for backend and model calls, in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, classify and index a folder of OCR page exports.
    Index {
        /// Folder containing page JSON files, searched recursively.
        #[arg(long)]
        folder: String,
        /// Chunking strategy: fixed or dynamic.
        #[arg(long, default_value = "fixed")]
        strategy: String,
        /// Character budget per chunk.
        #[arg(long, default_value = "1200")]
        chunk_size: usize,
        /// Overlap carried between fixed-strategy chunks.
        #[arg(long, default_value = "120")]
        chunk_overlap: usize,
        /// Dynamic strategy topic-shift threshold.
        #[arg(long, default_value = "0.55")]
        similarity_threshold: f32,
        /// Classification method used to tag chunks.
        #[arg(long, default_value = "rule_based")]
        classify_method: String,
        /// Facet metadata attached to every record, as name=value.
        #[arg(long = "meta")]
        metadata: Vec<String>,
    },
    /// Run a hybrid lexical + vector query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Facet filter, as name=value. Repeat for more values.
        #[arg(long = "facet")]
        facets: Vec<String>,
        /// Restrict to one language: hindi, gujarati or sanskrit.
        #[arg(long)]
        language: Option<String>,
        /// Word-distance tolerance; 0 means exact phrase.
        #[arg(long, default_value = "0")]
        proximity: u32,
        /// Enable edit-distance typo tolerance.
        #[arg(long, default_value_t = false)]
        typos: bool,
        /// Lexical result page number, zero-based.
        #[arg(long, default_value = "0")]
        page: usize,
        #[arg(long, default_value = "10")]
        page_size: usize,
        /// Vector channel top-K cap.
        #[arg(long, default_value_t = DEFAULT_KNN_TOP_K)]
        top_k: usize,
    },
    /// Classify text spans for language.
    Classify {
        /// A single text span.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// A file of newline-separated spans, classified as a batch.
        #[arg(long)]
        file: Option<String>,
        /// rule_based, fasttext, indicbert or hybrid.
        #[arg(long, default_value = "hybrid")]
        method: String,
    },
}

fn parse_method(name: &str) -> anyhow::Result<ClassifyMethod> {
    match name {
        "rule_based" => Ok(ClassifyMethod::RuleBased),
        "fasttext" => Ok(ClassifyMethod::Fasttext),
        "indicbert" => Ok(ClassifyMethod::IndicBert),
        "hybrid" => Ok(ClassifyMethod::Hybrid),
        other => bail!("unknown classification method: {other}"),
    }
}

fn parse_language(name: &str) -> anyhow::Result<Language> {
    match name {
        "hindi" => Ok(Language::Hindi),
        "gujarati" => Ok(Language::Gujarati),
        "sanskrit" => Ok(Language::Sanskrit),
        other => bail!("unknown language: {other}"),
    }
}

fn parse_strategy(name: &str) -> anyhow::Result<ChunkStrategy> {
    match name {
        "fixed" => Ok(ChunkStrategy::Fixed),
        "dynamic" => Ok(ChunkStrategy::Dynamic),
        other => bail!("unknown chunking strategy: {other}"),
    }
}

fn parse_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .with_context(|| format!("expected name=value, got: {pair}"))
        })
        .collect()
}

fn build_embedder(cli: &Cli, timeout: Duration) -> anyhow::Result<Arc<dyn Embedder>> {
    match &cli.embedder_url {
        Some(url) => Ok(Arc::new(RemoteEmbedder::new(
            url,
            cli.embedding_dimensions,
            timeout,
        )?)),
        None => Ok(Arc::new(HashedNgramEmbedder {
            dimensions: cli.embedding_dimensions,
        })),
    }
}

fn build_classifier(cli: &Cli, timeout: Duration) -> anyhow::Result<LanguageClassifier> {
    let fasttext: Option<Arc<dyn ScriptModel>> = match &cli.fasttext_url {
        Some(url) => Some(Arc::new(RemoteScriptModel::new(url, "fasttext", timeout)?)),
        None => None,
    };
    let indicbert: Option<Arc<dyn ScriptModel>> = match &cli.indicbert_url {
        Some(url) => Some(Arc::new(RemoteScriptModel::new(url, "indicbert", timeout)?)),
        None => None,
    };
    Ok(LanguageClassifier::new(
        fasttext,
        indicbert,
        ClassifierOptions::default(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "granth-search boot"
    );

    match &cli.command {
        Command::Index {
            folder,
            strategy,
            chunk_size,
            chunk_overlap,
            similarity_threshold,
            classify_method,
            metadata,
        } => {
            let embedder = build_embedder(&cli, timeout)?;
            let classifier = build_classifier(&cli, timeout)?;
            let options = ChunkingOptions {
                strategy: parse_strategy(strategy)?,
                chunk_size: *chunk_size,
                chunk_overlap: *chunk_overlap,
                similarity_threshold: *similarity_threshold,
                classify_method: parse_method(classify_method)?,
            };

            let chunker = SemanticChunker::new(embedder.as_ref(), &classifier, options);
            let report = ingest_folder_chunks_best_effort(Path::new(folder), &chunker).await?;

            if !report.skipped_files.is_empty() {
                warn!(skipped = report.skipped_files.len(), folder = %folder, "skipped page files");
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped page");
                }
            }

            info!(folder = %folder, chunk_count = report.chunks.len(), "assembling records");

            let doc_metadata: BTreeMap<String, String> =
                parse_pairs(metadata)?.into_iter().collect();
            let assembler = IndexingAssembler::new(embedder.as_ref(), doc_metadata);
            let assembly = assembler.assemble(&report.chunks).await;

            for failure in &assembly.embedding_failures {
                warn!(
                    chunk_id = %failure.chunk_id,
                    reason = %failure.details,
                    "chunk indexed lexical-only; embedding failed"
                );
            }

            let store =
                OpenSearchStore::new(&cli.opensearch_url, &cli.opensearch_index, timeout)?;
            store.ensure_index(embedder.dimensions()).await?;
            store.index_records(&assembly.records).await?;

            println!(
                "{} chunks indexed ({} lexical-only) at {}",
                assembly.records.len(),
                assembly.embedding_failures.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Search {
            query,
            facets,
            language,
            proximity,
            typos,
            page,
            page_size,
            top_k,
        } => {
            let mut filters: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (name, value) in parse_pairs(facets)? {
                filters.entry(name).or_default().push(value);
            }

            let request = RetrievalRequest {
                query: query.clone(),
                filters,
                language: language.as_deref().map(parse_language).transpose()?,
                proximity_distance: *proximity,
                allow_typos: *typos,
                page: *page,
                page_size: *page_size,
            };

            let embedder = build_embedder(&cli, timeout)?;
            let store =
                OpenSearchStore::new(&cli.opensearch_url, &cli.opensearch_index, timeout)?;
            let engine = RetrievalEngine::new(store, embedder, *top_k);

            let response = engine.search(&request).await?;

            if response.degraded {
                warn!("vector search unavailable; lexical results only");
            }

            println!(
                "lexical matches: {} (showing page {} of {})",
                response.lexical_total,
                request.page,
                response.lexical.len()
            );
            for hit in &response.lexical {
                println!(
                    "[lexical] score={:.4} document={} page={} chunk={}",
                    hit.score, hit.document_id, hit.page_number, hit.chunk_id
                );
                if !hit.snippet.is_empty() {
                    println!("  snippet: {}", hit.snippet);
                }
            }

            println!("semantic matches: {}", response.vector_total);
            for hit in &response.vector {
                println!(
                    "[vector] score={:.4} document={} page={} language={}",
                    hit.score,
                    hit.document_id,
                    hit.page_number,
                    hit.language.map(|l| l.as_str()).unwrap_or("unknown")
                );
                println!("  text: {}", hit.text);
            }
        }
        Command::Classify { text, file, method } => {
            let classifier = build_classifier(&cli, timeout)?;
            let method = parse_method(method)?;

            let lines: Vec<String> = match (text, file) {
                (Some(span), None) => vec![span.clone()],
                (None, Some(path)) => tokio::fs::read_to_string(path)
                    .await?
                    .lines()
                    .map(str::to_string)
                    .collect(),
                _ => bail!("provide exactly one of --text or --file"),
            };

            let results = classifier.classify_batch(&lines, method).await;
            for (line, result) in lines.iter().zip(results) {
                match result {
                    Ok(outcome) => println!(
                        "{}\t{}\t{:.3}\t{}",
                        outcome.language, outcome.method, outcome.confidence, line
                    ),
                    Err(error) => println!("error\t{method}\t-\t{line}\t({error})"),
                }
            }
        }
    }

    Ok(())
}
