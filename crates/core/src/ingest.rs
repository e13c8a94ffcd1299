use crate::chunking::{split_sentences, SemanticChunker};
use crate::error::IndexError;
use crate::models::{Chunk, PageText, Paragraph};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// OCR export for one page. Paragraphs arrive either pre-segmented into
/// sentences or as raw text that we segment ourselves.
#[derive(Debug, Deserialize)]
struct RawPageFile {
    document_id: String,
    page_number: u32,
    paragraphs: Vec<RawParagraph>,
}

#[derive(Debug, Deserialize)]
struct RawParagraph {
    paragraph_id: String,
    #[serde(default)]
    sentences: Vec<String>,
    #[serde(default)]
    text: Option<String>,
}

pub fn discover_page_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn load_page_text(path: &Path) -> Result<PageText, IndexError> {
    let raw = fs::read_to_string(path)?;
    let parsed: RawPageFile =
        serde_json::from_str(&raw).map_err(|error| IndexError::PageParse {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;

    let paragraphs = parsed
        .paragraphs
        .into_iter()
        .map(|paragraph| {
            let sentences = if paragraph.sentences.is_empty() {
                paragraph
                    .text
                    .as_deref()
                    .map(split_sentences)
                    .unwrap_or_default()
            } else {
                paragraph.sentences
            };
            Paragraph {
                paragraph_id: paragraph.paragraph_id,
                sentences,
            }
        })
        .collect();

    Ok(PageText {
        document_id: parsed.document_id,
        page_number: parsed.page_number,
        paragraphs,
    })
}

#[derive(Debug)]
pub struct SkippedPage {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestionReport {
    pub chunks: Vec<Chunk>,
    pub skipped_files: Vec<SkippedPage>,
}

/// Walks a folder of OCR page exports and chunks every page it can
/// read. A file that fails to parse or chunk is recorded and skipped;
/// it never aborts the rest of the folder.
pub async fn ingest_folder_chunks_best_effort(
    folder: &Path,
    chunker: &SemanticChunker<'_>,
) -> Result<IngestionReport, IndexError> {
    let files = discover_page_files(folder);

    if files.is_empty() {
        return Err(IndexError::InvalidArgument(format!(
            "no page files found in {}",
            folder.display()
        )));
    }

    let mut chunks = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let outcome = match load_page_text(&path) {
            Ok(page) => chunker.chunk_page(&page).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(page_chunks) => chunks.extend(page_chunks),
            Err(error) => skipped_files.push(SkippedPage {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        chunks,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LanguageClassifier;
    use crate::embeddings::HashedNgramEmbedder;
    use crate::models::ChunkingOptions;
    use std::io::Write;

    fn write_page(dir: &Path, name: &str, body: &str) {
        let mut file = fs::File::create(dir.join(name)).expect("create");
        file.write_all(body.as_bytes()).expect("write");
    }

    #[test]
    fn raw_paragraph_text_is_sentence_segmented() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_page(
            dir.path(),
            "page-1.json",
            r#"{
                "document_id": "doc-1",
                "page_number": 1,
                "paragraphs": [
                    {"paragraph_id": "p1", "text": "पहला वाक्य। दूसरा वाक्य।"}
                ]
            }"#,
        );

        let page = load_page_text(&dir.path().join("page-1.json")).expect("load");
        assert_eq!(page.paragraphs.len(), 1);
        assert_eq!(
            page.paragraphs[0].sentences,
            vec!["पहला वाक्य।", "दूसरा वाक्य।"]
        );
    }

    #[tokio::test]
    async fn unreadable_page_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_page(
            dir.path(),
            "good.json",
            r#"{
                "document_id": "doc-1",
                "page_number": 1,
                "paragraphs": [
                    {"paragraph_id": "p1", "sentences": ["कोई वाक्य।"]}
                ]
            }"#,
        );
        write_page(dir.path(), "bad.json", "{not json");

        let embedder = HashedNgramEmbedder::default();
        let classifier = LanguageClassifier::rule_based_only();
        let chunker =
            SemanticChunker::new(&embedder, &classifier, ChunkingOptions::default());

        let report = ingest_folder_chunks_best_effort(dir.path(), &chunker)
            .await
            .expect("ingest");
        assert_eq!(report.chunks.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.skipped_files[0].path.ends_with("bad.json"));
    }

    #[tokio::test]
    async fn empty_folder_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let embedder = HashedNgramEmbedder::default();
        let classifier = LanguageClassifier::rule_based_only();
        let chunker =
            SemanticChunker::new(&embedder, &classifier, ChunkingOptions::default());

        let error = ingest_folder_chunks_best_effort(dir.path(), &chunker)
            .await
            .expect_err("must fail");
        assert!(matches!(error, IndexError::InvalidArgument(_)));
    }
}
