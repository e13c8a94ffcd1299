use crate::classify::LanguageClassifier;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::IndexError;
use crate::models::{Chunk, ChunkStrategy, ChunkingOptions, PageText, Paragraph};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn sentence_boundary() -> &'static Regex {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    BOUNDARY.get_or_init(|| Regex::new(r"(?:॥|।|[.!?])\s*").expect("constant pattern"))
}

/// Splits raw OCR paragraph text on danda and western sentence
/// terminators, keeping the terminator with its sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let boundary = sentence_boundary();

    let mut sentences = Vec::new();
    let mut last = 0;
    for found in boundary.find_iter(text) {
        let sentence = text[last..found.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        last = found.end();
    }
    let tail = text[last..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

pub fn make_chunk_id(
    document_id: &str,
    page_number: u32,
    paragraph_id: &str,
    chunk_in_para_index: u32,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page_number.to_le_bytes());
    hasher.update(paragraph_id.as_bytes());
    hasher.update(chunk_in_para_index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// A chunk boundary decision before ids and language tags are attached.
struct DraftChunk {
    /// Paragraph the chunk begins in.
    paragraph_id: String,
    text: String,
}

/// Splits a page into retrieval units. Boundaries fall between
/// paragraphs; only a paragraph exceeding the size budget is split at
/// sentence boundaries. The embedder is consulted by the dynamic
/// strategy only; the classifier tags every produced chunk.
pub struct SemanticChunker<'a> {
    embedder: &'a dyn Embedder,
    classifier: &'a LanguageClassifier,
    options: ChunkingOptions,
}

impl<'a> SemanticChunker<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        classifier: &'a LanguageClassifier,
        options: ChunkingOptions,
    ) -> Self {
        Self {
            embedder,
            classifier,
            options,
        }
    }

    pub async fn chunk_page(&self, page: &PageText) -> Result<Vec<Chunk>, IndexError> {
        let paragraphs: Vec<&Paragraph> = page
            .paragraphs
            .iter()
            .filter(|paragraph| !paragraph.text().trim().is_empty())
            .collect();

        if paragraphs.is_empty() {
            return Ok(Vec::new());
        }

        let drafts = match self.options.strategy {
            ChunkStrategy::Fixed => self.fixed_drafts(&paragraphs),
            ChunkStrategy::Dynamic => self.dynamic_drafts(&paragraphs).await?,
        };

        self.finalize(page, drafts).await
    }

    fn fixed_drafts(&self, paragraphs: &[&Paragraph]) -> Vec<DraftChunk> {
        let budget = self.options.chunk_size;
        let mut drafts: Vec<DraftChunk> = Vec::new();
        let mut current: Option<DraftChunk> = None;

        for paragraph in paragraphs {
            let text = paragraph.text();

            if text.chars().count() > budget {
                if let Some(done) = current.take() {
                    drafts.push(done);
                }
                drafts.extend(split_oversized(paragraph, budget));
                continue;
            }

            let fits = current
                .as_ref()
                .is_some_and(|chunk| {
                    chunk.text.chars().count() + 2 + text.chars().count() <= budget
                });

            if fits {
                if let Some(chunk) = current.as_mut() {
                    chunk.text.push_str("\n\n");
                    chunk.text.push_str(&text);
                }
                continue;
            }

            if let Some(done) = current.take() {
                drafts.push(done);
            }

            // The carried tail counts against the budget; when it does
            // not fit alongside the paragraph it is dropped, never
            // allowed to push the chunk past the size budget.
            let overlap = drafts
                .last()
                .map(|previous| tail_chars(&previous.text, self.options.chunk_overlap))
                .unwrap_or_default();
            let body = if overlap.is_empty()
                || overlap.chars().count() + 2 + text.chars().count() > budget
            {
                text
            } else {
                format!("{overlap}\n\n{text}")
            };
            current = Some(DraftChunk {
                paragraph_id: paragraph.paragraph_id.clone(),
                text: body,
            });
        }

        if let Some(done) = current {
            drafts.push(done);
        }

        drafts
    }

    async fn dynamic_drafts(
        &self,
        paragraphs: &[&Paragraph],
    ) -> Result<Vec<DraftChunk>, IndexError> {
        let budget = self.options.chunk_size;
        let mut drafts: Vec<DraftChunk> = Vec::new();
        let mut current: Option<DraftChunk> = None;
        let mut centroid: Vec<f32> = Vec::new();
        let mut member_count = 0usize;

        for paragraph in paragraphs {
            let text = paragraph.text();

            // An oversized paragraph is hard-split at sentence boundaries
            // and does not count as a similarity-boundary event.
            if text.chars().count() > budget {
                if let Some(done) = current.take() {
                    drafts.push(done);
                }
                drafts.extend(split_oversized(paragraph, budget));
                centroid.clear();
                member_count = 0;
                continue;
            }

            let embedding = self.embedder.embed(&text).await?;

            let belongs = current.as_ref().is_some_and(|chunk| {
                let similarity = cosine_similarity(&centroid, &embedding);
                let over_budget =
                    chunk.text.chars().count() + 2 + text.chars().count() > budget;
                similarity >= self.options.similarity_threshold && !over_budget
            });

            if belongs {
                if let Some(chunk) = current.as_mut() {
                    chunk.text.push_str("\n\n");
                    chunk.text.push_str(&text);
                }
                // Incremental running mean over member paragraphs.
                let next = member_count as f32 + 1.0;
                for (slot, value) in centroid.iter_mut().zip(embedding.iter()) {
                    *slot += (value - *slot) / next;
                }
                member_count += 1;
            } else {
                if let Some(done) = current.take() {
                    drafts.push(done);
                }
                current = Some(DraftChunk {
                    paragraph_id: paragraph.paragraph_id.clone(),
                    text,
                });
                centroid = embedding;
                member_count = 1;
            }
        }

        if let Some(done) = current {
            drafts.push(done);
        }

        Ok(drafts)
    }

    async fn finalize(
        &self,
        page: &PageText,
        drafts: Vec<DraftChunk>,
    ) -> Result<Vec<Chunk>, IndexError> {
        let mut chunks = Vec::with_capacity(drafts.len());
        let mut previous_paragraph: Option<String> = None;
        let mut in_para_index = 0u32;

        for draft in drafts {
            if previous_paragraph.as_deref() == Some(draft.paragraph_id.as_str()) {
                in_para_index += 1;
            } else {
                in_para_index = 0;
                previous_paragraph = Some(draft.paragraph_id.clone());
            }

            let classified = self
                .classifier
                .classify(&draft.text, self.options.classify_method)
                .await?;

            chunks.push(Chunk {
                chunk_id: make_chunk_id(
                    &page.document_id,
                    page.page_number,
                    &draft.paragraph_id,
                    in_para_index,
                ),
                document_id: page.document_id.clone(),
                page_number: page.page_number,
                paragraph_id: draft.paragraph_id,
                chunk_in_para_index: in_para_index,
                text: draft.text,
                detected_language: classified.language,
                embedding: None,
            });
        }

        Ok(chunks)
    }
}

/// Greedy sentence packing for a paragraph over the size budget. A
/// single sentence longer than the budget becomes its own chunk.
fn split_oversized(paragraph: &Paragraph, budget: usize) -> Vec<DraftChunk> {
    let mut pieces: Vec<DraftChunk> = Vec::new();
    let mut current = String::new();

    for sentence in paragraph
        .sentences
        .iter()
        .map(|sentence| sentence.trim())
        .filter(|sentence| !sentence.is_empty())
    {
        if current.is_empty() {
            current.push_str(sentence);
            continue;
        }

        if current.chars().count() + 1 + sentence.chars().count() <= budget {
            current.push(' ');
            current.push_str(sentence);
        } else {
            pieces.push(DraftChunk {
                paragraph_id: paragraph.paragraph_id.clone(),
                text: std::mem::take(&mut current),
            });
            current.push_str(sentence);
        }
    }

    if !current.is_empty() {
        pieces.push(DraftChunk {
            paragraph_id: paragraph.paragraph_id.clone(),
            text: current,
        });
    }

    pieces
}

fn tail_chars(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(count);
    chars[start..].iter().collect()
}
