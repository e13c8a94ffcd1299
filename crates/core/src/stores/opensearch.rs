use crate::error::SearchError;
use crate::models::{IndexRecord, Language, LexicalHit, VectorHit};
use crate::retrieval::{FilterClause, KnnPlan, LexicalPlan};
use crate::traits::{LexicalPage, SearchBackend};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

const HIGHLIGHT_FIELDS: [&str; 3] = ["text", "text_hi", "text_gu"];

/// OpenSearch-backed index: one language-neutral text field, Indic
/// analyzers for the per-language fields and an HNSW cosine knn vector.
pub struct OpenSearchStore {
    client: Client,
    endpoint: String,
    index_name: String,
}

impl OpenSearchStore {
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            index_name: index_name.into(),
        })
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.index_name)
    }
}

#[async_trait]
impl SearchBackend for OpenSearchStore {
    async fn ensure_index(&self, dimensions: usize) -> Result<(), SearchError> {
        let response = self
            .client
            .head(self.index_url())
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        if response.status() == StatusCode::OK {
            return Ok(());
        }

        if !response.status().is_client_error() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let response = self
            .client
            .put(self.index_url())
            .json(&index_definition(dimensions))
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: format!("index setup failed with {}", response.status()),
            });
        }

        Ok(())
    }

    async fn index_records(&self, records: &[IndexRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut operations = Vec::with_capacity(records.len() * 2);
        for record in records {
            operations.push(json!({
                "index": {
                    "_index": self.index_name,
                    "_id": record.chunk_id,
                }
            }));
            operations.push(record_body(record)?);
        }

        let payload: String = operations
            .into_iter()
            .map(|value| serde_json::to_string(&value))
            .collect::<Result<Vec<_>, serde_json::Error>>()?
            .join("\n")
            + "\n";

        let response = self
            .client
            .post(format!("{}/_bulk", self.endpoint))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn lexical_search(
        &self,
        query: &str,
        plan: &LexicalPlan,
    ) -> Result<LexicalPage, SearchError> {
        let body = json!({
            "from": plan.from,
            "size": plan.size,
            "track_total_hits": true,
            "query": {
                "bool": {
                    "must": [match_clause(query, plan)],
                    "filter": filter_values(&plan.filters),
                }
            },
            "highlight": {
                "pre_tags": ["<em>"],
                "post_tags": ["</em>"],
                "fields": {
                    "text": {},
                    "text_hi": {},
                    "text_gu": {},
                }
            },
        });

        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&body)
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        parse_lexical_page(&payload)
    }

    async fn knn_search(
        &self,
        vector: &[f32],
        plan: &KnnPlan,
    ) -> Result<Vec<VectorHit>, SearchError> {
        let mut knn = json!({
            "vector": vector,
            "k": plan.k,
        });
        if !plan.filters.is_empty() {
            knn["filter"] = json!({"bool": {"filter": filter_values(&plan.filters)}});
        }

        let body = json!({
            "size": plan.k,
            "query": {
                "knn": {
                    "embedding": knn
                }
            },
        });

        let response = self
            .client
            .post(format!("{}/_search", self.index_url()))
            .json(&body)
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "opensearch".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        parse_knn_hits(&payload)
    }
}

fn unavailable(details: String) -> SearchError {
    SearchError::BackendUnavailable {
        backend: "opensearch".to_string(),
        details,
    }
}

fn index_definition(dimensions: usize) -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0,
            "index.knn": true,
            "analysis": {
                "analyzer": {
                    "hindi_text": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": [
                            "lowercase",
                            "decimal_digit",
                            "indic_normalization",
                            "hindi_normalization",
                            "hindi_stop",
                            "hindi_stemmer"
                        ]
                    },
                    "gujarati_text": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": [
                            "lowercase",
                            "decimal_digit",
                            "indic_normalization"
                        ]
                    }
                },
                "filter": {
                    "hindi_stop": {"type": "stop", "stopwords": "_hindi_"},
                    "hindi_stemmer": {"type": "stemmer", "language": "hindi"}
                }
            }
        },
        "mappings": {
            "properties": {
                "chunk_id": {"type": "keyword"},
                "document_id": {"type": "keyword"},
                "paragraph_id": {"type": "keyword"},
                "page_number": {"type": "integer"},
                "chunk_in_para_index": {"type": "integer"},
                "language": {"type": "keyword"},
                "text": {"type": "text", "analyzer": "standard"},
                "text_hi": {"type": "text", "analyzer": "hindi_text"},
                "text_gu": {"type": "text", "analyzer": "gujarati_text"},
                "embedding": {
                    "type": "knn_vector",
                    "dimension": dimensions,
                    "method": {
                        "name": "hnsw",
                        "space_type": "cosinesimil",
                        "engine": "nmslib"
                    }
                },
                "metadata": {"type": "object", "dynamic": true},
                "indexed_at": {"type": "date"}
            }
        }
    })
}

/// A chunk with no embedding is still indexed for lexical search; the
/// knn field is simply absent from its record.
fn record_body(record: &IndexRecord) -> Result<Value, SearchError> {
    let mut body = serde_json::to_value(record)?;
    if record.embedding.is_none() {
        if let Some(map) = body.as_object_mut() {
            map.remove("embedding");
        }
    }
    Ok(body)
}

fn match_clause(query: &str, plan: &LexicalPlan) -> Value {
    let phrase = json!({
        "multi_match": {
            "query": query,
            "fields": plan.fields,
            "type": "phrase",
            "slop": plan.slop,
        }
    });

    match &plan.fuzziness {
        None => phrase,
        // Fuzzy matching carries the query; the phrase clause only
        // boosts near-phrase hits. Plan slop is already forced >= 1.
        Some(fuzziness) => json!({
            "bool": {
                "should": [
                    {
                        "multi_match": {
                            "query": query,
                            "fields": plan.fields,
                            "fuzziness": fuzziness,
                            "operator": "and",
                        }
                    },
                    phrase,
                ],
                "minimum_should_match": 1,
            }
        }),
    }
}

fn filter_values(filters: &[FilterClause]) -> Vec<Value> {
    filters
        .iter()
        .map(|clause| {
            let (kind, body) = if clause.values.len() == 1 {
                ("term", json!(clause.values[0]))
            } else {
                ("terms", json!(clause.values))
            };
            let mut field_map = serde_json::Map::new();
            field_map.insert(clause.field.clone(), body);
            let mut outer = serde_json::Map::new();
            outer.insert(kind.to_string(), Value::Object(field_map));
            Value::Object(outer)
        })
        .collect()
}

fn parse_lexical_page(payload: &Value) -> Result<LexicalPage, SearchError> {
    let total = payload
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let raw_hits = payload
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hits = Vec::with_capacity(raw_hits.len());
    for raw in raw_hits {
        let snippet = HIGHLIGHT_FIELDS
            .iter()
            .find_map(|field| {
                raw.pointer(&format!("/highlight/{field}/0"))
                    .and_then(Value::as_str)
            })
            .unwrap_or_default()
            .to_string();

        hits.push(LexicalHit {
            chunk_id: string_at(&raw, "/_id"),
            document_id: string_at(&raw, "/_source/document_id"),
            page_number: raw
                .pointer("/_source/page_number")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            paragraph_id: string_at(&raw, "/_source/paragraph_id"),
            score: raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
            snippet,
        });
    }

    Ok(LexicalPage { hits, total })
}

fn parse_knn_hits(payload: &Value) -> Result<Vec<VectorHit>, SearchError> {
    let raw_hits = payload
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut hits = Vec::with_capacity(raw_hits.len());
    for raw in raw_hits {
        let language = raw
            .pointer("/_source/language")
            .cloned()
            .and_then(|value| serde_json::from_value::<Language>(value).ok());

        hits.push(VectorHit {
            chunk_id: string_at(&raw, "/_id"),
            document_id: string_at(&raw, "/_source/document_id"),
            page_number: raw
                .pointer("/_source/page_number")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            paragraph_id: string_at(&raw, "/_source/paragraph_id"),
            language,
            text: string_at(&raw, "/_source/text"),
            score: raw.pointer("/_score").and_then(Value::as_f64).unwrap_or(0.0),
        });
    }

    Ok(hits)
}

fn string_at(value: &Value, pointer: &str) -> String {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievalRequest;
    use crate::retrieval::lexical_plan;
    use std::collections::BTreeMap;

    fn request(allow_typos: bool, proximity: u32) -> RetrievalRequest {
        RetrievalRequest {
            query: "सत्यमेव जयते".to_string(),
            filters: BTreeMap::new(),
            language: None,
            proximity_distance: proximity,
            allow_typos,
            page: 0,
            page_size: 10,
        }
    }

    #[test]
    fn exact_phrase_builds_phrase_query_with_requested_slop() {
        let plan = lexical_plan(&request(false, 3));
        let clause = match_clause("सत्यमेव जयते", &plan);
        assert_eq!(clause.pointer("/multi_match/slop"), Some(&json!(3)));
        assert!(clause.pointer("/multi_match/fuzziness").is_none());
    }

    #[test]
    fn typo_tolerance_never_emits_slop_zero() {
        let plan = lexical_plan(&request(true, 0));
        let clause = match_clause("सत्यमेव जयते", &plan);
        let fuzzy = clause
            .pointer("/bool/should/0/multi_match/fuzziness")
            .and_then(Value::as_str);
        assert_eq!(fuzzy, Some("AUTO"));
        let slop = clause
            .pointer("/bool/should/1/multi_match/slop")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        assert!(slop >= 1);
    }

    #[test]
    fn single_value_facet_becomes_term_clause() {
        let clauses = filter_values(&[
            FilterClause {
                field: "metadata.granth".to_string(),
                values: vec!["gita".to_string()],
            },
            FilterClause {
                field: "language".to_string(),
                values: vec!["hindi".to_string(), "sanskrit".to_string()],
            },
        ]);
        assert_eq!(clauses[0], json!({"term": {"metadata.granth": "gita"}}));
        assert_eq!(
            clauses[1],
            json!({"terms": {"language": ["hindi", "sanskrit"]}})
        );
    }

    #[test]
    fn record_without_embedding_omits_the_knn_field() {
        let record = IndexRecord {
            chunk_id: "c1".to_string(),
            document_id: "d1".to_string(),
            page_number: 1,
            paragraph_id: "p1".to_string(),
            chunk_in_para_index: 0,
            text: "कोई पाठ".to_string(),
            text_hi: Some("कोई पाठ".to_string()),
            text_gu: None,
            language: Language::Hindi,
            embedding: None,
            metadata: BTreeMap::new(),
            indexed_at: chrono::Utc::now(),
        };

        let body = record_body(&record).expect("serialize");
        assert!(body.get("embedding").is_none());
        assert_eq!(body.pointer("/chunk_id"), Some(&json!("c1")));
    }

    #[test]
    fn lexical_hits_are_parsed_with_highlights() {
        let payload = json!({
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [{
                    "_id": "chunk-1",
                    "_score": 7.5,
                    "_source": {
                        "document_id": "doc-9",
                        "page_number": 5,
                        "paragraph_id": "p2",
                    },
                    "highlight": {
                        "text_hi": ["<em>सत्यमेव</em> जयते"]
                    }
                }]
            }
        });

        let page = parse_lexical_page(&payload).expect("parse");
        assert_eq!(page.total, 42);
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.hits[0].document_id, "doc-9");
        assert_eq!(page.hits[0].page_number, 5);
        assert_eq!(page.hits[0].snippet, "<em>सत्यमेव</em> जयते");
    }

    #[test]
    fn knn_hits_are_parsed_with_language_and_text() {
        let payload = json!({
            "hits": {
                "hits": [{
                    "_id": "chunk-2",
                    "_score": 0.87,
                    "_source": {
                        "document_id": "doc-9",
                        "page_number": 3,
                        "paragraph_id": "p1",
                        "language": "sanskrit",
                        "text": "धर्मो रक्षति रक्षितः",
                    }
                }]
            }
        });

        let hits = parse_knn_hits(&payload).expect("parse");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].language, Some(Language::Sanskrit));
        assert_eq!(hits[0].text, "धर्मो रक्षति रक्षितः");
    }
}
