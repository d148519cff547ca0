//! In-memory document store for uploaded files.
//!
//! Ingest extracts text, splits it into overlapping passages and embeds each
//! passage through the model client. Queries fuse a keyword ranking with a
//! vector ranking using RRF; when embeddings are unavailable the keyword
//! ranking is used alone. Everything lives for the process lifetime.

pub mod chunker;
pub mod extractor;
pub mod ranking;

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::ModelClient;

/// Candidates taken from each ranking before fusion.
const CANDIDATES_PER_RANKING: usize = 20;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "does", "for", "from", "how", "in", "is",
    "it", "of", "on", "or", "the", "this", "to", "was", "what", "when", "where", "which", "who",
    "why", "with",
];

/// Metadata for one ingested file.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub filename: String,
    pub sha256: String,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Outcome of an ingest call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub filename: String,
    pub chunks: usize,
    /// Whether passages carry embeddings (false means keyword-only retrieval).
    pub embedded: bool,
    /// The same bytes were already ingested; nothing was added.
    pub duplicate: bool,
}

/// A retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub filename: String,
    pub content: String,
    pub score: f64,
}

#[derive(Debug)]
struct StoredChunk {
    filename: String,
    content: String,
    term_counts: HashMap<String, usize>,
    embedding: Option<Vec<f32>>,
}

#[derive(Debug, Default)]
struct Inner {
    documents: Vec<DocumentInfo>,
    hashes: HashSet<String>,
    chunks: Vec<StoredChunk>,
}

#[derive(Debug, Default)]
pub struct DocumentStore {
    inner: RwLock<Inner>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn documents(&self) -> Vec<DocumentInfo> {
        self.read().documents.clone()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.read()
            .documents
            .iter()
            .map(|d| d.filename.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.read().documents.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.read().chunks.len()
    }

    /// Extract, chunk, embed and store an uploaded file.
    ///
    /// Embedding failures (including an unreachable model) degrade the file
    /// to keyword-only retrieval rather than failing the upload.
    pub async fn ingest(
        &self,
        model: &dyn ModelClient,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestStats> {
        let sha256 = hex::encode(Sha256::digest(bytes));
        if self.read().hashes.contains(&sha256) {
            tracing::info!("Skipping duplicate upload {} ({})", filename, &sha256[..12]);
            return Ok(IngestStats {
                filename: filename.to_string(),
                chunks: 0,
                embedded: false,
                duplicate: true,
            });
        }

        let text = extractor::extract_text(filename, bytes)?;
        let chunks = chunker::chunk_text_default(&text);

        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut embedding_ok = true;
        for chunk in &chunks {
            if !embedding_ok {
                embeddings.push(None);
                continue;
            }
            match model.embed(&chunk.content).await {
                Ok(v) if !v.is_empty() => embeddings.push(Some(v)),
                Ok(_) => {
                    embedding_ok = false;
                    embeddings.push(None);
                }
                Err(e) => {
                    tracing::warn!(
                        "Embedding failed for {}, falling back to keyword retrieval: {}",
                        filename,
                        e
                    );
                    embedding_ok = false;
                    embeddings.push(None);
                }
            }
        }
        let embedded = embedding_ok && !chunks.is_empty();

        let mut inner = self.write();
        // A concurrent ingest may have stored the same bytes while we embedded
        if !inner.hashes.insert(sha256.clone()) {
            return Ok(IngestStats {
                filename: filename.to_string(),
                chunks: 0,
                embedded: false,
                duplicate: true,
            });
        }
        let chunk_count = chunks.len();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            inner.chunks.push(StoredChunk {
                filename: filename.to_string(),
                term_counts: term_counts(&chunk.content),
                content: chunk.content,
                embedding: if embedded { embedding } else { None },
            });
        }
        inner.documents.push(DocumentInfo {
            filename: filename.to_string(),
            sha256,
            chunk_count,
            ingested_at: Utc::now(),
        });

        tracing::info!(
            "Ingested {}: {} chunks, embedded={}",
            filename,
            chunk_count,
            embedded
        );
        Ok(IngestStats {
            filename: filename.to_string(),
            chunks: chunk_count,
            embedded,
            duplicate: false,
        })
    }

    /// Best-matching passages for a question, best first.
    pub async fn query(
        &self,
        model: &dyn ModelClient,
        question: &str,
        limit: usize,
    ) -> Result<Vec<Passage>> {
        let wants_vectors = self.read().chunks.iter().any(|c| c.embedding.is_some());
        let query_embedding = if wants_vectors {
            match model.embed(question).await {
                Ok(v) => Some(v),
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    tracing::warn!("Query embedding failed, keyword ranking only: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let inner = self.read();
        let keyword = keyword_ranking(&inner.chunks, question);
        let vector = query_embedding
            .as_deref()
            .map(|q| vector_ranking(&inner.chunks, q))
            .unwrap_or_default();

        let passages = ranking::reciprocal_rank_fusion(&keyword, &vector)
            .into_iter()
            .take(limit)
            .filter_map(|ranked| {
                inner.chunks.get(ranked.chunk_id).map(|chunk| Passage {
                    filename: chunk.filename.clone(),
                    content: chunk.content.clone(),
                    score: ranked.rrf_score,
                })
            })
            .collect();
        Ok(passages)
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for term in tokenize(text) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

/// TF-IDF style scoring with saturating term frequency.
fn keyword_ranking(chunks: &[StoredChunk], question: &str) -> Vec<(usize, f64)> {
    let terms: HashSet<String> = tokenize(question).collect();
    if terms.is_empty() || chunks.is_empty() {
        return Vec::new();
    }

    let n = chunks.len() as f64;
    let idf: HashMap<&str, f64> = terms
        .iter()
        .map(|t| {
            let df = chunks
                .iter()
                .filter(|c| c.term_counts.contains_key(t))
                .count() as f64;
            (t.as_str(), (1.0 + n / (df + 1.0)).ln())
        })
        .collect();

    let mut scored: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .filter_map(|(id, chunk)| {
            let score: f64 = terms
                .iter()
                .filter_map(|t| {
                    let tf = *chunk.term_counts.get(t)? as f64;
                    Some(idf[t.as_str()] * tf / (tf + 1.0))
                })
                .sum();
            (score > 0.0).then_some((id, score))
        })
        .collect();
    sort_desc(&mut scored);
    scored.truncate(CANDIDATES_PER_RANKING);
    scored
}

fn vector_ranking(chunks: &[StoredChunk], query: &[f32]) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = chunks
        .iter()
        .enumerate()
        .filter_map(|(id, chunk)| {
            let embedding = chunk.embedding.as_deref()?;
            let sim = cosine_similarity(embedding, query)?;
            (sim > 0.0).then_some((id, sim))
        })
        .collect();
    sort_desc(&mut scored);
    scored.truncate(CANDIDATES_PER_RANKING);
    scored
}

fn sort_desc(scored: &mut [(usize, f64)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}
