//! Lexical TF-IDF retrieval over chunked reference materials.

use super::chunking::split_text;
use super::{DocumentStore, Retriever, SourceText};
use crate::state::RetrievedDocument;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "that", "the", "this", "to", "with",
];

/// Ranks chunks of the stored materials against the query. The index is
/// rebuilt on every call so uploads and removals take effect immediately.
#[derive(Debug, Clone)]
pub struct KeywordRetriever {
    store: DocumentStore,
    chunk_size: usize,
    chunk_overlap: usize,
}

struct Chunk {
    source: String,
    index: usize,
    text: String,
    terms: HashMap<String, usize>,
    length: usize,
}

impl KeywordRetriever {
    pub fn new(store: DocumentStore, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            store,
            chunk_size,
            chunk_overlap,
        }
    }

    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievedDocument>> {
        let texts = self.store.load_texts()?;
        Ok(rank(&texts, query, k, self.chunk_size, self.chunk_overlap))
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedDocument> {
        let retriever = self.clone();
        let query = query.to_string();
        match tokio::task::spawn_blocking(move || retriever.search(&query, k)).await {
            Ok(Ok(documents)) => documents,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Retrieval failed; continuing without materials");
                Vec::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval task failed; continuing without materials");
                Vec::new()
            }
        }
    }
}

/// Lowercased alphanumeric terms, minus stopwords and single characters.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Top `k` chunks by TF-IDF score. Ties break on source name, then position.
pub(crate) fn rank(
    texts: &[SourceText],
    query: &str,
    k: usize,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<RetrievedDocument> {
    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
    if query_terms.is_empty() || k == 0 {
        return Vec::new();
    }

    let chunks: Vec<Chunk> = texts
        .iter()
        .flat_map(|text| {
            split_text(&text.content, chunk_size, chunk_overlap)
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| {
                    let tokens = tokenize(&chunk);
                    let mut terms = HashMap::new();
                    for token in &tokens {
                        *terms.entry(token.clone()).or_insert(0) += 1;
                    }
                    Chunk {
                        source: text.source.clone(),
                        index,
                        text: chunk,
                        terms,
                        length: tokens.len().max(1),
                    }
                })
        })
        .collect();

    let total = chunks.len() as f64;
    let idf: HashMap<&str, f64> = query_terms
        .iter()
        .map(|term| {
            let df = chunks.iter().filter(|c| c.terms.contains_key(term)).count() as f64;
            (term.as_str(), ((total + 1.0) / (df + 1.0)).ln() + 1.0)
        })
        .collect();

    let mut scored: Vec<(f64, &Chunk)> = chunks
        .iter()
        .map(|chunk| {
            let score = query_terms
                .iter()
                .filter_map(|term| {
                    let tf = *chunk.terms.get(term)? as f64 / chunk.length as f64;
                    Some(tf * idf.get(term.as_str()).copied().unwrap_or(1.0))
                })
                .sum::<f64>();
            (score, chunk)
        })
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.index.cmp(&b.index))
    });

    scored
        .into_iter()
        .take(k)
        .map(|(_, chunk)| RetrievedDocument::new(chunk.text.clone(), chunk.source.clone()))
        .collect()
}
