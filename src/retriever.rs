//! In-memory keyword retrieval over chunked documents.
//!
//! A deliberately simple stand-in for semantic retrieval: a query matches a
//! chunk when any lowercased query term appears in the chunk's lowercased
//! text as a substring. Matches come back in original chunk order, truncated
//! to the requested count — no scoring or ranking.
//!
//! The index is bounded: documents are held in an LRU cache with a
//! configurable capacity, so a long-running process cannot grow without
//! limit. Re-indexing a document replaces its previous chunks.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, warn};

struct IndexedDocument {
    chunks: Vec<String>,
    total_chunks: usize,
}

/// Bounded chunk index with substring-match retrieval.
pub struct KeywordRetriever {
    index: Mutex<LruCache<String, IndexedDocument>>,
}

/// Snapshot of index occupancy, for the stats endpoint and tests.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub documents: Vec<DocumentStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStats {
    pub doc_id: String,
    pub total_chunks: usize,
}

impl KeywordRetriever {
    /// Creates a retriever holding at most `capacity` documents.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            index: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Indexes `chunks` under `doc_id`, replacing any existing entry.
    ///
    /// Returns the stored chunk count. The least-recently-used document is
    /// evicted if the index is at capacity.
    pub fn index(&self, doc_id: &str, chunks: Vec<String>) -> usize {
        let total_chunks = chunks.len();
        let mut index = self.index.lock().unwrap();
        index.put(
            doc_id.to_string(),
            IndexedDocument {
                chunks,
                total_chunks,
            },
        );
        debug!(doc_id, total_chunks, "indexed document");
        total_chunks
    }

    /// Returns up to `n` chunks of `doc_id` containing any query term.
    ///
    /// Terms are the lowercased whitespace-separated words of `query`;
    /// matching is plain substring containment. Chunks are returned in
    /// document order. An unindexed `doc_id` yields an empty vec and a
    /// warning — never an error.
    pub fn query(&self, doc_id: &str, query: &str, n: usize) -> Vec<String> {
        let mut index = self.index.lock().unwrap();
        let doc = match index.get(doc_id) {
            Some(doc) => doc,
            None => {
                warn!(doc_id, "document not found in index");
                return Vec::new();
            }
        };

        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Vec::new();
        }

        doc.chunks
            .iter()
            .filter(|chunk| {
                let chunk_lower = chunk.to_lowercase();
                terms.iter().any(|term| chunk_lower.contains(term))
            })
            .take(n)
            .cloned()
            .collect()
    }

    /// True if `doc_id` is currently indexed. Does not touch LRU order.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.index.lock().unwrap().peek(doc_id).is_some()
    }

    /// Occupancy snapshot in most-recently-used order.
    pub fn stats(&self) -> IndexStats {
        let index = self.index.lock().unwrap();
        let documents: Vec<DocumentStats> = index
            .iter()
            .map(|(doc_id, doc)| DocumentStats {
                doc_id: doc_id.clone(),
                total_chunks: doc.total_chunks,
            })
            .collect();
        IndexStats {
            total_documents: documents.len(),
            documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn substring_match_in_document_order() {
        let retriever = KeywordRetriever::new(16);
        retriever.index(
            "doc1",
            chunks(&[
                "film is philosophy",
                "cats are cute",
                "philosophy of mind",
                "nothing here",
            ]),
        );
        let result = retriever.query("doc1", "philosophy", 3);
        assert_eq!(result, vec!["film is philosophy", "philosophy of mind"]);
    }

    #[test]
    fn missing_document_returns_empty() {
        let retriever = KeywordRetriever::new(16);
        assert!(retriever.query("missing_id", "x", 3).is_empty());
    }

    #[test]
    fn any_term_matches_and_result_is_truncated() {
        let retriever = KeywordRetriever::new(16);
        retriever.index(
            "doc1",
            chunks(&["alpha one", "beta two", "alpha three", "beta four", "alpha five"]),
        );
        let result = retriever.query("doc1", "ALPHA beta", 3);
        assert_eq!(result.len(), 3);
        assert_eq!(result[0], "alpha one");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let retriever = KeywordRetriever::new(16);
        retriever.index("doc1", chunks(&["The Quick Brown Fox"]));
        assert_eq!(retriever.query("doc1", "quick", 3).len(), 1);
    }

    #[test]
    fn empty_query_returns_empty() {
        let retriever = KeywordRetriever::new(16);
        retriever.index("doc1", chunks(&["something"]));
        assert!(retriever.query("doc1", "   ", 3).is_empty());
    }

    #[test]
    fn reindex_replaces_previous_chunks() {
        let retriever = KeywordRetriever::new(16);
        retriever.index("doc1", chunks(&["old contents"]));
        let count = retriever.index("doc1", chunks(&["new text", "more new text"]));
        assert_eq!(count, 2);
        assert!(retriever.query("doc1", "old", 3).is_empty());
        assert_eq!(retriever.query("doc1", "new", 3).len(), 2);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let retriever = KeywordRetriever::new(2);
        retriever.index("a", chunks(&["alpha"]));
        retriever.index("b", chunks(&["beta"]));
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(retriever.query("a", "alpha", 1).len(), 1);
        retriever.index("c", chunks(&["gamma"]));
        assert!(retriever.contains("a"));
        assert!(!retriever.contains("b"));
        assert!(retriever.contains("c"));
    }

    #[test]
    fn stats_reports_chunk_counts() {
        let retriever = KeywordRetriever::new(16);
        retriever.index("doc1", chunks(&["one", "two"]));
        retriever.index("doc2", chunks(&["three"]));
        let stats = retriever.stats();
        assert_eq!(stats.total_documents, 2);
        let doc1 = stats.documents.iter().find(|d| d.doc_id == "doc1").unwrap();
        assert_eq!(doc1.total_chunks, 2);
    }
}
