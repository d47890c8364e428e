//! In-memory search backend.
//!
//! Holds documents and their embeddings in process and answers k-NN requests
//! by brute force: every document is scored against the query vector with
//! cosine distance, the same metric the RediSearch index is created with.
//! Suitable for small corpora, offline use and tests.

use async_trait::async_trait;
use std::sync::RwLock;

use super::{check_dimension, compare_results, BackendResult, SearchBackend, SearchError};
use crate::models::{EmbeddingVector, Paper, SearchResult};
use crate::query::SearchRequest;

/// Compute cosine similarity between two vectors.
///
/// Ranges from -1 to 1, where 1 means the vectors point in the same
/// direction. A zero-magnitude vector has similarity 0 with everything.
///
/// # Panics
/// Panics if the vectors have different lengths
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have the same length");

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Cosine distance as RediSearch reports it: `1 - cosine_similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

struct IndexedPaper {
    paper: Paper,
    embedding: EmbeddingVector,
}

/// Exact k-NN index over papers held in memory.
pub struct InMemoryIndex {
    dimension: usize,
    documents: RwLock<Vec<IndexedPaper>>,
}

impl InMemoryIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Add a paper with its embedding. A paper with the same id is replaced.
    ///
    /// # Errors
    /// `DimensionMismatch` if the embedding has the wrong length
    pub fn insert(&self, paper: Paper, embedding: EmbeddingVector) -> BackendResult<()> {
        check_dimension(self.dimension, &embedding)?;
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.retain(|doc| doc.paper.id != paper.id);
        documents.push(IndexedPaper { paper, embedding });
        Ok(())
    }

    /// Number of indexed papers.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copy only the requested fields, as the index would return them.
fn project(paper: &Paper, request: &SearchRequest) -> Paper {
    let mut projected = Paper {
        id: paper.id.clone(),
        ..Paper::default()
    };
    for field in &request.return_fields {
        if let Some(value) = paper.field(field) {
            projected.set_field(field, value.to_string());
        }
    }
    projected
}

#[async_trait]
impl SearchBackend for InMemoryIndex {
    async fn search(
        &self,
        request: &SearchRequest,
        vector: &EmbeddingVector,
    ) -> BackendResult<Vec<SearchResult>> {
        check_dimension(self.dimension, vector)?;
        if request.k == 0 {
            return Err(SearchError::QueryError("k must be at least 1".to_string()));
        }

        let documents = self
            .documents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut scored: Vec<SearchResult> = documents
            .iter()
            .map(|doc| {
                let score = cosine_distance(vector.as_slice(), doc.embedding.as_slice());
                SearchResult::new(doc.paper.clone(), score)
            })
            .collect();
        drop(documents);

        // KNN picks the k nearest; the page window then applies to those.
        scored.sort_by(|a, b| compare_results(a, b, request.sort));
        scored.truncate(request.k);

        Ok(scored
            .into_iter()
            .skip(request.paging.offset)
            .take(request.paging.limit)
            .map(|mut hit| {
                hit.paper = project(&hit.paper, request);
                hit
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build_query, QueryBuilder};

    fn paper(id: &str, title: &str) -> Paper {
        Paper {
            id: id.to_string(),
            title: title.to_string(),
            categories: "cs.LG".to_string(),
            abstract_text: format!("Abstract of {}", title),
            authors: "Test Author".to_string(),
            year: "2020".to_string(),
        }
    }

    fn index_with(docs: &[(&str, &str, Vec<f32>)]) -> InMemoryIndex {
        let index = InMemoryIndex::new(3);
        for (id, title, embedding) in docs {
            index
                .insert(paper(id, title), EmbeddingVector::new(embedding.clone()))
                .unwrap();
        }
        index
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_results_sorted_and_bounded_by_k() {
        let index = index_with(&[
            ("p1", "Paper A", vec![1.0, 0.0, 0.0]),
            ("p2", "Paper B", vec![0.8, 0.6, 0.0]),
            ("p3", "Paper C", vec![0.0, 1.0, 0.0]),
            ("p4", "Paper D", vec![0.9, 0.1, 0.0]),
        ]);
        let query = EmbeddingVector::new(vec![1.0, 0.0, 0.0]);

        let results = index.search(&build_query("KNN", 3).unwrap(), &query).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].paper.id, "p1");
        for pair in results.windows(2) {
            assert!(pair[0].similarity() >= pair[1].similarity());
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_results() {
        let index = InMemoryIndex::new(3);
        let results = index
            .search(&build_query("KNN", 5).unwrap(), &EmbeddingVector::new(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_fast() {
        let index = index_with(&[("p1", "Paper A", vec![1.0, 0.0, 0.0])]);
        let result = index
            .search(&build_query("KNN", 1).unwrap(), &EmbeddingVector::new(vec![1.0, 0.0]))
            .await;
        assert!(matches!(
            result,
            Err(SearchError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_ties_broken_by_id() {
        let index = index_with(&[
            ("p9", "Twin B", vec![0.0, 1.0, 0.0]),
            ("p2", "Twin A", vec![0.0, 1.0, 0.0]),
        ]);
        let results = index
            .search(&build_query("KNN", 2).unwrap(), &EmbeddingVector::new(vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p9"]);
    }

    #[tokio::test]
    async fn test_projection_follows_return_fields() {
        let index = index_with(&[("p1", "Paper A", vec![1.0, 0.0, 0.0])]);
        let request = QueryBuilder::new()
            .with_return_fields(["categories"])
            .unwrap()
            .build("KNN", 1)
            .unwrap();
        let results = index
            .search(&request, &EmbeddingVector::new(vec![1.0, 0.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(results[0].paper.categories, "cs.LG");
        assert!(results[0].paper.title.is_empty());
        assert_eq!(results[0].paper.id, "p1");
    }

    #[test]
    fn test_insert_replaces_same_id_and_checks_dimension() {
        let index = index_with(&[("p1", "Paper A", vec![1.0, 0.0, 0.0])]);
        index
            .insert(paper("p1", "Paper A v2"), EmbeddingVector::new(vec![0.0, 1.0, 0.0]))
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index
            .insert(paper("p2", "Bad"), EmbeddingVector::new(vec![1.0]))
            .is_err());
    }
}
