//! Core data models for the paper search service.
//!
//! This module contains the value objects that flow through a single
//! interaction: the query embedding, the paper records returned by the
//! vector index, their scores, and extracted answers.

use serde::{Deserialize, Serialize};

/// A dense embedding of a piece of text.
///
/// Produced by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider) and
/// never mutated afterwards. Its length must match the dimensionality the
/// vector index was created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap raw model output.
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Number of components in the vector.
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components.
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Serialize as packed little-endian float32, the blob layout RediSearch
    /// expects for a `FLOAT32` vector query parameter.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Consume the wrapper and return the components.
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// A paper record as stored in the vector index.
///
/// All fields are opaque strings sourced from the index hash. Fields that were
/// not requested in the search's return list are left empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Document key in the index (e.g. `paper:1706.03762`)
    pub id: String,

    /// Paper title
    pub title: String,

    /// Subject categories (e.g. `cs.LG stat.ML`)
    pub categories: String,

    /// Abstract text
    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// Author list as stored in the index
    pub authors: String,

    /// Publication year
    pub year: String,
}

impl Paper {
    /// Set a field by its index attribute name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "title" => self.title = value,
            "categories" => self.categories = value,
            "abstract" => self.abstract_text = value,
            "authors" => self.authors = value,
            "year" => self.year = value,
            _ => {}
        }
    }

    /// Read a field by its index attribute name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(&self.title),
            "categories" => Some(&self.categories),
            "abstract" => Some(&self.abstract_text),
            "authors" => Some(&self.authors),
            "year" => Some(&self.year),
            _ => None,
        }
    }
}

/// Relevance classification for search results.
///
/// Papers are categorized by their cosine similarity to the query,
/// allowing clients to understand the quality of matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceLevel {
    /// Extremely high similarity (cosine similarity > 0.95)
    Identical,

    /// Very high similarity (cosine similarity > 0.85)
    HighlySimilar,

    /// Moderate similarity (cosine similarity > 0.70)
    Similar,

    /// Anything lower
    Relevant,
}

impl RelevanceLevel {
    /// Determine relevance level from a cosine similarity score.
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity > 0.95 {
            RelevanceLevel::Identical
        } else if similarity > 0.85 {
            RelevanceLevel::HighlySimilar
        } else if similarity > 0.70 {
            RelevanceLevel::Similar
        } else {
            RelevanceLevel::Relevant
        }
    }

    /// Upper-case label used by the front-ends.
    pub fn label(&self) -> &'static str {
        match self {
            RelevanceLevel::Identical => "IDENTICAL",
            RelevanceLevel::HighlySimilar => "HIGHLY_SIMILAR",
            RelevanceLevel::Similar => "SIMILAR",
            RelevanceLevel::Relevant => "RELEVANT",
        }
    }
}

/// A single search hit: a paper plus the score the index assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The paper metadata
    pub paper: Paper,

    /// The `vector_score` reported by the index: cosine distance,
    /// `0.0` for an identical direction, lower is better
    pub score: f32,

    /// Categorical relevance classification
    pub relevance: RelevanceLevel,
}

impl SearchResult {
    /// Create a new search result from a paper and its cosine distance.
    pub fn new(paper: Paper, score: f32) -> Self {
        Self {
            relevance: RelevanceLevel::from_similarity(1.0 - score),
            paper,
            score,
        }
    }

    /// Cosine similarity derived from the distance score.
    pub fn similarity(&self) -> f32 {
        1.0 - self.score
    }
}

/// An answer extracted from a context passage.
///
/// `start..end` are byte offsets into the context the answer was taken from,
/// and `text` is exactly that slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSpan {
    /// Answer text
    pub text: String,

    /// Model confidence (`p_start * p_end`), when the extractor reports one
    pub score: Option<f32>,

    /// Byte offset of the first answer character in the context
    pub start: usize,

    /// Byte offset one past the last answer character in the context
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevance_level_from_similarity() {
        assert_eq!(RelevanceLevel::from_similarity(0.96), RelevanceLevel::Identical);
        assert_eq!(RelevanceLevel::from_similarity(0.90), RelevanceLevel::HighlySimilar);
        assert_eq!(RelevanceLevel::from_similarity(0.75), RelevanceLevel::Similar);
        assert_eq!(RelevanceLevel::from_similarity(0.60), RelevanceLevel::Relevant);
    }

    #[test]
    fn test_search_result_derives_relevance_from_distance() {
        let result = SearchResult::new(Paper::default(), 0.02);
        assert_eq!(result.relevance, RelevanceLevel::Identical);
        assert!((result.similarity() - 0.98).abs() < 1e-6);

        let result = SearchResult::new(Paper::default(), 0.5);
        assert_eq!(result.relevance, RelevanceLevel::Relevant);
    }

    #[test]
    fn test_embedding_bytes_are_little_endian_f32() {
        let vector = EmbeddingVector::new(vec![1.0, -2.5]);
        let bytes = vector.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn test_paper_field_access() {
        let mut paper = Paper::default();
        paper.set_field("abstract", "We study graphs.".to_string());
        paper.set_field("unknown", "ignored".to_string());
        assert_eq!(paper.field("abstract"), Some("We study graphs."));
        assert_eq!(paper.field("unknown"), None);

        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "We study graphs.");
    }
}
