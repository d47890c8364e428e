//! Typed view-models for the three interaction modes.
//!
//! Each card carries exactly what its mode displays; the HTTP server
//! serializes them as JSON and the terminal front-end renders them as tables.

use serde::{Deserialize, Serialize};

use crate::models::{AnswerSpan, RelevanceLevel, SearchResult};
use crate::service::Mode;

/// A recommended paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperCard {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub year: String,

    #[serde(rename = "abstract")]
    pub abstract_text: String,

    pub relevance: RelevanceLevel,

    /// Cosine similarity (1.0 is identical)
    pub similarity: f32,
}

impl From<SearchResult> for PaperCard {
    fn from(result: SearchResult) -> Self {
        let similarity = result.similarity();
        Self {
            id: result.paper.id,
            title: result.paper.title,
            authors: result.paper.authors,
            year: result.paper.year,
            abstract_text: result.paper.abstract_text,
            relevance: result.relevance,
            similarity,
        }
    }
}

/// The categories of the closest paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCard {
    pub id: String,
    pub title: String,

    /// Category codes, e.g. `["cs.LG", "stat.ML"]`
    pub categories: Vec<String>,

    pub relevance: RelevanceLevel,
    pub similarity: f32,
}

impl From<SearchResult> for TopicCard {
    fn from(result: SearchResult) -> Self {
        let similarity = result.similarity();
        Self {
            id: result.paper.id,
            title: result.paper.title,
            categories: split_categories(&result.paper.categories),
            relevance: result.relevance,
            similarity,
        }
    }
}

/// Split the space-separated category field stored in the index.
pub fn split_categories(raw: &str) -> Vec<String> {
    raw.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

/// An answer extracted from the closest paper's abstract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCard {
    pub id: String,
    pub title: String,

    #[serde(rename = "abstract")]
    pub abstract_text: String,

    /// `None` when the abstract was empty
    pub answer: Option<String>,

    pub answer_score: Option<f32>,
    pub relevance: RelevanceLevel,
    pub similarity: f32,
}

impl AnswerCard {
    pub fn new(result: SearchResult, answer: Option<AnswerSpan>) -> Self {
        let similarity = result.similarity();
        let (answer, answer_score) = match answer {
            Some(span) => (Some(span.text), span.score),
            None => (None, None),
        };
        Self {
            id: result.paper.id,
            title: result.paper.title,
            abstract_text: result.paper.abstract_text,
            answer,
            answer_score,
            relevance: result.relevance,
            similarity,
        }
    }
}

/// Everything one interaction produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeView {
    Recommendation {
        query: String,
        #[serde(rename = "results")]
        papers: Vec<PaperCard>,
    },
    Topic {
        query: String,
        #[serde(rename = "results")]
        topics: Vec<TopicCard>,
    },
    Answer {
        query: String,
        #[serde(rename = "results")]
        answers: Vec<AnswerCard>,
    },
}

impl ModeView {
    pub fn mode(&self) -> Mode {
        match self {
            ModeView::Recommendation { .. } => Mode::Recommendation,
            ModeView::Topic { .. } => Mode::Topic,
            ModeView::Answer { .. } => Mode::Answer,
        }
    }

    pub fn query(&self) -> &str {
        match self {
            ModeView::Recommendation { query, .. }
            | ModeView::Topic { query, .. }
            | ModeView::Answer { query, .. } => query,
        }
    }

    /// Number of cards.
    pub fn len(&self) -> usize {
        match self {
            ModeView::Recommendation { papers, .. } => papers.len(),
            ModeView::Topic { topics, .. } => topics.len(),
            ModeView::Answer { answers, .. } => answers.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Paper;

    fn result(abstract_text: &str) -> SearchResult {
        SearchResult::new(
            Paper {
                id: "paper:1".to_string(),
                title: "Graph Attention Networks".to_string(),
                categories: "stat.ML cs.AI cs.LG".to_string(),
                abstract_text: abstract_text.to_string(),
                authors: "Petar Velickovic, Guillem Cucurull".to_string(),
                year: "2017".to_string(),
            },
            0.1,
        )
    }

    #[test]
    fn test_paper_card() {
        let card = PaperCard::from(result("We present GATs."));
        assert_eq!(card.year, "2017");
        assert!((card.similarity - 0.9).abs() < 1e-6);
        assert_eq!(card.relevance, RelevanceLevel::HighlySimilar);

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["abstract"], "We present GATs.");
    }

    #[test]
    fn test_topic_card_splits_categories() {
        let card = TopicCard::from(result(""));
        assert_eq!(card.categories, vec!["stat.ML", "cs.AI", "cs.LG"]);
        assert!(split_categories("  ").is_empty());
        assert_eq!(split_categories("cs.CL,cs.LG"), vec!["cs.CL", "cs.LG"]);
    }

    #[test]
    fn test_answer_card_without_answer() {
        let card = AnswerCard::new(result(""), None);
        assert!(card.answer.is_none());
        assert!(card.answer_score.is_none());
    }

    #[test]
    fn test_mode_view_is_tagged() {
        let view = ModeView::Topic {
            query: "attention".to_string(),
            topics: vec![TopicCard::from(result(""))],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["mode"], "topic");
        assert_eq!(json["results"][0]["categories"][0], "stat.ML");
        assert_eq!(view.mode(), Mode::Topic);
        assert_eq!(view.len(), 1);
        assert_eq!(view.query(), "attention");
    }
}
