//! Vector query construction.
//!
//! This module turns a search strategy and a result count into a
//! [`SearchRequest`]: the backend-neutral description of a k-nearest-neighbor
//! query (which vector field to compare, which score to sort on, which page to
//! return and which fields to project). Building a request is pure, so a
//! request built once can be reused for every interaction with the same
//! `(strategy, k)`.
//!
//! # Usage
//!
//! ```rust
//! use paper_vss::query::build_query;
//!
//! let request = build_query("KNN", 5).unwrap();
//! assert_eq!(request.query_string(), "*=>[KNN 5 @vector $vec_param AS vector_score]");
//! assert_eq!(request.paging.limit, 5);
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Field the engine writes the distance score into.
pub const SCORE_FIELD: &str = "vector_score";

/// Name of the query parameter carrying the vector blob.
pub const VECTOR_PARAM: &str = "vec_param";

/// Default name of the vector attribute in the index.
pub const DEFAULT_VECTOR_FIELD: &str = "vector";

/// Query dialect the KNN syntax requires.
pub const QUERY_DIALECT: u32 = 2;

/// Fields returned for every hit.
pub const RETURN_FIELDS: [&str; 5] = ["title", "categories", "abstract", "authors", "year"];

/// Errors that can occur while building a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    /// A builder parameter is out of range or unrecognized
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for query construction.
pub type QueryResult<T> = Result<T, QueryError>;

/// Search strategies understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchStrategy {
    /// k-nearest-neighbor search
    Knn,
}

impl SearchStrategy {
    /// Token used in the query text.
    pub fn token(&self) -> &'static str {
        match self {
            SearchStrategy::Knn => "KNN",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for SearchStrategy {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("knn") {
            Ok(SearchStrategy::Knn)
        } else {
            Err(QueryError::InvalidArgument(format!(
                "unrecognized search strategy '{}'",
                s
            )))
        }
    }
}

/// Sort direction on the score field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn token(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Result window `[offset, offset + limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub offset: usize,
    pub limit: usize,
}

/// A fully specified k-NN search request.
///
/// The score is a cosine distance, so results are sorted ascending: the most
/// similar document comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search strategy
    pub strategy: SearchStrategy,

    /// Number of nearest neighbors to retrieve (always >= 1)
    pub k: usize,

    /// Vector attribute compared against the query vector
    pub vector_field: String,

    /// Name of the parameter carrying the query vector
    pub vector_param: String,

    /// Field holding the distance score
    pub score_field: String,

    /// Sort direction on `score_field`
    pub sort: SortDirection,

    /// Result window, always `[0, k)`
    pub paging: Paging,

    /// Document fields to return for each hit
    pub return_fields: Vec<String>,

    /// Query dialect version
    pub dialect: u32,
}

impl SearchRequest {
    /// The query text: match every document, then take the `k` nearest.
    pub fn query_string(&self) -> String {
        format!(
            "*=>[{} {} @{} ${} AS {}]",
            self.strategy, self.k, self.vector_field, self.vector_param, self.score_field
        )
    }

    /// Whether `field` is in the projection.
    pub fn returns(&self, field: &str) -> bool {
        self.return_fields.iter().any(|f| f == field)
    }
}

/// Builder for [`SearchRequest`]s against a particular index layout.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    vector_field: String,
    return_fields: Vec<String>,
    dialect: u32,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            vector_field: DEFAULT_VECTOR_FIELD.to_string(),
            return_fields: RETURN_FIELDS.iter().map(|f| f.to_string()).collect(),
            dialect: QUERY_DIALECT,
        }
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different vector attribute name.
    pub fn with_vector_field(mut self, field: impl Into<String>) -> QueryResult<Self> {
        let field = field.into();
        if field.trim().is_empty() {
            return Err(QueryError::InvalidArgument(
                "vector field name cannot be empty".to_string(),
            ));
        }
        self.vector_field = field;
        Ok(self)
    }

    /// Replace the returned fields.
    ///
    /// # Errors
    /// `InvalidArgument` if the list is empty or contains duplicates
    pub fn with_return_fields<I, S>(mut self, fields: I) -> QueryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(QueryError::InvalidArgument(
                "at least one return field is required".to_string(),
            ));
        }
        for (i, field) in fields.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(QueryError::InvalidArgument("return field name cannot be empty".to_string()));
            }
            if fields[..i].contains(field) {
                return Err(QueryError::InvalidArgument(format!(
                    "duplicate return field '{}'",
                    field
                )));
            }
        }
        self.return_fields = fields;
        Ok(self)
    }

    /// Pin a different query dialect.
    pub fn with_dialect(mut self, dialect: u32) -> QueryResult<Self> {
        if dialect < QUERY_DIALECT {
            return Err(QueryError::InvalidArgument(format!(
                "vector queries need dialect {} or later, got {}",
                QUERY_DIALECT, dialect
            )));
        }
        self.dialect = dialect;
        Ok(self)
    }

    /// Build a request for `k` nearest neighbors using `strategy`.
    ///
    /// # Errors
    /// `InvalidArgument` if `k` is zero or the strategy is not recognized
    pub fn build(&self, strategy: &str, k: usize) -> QueryResult<SearchRequest> {
        let strategy: SearchStrategy = strategy.parse()?;
        if k == 0 {
            return Err(QueryError::InvalidArgument(
                "number of results must be at least 1".to_string(),
            ));
        }

        Ok(SearchRequest {
            strategy,
            k,
            vector_field: self.vector_field.clone(),
            vector_param: VECTOR_PARAM.to_string(),
            score_field: SCORE_FIELD.to_string(),
            sort: SortDirection::Ascending,
            paging: Paging { offset: 0, limit: k },
            return_fields: self.return_fields.clone(),
            dialect: self.dialect,
        })
    }
}

/// Build a request with the default index layout.
pub fn build_query(strategy: &str, k: usize) -> QueryResult<SearchRequest> {
    QueryBuilder::default().build(strategy, k)
}
