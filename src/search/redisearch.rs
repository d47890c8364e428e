//! RediSearch backend.
//!
//! Issues `FT.SEARCH` k-NN queries against a Redis Stack index whose documents
//! carry a FLOAT32 vector attribute created with the COSINE distance metric.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{check_dimension, rank_results, BackendResult, SearchBackend, SearchError};
use crate::config::RedisConfig;
use crate::models::{EmbeddingVector, Paper, SearchResult};
use crate::query::SearchRequest;

/// Client for a RediSearch vector index.
///
/// Cloning is cheap: clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisSearchClient {
    connection: ConnectionManager,
    index_name: String,
    dimension: usize,
    query_timeout: Duration,
}

impl std::fmt::Debug for RedisSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSearchClient")
            .field("index_name", &self.index_name)
            .field("dimension", &self.dimension)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl RedisSearchClient {
    /// Connect to Redis and determine the index's vector dimension.
    ///
    /// The dimension reported by `FT.INFO` wins over `config.dimension`; the
    /// configured value is only used when the probe cannot determine it.
    ///
    /// # Errors
    /// * `BackendUnavailable` if the server cannot be reached
    /// * `Timeout` if connecting exceeds `config.connect_timeout_ms`
    /// * `QueryError` if no dimension can be determined
    pub async fn connect(config: &RedisConfig) -> BackendResult<Self> {
        let url = config.connection_url();
        info!(url = %config.redacted_url(), index = %config.index_name, "connecting to RediSearch");

        let client = redis::Client::open(url.as_str()).map_err(|e| {
            SearchError::BackendUnavailable(format!("invalid connection string: {}", e))
        })?;
        let connect_timeout = config.connect_timeout();
        let connection =
            with_deadline(connect_timeout, client.get_connection_manager()).await?;

        let mut search = Self {
            connection,
            index_name: config.index_name.clone(),
            dimension: config.dimension.unwrap_or(0),
            query_timeout: config.query_timeout(),
        };

        let probed = search.probe_dimension(&config.vector_field).await?;
        search.dimension = resolve_dimension(probed, config.dimension).inspect_err(|_| {
            warn!(
                index = %config.index_name,
                vector_field = %config.vector_field,
                "no vector dimension in FT.INFO and none configured"
            );
        })?;

        info!(index = %search.index_name, dimension = search.dimension, "connected to RediSearch");
        Ok(search)
    }

    async fn probe_dimension(&self, vector_field: &str) -> BackendResult<Option<usize>> {
        let mut cmd = redis::cmd("FT.INFO");
        cmd.arg(&self.index_name);
        let mut conn = self.connection.clone();

        match with_deadline(self.query_timeout, probe_info(&cmd, &mut conn)).await {
            Ok(info) => Ok(parse_index_dimension(&info, vector_field)),
            // A missing index is reported as a server error; searches will fail
            // with the same message, so fall back to configuration here.
            Err(SearchError::QueryError(message)) => {
                warn!(index = %self.index_name, error = %message, "FT.INFO failed");
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

#[async_trait]
impl SearchBackend for RedisSearchClient {
    async fn search(
        &self,
        request: &SearchRequest,
        vector: &EmbeddingVector,
    ) -> BackendResult<Vec<SearchResult>> {
        check_dimension(self.dimension, vector)?;

        let mut cmd = redis::cmd("FT.SEARCH");
        for arg in search_args(&self.index_name, request, vector) {
            cmd.arg(arg);
        }

        debug!(index = %self.index_name, query = %request.query_string(), "FT.SEARCH");
        let mut conn = self.connection.clone();
        let reply: Value = with_deadline(self.query_timeout, cmd.query_async(&mut conn)).await?;

        let results = parse_search_reply(reply, &request.score_field)?;
        Ok(rank_results(results, request))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "redisearch"
    }
}

async fn probe_info(cmd: &redis::Cmd, conn: &mut ConnectionManager) -> redis::RedisResult<Value> {
    let info: Value = cmd.query_async(conn).await?;
    Ok(info)
}

/// Run a Redis future under a deadline, classifying failures.
async fn with_deadline<T, F>(deadline: Duration, fut: F) -> BackendResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result.map_err(|e| classify_error(e, deadline)),
        Err(_) => Err(SearchError::Timeout(deadline)),
    }
}

fn classify_error(err: RedisError, deadline: Duration) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout(deadline)
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        SearchError::BackendUnavailable(err.to_string())
    } else {
        SearchError::QueryError(err.to_string())
    }
}

/// Arguments following `FT.SEARCH` for `request`.
///
/// `<index> <query> PARAMS 2 <param> <blob> SORTBY <score> <dir> LIMIT <offset>
/// <limit> RETURN <n> <fields..> <score> DIALECT <d>`
pub fn search_args(index: &str, request: &SearchRequest, vector: &EmbeddingVector) -> Vec<Vec<u8>> {
    let mut args: Vec<Vec<u8>> = vec![
        index.as_bytes().to_vec(),
        request.query_string().into_bytes(),
        b"PARAMS".to_vec(),
        b"2".to_vec(),
        request.vector_param.as_bytes().to_vec(),
        vector.to_bytes(),
        b"SORTBY".to_vec(),
        request.score_field.as_bytes().to_vec(),
        request.sort.token().as_bytes().to_vec(),
        b"LIMIT".to_vec(),
        request.paging.offset.to_string().into_bytes(),
        request.paging.limit.to_string().into_bytes(),
        b"RETURN".to_vec(),
        (request.return_fields.len() + 1).to_string().into_bytes(),
    ];
    args.extend(request.return_fields.iter().map(|f| f.as_bytes().to_vec()));
    args.push(request.score_field.as_bytes().to_vec());
    args.push(b"DIALECT".to_vec());
    args.push(request.dialect.to_string().into_bytes());
    args
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Okay => Some("OK".to_string()),
        _ => None,
    }
}

fn malformed(what: &str) -> SearchError {
    SearchError::QueryError(format!("malformed FT.SEARCH reply: {}", what))
}

/// Decode a RESP2 `FT.SEARCH` reply: `[total, key, [field, value, ..], ..]`.
///
/// Document keys become paper ids. Hits without a parseable `score_field` are
/// rejected since they cannot be ranked.
pub fn parse_search_reply(reply: Value, score_field: &str) -> BackendResult<Vec<SearchResult>> {
    let items = match reply {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        _ => return Err(malformed("expected an array")),
    };

    let mut items = items.into_iter();
    match items.next() {
        Some(Value::Int(_)) => {}
        None => return Ok(Vec::new()),
        Some(_) => return Err(malformed("missing result count")),
    }

    let mut results = Vec::new();
    while let Some(key) = items.next() {
        let id = value_to_string(&key).ok_or_else(|| malformed("document key is not a string"))?;
        let fields = match items.next() {
            Some(Value::Array(fields)) => fields,
            Some(Value::Nil) | None => Vec::new(),
            Some(_) => return Err(malformed("document fields are not an array")),
        };

        let mut paper = Paper {
            id,
            ..Paper::default()
        };
        let mut score = None;
        for pair in fields.chunks(2) {
            let (Some(name), Some(value)) = (
                pair.first().and_then(value_to_string),
                pair.get(1).and_then(value_to_string),
            ) else {
                continue;
            };
            if name == score_field {
                score = value.trim().parse::<f32>().ok();
            } else {
                paper.set_field(&name, value);
            }
        }

        let score = score.ok_or_else(|| {
            malformed(&format!("document '{}' has no '{}'", paper.id, score_field))
        })?;
        results.push(SearchResult::new(paper, score));
    }

    Ok(results)
}

/// Pick the vector dimension: the index's own value wins, configuration is
/// the fallback.
fn resolve_dimension(probed: Option<usize>, configured: Option<usize>) -> BackendResult<usize> {
    match (probed, configured) {
        (Some(found), Some(configured)) if found != configured => {
            warn!(
                index_dimension = found,
                configured_dimension = configured,
                "configured dimension disagrees with the index, using the index value"
            );
            Ok(found)
        }
        (Some(found), _) => Ok(found),
        (None, Some(configured)) => {
            warn!(
                configured_dimension = configured,
                "could not read vector dimension from FT.INFO, using configured value"
            );
            Ok(configured)
        }
        (None, None) => Err(SearchError::QueryError(
            "cannot determine the dimension of the vector field".to_string(),
        )),
    }
}

/// Find the `dim` of `vector_field` in an `FT.INFO` reply.
///
/// Handles the flat key/value arrays of RESP2 as well as RESP3 maps, and both
/// the `attributes` (current) and `fields` (older) layouts.
pub fn parse_index_dimension(info: &Value, vector_field: &str) -> Option<usize> {
    let top_level = key_values(info)?;
    let attributes = top_level
        .iter()
        .find(|(k, _)| k == "attributes" || k == "fields")
        .map(|(_, v)| *v)?;

    let Value::Array(attributes) = attributes else {
        return None;
    };

    attributes.iter().find_map(|attribute| {
        // Older servers put the field name first, outside the key/value pairs.
        let (leading, props) = match attribute {
            Value::Array(items) if items.len() % 2 == 1 => {
                (value_to_string(&items[0]), pairs(&items[1..]))
            }
            other => (None, key_values(other)?),
        };
        let named = leading.as_deref() == Some(vector_field)
            || props.iter().any(|(k, v)| {
                (k == "identifier" || k == "attribute")
                    && value_to_string(v).as_deref() == Some(vector_field)
            });
        if !named {
            return None;
        }
        props
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("dim"))
            .and_then(|(_, v)| value_to_string(v))
            .and_then(|dim| dim.trim().parse().ok())
    })
}

fn key_values(value: &Value) -> Option<Vec<(String, &Value)>> {
    match value {
        Value::Map(entries) => Some(
            entries
                .iter()
                .filter_map(|(k, v)| value_to_string(k).map(|k| (k, v)))
                .collect(),
        ),
        Value::Array(items) => Some(pairs(items)),
        _ => None,
    }
}

fn pairs(items: &[Value]) -> Vec<(String, &Value)> {
    items
        .chunks_exact(2)
        .filter_map(|pair| value_to_string(&pair[0]).map(|k| (k, &pair[1])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::build_query;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn doc(key: &str, score: &str, title: &str) -> Vec<Value> {
        vec![
            bulk(key),
            Value::Array(vec![
                bulk("title"),
                bulk(title),
                bulk("year"),
                bulk("2018"),
                bulk("vector_score"),
                bulk(score),
            ]),
        ]
    }

    #[test]
    fn test_search_args_layout() {
        let request = build_query("KNN", 5).unwrap();
        let vector = EmbeddingVector::new(vec![1.0, 0.5]);
        let args = search_args("index", &request, &vector);
        let text: Vec<String> = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect();

        assert_eq!(text[0], "index");
        assert_eq!(text[1], "*=>[KNN 5 @vector $vec_param AS vector_score]");
        assert_eq!(&text[2..5], &["PARAMS", "2", "vec_param"]);
        assert_eq!(args[5], vector.to_bytes());
        assert_eq!(&text[6..9], &["SORTBY", "vector_score", "ASC"]);
        assert_eq!(&text[9..12], &["LIMIT", "0", "5"]);
        assert_eq!(&text[12..14], &["RETURN", "6"]);
        assert_eq!(
            &text[14..20],
            &["title", "categories", "abstract", "authors", "year", "vector_score"]
        );
        assert_eq!(&text[20..], &["DIALECT", "2"]);
    }

    #[test]
    fn test_parse_search_reply() {
        let mut reply = vec![Value::Int(2)];
        reply.extend(doc("paper:1", "0.12", "Graph Attention Networks"));
        reply.extend(doc("paper:2", "0.3", "Deep Residual Learning"));

        let results = parse_search_reply(Value::Array(reply), "vector_score").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].paper.id, "paper:1");
        assert_eq!(results[0].paper.title, "Graph Attention Networks");
        assert_eq!(results[0].paper.year, "2018");
        assert!((results[0].score - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_parse_empty_reply() {
        let results = parse_search_reply(Value::Array(vec![Value::Int(0)]), "vector_score").unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_parse_rejects_missing_score() {
        let reply = Value::Array(vec![
            Value::Int(1),
            bulk("paper:1"),
            Value::Array(vec![bulk("title"), bulk("No score")]),
        ]);
        assert!(matches!(
            parse_search_reply(reply, "vector_score"),
            Err(SearchError::QueryError(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_search_reply(bulk("oops"), "vector_score").is_err());
    }

    #[test]
    fn test_parse_index_dimension_resp2() {
        let info = Value::Array(vec![
            bulk("index_name"),
            bulk("index"),
            bulk("attributes"),
            Value::Array(vec![
                Value::Array(vec![
                    bulk("identifier"),
                    bulk("title"),
                    bulk("attribute"),
                    bulk("title"),
                    bulk("type"),
                    bulk("TEXT"),
                ]),
                Value::Array(vec![
                    bulk("identifier"),
                    bulk("vector"),
                    bulk("attribute"),
                    bulk("vector"),
                    bulk("type"),
                    bulk("VECTOR"),
                    bulk("dim"),
                    Value::Int(768),
                    bulk("distance_metric"),
                    bulk("COSINE"),
                ]),
            ]),
        ]);
        assert_eq!(parse_index_dimension(&info, "vector"), Some(768));
        assert_eq!(parse_index_dimension(&info, "embedding"), None);
    }

    #[test]
    fn test_parse_index_dimension_resp3_map() {
        let info = Value::Map(vec![(
            bulk("attributes"),
            Value::Array(vec![Value::Map(vec![
                (bulk("identifier"), bulk("vector")),
                (bulk("dim"), bulk("384")),
            ])]),
        )]);
        assert_eq!(parse_index_dimension(&info, "vector"), Some(384));
    }

    #[test]
    fn test_parse_index_dimension_leading_field_name() {
        let info = Value::Array(vec![
            bulk("fields"),
            Value::Array(vec![
                Value::Array(vec![bulk("title"), bulk("type"), bulk("TEXT")]),
                Value::Array(vec![
                    bulk("vector"),
                    bulk("type"),
                    bulk("VECTOR"),
                    bulk("dim"),
                    bulk("512"),
                ]),
            ]),
        ]);
        assert_eq!(parse_index_dimension(&info, "vector"), Some(512));
        assert_eq!(parse_index_dimension(&info, "title"), None);
    }

    #[test]
    fn test_values_are_not_read_as_keys() {
        // A field named "dim" must not be mistaken for the dimension key.
        let info = Value::Array(vec![
            bulk("attributes"),
            Value::Array(vec![Value::Array(vec![
                bulk("identifier"),
                bulk("dim"),
                bulk("attribute"),
                bulk("vector"),
                bulk("type"),
                bulk("VECTOR"),
                bulk("dim"),
                bulk("256"),
            ])]),
        ]);
        assert_eq!(parse_index_dimension(&info, "vector"), Some(256));

        let info = Value::Array(vec![
            bulk("index_name"),
            bulk("attributes"),
            bulk("fields"),
            Value::Array(vec![]),
        ]);
        assert_eq!(parse_index_dimension(&info, "vector"), None);
    }

    #[test]
    fn test_resolve_dimension() {
        assert_eq!(resolve_dimension(Some(768), None).unwrap(), 768);
        assert_eq!(resolve_dimension(Some(768), Some(384)).unwrap(), 768);
        assert_eq!(resolve_dimension(None, Some(384)).unwrap(), 384);
        assert!(matches!(
            resolve_dimension(None, None),
            Err(SearchError::QueryError(_))
        ));
    }

    #[test]
    fn test_classify_io_error_as_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(classify_error(err, Duration::from_secs(1)), SearchError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails_cleanly() {
        let config = RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 500,
            ..RedisConfig::default()
        };
        let err = RedisSearchClient::connect(&config).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
