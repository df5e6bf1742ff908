use crate::query::QueryError;

/// Loader-level failures, caught and rendered at the control boundary.
///
/// `Cors` is reserved for the GeoParquet proxy ladder: it means the direct
/// fetch and every configured proxy were exhausted. Per-refresh bounds-query
/// failures live in `QueryError` and are non-fatal by policy.
#[derive(Debug)]
pub enum LoadError {
    /// Non-2xx response or transport failure.
    Fetch { url: String, reason: String },
    /// Every proxy attempt exhausted.
    Cors { url: String },
    /// Malformed JSON/GeoJSON or undecodable FlatGeobuf content.
    Parse(String),
    /// The transport exposed no readable body to stream.
    StreamUnsupported,
    /// The dataset was removed before its load could run.
    Cancelled,
    /// The analytical query engine rejected a full-table read.
    Query(QueryError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Fetch { url, reason } => write!(f, "fetch failed for {url}: {reason}"),
            LoadError::Cors { url } => {
                write!(f, "all proxy attempts exhausted for {url}")
            }
            LoadError::Parse(reason) => write!(f, "parse error: {reason}"),
            LoadError::StreamUnsupported => write!(f, "transport provides no readable body"),
            LoadError::Cancelled => write!(f, "load cancelled: dataset removed"),
            LoadError::Query(err) => write!(f, "query engine error: {err}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Query(err) => Some(err),
            _ => None,
        }
    }
}

impl From<QueryError> for LoadError {
    fn from(err: QueryError) -> Self {
        LoadError::Query(err)
    }
}
