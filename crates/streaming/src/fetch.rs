use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed chunk stream over a response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchFailure>> + Send>>;

/// Transport-level failure: network error or non-2xx status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub url: String,
    pub reason: String,
}

impl FetchFailure {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

impl std::error::Error for FetchFailure {}

/// Transport seam for the loaders.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait FetchClient: Send + Sync {
    /// Fetch the whole body. Non-2xx statuses are failures.
    fn fetch_bytes(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchFailure>>;

    /// Fetch the body as a chunk stream.
    ///
    /// Returns `Ok(None)` when the transport exposes no readable body (the
    /// FlatGeobuf loader turns that into `LoadError::StreamUnsupported`).
    fn fetch_stream(&self, url: &str) -> BoxFuture<'_, Result<Option<ByteStream>, FetchFailure>>;
}

/// `reqwest`-backed transport.
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send_checked(&self, url: &str) -> Result<reqwest::Response, FetchFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::new(url, e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FetchFailure::new(url, format!("HTTP {}", resp.status())));
        }
        Ok(resp)
    }
}

impl Default for HttpFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchClient for HttpFetch {
    fn fetch_bytes(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchFailure>> {
        let url = url.to_string();
        Box::pin(async move {
            let resp = self.send_checked(&url).await?;
            resp.bytes()
                .await
                .map_err(|e| FetchFailure::new(&url, e.to_string()))
        })
    }

    fn fetch_stream(&self, url: &str) -> BoxFuture<'_, Result<Option<ByteStream>, FetchFailure>> {
        let url = url.to_string();
        Box::pin(async move {
            let resp = self.send_checked(&url).await?;
            let stream_url = url.clone();
            let stream = resp
                .bytes_stream()
                .map(move |chunk| chunk.map_err(|e| FetchFailure::new(&stream_url, e.to_string())));
            Ok(Some(Box::pin(stream) as ByteStream))
        })
    }
}

/// In-memory transport for tests and fixtures.
///
/// Streamed responses are sliced into small chunks so consumers exercise
/// their accumulation path; URLs marked streamless return no body.
#[derive(Debug, Default)]
pub struct MemoryFetch {
    responses: BTreeMap<String, Bytes>,
    streamless: BTreeSet<String>,
    chunk_size: usize,
}

impl MemoryFetch {
    pub fn new() -> Self {
        Self {
            responses: BTreeMap::new(),
            streamless: BTreeSet::new(),
            chunk_size: 64,
        }
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.responses.insert(url.into(), body.into());
    }

    /// Keep the body but report no readable stream for this URL.
    pub fn mark_streamless(&mut self, url: impl Into<String>) {
        self.streamless.insert(url.into());
    }
}

impl FetchClient for MemoryFetch {
    fn fetch_bytes(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchFailure>> {
        let result = match self.responses.get(url) {
            Some(body) => Ok(body.clone()),
            None => Err(FetchFailure::new(url, "HTTP 404")),
        };
        Box::pin(async move { result })
    }

    fn fetch_stream(&self, url: &str) -> BoxFuture<'_, Result<Option<ByteStream>, FetchFailure>> {
        if self.streamless.contains(url) {
            return Box::pin(async move { Ok(None) });
        }

        let result = match self.responses.get(url) {
            Some(body) => {
                let chunks: Vec<Result<Bytes, FetchFailure>> = body
                    .chunks(self.chunk_size.max(1))
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(Some(Box::pin(stream::iter(chunks)) as ByteStream))
            }
            None => Err(FetchFailure::new(url, "HTTP 404")),
        };
        Box::pin(async move { result })
    }
}
