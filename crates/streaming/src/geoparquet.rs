use bytes::Bytes;
use formats::FeatureCollection;

use crate::error::LoadError;
use crate::fetch::FetchClient;
use crate::query::QueryEngine;

/// Fallback ladder for fetching GeoParquet buffers.
///
/// Attempts run in order: the direct URL, the configured proxy (if any),
/// then the public fallback proxy. Only when every rung fails does the
/// loader surface `LoadError::Cors`. Proxy templates substitute `{url}`;
/// templates without the placeholder get the URL appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyChain {
    pub configured: Option<String>,
    pub fallback: String,
}

impl Default for ProxyChain {
    fn default() -> Self {
        Self {
            configured: None,
            fallback: "https://corsproxy.io/?{url}".to_string(),
        }
    }
}

impl ProxyChain {
    pub fn with_proxy(template: impl Into<String>) -> Self {
        Self {
            configured: Some(template.into()),
            ..Self::default()
        }
    }

    /// Candidate URLs in attempt order.
    pub fn candidates(&self, url: &str) -> Vec<String> {
        let mut out = vec![url.to_string()];
        if let Some(template) = &self.configured {
            out.push(apply_template(template, url));
        }
        out.push(apply_template(&self.fallback, url));
        out
    }
}

fn apply_template(template: &str, url: &str) -> String {
    if template.contains("{url}") {
        template.replace("{url}", url)
    } else {
        format!("{template}{url}")
    }
}

/// Fetch a remote buffer through the proxy ladder.
pub async fn fetch_with_proxies(
    fetch: &dyn FetchClient,
    chain: &ProxyChain,
    url: &str,
) -> Result<Bytes, LoadError> {
    for candidate in chain.candidates(url) {
        match fetch.fetch_bytes(&candidate).await {
            Ok(body) => return Ok(body),
            Err(e) => {
                tracing::debug!("geoparquet fetch attempt failed: {e}");
            }
        }
    }
    Err(LoadError::Cors {
        url: url.to_string(),
    })
}

/// Full (non-viewport) GeoParquet load.
///
/// The loader only moves bytes; decoding the columnar buffer is the query
/// engine's job.
pub async fn load_geoparquet(
    fetch: &dyn FetchClient,
    engine: &dyn QueryEngine,
    chain: &ProxyChain,
    url: &str,
) -> Result<FeatureCollection, LoadError> {
    let buffer = fetch_with_proxies(fetch, chain, url).await?;
    engine.read_table(buffer).await.map_err(LoadError::Query)
}

#[cfg(test)]
mod tests {
    use super::{ProxyChain, fetch_with_proxies, load_geoparquet};
    use crate::error::LoadError;
    use crate::fetch::MemoryFetch;
    use crate::query::MemoryQueryEngine;

    const TABLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "a"},
             "geometry": {"type": "Point", "coordinates": [0, 0]}}
        ]
    }"#;

    #[test]
    fn candidates_run_direct_then_proxies() {
        let chain = ProxyChain::with_proxy("https://proxy.internal/fetch?target={url}");
        let candidates = chain.candidates("https://x/t.parquet");
        assert_eq!(
            candidates,
            vec![
                "https://x/t.parquet".to_string(),
                "https://proxy.internal/fetch?target=https://x/t.parquet".to_string(),
                "https://corsproxy.io/?https://x/t.parquet".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_the_proxy() {
        let mut fetch = MemoryFetch::new();
        // Direct URL is absent; only the proxied form resolves.
        fetch.insert("https://corsproxy.io/?https://x/t.parquet", TABLE);

        let body = fetch_with_proxies(&fetch, &ProxyChain::default(), "https://x/t.parquet")
            .await
            .expect("proxied fetch");
        assert!(!body.is_empty());
    }

    #[tokio::test]
    async fn exhausted_ladder_is_a_cors_error() {
        let fetch = MemoryFetch::new();
        let err = fetch_with_proxies(&fetch, &ProxyChain::default(), "https://x/t.parquet")
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cors { .. }));
    }

    #[tokio::test]
    async fn full_load_decodes_through_the_engine() {
        let mut fetch = MemoryFetch::new();
        fetch.insert("https://x/t.parquet", TABLE);
        let engine = MemoryQueryEngine::new();

        let fc = load_geoparquet(&fetch, &engine, &ProxyChain::default(), "https://x/t.parquet")
            .await
            .expect("load");
        assert_eq!(fc.len(), 1);
    }
}
