use formats::FeatureCollection;

use crate::error::LoadError;
use crate::fetch::FetchClient;

/// Fetch and parse a GeoJSON document.
///
/// Bare `Geometry`/`Feature` payloads normalize into single-feature
/// collections inside the parser.
pub async fn load_geojson(
    fetch: &dyn FetchClient,
    url: &str,
) -> Result<FeatureCollection, LoadError> {
    let body = fetch.fetch_bytes(url).await.map_err(|e| LoadError::Fetch {
        url: url.to_string(),
        reason: e.reason,
    })?;

    let text = std::str::from_utf8(&body).map_err(|e| LoadError::Parse(e.to_string()))?;
    FeatureCollection::from_geojson_str(text).map_err(|e| LoadError::Parse(e.to_string()))
}
