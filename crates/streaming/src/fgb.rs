use std::io::Cursor;

use flatgeobuf::{FallibleStreamingIterator, FgbReader};
use futures_util::StreamExt;
use geozero::{FeatureProperties, ToJson};
use serde_json::{Map, Value};

use formats::{Feature, FeatureCollection, parse_geometry};

use crate::error::LoadError;
use crate::fetch::FetchClient;

/// Stream a FlatGeobuf body and decode it feature by feature.
///
/// The body is accumulated chunk by chunk; a transport with no readable
/// body fails with `StreamUnsupported` before any decode work happens.
pub async fn load_flatgeobuf(
    fetch: &dyn FetchClient,
    url: &str,
) -> Result<FeatureCollection, LoadError> {
    let stream = fetch
        .fetch_stream(url)
        .await
        .map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            reason: e.reason,
        })?;
    let Some(mut stream) = stream else {
        return Err(LoadError::StreamUnsupported);
    };

    let mut buffer: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| LoadError::Fetch {
            url: url.to_string(),
            reason: e.reason,
        })?;
        buffer.extend_from_slice(&chunk);
    }

    decode_flatgeobuf(&buffer)
}

/// Walk a FlatGeobuf buffer with the incremental reader, appending each
/// decoded feature. Property values arrive as strings from the column
/// accessor and are carried as JSON strings.
pub fn decode_flatgeobuf(bytes: &[u8]) -> Result<FeatureCollection, LoadError> {
    let mut cursor = Cursor::new(bytes);
    let reader = FgbReader::open(&mut cursor).map_err(|e| LoadError::Parse(e.to_string()))?;
    let mut selected = reader
        .select_all()
        .map_err(|e| LoadError::Parse(e.to_string()))?;

    let mut features: Vec<Feature> = Vec::new();
    while let Some(feature) = selected
        .next()
        .map_err(|e| LoadError::Parse(e.to_string()))?
    {
        let geometry_json = feature
            .to_json()
            .map_err(|e| LoadError::Parse(e.to_string()))?;
        let geometry_value: Value =
            serde_json::from_str(&geometry_json).map_err(|e| LoadError::Parse(e.to_string()))?;
        let geometry = parse_geometry(&geometry_value).map_err(LoadError::Parse)?;

        let mut properties = Map::new();
        for (key, value) in feature
            .properties()
            .map_err(|e| LoadError::Parse(e.to_string()))?
        {
            properties.insert(key, Value::String(value));
        }

        features.push(Feature {
            id: None,
            properties,
            geometry,
        });
    }

    Ok(FeatureCollection { features })
}

#[cfg(test)]
mod tests {
    use super::{decode_flatgeobuf, load_flatgeobuf};
    use crate::error::LoadError;
    use crate::fetch::MemoryFetch;
    use flatgeobuf::{ColumnType, FgbWriter, FgbWriterOptions, GeometryType};
    use formats::GeometryKind;
    use geozero::geojson::GeoJson;

    fn sample_fgb() -> Vec<u8> {
        let mut fgb = FgbWriter::create_with_options(
            "sample",
            GeometryType::Point,
            FgbWriterOptions {
                write_index: false,
                ..Default::default()
            },
        )
        .expect("writer");
        fgb.add_column("name", ColumnType::String, |_, _| {});
        fgb.add_feature(GeoJson(
            r#"{"type": "Feature", "properties": {"name": "alpha"},
                "geometry": {"type": "Point", "coordinates": [10.0, 20.0]}}"#,
        ))
        .expect("feature a");
        fgb.add_feature(GeoJson(
            r#"{"type": "Feature", "properties": {"name": "beta"},
                "geometry": {"type": "Point", "coordinates": [30.0, 40.0]}}"#,
        ))
        .expect("feature b");

        let mut out: Vec<u8> = Vec::new();
        fgb.write(&mut out).expect("write");
        out
    }

    #[test]
    fn decodes_features_and_properties() {
        let fc = decode_flatgeobuf(&sample_fgb()).expect("decode");
        assert_eq!(fc.len(), 2);
        assert_eq!(fc.geometry_kinds(), vec![GeometryKind::Point]);
        assert_eq!(
            fc.features[0].properties.get("name").and_then(|v| v.as_str()),
            Some("alpha")
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            decode_flatgeobuf(b"not a flatgeobuf"),
            Err(LoadError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn loads_over_a_chunked_stream() {
        let mut fetch = MemoryFetch::new();
        fetch.insert("https://x/y.fgb", sample_fgb());

        let fc = load_flatgeobuf(&fetch, "https://x/y.fgb").await.expect("load");
        assert_eq!(fc.len(), 2);
    }

    #[tokio::test]
    async fn missing_body_is_stream_unsupported() {
        let mut fetch = MemoryFetch::new();
        fetch.insert("https://x/y.fgb", sample_fgb());
        fetch.mark_streamless("https://x/y.fgb");

        let err = load_flatgeobuf(&fetch, "https://x/y.fgb").await.unwrap_err();
        assert!(matches!(err, LoadError::StreamUnsupported));
    }
}
