/// Declared on-the-wire format of a remote dataset URL.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    GeoJson,
    GeoParquet,
    FlatGeobuf,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::GeoJson => "geojson",
            Format::GeoParquet => "geoparquet",
            Format::FlatGeobuf => "flatgeobuf",
        };
        write!(f, "{name}")
    }
}

/// Map a URL to its declared format by trailing extension.
///
/// Pure and total: case-insensitive, query string and fragment are ignored,
/// and anything unrecognized defaults to GeoJSON.
pub fn detect_format(url: &str) -> Format {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("parquet") | Some("geoparquet") => Format::GeoParquet,
        Some("fgb") => Format::FlatGeobuf,
        _ => Format::GeoJson,
    }
}
