use std::collections::BTreeMap;

use bytes::Bytes;
use foundation::bounds::LonLatBounds;
use formats::{Feature, FeatureCollection, Geometry, Position};
use parking_lot::Mutex;

use crate::fetch::BoxFuture;

/// Error type for query engine operations.
#[derive(Debug)]
pub struct QueryError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl QueryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Schema of a registered remote table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    pub geometry_column: Option<String>,
    pub property_columns: Vec<String>,
}

/// The analytical query engine collaborator.
///
/// The engine owns query execution and its process-wide registered-file
/// table; this workspace is a client of the contract only. Implementations
/// must be `Send + Sync`; methods return boxed futures for dyn-compatibility.
pub trait QueryEngine: Send + Sync {
    /// Make a remote file queryable under `name`.
    fn register_remote_file(&self, url: &str, name: &str) -> BoxFuture<'_, Result<(), QueryError>>;

    fn schema(&self, name: &str) -> BoxFuture<'_, Result<TableSchema, QueryError>>;

    /// Bounds-filtered read of a registered table.
    fn query_by_bounds(
        &self,
        name: &str,
        bounds: LonLatBounds,
        geometry_column: &str,
        property_columns: &[String],
    ) -> BoxFuture<'_, Result<FeatureCollection, QueryError>>;

    fn unregister_file(&self, name: &str) -> BoxFuture<'_, Result<(), QueryError>>;

    /// Decode a whole fetched columnar buffer into features (the full,
    /// non-viewport load path).
    fn read_table(&self, bytes: Bytes) -> BoxFuture<'_, Result<FeatureCollection, QueryError>>;
}

#[derive(Debug, Clone)]
struct MemoryTable {
    url: String,
    geometry_column: Option<String>,
    features: FeatureCollection,
}

/// In-memory query engine for tests and headless runs.
///
/// Tables are keyed by URL; `register_remote_file` aliases a known URL under
/// the registered name. Buffers handed to `read_table` are treated as GeoJSON
/// text, standing in for the columnar decode of a real engine.
#[derive(Default)]
pub struct MemoryQueryEngine {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
    registered: Mutex<BTreeMap<String, String>>, // name -> url
    query_log: Mutex<Vec<(String, LonLatBounds)>>,
}

impl MemoryQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(
        &self,
        url: impl Into<String>,
        geometry_column: Option<&str>,
        features: FeatureCollection,
    ) {
        let url = url.into();
        self.tables.lock().insert(
            url.clone(),
            MemoryTable {
                url,
                geometry_column: geometry_column.map(|s| s.to_string()),
                features,
            },
        );
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.registered.lock().keys().cloned().collect()
    }

    pub fn query_count(&self) -> usize {
        self.query_log.lock().len()
    }

    pub fn last_query_bounds(&self) -> Option<LonLatBounds> {
        self.query_log.lock().last().map(|(_, b)| *b)
    }
}

impl QueryEngine for MemoryQueryEngine {
    fn register_remote_file(&self, url: &str, name: &str) -> BoxFuture<'_, Result<(), QueryError>> {
        let url = url.to_string();
        let name = name.to_string();
        Box::pin(async move {
            if !self.tables.lock().contains_key(&url) {
                return Err(QueryError::new(format!("unknown remote file: {url}")));
            }
            self.registered.lock().insert(name, url);
            Ok(())
        })
    }

    fn schema(&self, name: &str) -> BoxFuture<'_, Result<TableSchema, QueryError>> {
        let name = name.to_string();
        Box::pin(async move {
            let url = self
                .registered
                .lock()
                .get(&name)
                .cloned()
                .ok_or_else(|| QueryError::new(format!("not registered: {name}")))?;
            let tables = self.tables.lock();
            let table = tables
                .get(&url)
                .ok_or_else(|| QueryError::new(format!("table vanished: {url}")))?;

            let mut property_columns: Vec<String> = Vec::new();
            for feature in &table.features.features {
                for key in feature.properties.keys() {
                    if !property_columns.contains(key) {
                        property_columns.push(key.clone());
                    }
                }
            }

            Ok(TableSchema {
                geometry_column: table.geometry_column.clone(),
                property_columns,
            })
        })
    }

    fn query_by_bounds(
        &self,
        name: &str,
        bounds: LonLatBounds,
        _geometry_column: &str,
        property_columns: &[String],
    ) -> BoxFuture<'_, Result<FeatureCollection, QueryError>> {
        let name = name.to_string();
        let property_columns = property_columns.to_vec();
        Box::pin(async move {
            let url = self
                .registered
                .lock()
                .get(&name)
                .cloned()
                .ok_or_else(|| QueryError::new(format!("not registered: {name}")))?;
            self.query_log.lock().push((name, bounds));

            let tables = self.tables.lock();
            let table = tables
                .get(&url)
                .ok_or_else(|| QueryError::new(format!("table vanished: {url}")))?;

            let features = table
                .features
                .features
                .iter()
                .filter(|f| {
                    let p = representative_position(&f.geometry);
                    bounds.contains(p.lon_deg, p.lat_deg)
                })
                .map(|f| Feature {
                    id: f.id.clone(),
                    properties: f
                        .properties
                        .iter()
                        .filter(|(k, _)| {
                            property_columns.is_empty() || property_columns.contains(k)
                        })
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    geometry: f.geometry.clone(),
                })
                .collect();

            Ok(FeatureCollection { features })
        })
    }

    fn unregister_file(&self, name: &str) -> BoxFuture<'_, Result<(), QueryError>> {
        let name = name.to_string();
        Box::pin(async move {
            self.registered.lock().remove(&name);
            Ok(())
        })
    }

    fn read_table(&self, bytes: Bytes) -> BoxFuture<'_, Result<FeatureCollection, QueryError>> {
        Box::pin(async move {
            let text = std::str::from_utf8(&bytes)
                .map_err(|e| QueryError::with_source("table buffer is not UTF-8", e))?;
            FeatureCollection::from_geojson_str(text)
                .map_err(|e| QueryError::with_source("table decode failed", e))
        })
    }
}

/// A stable single position standing in for the geometry in bounds checks.
fn representative_position(geometry: &Geometry) -> Position {
    match geometry {
        Geometry::Point(p) => *p,
        Geometry::MultiPoint(ps) | Geometry::LineString(ps) => {
            ps.first().copied().unwrap_or(Position::new(0.0, 0.0))
        }
        Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => lines
            .first()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or(Position::new(0.0, 0.0)),
        Geometry::MultiPolygon(polys) => polys
            .first()
            .and_then(|p| p.first())
            .and_then(|r| r.first())
            .copied()
            .unwrap_or(Position::new(0.0, 0.0)),
    }
}
