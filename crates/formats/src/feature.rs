use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Position {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl Position {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

/// Rendering-facing grouping of the six GeoJSON geometry types.
///
/// Point-like geometries draw as circles, line-like as lines, and area-like
/// as fill plus outline. The synthesizer only needs this census, never the
/// concrete type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryKind {
    Point,
    Line,
    Area,
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryKind::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryKind::Line,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeometryKind::Area,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug)]
pub enum GeoJsonError {
    Parse(String),
    UnsupportedRoot(String),
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeoJsonError::Parse(reason) => write!(f, "JSON parse error: {reason}"),
            GeoJsonError::UnsupportedRoot(ty) => {
                write!(f, "unsupported GeoJSON root type: {ty}")
            }
            GeoJsonError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl FeatureCollection {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Which geometry kinds occur in this collection, in stable order.
    pub fn geometry_kinds(&self) -> Vec<GeometryKind> {
        let mut kinds: Vec<GeometryKind> = self
            .features
            .iter()
            .map(|f| f.geometry.kind())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Parse any GeoJSON document into a collection.
    ///
    /// Normalization contract: a bare `Geometry` or a bare `Feature` becomes
    /// a single-feature collection; a `FeatureCollection` parses as-is.
    /// Parsing an exported collection again yields an equal value.
    pub fn from_geojson_str(payload: &str) -> Result<Self, GeoJsonError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| GeoJsonError::Parse(e.to_string()))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, GeoJsonError> {
        let obj = value
            .as_object()
            .ok_or_else(|| GeoJsonError::UnsupportedRoot("non-object".to_string()))?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GeoJsonError::UnsupportedRoot("missing type".to_string()))?;

        match ty {
            "FeatureCollection" => {
                let features_val = obj.get("features").and_then(|v| v.as_array()).ok_or_else(
                    || GeoJsonError::UnsupportedRoot("FeatureCollection without features".to_string()),
                )?;

                let mut features = Vec::with_capacity(features_val.len());
                for (index, feat_val) in features_val.iter().enumerate() {
                    features.push(parse_feature(feat_val, index)?);
                }
                Ok(Self { features })
            }
            "Feature" => Ok(Self {
                features: vec![parse_feature(value, 0)?],
            }),
            // A bare geometry wraps into one feature with empty properties.
            "Point" | "MultiPoint" | "LineString" | "MultiLineString" | "Polygon"
            | "MultiPolygon" => {
                let geometry = parse_geometry(value)
                    .map_err(|reason| GeoJsonError::InvalidFeature { index: 0, reason })?;
                Ok(Self {
                    features: vec![Feature {
                        id: None,
                        properties: Map::new(),
                        geometry,
                    }],
                })
            }
            other => Err(GeoJsonError::UnsupportedRoot(other.to_string())),
        }
    }

    /// Export as a GeoJSON FeatureCollection value.
    /// (Property ordering may differ from the original input.)
    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );

        let mut features: Vec<Value> = Vec::with_capacity(self.features.len());
        for feat in &self.features {
            let mut fobj = Map::new();
            fobj.insert("type".to_string(), Value::String("Feature".to_string()));
            if let Some(id) = &feat.id {
                fobj.insert("id".to_string(), Value::String(id.clone()));
            }
            fobj.insert(
                "properties".to_string(),
                Value::Object(feat.properties.clone()),
            );
            fobj.insert("geometry".to_string(), geometry_to_value(&feat.geometry));
            features.push(Value::Object(fobj));
        }

        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }
}

fn parse_feature(value: &Value, index: usize) -> Result<Feature, GeoJsonError> {
    let obj = value.as_object().ok_or(GeoJsonError::InvalidFeature {
        index,
        reason: "feature must be an object".to_string(),
    })?;

    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or(GeoJsonError::InvalidFeature {
            index,
            reason: "feature missing type".to_string(),
        })?;
    if ty != "Feature" {
        return Err(GeoJsonError::InvalidFeature {
            index,
            reason: format!("unexpected feature type: {ty}"),
        });
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let properties = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let geometry_val = obj.get("geometry").ok_or(GeoJsonError::InvalidFeature {
        index,
        reason: "feature missing geometry".to_string(),
    })?;
    let geometry = parse_geometry(geometry_val)
        .map_err(|reason| GeoJsonError::InvalidFeature { index, reason })?;

    Ok(Feature {
        id,
        properties,
        geometry,
    })
}

pub fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_position(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_positions(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_positions(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_lines(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_rings(coords)?)),
        "MultiPolygon" => Ok(Geometry::MultiPolygon(parse_multi_polygon(coords)?)),
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn geometry_to_value(geom: &Geometry) -> Value {
    let (ty, coords) = match geom {
        Geometry::Point(p) => ("Point", position_coords(p)),
        Geometry::MultiPoint(ps) => (
            "MultiPoint",
            Value::Array(ps.iter().map(position_coords).collect()),
        ),
        Geometry::LineString(ps) => (
            "LineString",
            Value::Array(ps.iter().map(position_coords).collect()),
        ),
        Geometry::MultiLineString(lines) => (
            "MultiLineString",
            Value::Array(
                lines
                    .iter()
                    .map(|line| Value::Array(line.iter().map(position_coords).collect()))
                    .collect(),
            ),
        ),
        Geometry::Polygon(rings) => (
            "Polygon",
            Value::Array(
                rings
                    .iter()
                    .map(|ring| Value::Array(ring.iter().map(position_coords).collect()))
                    .collect(),
            ),
        ),
        Geometry::MultiPolygon(polys) => (
            "MultiPolygon",
            Value::Array(
                polys
                    .iter()
                    .map(|poly| {
                        Value::Array(
                            poly.iter()
                                .map(|ring| {
                                    Value::Array(ring.iter().map(position_coords).collect())
                                })
                                .collect(),
                        )
                    })
                    .collect(),
            ),
        ),
    };

    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(ty.to_string()));
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn position_coords(p: &Position) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn parse_position(coords: &Value) -> Result<Position, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(Position::new(lon, lat))
}

fn parse_positions(coords: &Value) -> Result<Vec<Position>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(parse_position(item)?);
    }
    Ok(out)
}

fn parse_lines(coords: &Value) -> Result<Vec<Vec<Position>>, String> {
    let arr = coords
        .as_array()
        .ok_or("MultiLineString coordinates must be an array".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for line in arr {
        out.push(parse_positions(line)?);
    }
    Ok(out)
}

fn parse_rings(coords: &Value) -> Result<Vec<Vec<Position>>, String> {
    let rings = coords
        .as_array()
        .ok_or("Polygon coordinates must be an array of rings".to_string())?;
    let mut out = Vec::with_capacity(rings.len());
    for ring in rings {
        out.push(parse_positions(ring)?);
    }
    Ok(out)
}

fn parse_multi_polygon(coords: &Value) -> Result<Vec<Vec<Vec<Position>>>, String> {
    let polys = coords
        .as_array()
        .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
    let mut out = Vec::with_capacity(polys.len());
    for poly in polys {
        out.push(parse_rings(poly)?);
    }
    Ok(out)
}
