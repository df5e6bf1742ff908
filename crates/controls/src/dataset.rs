use foundation::ids::DatasetId;
use formats::{Format, GeometryKind};
use layers::VectorStyle;

/// Per-dataset knobs supplied when the user submits a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetOptions {
    pub style: VectorStyle,
    pub pickable: bool,
    /// Incremental bounds-driven loading. Only honored for GeoParquet
    /// sources; other formats always download whole.
    pub viewport_mode: bool,
    /// Below this zoom, viewport-mode sublayers hide and no query runs.
    pub viewport_min_zoom: f64,
    /// Move-end quiescence window, seconds.
    pub debounce_s: f64,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            style: VectorStyle::default(),
            pickable: false,
            viewport_mode: false,
            viewport_min_zoom: 8.0,
            debounce_s: 0.3,
        }
    }
}

impl DatasetOptions {
    pub fn viewport(min_zoom: f64) -> Self {
        Self {
            viewport_mode: true,
            viewport_min_zoom: min_zoom,
            ..Self::default()
        }
    }
}

/// Bookkeeping for one registered remote dataset.
///
/// Owned exclusively by the control; the host engine owns only the derived
/// source/sublayer objects referenced by `source_id`/`sublayer_ids`.
///
/// Invariant: `viewport_mode = true` implies non-empty `sublayer_ids` (all
/// groups are pre-created at registration because geometry composition is
/// unknown before the first query). With `viewport_mode = false`, sublayers
/// exist only for geometry kinds actually observed.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetHandle {
    pub id: DatasetId,
    pub url: String,
    pub format: Format,
    pub source_id: String,
    pub sublayer_ids: Vec<String>,
    pub feature_count: usize,
    pub geometry_kinds: Vec<GeometryKind>,
    pub style: VectorStyle,
    pub pickable: bool,
    pub viewport_mode: bool,
    pub viewport_min_zoom: f64,
    pub debounce_s: f64,
    /// Highest-issued load sequence; completions below it are stale.
    pub load_seq: u64,
}

impl DatasetHandle {
    pub fn new(id: DatasetId, url: impl Into<String>, format: Format, options: &DatasetOptions) -> Self {
        Self {
            id,
            url: url.into(),
            format,
            source_id: id.to_string(),
            sublayer_ids: Vec::new(),
            feature_count: 0,
            geometry_kinds: Vec::new(),
            style: options.style,
            pickable: options.pickable,
            viewport_mode: options.viewport_mode && format == Format::GeoParquet,
            viewport_min_zoom: options.viewport_min_zoom,
            debounce_s: options.debounce_s,
            load_seq: 0,
        }
    }
}
