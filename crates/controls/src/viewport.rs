use foundation::bounds::LonLatBounds;
use foundation::ids::DatasetId;
use runtime::debounce::Debounce;

/// Lifecycle of one viewport-mode dataset.
///
/// `Registered` is transient: registration either reaches `Queryable` (and
/// immediately issues the initial query) or falls back to the full download
/// path, in which case the machine is dropped without ever becoming
/// queryable. `Unregistered` exists only during teardown.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshPhase {
    Registered,
    Queryable,
    Querying,
    Unregistered,
}

/// Per-dataset refresh bookkeeping for viewport mode.
#[derive(Debug, Clone)]
pub struct RefreshState {
    pub phase: RefreshPhase,
    /// Name the remote file is registered under in the query engine.
    pub table_name: String,
    pub geometry_column: String,
    pub property_columns: Vec<String>,
    pub debounce: Debounce,
    /// Highest-issued query sequence; completions below it are discarded.
    pub latest_seq: u64,
}

impl RefreshState {
    pub fn new(
        table_name: impl Into<String>,
        geometry_column: impl Into<String>,
        property_columns: Vec<String>,
        debounce_s: f64,
    ) -> Self {
        Self {
            phase: RefreshPhase::Registered,
            table_name: table_name.into(),
            geometry_column: geometry_column.into(),
            property_columns,
            debounce: Debounce::new(debounce_s),
            latest_seq: 0,
        }
    }
}

/// Handle for one in-flight bounds query.
///
/// Captures the bounds at dispatch time; `seq` implements the "only the
/// most recent query may update the source" rule.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTicket {
    pub dataset: DatasetId,
    pub seq: u64,
    pub bounds: LonLatBounds,
}
