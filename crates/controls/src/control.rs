use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use foundation::{DatasetId, Time};
use formats::{Feature, FeatureCollection, Format, detect_format};
use host::MapSurface;
use layers::{
    PopupContent, SublayerKind, VectorStyle, build_specs, plan_for_kinds, plan_for_viewport,
    sublayer_id,
};
use runtime::hub::{EventHub, Subscription};
use streaming::{
    FetchClient, LoadError, ProxyChain, QueryEngine, load_flatgeobuf, load_geojson,
    load_geoparquet,
};
use tracing::{debug, warn};

use crate::dataset::{DatasetHandle, DatasetOptions};
use crate::events::{ControlEvent, EventKind, StateSnapshot};
use crate::viewport::{QueryTicket, RefreshPhase, RefreshState};

/// Handle for one in-flight full download. Completions whose `seq` no longer
/// matches the dataset's current load sequence are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    pub dataset: DatasetId,
    pub seq: u64,
}

/// Owner of the vector-dataset registry: detects formats, runs loads,
/// synthesizes sublayers on the host surface, drives viewport refreshes,
/// and publishes lifecycle events.
///
/// All mutation funnels through `&mut self`; the async collaborators
/// (`FetchClient`, `QueryEngine`) are shared behind `Arc` and hold no
/// control state of their own.
pub struct VectorDatasetControl<S: MapSurface> {
    surface: S,
    fetch: Arc<dyn FetchClient>,
    engine: Arc<dyn QueryEngine>,
    proxies: ProxyChain,
    datasets: BTreeMap<DatasetId, DatasetHandle>,
    refresh: BTreeMap<DatasetId, RefreshState>,
    in_flight: BTreeSet<DatasetId>,
    next_dataset: u64,
    error: Option<String>,
    status: Option<String>,
    events: EventHub<EventKind, ControlEvent>,
    popup: Option<PopupContent>,
}

impl<S: MapSurface> VectorDatasetControl<S> {
    pub fn new(surface: S, fetch: Arc<dyn FetchClient>, engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            surface,
            fetch,
            engine,
            proxies: ProxyChain::default(),
            datasets: BTreeMap::new(),
            refresh: BTreeMap::new(),
            in_flight: BTreeSet::new(),
            next_dataset: 1,
            error: None,
            status: None,
            events: EventHub::new(),
            popup: None,
        }
    }

    pub fn with_proxies(mut self, proxies: ProxyChain) -> Self {
        self.proxies = proxies;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn dataset(&self, id: DatasetId) -> Option<&DatasetHandle> {
        self.datasets.get(&id)
    }

    pub fn dataset_ids(&self) -> Vec<DatasetId> {
        self.datasets.keys().copied().collect()
    }

    pub fn refresh_phase(&self, id: DatasetId) -> Option<RefreshPhase> {
        self.refresh.get(&id).map(|r| r.phase)
    }

    /// Whether the control currently needs move-end notifications. False
    /// once the last viewport-mode dataset is gone.
    pub fn wants_move_end(&self) -> bool {
        !self.refresh.is_empty()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            loading: self.loading(),
            error: self.error.clone(),
            status: self.status.clone(),
            dataset_count: self.datasets.len(),
        }
    }

    pub fn on(&mut self, kind: EventKind, callback: impl FnMut(&ControlEvent) + 'static) -> Subscription {
        self.events.subscribe(kind, callback)
    }

    pub fn off(&mut self, sub: Subscription) -> bool {
        self.events.unsubscribe(sub)
    }

    fn emit(&mut self, event: ControlEvent) {
        let kind = event.kind;
        self.events.emit(&kind, &event);
    }

    /// Register a dataset and issue a load ticket without performing I/O.
    ///
    /// The split from `load_for_ticket`/`finish_load` lets callers drive the
    /// download on whatever executor they have; `add_dataset` composes the
    /// three for the common case.
    pub fn request_dataset(&mut self, url: &str, options: DatasetOptions) -> LoadTicket {
        let id = DatasetId(self.next_dataset);
        self.next_dataset += 1;

        let format = detect_format(url);
        let mut handle = DatasetHandle::new(id, url, format, &options);
        handle.load_seq = 1;
        let seq = handle.load_seq;
        debug!(%id, url, ?format, "dataset registered");
        self.datasets.insert(id, handle);
        self.in_flight.insert(id);
        self.error = None;

        LoadTicket { dataset: id, seq }
    }

    /// Run the download for a ticket. Dispatches on the detected format.
    pub async fn load_for_ticket(&self, ticket: &LoadTicket) -> Result<FeatureCollection, LoadError> {
        let Some(handle) = self.datasets.get(&ticket.dataset) else {
            return Err(LoadError::Cancelled);
        };
        let url = handle.url.clone();
        match handle.format {
            Format::GeoJson => load_geojson(self.fetch.as_ref(), &url).await,
            Format::FlatGeobuf => load_flatgeobuf(self.fetch.as_ref(), &url).await,
            Format::GeoParquet => {
                load_geoparquet(self.fetch.as_ref(), self.engine.as_ref(), &self.proxies, &url)
                    .await
            }
        }
    }

    /// Apply a completed load. A ticket whose dataset was removed, or whose
    /// sequence was superseded, is a no-op.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<FeatureCollection, LoadError>) {
        let Some(handle) = self.datasets.get(&ticket.dataset) else {
            return;
        };
        if handle.load_seq != ticket.seq {
            return;
        }
        self.in_flight.remove(&ticket.dataset);

        match result {
            Ok(collection) => self.install_full(ticket.dataset, collection),
            Err(err) => {
                let message = err.to_string();
                warn!(dataset = %ticket.dataset, error = %message, "load failed");
                self.error = Some(message.clone());
                let url = self
                    .datasets
                    .get(&ticket.dataset)
                    .map(|h| h.url.clone())
                    .unwrap_or_default();
                let event = ControlEvent::new(EventKind::Error, self.snapshot())
                    .with_url(url)
                    .with_message(message);
                self.emit(event);
            }
        }
    }

    /// Full-download convenience: register, load, apply.
    pub async fn add_dataset(&mut self, url: &str, options: DatasetOptions) -> DatasetId {
        let ticket = self.request_dataset(url, options);
        let id = ticket.dataset;
        let viewport_mode = self
            .datasets
            .get(&id)
            .map(|h| h.viewport_mode)
            .unwrap_or(false);

        if viewport_mode {
            self.enable_viewport(id).await;
        } else {
            let result = self.load_for_ticket(&ticket).await;
            self.finish_load(ticket, result);
        }
        id
    }

    /// Materialize a fully-downloaded collection: source, sublayers for the
    /// observed geometry kinds, layer-add event.
    fn install_full(&mut self, id: DatasetId, collection: FeatureCollection) {
        let kinds = collection.geometry_kinds();
        let (specs, source_id, url) = {
            let Some(handle) = self.datasets.get_mut(&id) else {
                return;
            };
            let plan = plan_for_kinds(&kinds);
            let specs = build_specs(&handle.source_id, &plan, &handle.style, false, handle.pickable);
            handle.feature_count = collection.len();
            handle.geometry_kinds = kinds;
            handle.sublayer_ids = specs.iter().map(|s| s.id.clone()).collect();
            (specs, handle.source_id.clone(), handle.url.clone())
        };

        self.surface
            .add_geojson_source(&source_id, collection.to_geojson_value());
        for spec in &specs {
            self.surface.add_sublayer(spec);
        }
        debug!(dataset = %id, sublayers = specs.len(), "dataset installed");

        let event = ControlEvent::new(EventKind::LayerAdd, self.snapshot())
            .with_url(url)
            .with_layer_id(source_id);
        self.emit(event);
    }

    /// Register a GeoParquet dataset for incremental, bounds-driven loading.
    ///
    /// On any registration failure (engine error or a table with no geometry
    /// column) the dataset degrades to a full download, with a status message
    /// explaining the downgrade. Registration failure is not a dataset error.
    async fn enable_viewport(&mut self, id: DatasetId) {
        let Some(handle) = self.datasets.get(&id) else {
            return;
        };
        let url = handle.url.clone();
        let table_name = handle.source_id.clone();
        let debounce_s = handle.debounce_s;

        let registration = match self.engine.register_remote_file(&url, &table_name).await {
            Ok(()) => self.engine.schema(&table_name).await,
            Err(err) => Err(err),
        };
        let columns = match registration {
            Ok(schema) => match schema.geometry_column {
                Some(geometry_column) => Some((geometry_column, schema.property_columns)),
                None => {
                    warn!(dataset = %id, url, "no geometry column; cannot query by bounds");
                    None
                }
            },
            Err(err) => {
                warn!(dataset = %id, url, error = %err, "remote registration failed");
                None
            }
        };

        let Some((geometry_column, property_columns)) = columns else {
            // Roll back any half-registration before the fallback download.
            if let Err(err) = self.engine.unregister_file(&table_name).await {
                debug!(dataset = %id, error = %err, "unregister after failed setup");
            }
            let message = "viewport loading failed; downloading full dataset".to_string();
            self.status = Some(message.clone());
            let event =
                ControlEvent::new(EventKind::Status, self.snapshot()).with_message(message);
            self.emit(event);

            let seq = {
                let Some(handle) = self.datasets.get_mut(&id) else {
                    return;
                };
                handle.viewport_mode = false;
                handle.load_seq
            };
            let ticket = LoadTicket { dataset: id, seq };
            let result = self.load_for_ticket(&ticket).await;
            self.finish_load(ticket, result);
            return;
        };

        let mut state = RefreshState::new(table_name, geometry_column, property_columns, debounce_s);
        state.phase = RefreshPhase::Queryable;
        self.refresh.insert(id, state);

        // Pre-create the source (empty for now) and all four kind-filtered
        // sublayers; composition is unknown until the first query lands.
        let (specs, source_id, url) = {
            let Some(handle) = self.datasets.get_mut(&id) else {
                return;
            };
            let specs = build_specs(
                &handle.source_id,
                &plan_for_viewport(),
                &handle.style,
                true,
                handle.pickable,
            );
            handle.sublayer_ids = specs.iter().map(|s| s.id.clone()).collect();
            (specs, handle.source_id.clone(), handle.url.clone())
        };
        self.surface
            .add_geojson_source(&source_id, FeatureCollection::default().to_geojson_value());
        for spec in &specs {
            self.surface.add_sublayer(spec);
        }
        self.in_flight.remove(&id);

        let event = ControlEvent::new(EventKind::LayerAdd, self.snapshot())
            .with_url(url)
            .with_layer_id(source_id);
        self.emit(event);

        // First population runs immediately; later ones wait on move-end.
        if let Some(ticket) = self.begin_refresh(id) {
            let result = self.run_refresh(&ticket).await;
            self.apply_refresh(ticket, result);
        }
    }

    /// Note a completed map movement at `now`. Cheap; the actual query waits
    /// for the dataset's quiescence window and runs from `pump`.
    pub fn on_move_end(&mut self, now: Time) {
        for state in self.refresh.values_mut() {
            if matches!(state.phase, RefreshPhase::Queryable | RefreshPhase::Querying) {
                state.debounce.trigger(now);
            }
        }
    }

    /// Advance debouncers to `now` and run any refresh that became due.
    /// Datasets fire in id order.
    pub async fn pump(&mut self, now: Time) {
        let due: Vec<DatasetId> = self
            .refresh
            .iter_mut()
            .filter_map(|(id, state)| state.debounce.fire_due(now).then_some(*id))
            .collect();

        for id in due {
            let Some(handle) = self.datasets.get(&id) else {
                continue;
            };
            let min_zoom = handle.viewport_min_zoom;
            let sublayer_ids = handle.sublayer_ids.clone();

            let viewport = self.surface.viewport();
            if viewport.zoom < min_zoom {
                // Zoomed out past the threshold: hide, and skip the query
                // entirely rather than fetch data nobody will see.
                for layer in &sublayer_ids {
                    self.surface.set_visibility(layer, false);
                }
                continue;
            }
            for layer in &sublayer_ids {
                self.surface.set_visibility(layer, true);
            }

            let Some(ticket) = self.begin_refresh(id) else {
                continue;
            };
            let result = self.run_refresh(&ticket).await;
            self.apply_refresh(ticket, result);
        }
    }

    /// Open a refresh ticket against the current viewport bounds. Returns
    /// `None` for datasets that are not in a queryable phase.
    pub fn begin_refresh(&mut self, id: DatasetId) -> Option<QueryTicket> {
        let bounds = self.surface.viewport().bounds;
        let state = self.refresh.get_mut(&id)?;
        if matches!(state.phase, RefreshPhase::Registered | RefreshPhase::Unregistered) {
            return None;
        }
        state.latest_seq += 1;
        state.phase = RefreshPhase::Querying;
        Some(QueryTicket {
            dataset: id,
            seq: state.latest_seq,
            bounds,
        })
    }

    /// Execute the bounds query for a ticket.
    pub async fn run_refresh(
        &self,
        ticket: &QueryTicket,
    ) -> Result<FeatureCollection, streaming::QueryError> {
        let Some(state) = self.refresh.get(&ticket.dataset) else {
            return Err(streaming::QueryError::new("dataset removed"));
        };
        self.engine
            .query_by_bounds(
                &state.table_name,
                ticket.bounds,
                &state.geometry_column,
                &state.property_columns,
            )
            .await
    }

    /// Apply a completed refresh. Only the ticket matching the dataset's
    /// latest sequence may update the source; stale completions from
    /// superseded viewports are discarded. A failed refresh keeps the
    /// previous data on screen and never touches the error state.
    pub fn apply_refresh(
        &mut self,
        ticket: QueryTicket,
        result: Result<FeatureCollection, streaming::QueryError>,
    ) {
        let Some(state) = self.refresh.get_mut(&ticket.dataset) else {
            return;
        };
        if ticket.seq != state.latest_seq {
            debug!(dataset = %ticket.dataset, seq = ticket.seq, "stale refresh discarded");
            return;
        }
        state.phase = RefreshPhase::Queryable;

        match result {
            Ok(collection) => {
                let kinds = collection.geometry_kinds();
                let source_id = {
                    let Some(handle) = self.datasets.get_mut(&ticket.dataset) else {
                        return;
                    };
                    handle.feature_count = collection.len();
                    handle.geometry_kinds = kinds;
                    handle.source_id.clone()
                };
                self.surface
                    .set_source_data(&source_id, collection.to_geojson_value());
            }
            Err(err) => {
                warn!(dataset = %ticket.dataset, error = %err, "viewport query failed; keeping previous data");
            }
        }
    }

    /// Tear down a dataset: surface objects, engine registration, refresh
    /// machine, popup. Returns `false` for unknown ids.
    pub async fn remove_dataset(&mut self, id: DatasetId) -> bool {
        let Some(handle) = self.datasets.remove(&id) else {
            return false;
        };
        self.in_flight.remove(&id);

        if let Some(mut state) = self.refresh.remove(&id) {
            state.phase = RefreshPhase::Unregistered;
            if let Err(err) = self.engine.unregister_file(&state.table_name).await {
                warn!(dataset = %id, error = %err, "unregister failed");
            }
        }

        for layer in &handle.sublayer_ids {
            self.surface.remove_sublayer(layer);
        }
        self.surface.remove_source(&handle.source_id);

        if let Some(popup) = &self.popup
            && handle.sublayer_ids.iter().any(|l| *l == popup.sublayer_id)
        {
            self.popup = None;
        }

        debug!(dataset = %id, url = handle.url, "dataset removed");
        let event = ControlEvent::new(EventKind::LayerRemove, self.snapshot())
            .with_url(handle.url)
            .with_layer_id(handle.source_id);
        self.emit(event);
        true
    }

    /// Adjust a dataset's opacity across all of its sublayers.
    pub fn set_opacity(&mut self, id: DatasetId, opacity: f32) -> bool {
        let (value, sublayer_ids) = {
            let Some(handle) = self.datasets.get_mut(&id) else {
                return false;
            };
            handle.style = handle.style.with_opacity(opacity);
            (handle.style.opacity, handle.sublayer_ids.clone())
        };
        for layer in &sublayer_ids {
            self.surface.set_opacity(layer, value);
        }
        true
    }

    /// Replace a dataset's style, pushing per-kind colors and the opacity to
    /// every existing sublayer.
    pub fn set_style(&mut self, id: DatasetId, style: VectorStyle) -> bool {
        let (source_id, sublayer_ids) = {
            let Some(handle) = self.datasets.get_mut(&id) else {
                return false;
            };
            handle.style = style;
            (handle.source_id.clone(), handle.sublayer_ids.clone())
        };
        for kind in SublayerKind::ALL {
            let layer = sublayer_id(&source_id, kind);
            if !sublayer_ids.contains(&layer) {
                continue;
            }
            let color = match kind {
                SublayerKind::Fill => style.fill_color,
                SublayerKind::Outline | SublayerKind::Line => style.line_color,
                SublayerKind::Circle => style.circle_color,
            };
            self.surface.set_color(&layer, color);
            self.surface.set_opacity(&layer, style.opacity);
        }
        true
    }

    /// Open the popup for a picked feature. Only pickable sublayers respond;
    /// at most one popup exists, so an open popup is replaced.
    pub fn open_popup(&mut self, sublayer: &str, feature: &Feature) -> bool {
        let pickable = self
            .datasets
            .values()
            .any(|h| h.pickable && h.sublayer_ids.iter().any(|l| l == sublayer));
        if !pickable {
            return false;
        }
        self.popup = Some(PopupContent::from_feature(sublayer, feature));
        true
    }

    pub fn popup(&self) -> Option<&PopupContent> {
        self.popup.as_ref()
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    use foundation::{LonLatBounds, Time, Viewport};
    use formats::FeatureCollection;
    use host::MemorySurface;
    use layers::VectorStyle;
    use streaming::{MemoryFetch, MemoryQueryEngine};

    use super::{LoadTicket, VectorDatasetControl};
    use crate::dataset::DatasetOptions;
    use crate::events::{ControlEvent, EventKind};
    use crate::viewport::RefreshPhase;

    const MIXED: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "park"},
             "geometry": {"type": "Polygon",
                          "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"name": "kiosk"},
             "geometry": {"type": "Point", "coordinates": [0.5, 0.5]}}
        ]
    }"#;

    fn control_with(
        responses: &[(&str, &str)],
    ) -> (VectorDatasetControl<MemorySurface>, Arc<MemoryQueryEngine>) {
        let mut fetch = MemoryFetch::new();
        for (url, body) in responses {
            fetch.insert(*url, body.as_bytes().to_vec());
        }
        let engine = Arc::new(MemoryQueryEngine::new());
        let control = VectorDatasetControl::new(
            MemorySurface::new(),
            Arc::new(fetch),
            Arc::clone(&engine) as Arc<dyn streaming::QueryEngine>,
        );
        (control, engine)
    }

    fn capture(
        control: &mut VectorDatasetControl<MemorySurface>,
        kind: EventKind,
    ) -> Rc<RefCell<Vec<ControlEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        control.on(kind, move |event| sink.borrow_mut().push(event.clone()));
        seen
    }

    #[tokio::test]
    async fn geojson_dataset_creates_only_needed_sublayers() {
        let (mut control, _) = control_with(&[("https://x/parks.geojson", MIXED)]);
        let adds = capture(&mut control, EventKind::LayerAdd);

        let id = control
            .add_dataset("https://x/parks.geojson", DatasetOptions::default())
            .await;

        let handle = control.dataset(id).expect("handle");
        assert_eq!(handle.feature_count, 2);
        assert_eq!(
            handle.sublayer_ids,
            vec!["dataset-1-fill", "dataset-1-outline", "dataset-1-circle"]
        );
        assert!(control.surface().source("dataset-1").is_some());
        assert!(!control.loading());
        assert_eq!(control.error(), None);

        let adds = adds.borrow();
        assert_eq!(adds.len(), 1);
        assert_eq!(adds[0].url.as_deref(), Some("https://x/parks.geojson"));
        assert_eq!(adds[0].layer_id.as_deref(), Some("dataset-1"));
        assert_eq!(adds[0].snapshot.dataset_count, 1);
    }

    #[tokio::test]
    async fn failed_load_sets_error_and_emits() {
        let (mut control, _) = control_with(&[]);
        let errors = capture(&mut control, EventKind::Error);

        control
            .add_dataset("https://x/gone.geojson", DatasetOptions::default())
            .await;

        assert!(!control.loading());
        assert!(control.error().is_some());
        let errors = errors.borrow();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.as_deref().is_some());
        // The entry stays in the registry so the UI can show the failure.
        assert_eq!(control.dataset_ids().len(), 1);
        assert!(control.surface().sublayer_ids().is_empty());
    }

    #[tokio::test]
    async fn removed_dataset_ignores_its_late_completion() {
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let removes = capture(&mut control, EventKind::LayerRemove);

        let ticket = control.request_dataset("https://x/a.geojson", DatasetOptions::default());
        let result = control.load_for_ticket(&ticket).await;
        assert!(control.remove_dataset(ticket.dataset).await);
        control.finish_load(ticket, result);

        assert!(control.dataset(ticket.dataset).is_none());
        assert!(control.surface().source("dataset-1").is_none());
        assert!(control.surface().sublayer_ids().is_empty());
        assert!(!control.loading());
        assert_eq!(removes.borrow().len(), 1);
    }

    #[tokio::test]
    async fn load_after_removal_is_cancelled_not_a_parse_failure() {
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let ticket = control.request_dataset("https://x/a.geojson", DatasetOptions::default());
        control.remove_dataset(ticket.dataset).await;

        let err = control.load_for_ticket(&ticket).await.unwrap_err();
        assert!(matches!(err, streaming::LoadError::Cancelled));
    }

    #[tokio::test]
    async fn superseded_load_ticket_is_discarded() {
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let ticket = control.request_dataset("https://x/a.geojson", DatasetOptions::default());
        let result = control.load_for_ticket(&ticket).await;

        let stale = LoadTicket {
            dataset: ticket.dataset,
            seq: ticket.seq + 1,
        };
        control.finish_load(ticket, result);
        // A mismatched sequence leaves everything untouched.
        let count_before = control.surface().ops().len();
        control.finish_load(stale, Ok(FeatureCollection::default()));
        assert_eq!(control.surface().ops().len(), count_before);
    }

    fn viewport_setup() -> (VectorDatasetControl<MemorySurface>, Arc<MemoryQueryEngine>) {
        let engine = Arc::new(MemoryQueryEngine::new());
        let table = FeatureCollection::from_geojson_str(MIXED).expect("table");
        engine.insert_table("https://x/t.parquet", Some("geometry"), table);

        let surface = MemorySurface::with_viewport(Viewport::new(
            LonLatBounds::new(-1.0, -1.0, 2.0, 2.0),
            10.0,
        ));
        let control = VectorDatasetControl::new(
            surface,
            Arc::new(MemoryFetch::new()),
            Arc::clone(&engine) as Arc<dyn streaming::QueryEngine>,
        );
        (control, engine)
    }

    #[tokio::test]
    async fn viewport_dataset_registers_and_runs_initial_query() {
        let (mut control, engine) = viewport_setup();
        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;

        assert_eq!(control.refresh_phase(id), Some(RefreshPhase::Queryable));
        assert_eq!(engine.registered_names(), vec!["dataset-1".to_string()]);
        assert_eq!(engine.query_count(), 1);
        assert!(control.wants_move_end());

        // All four kind-filtered sublayers exist before composition is known.
        let handle = control.dataset(id).expect("handle");
        assert_eq!(handle.sublayer_ids.len(), 4);
        assert_eq!(handle.feature_count, 2);
    }

    #[tokio::test]
    async fn move_end_coalesces_into_one_query() {
        let (mut control, engine) = viewport_setup();
        control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;
        assert_eq!(engine.query_count(), 1);

        control.on_move_end(Time(0.0));
        control.on_move_end(Time(0.1));
        control.on_move_end(Time(0.2));
        control.pump(Time(0.3)).await; // window restarted at 0.2
        assert_eq!(engine.query_count(), 1);

        control.pump(Time(0.5)).await;
        assert_eq!(engine.query_count(), 2);

        // One-shot until the next movement.
        control.pump(Time(10.0)).await;
        assert_eq!(engine.query_count(), 2);
    }

    #[tokio::test]
    async fn refresh_queries_current_bounds() {
        let (mut control, engine) = viewport_setup();
        control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;

        let moved = LonLatBounds::new(10.0, 10.0, 20.0, 20.0);
        control
            .surface_mut()
            .set_viewport(Viewport::new(moved, 10.0));
        control.on_move_end(Time(0.0));
        control.pump(Time(1.0)).await;

        assert_eq!(engine.last_query_bounds(), Some(moved));
    }

    #[tokio::test]
    async fn low_zoom_hides_sublayers_without_querying() {
        let (mut control, engine) = viewport_setup();
        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;
        assert_eq!(engine.query_count(), 1);

        control
            .surface_mut()
            .set_viewport(Viewport::new(LonLatBounds::world(), 4.0));
        control.on_move_end(Time(0.0));
        control.pump(Time(1.0)).await;

        assert_eq!(engine.query_count(), 1);
        let handle = control.dataset(id).expect("handle");
        for layer in &handle.sublayer_ids {
            let record = control.surface().sublayer(layer).expect("sublayer");
            assert!(!record.visible);
        }

        // Zooming back in shows and queries again.
        control
            .surface_mut()
            .set_viewport(Viewport::new(LonLatBounds::world(), 9.0));
        control.on_move_end(Time(2.0));
        control.pump(Time(3.0)).await;
        assert_eq!(engine.query_count(), 2);
        for layer in &control.dataset(id).expect("handle").sublayer_ids {
            assert!(control.surface().sublayer(layer).expect("sublayer").visible);
        }
    }

    #[tokio::test]
    async fn stale_refresh_result_is_discarded() {
        let (mut control, _) = viewport_setup();
        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;

        let first = control.begin_refresh(id).expect("first ticket");
        let second = control.begin_refresh(id).expect("second ticket");

        let fresh = control.run_refresh(&second).await;
        control.apply_refresh(second, fresh);
        let count_after_fresh = control.dataset(id).expect("handle").feature_count;

        // The older ticket completes afterwards with an empty result; it
        // must not overwrite the newer data.
        control.apply_refresh(first, Ok(FeatureCollection::default()));
        assert_eq!(
            control.dataset(id).expect("handle").feature_count,
            count_after_fresh
        );
        assert_eq!(control.refresh_phase(id), Some(RefreshPhase::Queryable));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_data_and_error_state() {
        let (mut control, _) = viewport_setup();
        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;
        let before = control.dataset(id).expect("handle").feature_count;

        let ticket = control.begin_refresh(id).expect("ticket");
        control.apply_refresh(ticket, Err(streaming::QueryError::new("engine hiccup")));

        assert_eq!(control.dataset(id).expect("handle").feature_count, before);
        assert_eq!(control.error(), None);
        assert_eq!(control.refresh_phase(id), Some(RefreshPhase::Queryable));
    }

    #[tokio::test]
    async fn failed_registration_falls_back_to_full_download() {
        // The engine knows no tables, so registration fails; the fetch layer
        // serves the parquet URL, which the memory engine decodes as GeoJSON.
        let mut fetch = MemoryFetch::new();
        fetch.insert("https://x/t.parquet", MIXED.as_bytes().to_vec());
        let engine = Arc::new(MemoryQueryEngine::new());
        let mut control = VectorDatasetControl::new(
            MemorySurface::new(),
            Arc::new(fetch),
            Arc::clone(&engine) as Arc<dyn streaming::QueryEngine>,
        );
        let statuses = capture(&mut control, EventKind::Status);

        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;

        let status = control.status().expect("status");
        assert!(status.contains("viewport loading failed"));
        assert_eq!(statuses.borrow().len(), 1);
        assert!(!control.wants_move_end());
        assert!(!control.dataset(id).expect("handle").viewport_mode);
        assert_eq!(control.dataset(id).expect("handle").feature_count, 2);
        assert!(control.surface().source("dataset-1").is_some());
        assert_eq!(control.error(), None);
    }

    #[tokio::test]
    async fn removing_viewport_dataset_unregisters_and_drops_listener() {
        let (mut control, engine) = viewport_setup();
        let id = control
            .add_dataset("https://x/t.parquet", DatasetOptions::viewport(8.0))
            .await;
        assert!(control.wants_move_end());

        assert!(control.remove_dataset(id).await);
        assert!(!control.wants_move_end());
        assert!(engine.registered_names().is_empty());
        assert!(control.surface().sublayer_ids().is_empty());

        // Movement after removal is inert.
        control.on_move_end(Time(0.0));
        control.pump(Time(1.0)).await;
        assert_eq!(engine.query_count(), 1);
    }

    #[tokio::test]
    async fn style_changes_propagate_to_sublayers() {
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let id = control
            .add_dataset("https://x/a.geojson", DatasetOptions::default())
            .await;

        assert!(control.set_opacity(id, 0.25));
        let fill = control.surface().sublayer("dataset-1-fill").expect("fill");
        assert_eq!(fill.opacity, 0.25);

        let style = VectorStyle {
            fill_color: [1.0, 0.0, 0.0, 1.0],
            ..VectorStyle::default()
        };
        assert!(control.set_style(id, style));
        let fill = control.surface().sublayer("dataset-1-fill").expect("fill");
        assert_eq!(fill.color, [1.0, 0.0, 0.0, 1.0]);
        let circle = control
            .surface()
            .sublayer("dataset-1-circle")
            .expect("circle");
        assert_eq!(circle.color, style.circle_color);
    }

    #[tokio::test]
    async fn popup_requires_pickable_and_replaces_previous() {
        let options = DatasetOptions {
            pickable: true,
            ..DatasetOptions::default()
        };
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let id = control.add_dataset("https://x/a.geojson", options).await;

        let table = FeatureCollection::from_geojson_str(MIXED).expect("features");
        assert!(control.open_popup("dataset-1-fill", &table.features[0]));
        assert!(control.open_popup("dataset-1-circle", &table.features[1]));
        let popup = control.popup().expect("popup");
        assert_eq!(popup.sublayer_id, "dataset-1-circle");

        assert!(!control.open_popup("dataset-1-line", &table.features[0]));

        control.close_popup();
        assert!(control.popup().is_none());

        // Popups die with their dataset.
        assert!(control.open_popup("dataset-1-fill", &table.features[0]));
        control.remove_dataset(id).await;
        assert!(control.popup().is_none());
    }

    #[tokio::test]
    async fn unsubscribed_listeners_stop_firing() {
        let (mut control, _) = control_with(&[("https://x/a.geojson", MIXED)]);
        let seen = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&seen);
        let sub = control.on(EventKind::LayerAdd, move |_| *sink.borrow_mut() += 1);

        control
            .add_dataset("https://x/a.geojson", DatasetOptions::default())
            .await;
        assert_eq!(*seen.borrow(), 1);

        assert!(control.off(sub));
        control
            .add_dataset("https://x/a.geojson", DatasetOptions::default())
            .await;
        assert_eq!(*seen.borrow(), 1);
    }
}
