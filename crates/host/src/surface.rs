use foundation::viewport::Viewport;
use layers::{Rgba, SublayerSpec};
use serde_json::Value;

/// The host rendering engine's imperative surface, as consumed by the
/// controls. The engine owns rendering and the derived source/layer objects;
/// this side only drives them.
///
/// Sources carry GeoJSON payloads because that is the lingua franca of the
/// engines this targets. Mutations are fire-and-forget: a host that cannot
/// honor one (unknown id after an external style reset, say) drops it.
pub trait MapSurface {
    fn add_geojson_source(&mut self, source_id: &str, data: Value);

    /// Replace the live contents of an existing source.
    fn set_source_data(&mut self, source_id: &str, data: Value);

    fn remove_source(&mut self, source_id: &str);

    fn add_sublayer(&mut self, spec: &SublayerSpec);

    fn remove_sublayer(&mut self, sublayer_id: &str);

    fn set_visibility(&mut self, sublayer_id: &str, visible: bool);

    fn set_color(&mut self, sublayer_id: &str, color: Rgba);

    fn set_opacity(&mut self, sublayer_id: &str, opacity: f32);

    /// Current camera: bounds + zoom, read fresh on every call.
    fn viewport(&self) -> Viewport;
}
