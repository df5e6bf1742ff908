use crate::bounds::LonLatBounds;

/// Snapshot of the host map's camera, read on every move-end event.
///
/// Not persisted anywhere; a fresh value is taken from the host each time the
/// refresh loop runs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub bounds: LonLatBounds,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(bounds: LonLatBounds, zoom: f64) -> Self {
        Self { bounds, zoom }
    }
}
