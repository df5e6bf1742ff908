use std::collections::BTreeMap;

use foundation::bounds::LonLatBounds;
use foundation::viewport::Viewport;
use layers::{Rgba, SublayerSpec};
use serde_json::Value;

use crate::surface::MapSurface;

/// One sublayer as the in-memory engine currently sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct SublayerRecord {
    pub spec: SublayerSpec,
    pub visible: bool,
    pub color: Rgba,
    pub opacity: f32,
}

/// Structural log entry for order-sensitive assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    AddSource(String),
    SetSourceData(String),
    RemoveSource(String),
    AddSublayer(String),
    RemoveSublayer(String),
    SetVisibility(String, bool),
    SetColor(String, Rgba),
    SetOpacity(String, f32),
}

/// In-memory host engine for tests and headless runs.
///
/// Keeps sources and sublayers in `BTreeMap`s for stable traversal and
/// records mutations in call order.
#[derive(Debug, Default)]
pub struct MemorySurface {
    sources: BTreeMap<String, Value>,
    sublayers: BTreeMap<String, SublayerRecord>,
    viewport: Option<Viewport>,
    ops: Vec<SurfaceOp>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            viewport: Some(viewport),
            ..Self::default()
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    pub fn source(&self, source_id: &str) -> Option<&Value> {
        self.sources.get(source_id)
    }

    pub fn sublayer(&self, sublayer_id: &str) -> Option<&SublayerRecord> {
        self.sublayers.get(sublayer_id)
    }

    pub fn sublayer_ids(&self) -> Vec<&str> {
        self.sublayers.keys().map(|k| k.as_str()).collect()
    }

    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }
}

impl MapSurface for MemorySurface {
    fn add_geojson_source(&mut self, source_id: &str, data: Value) {
        self.ops.push(SurfaceOp::AddSource(source_id.to_string()));
        self.sources.insert(source_id.to_string(), data);
    }

    fn set_source_data(&mut self, source_id: &str, data: Value) {
        self.ops.push(SurfaceOp::SetSourceData(source_id.to_string()));
        self.sources.insert(source_id.to_string(), data);
    }

    fn remove_source(&mut self, source_id: &str) {
        self.ops.push(SurfaceOp::RemoveSource(source_id.to_string()));
        self.sources.remove(source_id);
    }

    fn add_sublayer(&mut self, spec: &SublayerSpec) {
        self.ops.push(SurfaceOp::AddSublayer(spec.id.clone()));
        self.sublayers.insert(
            spec.id.clone(),
            SublayerRecord {
                spec: spec.clone(),
                visible: true,
                color: spec.color,
                opacity: spec.opacity,
            },
        );
    }

    fn remove_sublayer(&mut self, sublayer_id: &str) {
        self.ops
            .push(SurfaceOp::RemoveSublayer(sublayer_id.to_string()));
        self.sublayers.remove(sublayer_id);
    }

    fn set_visibility(&mut self, sublayer_id: &str, visible: bool) {
        self.ops
            .push(SurfaceOp::SetVisibility(sublayer_id.to_string(), visible));
        if let Some(record) = self.sublayers.get_mut(sublayer_id) {
            record.visible = visible;
        }
    }

    fn set_color(&mut self, sublayer_id: &str, color: Rgba) {
        self.ops
            .push(SurfaceOp::SetColor(sublayer_id.to_string(), color));
        if let Some(record) = self.sublayers.get_mut(sublayer_id) {
            record.color = color;
        }
    }

    fn set_opacity(&mut self, sublayer_id: &str, opacity: f32) {
        self.ops
            .push(SurfaceOp::SetOpacity(sublayer_id.to_string(), opacity));
        if let Some(record) = self.sublayers.get_mut(sublayer_id) {
            record.opacity = opacity;
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
            .unwrap_or_else(|| Viewport::new(LonLatBounds::world(), 0.0))
    }
}
