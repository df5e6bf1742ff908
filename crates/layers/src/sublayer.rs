use formats::GeometryKind;

use crate::symbology::{Rgba, VectorStyle};

/// One rendering primitive derived from a logical dataset.
///
/// `Fill` and `Outline` always travel together (one "area group"); `Line`
/// and `Circle` each form their own group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SublayerKind {
    Fill,
    Outline,
    Line,
    Circle,
}

impl SublayerKind {
    pub const ALL: [SublayerKind; 4] = [
        SublayerKind::Fill,
        SublayerKind::Outline,
        SublayerKind::Line,
        SublayerKind::Circle,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            SublayerKind::Fill => "fill",
            SublayerKind::Outline => "outline",
            SublayerKind::Line => "line",
            SublayerKind::Circle => "circle",
        }
    }

    /// The geometry kind this sublayer draws.
    pub fn draws(&self) -> GeometryKind {
        match self {
            SublayerKind::Fill | SublayerKind::Outline => GeometryKind::Area,
            SublayerKind::Line => GeometryKind::Line,
            SublayerKind::Circle => GeometryKind::Point,
        }
    }
}

/// Everything the host engine needs to materialize one sublayer.
#[derive(Debug, Clone, PartialEq)]
pub struct SublayerSpec {
    pub id: String,
    pub source_id: String,
    pub kind: SublayerKind,
    pub color: Rgba,
    pub opacity: f32,
    /// When set, only features of this geometry kind draw in the sublayer.
    /// Used by viewport mode, where the composition is unknown up front.
    pub kind_filter: Option<GeometryKind>,
    pub pickable: bool,
}

pub fn sublayer_id(source_id: &str, kind: SublayerKind) -> String {
    format!("{source_id}-{}", kind.suffix())
}

/// Which sublayers a collection with these geometry kinds needs.
///
/// Deterministic order: fill, outline, line, circle.
pub fn plan_for_kinds(kinds: &[GeometryKind]) -> Vec<SublayerKind> {
    SublayerKind::ALL
        .into_iter()
        .filter(|s| kinds.contains(&s.draws()))
        .collect()
}

/// Viewport mode pre-creates every sublayer: the geometry composition is
/// unknown until the first bounds query completes, so each sublayer carries
/// a kind filter instead.
pub fn plan_for_viewport() -> Vec<SublayerKind> {
    SublayerKind::ALL.to_vec()
}

pub fn build_specs(
    source_id: &str,
    plan: &[SublayerKind],
    style: &VectorStyle,
    filtered: bool,
    pickable: bool,
) -> Vec<SublayerSpec> {
    plan.iter()
        .map(|&kind| {
            let color = match kind {
                SublayerKind::Fill => style.fill_color,
                SublayerKind::Outline | SublayerKind::Line => style.line_color,
                SublayerKind::Circle => style.circle_color,
            };
            SublayerSpec {
                id: sublayer_id(source_id, kind),
                source_id: source_id.to_string(),
                kind,
                color,
                opacity: style.opacity,
                kind_filter: filtered.then(|| kind.draws()),
                pickable,
            }
        })
        .collect()
}
