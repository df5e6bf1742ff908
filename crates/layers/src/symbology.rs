/// Premultiplied-free RGBA color, one channel per component in [0, 1].
pub type Rgba = [f32; 4];

/// Per-dataset style knobs surfaced by the control (color pickers + opacity
/// slider in the original UI).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VectorStyle {
    pub fill_color: Rgba,
    pub line_color: Rgba,
    pub circle_color: Rgba,
    pub opacity: f32,
}

impl VectorStyle {
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

impl Default for VectorStyle {
    fn default() -> Self {
        Self {
            fill_color: [0.33, 0.55, 0.85, 1.0],
            line_color: [0.20, 0.35, 0.60, 1.0],
            circle_color: [0.90, 0.45, 0.25, 1.0],
            opacity: 0.8,
        }
    }
}
