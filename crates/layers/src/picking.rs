use formats::Feature;
use serde_json::Value;

/// Attribute table shown when a pickable sublayer is clicked.
///
/// Contract: built from the first feature under the cursor; rows are the
/// feature's non-geometry attributes in property order. The control enforces
/// "at most one popup open" by replacing its current popup with a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub sublayer_id: String,
    pub rows: Vec<(String, String)>,
}

impl PopupContent {
    pub fn from_feature(sublayer_id: impl Into<String>, feature: &Feature) -> Self {
        let rows = feature
            .properties
            .iter()
            .map(|(key, value)| (key.clone(), display_value(value)))
            .collect();
        Self {
            sublayer_id: sublayer_id.into(),
            rows,
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
