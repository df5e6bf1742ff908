pub mod error;
pub mod fetch;
pub mod fgb;
pub mod geojson;
pub mod geoparquet;
pub mod query;

pub use error::*;
pub use fetch::*;
pub use fgb::*;
pub use geojson::*;
pub use geoparquet::*;
pub use query::*;
