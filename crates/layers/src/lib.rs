pub mod picking;
pub mod sublayer;
pub mod symbology;

pub use picking::*;
pub use sublayer::*;
pub use symbology::*;
