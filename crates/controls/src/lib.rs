pub mod control;
pub mod dataset;
pub mod events;
pub mod viewport;

pub use control::*;
pub use dataset::*;
pub use events::*;
pub use viewport::*;
