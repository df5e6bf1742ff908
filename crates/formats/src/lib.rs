pub mod detect;
pub mod feature;

pub use detect::*;
pub use feature::*;
