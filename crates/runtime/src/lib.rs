pub mod debounce;
pub mod hub;

pub use debounce::*;
pub use hub::*;
