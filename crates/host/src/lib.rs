pub mod memory;
pub mod surface;

pub use memory::*;
pub use surface::*;
