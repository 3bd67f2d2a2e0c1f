mod frequency;
mod grid;
mod taper;
mod uvw;
mod visibility;

pub use frequency::*;
pub use grid::*;
pub use taper::*;
pub use uvw::*;
pub use visibility::*;
