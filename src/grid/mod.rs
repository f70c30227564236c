mod cell;
mod grid;
mod widget;

pub use cell::*;
pub use grid::*;
pub use widget::*;
