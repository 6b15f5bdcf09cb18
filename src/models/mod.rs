pub mod cell_params;
pub mod shape;

pub use cell_params::*;
pub use shape::*;
