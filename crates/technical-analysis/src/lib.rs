pub mod indicators;
pub mod momentum;


pub use indicators::*;
pub use momentum::*;
