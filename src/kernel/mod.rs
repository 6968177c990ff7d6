//! Kernel functions and kernel matrix construction

pub mod gaussian;
pub mod matrix;
pub mod traits;

pub use self::gaussian::*;
pub use self::matrix::*;
pub use self::traits::*;
