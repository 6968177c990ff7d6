//! Regularized least-squares solver on a low-rank kernel
//!
//! Closed-form coefficients c = (K_approx + λI)⁻¹ y and the leave-one-out
//! error used to choose λ.

pub mod inverse;
pub mod loo;

pub use self::inverse::*;
pub use self::loo::*;
