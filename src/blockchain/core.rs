pub mod chain;
pub mod validation;

pub use chain::*;
pub use validation::*;
