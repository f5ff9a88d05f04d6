//! Command-line driver for the splitexit early-exit classifier.

pub mod cli;
pub mod dataset;
pub mod eval;

pub use cli::*;
pub use dataset::*;
pub use eval::*;
