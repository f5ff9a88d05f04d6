//! Embedding clustering primitives for splitexit.

pub mod config;
pub mod error;
pub mod kmeans;
pub mod utils;

pub use config::*;
pub use error::*;
pub use kmeans::*;
pub use utils::*;
