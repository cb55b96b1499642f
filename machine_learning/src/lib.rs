pub mod arch;
pub mod config;
pub mod data;
mod error;
pub mod optimization;
pub mod training;

pub use error::{MlErr, Result};
