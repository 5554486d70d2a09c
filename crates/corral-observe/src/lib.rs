//! Logging setup shared by the corral binaries.
mod logger;
pub use logger::*;
