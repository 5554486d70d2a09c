//! Value types shared by every role of the launcher: the client, the
//! per-job supervisor and the coordinator-side collaborators.
//!
//! Everything here is plain data. Types are immutable once built, serialize
//! with `serde` and carry no I/O.

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;

pub mod constants;
