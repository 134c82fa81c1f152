//! Pure processors that reshape fetched rows into display-ready structures.
//!
//! Nothing here performs I/O; services fetch the inputs.

pub mod map;
pub mod stats;
pub mod timeline;
