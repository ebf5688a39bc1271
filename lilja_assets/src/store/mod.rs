//! Store implementations backing the loaders.
//!
//! - `memory`: in-process stores with call recording, used by tests and
//!   tooling.
//! - `fs`: stores reading asset files from a root directory.

pub mod fs;
pub mod memory;
