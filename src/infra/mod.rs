//! Infrastructure layer
//!
//! Handles all I/O operations: filesystem, external processes, and
//! console output plumbing. This module is the only place where side
//! effects on the host system occur.

pub mod filesystem;
pub mod interleaver;
pub mod process;
pub mod recycler;
