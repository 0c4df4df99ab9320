//! Configuration module
//!
//! Constants and default values used across monorail.

pub mod defaults;
