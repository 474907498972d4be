//! Centralized constants for the k3rs DNS cache.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod dns;
pub mod labels;
pub mod paths;
pub mod state;
