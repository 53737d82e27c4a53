//! Foundational low-level utilities shared across ew crates.
//!
//! Provides app-directory resolution with restrictive permissions,
//! atomic file-write helpers, and time utilities used by state
//! persistence and staleness calculations.

pub mod appdirs;
pub mod atomic_io;
pub mod pathsearch;
pub mod time_utils;

pub use atomic_io::{write_secure_text_atomic, write_text_atomic};
pub use pathsearch::lookup_path;
pub use time_utils::{now_rfc3339, parse_rfc3339, seconds_since};
