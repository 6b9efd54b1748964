//! Core types: errors, ini configuration, option resolution, cancellation.

pub mod cancel;
pub mod config;
pub mod context;
pub mod errors;
pub mod options;
