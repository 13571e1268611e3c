//! Core infrastructure for sift.
//!
//! This crate carries the non-Python-specific building blocks shared by the
//! analysis engine and the CLI:
//! - [`error`]: unified error type and stable output codes
//! - [`text`]: line indexing and identifier utilities
//! - [`cache`]: generation counters, invalidation-aware cache cells, arenas

pub mod cache;
pub mod error;
pub mod text;

pub use error::{OutputErrorCode, SiftError};
pub use text::{LineIndex, Span};
