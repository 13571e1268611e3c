//! sift: static semantic analysis for Python.
//!
//! The root crate is the CLI shell. The engine lives in the workspace
//! crates: `sift-core` (errors, text positions, caching primitives) and
//! `sift-python` (the analyzer itself). Library users should depend on
//! `sift-python` directly; this crate re-exports the types the CLI layer
//! surfaces.

pub mod cli;
pub mod output;

pub use sift_core::error::{OutputErrorCode, SiftError};
pub use sift_python::{Analyzer, ModuleId, Occurrence, Project, ProjectConfig, ResolvedName};
