//! Python semantic analysis for sift.
//!
//! This crate builds a model of names, scopes, and inferred object types
//! from Python syntax trees, sufficient to support IDE-grade operations
//! (find-definition, find-usages, call-signature lookup) without executing
//! the analyzed code. It includes:
//! - An adapter over the external parser ([`syntax`])
//! - The object model and name-binding layer ([`objects`], [`names`])
//! - Lexical scope construction ([`scopes`])
//! - Symbolic expression evaluation ([`evaluate`])
//! - Structural and call-based type inference ([`infer`], [`builtins`])
//! - The name-resolution facade and occurrence finder ([`resolve`],
//!   [`occurrences`])
//! - The project/resource layer and dynamic-observation seeding
//!   ([`project`], [`dynamic`])
//!
//! Inference is best-effort by design: anything the engine cannot determine
//! degrades to the canonical `Unknown` object rather than failing.

pub mod analyzer;
pub mod builtins;
pub mod codescan;
pub mod dynamic;
pub mod evaluate;
pub mod infer;
pub mod names;
pub mod objects;
pub mod occurrences;
pub mod project;
pub mod resolve;
pub mod scopes;
pub mod syntax;

#[cfg(test)]
pub(crate) mod test_support;

pub use analyzer::{Analyzer, ModuleId, OutlineItem};
pub use dynamic::{CallSample, ObservationFile, TypeDescriptor};
pub use names::{BindingId, NameRef, Resolved};
pub use objects::ObjectId;
pub use occurrences::Occurrence;
pub use project::{Project, ProjectConfig};
pub use resolve::{NameKind, ResolvedName};
pub use scopes::ScopeId;
