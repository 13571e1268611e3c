//! Shared helpers for the crate's unit tests.

use crate::analyzer::{Analyzer, ModuleId};

/// An in-memory analyzer holding one module named `mod`.
pub(crate) fn analyzer_with(source: &str) -> (Analyzer, ModuleId) {
    let mut analyzer = Analyzer::in_memory();
    let module = analyzer.add_module("mod", source);
    (analyzer, module)
}

/// An in-memory analyzer holding several named modules, in order.
pub(crate) fn analyzer_with_modules(modules: &[(&str, &str)]) -> (Analyzer, Vec<ModuleId>) {
    let mut analyzer = Analyzer::in_memory();
    let ids = modules
        .iter()
        .map(|(name, source)| analyzer.add_module(name, source))
        .collect();
    (analyzer, ids)
}
