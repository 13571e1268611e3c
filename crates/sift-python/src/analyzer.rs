//! The analyzer: module registry, arenas, and invalidation.
//!
//! All analysis state lives in one [`Analyzer`] value. Objects, bindings,
//! and scopes are arena-allocated and addressed by index, which keeps the
//! lazily-built, mutually-referential model free of reference cycles. Each
//! module carries a generation counter; derived results are cached in
//! generation-tagged cells, so editing a module (or anything it transitively
//! feeds) invalidates stale conclusions without eager recomputation.
//!
//! The analyzer's behavior-bearing methods live in the sibling modules
//! (`scopes`, `objects`, `names`, `evaluate`, `infer`, ...); this module
//! holds the struct itself, module loading, and the import machinery.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustpython_parser::ast;
use tracing::debug;

use sift_core::cache::{Arena, Cell, Generation};
use sift_core::define_idx;
use sift_core::text::LineIndex;

use crate::infer::CallTable;
use crate::names::{Binding, BindingId, NameRef, Resolved};
use crate::objects::{ContainerKind, ObjectId, PyObject, ScalarKind};
use crate::project::Project;
use crate::scopes::{Scope, ScopeId};
use crate::syntax::{self, SyntaxError};

define_idx! {
    /// Index of a loaded module in the analyzer.
    pub struct ModuleId
}

// ============================================================================
// Module State
// ============================================================================

/// Everything the analyzer holds for one loaded module.
#[derive(Debug)]
pub struct ModuleState {
    /// Dotted module name (`pkg.sub.mod`).
    pub name: String,
    /// Backing file, absent for in-memory modules.
    pub resource: Option<PathBuf>,
    /// Normalized source text.
    pub source: String,
    /// Parsed top-level statements; `None` when the source does not parse.
    pub suite: Option<Arc<Vec<ast::Stmt>>>,
    pub parse_error: Option<SyntaxError>,
    pub lines: LineIndex,
    /// Bumped on every source change; tags all cached conclusions.
    pub generation: Generation,
    /// The module (or package) object representing this module.
    pub object: ObjectId,
    pub scope: Cell<ScopeId>,
    /// Modules whose conclusions may depend on this one.
    pub dependents: HashSet<ModuleId>,
    /// Package directory when this module is a package `__init__`.
    pub folder: Option<PathBuf>,
}

// ============================================================================
// Analyzer
// ============================================================================

/// The semantic analysis engine. One instance per analyzed project.
pub struct Analyzer {
    pub(crate) project: Project,
    pub(crate) modules: Arena<ModuleId, ModuleState>,
    pub(crate) module_ids: HashMap<String, ModuleId>,
    pub(crate) objects: Arena<ObjectId, PyObject>,
    pub(crate) bindings: Arena<BindingId, Binding>,
    pub(crate) scopes: Arena<ScopeId, Scope>,
    pub(crate) containers: HashMap<(ContainerKind, Vec<ObjectId>), ObjectId>,
    pub(crate) scalars: HashMap<ScalarKind, ObjectId>,
    pub(crate) instances: HashMap<ObjectId, ObjectId>,
    /// Lambda objects memoized by position, so re-evaluating the same
    /// expression yields the same object.
    pub(crate) lambdas: HashMap<(ModuleId, sift_core::text::Span), ObjectId>,
    pub(crate) calls: CallTable,
    /// Set whenever an in-progress result leaks into a computation; used to
    /// keep tainted values out of the caches.
    pub(crate) pending_seen: bool,
    /// Star-import bindings currently being expanded, to cut import cycles.
    pub(crate) star_guard: HashSet<BindingId>,
}

impl Analyzer {
    pub fn new(project: Project) -> Self {
        let mut objects = Arena::new();
        // Canonical singletons occupy fixed slots; the accessors in
        // `objects` rely on this allocation order.
        objects.alloc(PyObject::Unknown);
        objects.alloc(PyObject::TypeType);
        objects.alloc(PyObject::FunctionType);
        objects.alloc(PyObject::ModuleType);
        Analyzer {
            project,
            modules: Arena::new(),
            module_ids: HashMap::new(),
            objects,
            bindings: Arena::new(),
            scopes: Arena::new(),
            containers: HashMap::new(),
            scalars: HashMap::new(),
            instances: HashMap::new(),
            lambdas: HashMap::new(),
            calls: CallTable::new(),
            pending_seen: false,
            star_guard: HashSet::new(),
        }
    }

    /// An analyzer over no file tree; modules arrive via [`Self::add_module`].
    pub fn in_memory() -> Self {
        Analyzer::new(Project::empty())
    }

    pub fn project(&self) -> &Project {
        &self.project
    }
}

// ============================================================================
// Module Loading
// ============================================================================

impl Analyzer {
    /// Register (or replace) an in-memory module.
    pub fn add_module(&mut self, name: &str, source: &str) -> ModuleId {
        if let Some(&module) = self.module_ids.get(name) {
            self.update_module(module, source);
            return module;
        }
        self.install_module(name.to_string(), source.to_string(), None, None)
    }

    /// Replace a module's source and invalidate it along with every module
    /// that transitively depends on it.
    pub fn update_module(&mut self, module: ModuleId, source: &str) {
        let normalized = syntax::normalize_source(source);
        let (suite, parse_error, lines) = parse_state(&normalized);
        let state = &mut self.modules[module];
        state.source = normalized;
        state.suite = suite;
        state.parse_error = parse_error;
        state.lines = lines;
        self.bump_generation(module);
    }

    /// Load a module by dotted name through the project's search paths.
    /// Already-loaded modules are returned as-is.
    pub fn load_module(&mut self, name: &str) -> Option<ModuleId> {
        if let Some(&module) = self.module_ids.get(name) {
            return Some(module);
        }
        let found = self.project.resolve_module(name)?;
        let source = match self.project.read_source(&found.path) {
            Ok(source) => source,
            Err(err) => {
                debug!(module = name, error = %err, "module source unreadable");
                return None;
            }
        };
        Some(self.install_module(name.to_string(), source, Some(found.path), found.folder))
    }

    /// Load the module backing a file path, deriving its dotted name from
    /// the project's source folders when possible.
    pub fn load_path(&mut self, path: &Path) -> Option<ModuleId> {
        let name = self.project.module_name_of(path)?;
        if let Some(&module) = self.module_ids.get(&name) {
            return Some(module);
        }
        let source = match self.project.read_source(path) {
            Ok(source) => source,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "file unreadable");
                return None;
            }
        };
        let folder = self.project.package_folder_of(path);
        Some(self.install_module(name, source, Some(path.to_path_buf()), folder))
    }

    pub fn module_named(&self, name: &str) -> Option<ModuleId> {
        self.module_ids.get(name).copied()
    }

    pub fn module_state(&self, module: ModuleId) -> &ModuleState {
        &self.modules[module]
    }

    pub(crate) fn generation_of(&self, module: ModuleId) -> Generation {
        self.modules[module].generation
    }

    fn install_module(
        &mut self,
        name: String,
        source: String,
        resource: Option<PathBuf>,
        folder: Option<PathBuf>,
    ) -> ModuleId {
        let normalized = syntax::normalize_source(&source);
        let (suite, parse_error, lines) = parse_state(&normalized);
        if let Some(err) = &parse_error {
            debug!(module = %name, line = err.line, "module has a syntax error");
        }
        let module = self.modules.alloc(ModuleState {
            name: name.clone(),
            resource,
            source: normalized,
            suite,
            parse_error,
            lines,
            generation: Generation::initial(),
            object: ObjectId::unknown(),
            scope: Cell::new(),
            dependents: HashSet::new(),
            folder: folder.clone(),
        });
        let object = match folder {
            Some(folder) => self.objects.alloc(PyObject::Package { module, folder }),
            None => self.objects.alloc(PyObject::Module(module)),
        };
        self.modules[module].object = object;
        self.module_ids.insert(name, module);
        module
    }

    fn bump_generation(&mut self, module: ModuleId) {
        let mut queue = vec![module];
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop() {
            if !seen.insert(current) {
                continue;
            }
            self.modules[current].generation = self.modules[current].generation.next();
            queue.extend(self.modules[current].dependents.iter().copied());
        }
    }
}

// ============================================================================
// Imports
// ============================================================================

impl Analyzer {
    /// Resolve an import statement to a module object, recording the
    /// dependency edge for invalidation. `level` is the number of leading
    /// dots in a relative import.
    pub(crate) fn import_module(
        &mut self,
        importer: ModuleId,
        target: &str,
        level: u32,
    ) -> Option<ObjectId> {
        let absolute = self.absolute_target(importer, target, level)?;
        let module = self.load_module(&absolute)?;
        self.modules[module].dependents.insert(importer);
        Some(self.modules[module].object)
    }

    /// A package attribute that is not a module-scope name may be a
    /// submodule file or subpackage directory under the package folder.
    pub(crate) fn package_submodule(
        &mut self,
        module: ModuleId,
        folder: &Path,
        name: &str,
    ) -> Option<ObjectId> {
        let full = format!("{}.{}", self.modules[module].name, name);
        if let Some(&loaded) = self.module_ids.get(&full) {
            return Some(self.modules[loaded].object);
        }
        let found = self
            .project
            .resolve_module(&full)
            .or_else(|| self.project.find_in_folder(folder, name))?;
        let source = self.project.read_source(&found.path).ok()?;
        let loaded = self.install_module(full, source, Some(found.path), found.folder);
        Some(self.modules[loaded].object)
    }

    fn absolute_target(&self, importer: ModuleId, target: &str, level: u32) -> Option<String> {
        if level == 0 {
            return Some(target.to_string());
        }
        let state = &self.modules[importer];
        let mut parts: Vec<&str> = state.name.split('.').collect();
        // A plain module's enclosing package is one segment up; a package's
        // own name already names its package.
        let mut pops = level as usize;
        if state.folder.is_some() {
            pops -= 1;
        }
        for _ in 0..pops {
            parts.pop()?;
        }
        if target.is_empty() {
            if parts.is_empty() {
                return None;
            }
            return Some(parts.join("."));
        }
        if parts.is_empty() {
            return Some(target.to_string());
        }
        Some(format!("{}.{}", parts.join("."), target))
    }
}

// ============================================================================
// Whole-Module Analysis
// ============================================================================

impl Analyzer {
    /// Evaluate every expression in a module, scope by scope, so call sites
    /// feed the call table before call-based conclusions are read. Nested
    /// scopes are visited as their defining objects are encountered.
    pub fn analyze_module_calls(&mut self, module: ModuleId) {
        let Some(root) = self.module_scope(module) else {
            return;
        };
        let mut pending = vec![root];
        let mut visited = HashSet::new();
        while let Some(scope) = pending.pop() {
            if !visited.insert(scope) {
                continue;
            }
            self.evaluate_scope_body(scope);
            let children = self.scopes[scope].children.clone();
            for child in children {
                if let Some(inner) = self.scope_of(child) {
                    pending.push(inner);
                }
            }
        }
    }

    fn evaluate_scope_body(&mut self, scope: ScopeId) {
        let owner = self.scopes[scope].owner;
        let body: Option<Arc<Vec<ast::Stmt>>> = match &self.objects[owner] {
            PyObject::Module(m) | PyObject::Package { module: m, .. } => {
                self.modules[*m].suite.clone()
            }
            PyObject::Class(data) => Some(Arc::clone(&data.body)),
            PyObject::Function(data) => Some(Arc::clone(&data.body)),
            _ => None,
        };
        let Some(body) = body else { return };
        let mut calls: Vec<ast::Expr> = Vec::new();
        syntax::walk_same_scope(&body, &mut |stmt| {
            for expr in syntax::stmt_exprs(stmt) {
                syntax::walk_expr(expr, &mut |node| {
                    if matches!(node, ast::Expr::Call(_)) {
                        calls.push(node.clone());
                    }
                    true
                });
            }
        });
        for call in calls {
            let _ = self.evaluate(scope, &call);
        }
    }

    /// Run the call pre-pass over every loaded module.
    pub fn analyze_all(&mut self) {
        let count = self.modules.len();
        for index in 0..count {
            let module = <ModuleId as sift_core::cache::Idx>::from_usize(index);
            self.analyze_module_calls(module);
        }
    }
}

// ============================================================================
// Module-Scope Accessors
// ============================================================================

impl Analyzer {
    /// The binding of a module-level name.
    pub fn global_binding(&mut self, module: ModuleId, name: &str) -> Option<BindingId> {
        let scope = self.module_scope(module)?;
        self.scopes[scope].names.get(name).copied()
    }

    /// The object a module-level name resolves to.
    pub fn global_object(&mut self, module: ModuleId, name: &str) -> Option<ObjectId> {
        let scope = self.module_scope(module)?;
        match self.scope_local_lookup(scope, name)? {
            NameRef::Value(object) => Some(object),
            NameRef::Binding(binding) => match self.resolve_binding(binding) {
                Resolved::Object(object) => Some(object),
                Resolved::InProgress => None,
            },
        }
    }
}

// ============================================================================
// Outline
// ============================================================================

/// One entry of a module outline: a defined class or function and the
/// definitions nested inside it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OutlineItem {
    pub name: String,
    pub kind: &'static str,
    /// 1-indexed line of the definition.
    pub line: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineItem>,
}

impl Analyzer {
    /// The defined classes and functions of a module, in source order.
    pub fn module_outline(&mut self, module: ModuleId) -> Vec<OutlineItem> {
        let Some(scope) = self.module_scope(module) else {
            return Vec::new();
        };
        let children = self.scopes[scope].children.clone();
        children
            .into_iter()
            .filter_map(|object| self.outline_item(module, object))
            .collect()
    }

    fn outline_item(&mut self, module: ModuleId, object: ObjectId) -> Option<OutlineItem> {
        let (name, kind, start) = match &self.objects[object] {
            PyObject::Class(data) => (data.name.clone(), "class", data.name_span.start),
            PyObject::Function(data) => (data.name.clone(), "function", data.name_span.start),
            _ => return None,
        };
        let line = self.modules[module].lines.line_of(start);
        let nested = match self.scope_of(object) {
            Some(scope) => self.scopes[scope].children.clone(),
            None => Vec::new(),
        };
        let children = nested
            .into_iter()
            .filter_map(|child| self.outline_item(module, child))
            .collect();
        Some(OutlineItem {
            name,
            kind,
            line,
            children,
        })
    }
}

fn parse_state(
    normalized: &str,
) -> (
    Option<Arc<Vec<ast::Stmt>>>,
    Option<SyntaxError>,
    LineIndex,
) {
    match syntax::parse_module(normalized) {
        Ok(parsed) => (Some(parsed.suite), None, parsed.lines),
        Err(err) => (None, Some(err), LineIndex::new(normalized)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::test_support::{analyzer_with, analyzer_with_modules};

    mod loading {
        use super::*;

        #[test]
        fn replacing_a_module_bumps_its_generation() {
            let (mut analyzer, module) = analyzer_with("x = 1\n");
            let before = analyzer.generation_of(module);
            analyzer.add_module("mod", "x = 2\n");
            assert_ne!(before, analyzer.generation_of(module));
        }

        #[test]
        fn a_syntax_error_leaves_an_empty_scope() {
            let (mut analyzer, module) = analyzer_with("def broken(:\n");
            assert!(analyzer.module_state(module).parse_error.is_some());
            let scope = analyzer.module_scope(module).unwrap();
            assert!(analyzer.scopes[scope].names.is_empty());
        }

        #[test]
        fn rebuilt_scopes_see_new_names() {
            let (mut analyzer, module) = analyzer_with("old = 1\n");
            analyzer.add_module("mod", "new = 2\n");
            assert!(analyzer.global_binding(module, "old").is_none());
            assert!(analyzer.global_binding(module, "new").is_some());
        }
    }

    mod imports {
        use super::*;

        #[test]
        fn imported_names_resolve_across_modules() {
            let (mut analyzer, modules) = analyzer_with_modules(&[
                ("lib", "class Widget:\n    pass\n"),
                ("app", "from lib import Widget\n"),
            ]);
            let original = analyzer.global_object(modules[0], "Widget").unwrap();
            let imported = analyzer.global_object(modules[1], "Widget").unwrap();
            assert_eq!(original, imported);
        }

        #[test]
        fn import_binds_the_first_dotted_segment() {
            let (mut analyzer, modules) = analyzer_with_modules(&[
                ("pkgless", "value = 1\n"),
                ("app", "import pkgless\n"),
            ]);
            let object = analyzer.global_object(modules[1], "pkgless").unwrap();
            let expected = analyzer.module_state(modules[0]).object;
            assert_eq!(object, expected);
        }

        #[test]
        fn editing_a_dependency_invalidates_the_importer() {
            let (mut analyzer, modules) = analyzer_with_modules(&[
                ("lib", "thing = []\n"),
                ("app", "from lib import thing\n"),
            ]);
            // Pull the import through so the dependency edge exists.
            let _ = analyzer.global_object(modules[1], "thing");
            let before = analyzer.generation_of(modules[1]);
            analyzer.add_module("lib", "thing = {}\n");
            assert_ne!(before, analyzer.generation_of(modules[1]));
        }

        #[test]
        fn unknown_imports_degrade_quietly() {
            let (mut analyzer, module) = analyzer_with("import does_not_exist\n");
            let object = analyzer.global_object(module, "does_not_exist").unwrap();
            assert!(object.is_unknown());
        }
    }
}
