//! Name bindings: the indirection between an identifier and the object it
//! currently denotes.
//!
//! Every binding lazily computes and memoizes its resolved object in a
//! generation-tagged cell. Re-entrant resolution (circular inference such
//! as `x = f()` where `f` returns `x`) is reported as
//! [`Resolved::InProgress`] rather than recursing; callers treat that as
//! "unknown for this attempt" and the partial answer never poisons the
//! cache.
//!
//! Resolving a binding never fails for a missing type: anything the engine
//! cannot determine resolves to the canonical Unknown object.

use rustpython_parser::ast;

use sift_core::cache::{Cell, CellQuery};
use sift_core::define_idx;
use sift_core::text::Span;

use crate::analyzer::{Analyzer, ModuleId};
use crate::objects::{ObjectId, PyObject};

define_idx! {
    /// Index of a binding in the analyzer's binding arena.
    pub struct BindingId
}

// ============================================================================
// Name References
// ============================================================================

/// A reference to "a name somewhere": either a durable binding in some
/// scope, or a transient value with no binding (a literal, an intermediate
/// evaluation result).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameRef {
    Binding(BindingId),
    Value(ObjectId),
}

/// Outcome of resolving a binding. Callers must handle the re-entrant case
/// explicitly; there is no exception to forget to catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Object(ObjectId),
    InProgress,
}

// ============================================================================
// Binding Kinds
// ============================================================================

/// One step of a destructuring path: `a, (b, c) = expr` records `a` at
/// `[Index(0)]` and `c` at `[Index(1), Index(1)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStep {
    Index(usize),
    /// A starred target (`*rest`); resolves to Unknown.
    Splat,
}

/// One recorded right-hand side of an assignment to this name.
#[derive(Debug, Clone)]
pub struct AssignedExpr {
    /// The defined object whose scope the expression evaluates in.
    pub holder: ObjectId,
    pub expr: ast::Expr,
    pub path: Vec<PathStep>,
}

/// Implicit protocol applied to an evaluated expression before the value
/// reaches the bound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain evaluation.
    None,
    /// `for x in expr`: the element type of the iterable.
    Iterated,
    /// `with expr as x`: the `__enter__` result.
    Entered,
    /// `except E as x`: an instance of the handled class.
    Raised,
}

/// An expression binding with a protocol suffix (for/with/except targets).
#[derive(Debug, Clone)]
pub struct EvaluatedExpr {
    pub holder: ObjectId,
    pub expr: ast::Expr,
    pub protocol: Protocol,
    pub path: Vec<PathStep>,
}

#[derive(Debug)]
pub enum BindingKind {
    /// `def`/`class`: points directly at the defined object.
    Defined(ObjectId),
    /// Assigned by one or more `=` statements, inferred lazily from the
    /// right-hand sides.
    Assigned(Vec<AssignedExpr>),
    /// A function parameter, an index into the owning function's inferred
    /// parameter list.
    Parameter { function: ObjectId, index: usize },
    /// `import target` (possibly relative); resolves to a module object.
    ImportedModule { target: String, level: u32 },
    /// `from m import name`: delegates to the imported module's attribute.
    ImportedName { source: BindingId, name: String },
    /// A for/with/except target carrying its implicit protocol.
    Evaluated(Box<EvaluatedExpr>),
    /// A raw object wrapper for values with no durable binding.
    Unbound(ObjectId),
}

/// A binding slot in the arena.
#[derive(Debug)]
pub struct Binding {
    pub kind: BindingKind,
    pub module: ModuleId,
    /// Span of the name at its definition site, when one exists in source.
    pub def_span: Option<Span>,
    pub cache: Cell<ObjectId>,
}

impl Binding {
    pub fn new(kind: BindingKind, module: ModuleId, def_span: Option<Span>) -> Self {
        Binding {
            kind,
            module,
            def_span,
            cache: Cell::new(),
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

impl Analyzer {
    /// Resolve a binding to its object, memoized per module generation.
    pub fn resolve_binding(&mut self, id: BindingId) -> Resolved {
        let generation = self.generation_of(self.bindings[id].module);
        match self.bindings[id].cache.query(generation) {
            CellQuery::Hit(&object) => return Resolved::Object(object),
            CellQuery::InProgress => return Resolved::InProgress,
            CellQuery::Miss => {}
        }

        // Fast paths that cannot recurse.
        match &self.bindings[id].kind {
            BindingKind::Defined(object) | BindingKind::Unbound(object) => {
                let object = *object;
                self.bindings[id].cache.fill(generation, object);
                return Resolved::Object(object);
            }
            _ => {}
        }

        self.bindings[id].cache.begin();
        let saved = std::mem::replace(&mut self.pending_seen, false);
        let object = self.compute_binding(id);
        let tainted = self.pending_seen;
        self.pending_seen = tainted || saved;
        if tainted {
            // A sub-resolution was in progress; the answer is usable for
            // this attempt but must not be memoized.
            self.bindings[id].cache.reset();
        } else {
            self.bindings[id].cache.fill(generation, object);
        }
        Resolved::Object(object)
    }

    /// The object a name reference denotes. An in-progress binding counts
    /// as Unknown for the current attempt and taints enclosing caches.
    pub fn object_of(&mut self, name: NameRef) -> ObjectId {
        match name {
            NameRef::Value(object) => object,
            NameRef::Binding(binding) => match self.resolve_binding(binding) {
                Resolved::Object(object) => object,
                Resolved::InProgress => {
                    self.pending_seen = true;
                    self.unknown()
                }
            },
        }
    }

    fn compute_binding(&mut self, id: BindingId) -> ObjectId {
        match &self.bindings[id].kind {
            BindingKind::Defined(object) | BindingKind::Unbound(object) => *object,
            BindingKind::Assigned(assignments) => {
                let assignments = assignments.clone();
                for assigned in &assignments {
                    let Some(scope) = self.scope_of(assigned.holder) else {
                        continue;
                    };
                    let object = self.evaluate_object(scope, &assigned.expr);
                    let object = self.apply_path(object, &assigned.path);
                    if !object.is_unknown() {
                        return object;
                    }
                }
                self.unknown()
            }
            BindingKind::Parameter { function, index } => {
                let (function, index) = (*function, *index);
                self.parameter_object(function, index)
            }
            BindingKind::ImportedModule { target, level } => {
                let (target, level) = (target.clone(), *level);
                let importer = self.bindings[id].module;
                match self.import_module(importer, &target, level) {
                    Some(object) => object,
                    None => self.unknown(),
                }
            }
            BindingKind::ImportedName { source, name } => {
                let (source, name) = (*source, name.clone());
                let module_object = match self.resolve_binding(source) {
                    Resolved::Object(object) => object,
                    Resolved::InProgress => {
                        self.pending_seen = true;
                        return self.unknown();
                    }
                };
                match self.get_attribute(module_object, &name) {
                    Ok(found) => self.object_of(found),
                    Err(_) => self.unknown(),
                }
            }
            BindingKind::Evaluated(evaluated) => {
                let evaluated = (**evaluated).clone();
                let Some(scope) = self.scope_of(evaluated.holder) else {
                    return self.unknown();
                };
                let object = self.evaluate_object(scope, &evaluated.expr);
                let object = match evaluated.protocol {
                    Protocol::None => object,
                    Protocol::Iterated => self.iterated_element(object),
                    Protocol::Entered => self.entered_object(object),
                    Protocol::Raised => {
                        if matches!(self.objects[object], PyObject::Class(_)) {
                            self.instance_of(object)
                        } else {
                            self.unknown()
                        }
                    }
                };
                self.apply_path(object, &evaluated.path)
            }
        }
    }

    /// Walk a destructuring path into a multi-value object. Tuples yield
    /// per-position elements; other containers yield their iterated element
    /// regardless of position.
    pub fn apply_path(&mut self, object: ObjectId, path: &[PathStep]) -> ObjectId {
        let mut current = object;
        for step in path {
            let index = match step {
                PathStep::Splat => return self.unknown(),
                PathStep::Index(index) => *index,
            };
            let tuple_element = match &self.objects[current] {
                PyObject::Container {
                    kind: crate::objects::ContainerKind::Tuple,
                    holding,
                } => Some(holding.get(index).copied()),
                _ => None,
            };
            current = match tuple_element {
                Some(Some(element)) => element,
                Some(None) => self.unknown(),
                None => self.iterated_element(current),
            };
        }
        current
    }
}

// ============================================================================
// Definition Locations
// ============================================================================

impl Analyzer {
    /// The (module, span) where a name reference is defined, when it has a
    /// source-visible definition. Imports delegate to the definition in the
    /// source module, so `from m import f` and `m.f` share a location.
    pub fn def_location(&mut self, name: NameRef) -> Option<(ModuleId, Span)> {
        self.def_location_inner(name, 0)
    }

    fn def_location_inner(&mut self, name: NameRef, depth: u8) -> Option<(ModuleId, Span)> {
        // Import chains are finite in practice; the guard only protects
        // against pathological re-export cycles.
        if depth > 16 {
            return None;
        }
        match name {
            NameRef::Value(object) => self.object_def_location(object),
            NameRef::Binding(id) => match &self.bindings[id].kind {
                BindingKind::Defined(object) => {
                    let object = *object;
                    self.object_def_location(object)
                }
                BindingKind::ImportedModule { .. } => match self.resolve_binding(id) {
                    Resolved::Object(object) => self.object_def_location(object),
                    Resolved::InProgress => None,
                },
                BindingKind::ImportedName { source, name } => {
                    let (source, name) = (*source, name.clone());
                    let module_object = match self.resolve_binding(source) {
                        Resolved::Object(object) => object,
                        Resolved::InProgress => return None,
                    };
                    let found = self.get_attribute(module_object, &name).ok()?;
                    self.def_location_inner(found, depth + 1)
                }
                _ => {
                    let binding = &self.bindings[id];
                    binding.def_span.map(|span| (binding.module, span))
                }
            },
        }
    }

    fn object_def_location(&self, object: ObjectId) -> Option<(ModuleId, Span)> {
        match &self.objects[object] {
            PyObject::Class(data) => Some((data.module, data.name_span)),
            PyObject::Function(data) => Some((data.module, data.name_span)),
            PyObject::Module(module) | PyObject::Package { module, .. } => {
                Some((*module, Span::new(0, 0)))
            }
            _ => None,
        }
    }

    /// Whether two name references denote the same binding: identity, or
    /// matching definition locations (the import case).
    pub fn same_binding(&mut self, a: NameRef, b: NameRef) -> bool {
        if a == b {
            return true;
        }
        match (self.def_location(a), self.def_location(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::analyzer_with;

    mod resolution {
        use super::*;

        #[test]
        fn resolving_twice_is_identity_stable() {
            let (mut analyzer, module) = analyzer_with("x = 1\nprint(x)\n");
            let a = analyzer.global_binding(module, "x").unwrap();
            let b = analyzer.global_binding(module, "x").unwrap();
            assert_eq!(a, b);
            let first = analyzer.resolve_binding(a);
            let second = analyzer.resolve_binding(a);
            assert_eq!(first, second);
        }

        #[test]
        fn circular_definition_terminates_as_unknown() {
            let source = "\
x = f()

def f():
    return x
";
            let (mut analyzer, module) = analyzer_with(source);
            let x = analyzer.global_binding(module, "x").unwrap();
            let Resolved::Object(object) = analyzer.resolve_binding(x) else {
                panic!("top-level resolution must produce an object");
            };
            assert!(object.is_unknown());
        }

        #[test]
        fn circular_attempts_do_not_poison_the_cache() {
            let source = "\
x = f()

def f():
    return x
";
            let (mut analyzer, module) = analyzer_with(source);
            let x = analyzer.global_binding(module, "x").unwrap();
            let _ = analyzer.resolve_binding(x);
            // A second attempt recomputes rather than replaying a cached
            // in-progress artifact.
            let Resolved::Object(object) = analyzer.resolve_binding(x) else {
                panic!("second attempt must still produce an object");
            };
            assert!(object.is_unknown());
        }
    }

    mod identity {
        use super::*;

        #[test]
        fn distinct_bindings_are_not_the_same() {
            let (mut analyzer, module) = analyzer_with("a = 1\nb = 2\n");
            let a = analyzer.global_binding(module, "a").unwrap();
            let b = analyzer.global_binding(module, "b").unwrap();
            assert!(!analyzer.same_binding(NameRef::Binding(a), NameRef::Binding(b)));
        }
    }
}
