//! The object model: the modeled runtime counterpart of every expression.
//!
//! Objects live in an arena owned by the [`Analyzer`]; identity is arena
//! index identity. The canonical [`Unknown`](PyObject::Unknown) object and
//! the base-type singletons occupy fixed slots created at analyzer
//! construction. Builtin containers are memoized per element type so that
//! constructing `list[C]` twice yields the same object id, which keeps
//! id equality useful ("is this still a list of C").
//!
//! Attribute resolution order on classes: structural names (defined in the
//! class body, including hoisted `self.attr` assignments) win over
//! concluded (inherited) names. Concluded names merge base classes in
//! reverse declaration order so the first-listed base wins on conflict.
//! This is a deliberate approximation of the MRO, not a C3 linearization;
//! diamond hierarchies resolve in declaration order, and that ordering is
//! part of the observable contract.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rustpython_parser::ast;
use thiserror::Error;

use sift_core::cache::{Cell, CellQuery, Idx};
use sift_core::define_idx;
use sift_core::text::Span;

use crate::analyzer::{Analyzer, ModuleId};
use crate::names::NameRef;
use crate::scopes::ScopeId;

define_idx! {
    /// Index of an object in the analyzer's object arena.
    pub struct ObjectId
}

impl ObjectId {
    /// The canonical Unknown object (arena slot 0).
    pub fn unknown() -> ObjectId {
        ObjectId::from_usize(0)
    }

    pub fn is_unknown(self) -> bool {
        self == ObjectId::unknown()
    }
}

// ============================================================================
// Object Kinds
// ============================================================================

/// A modeled Python value or type. See the module docs for identity rules.
#[derive(Debug)]
pub enum PyObject {
    /// The canonical "could not determine" object.
    Unknown,
    /// The type of classes.
    TypeType,
    /// The type of functions, lambdas, and builtin methods.
    FunctionType,
    /// The type of modules and packages.
    ModuleType,
    /// A plain module.
    Module(ModuleId),
    /// A package directory; attributes are `__init__` names plus submodules.
    Package { module: ModuleId, folder: PathBuf },
    /// A user-defined class.
    Class(Box<ClassData>),
    /// A user-defined function or method.
    Function(Box<FunctionData>),
    /// A lambda closed over its defining scope.
    Lambda(Box<LambdaData>),
    /// An instance of a user-defined class.
    Instance { class: ObjectId },
    /// A builtin scalar value.
    Scalar(ScalarKind),
    /// A builtin container parameterized by what it holds.
    Container {
        kind: ContainerKind,
        /// Element types: one entry for list/set/iterator/generator, key and
        /// value for dict, one entry per element for tuple.
        holding: Vec<ObjectId>,
    },
    /// A synthesized container/scalar method with a precomputed return.
    BuiltinMethod { returns: ObjectId },
}

/// Builtin scalar kinds. `Str` is modeled here even though it behaves like
/// a container of itself; its protocol methods live in `builtins`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    Bytes,
    Complex,
    NoneType,
    Str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    List,
    Set,
    Tuple,
    Dict,
    Iterator,
    Generator,
}

// ============================================================================
// Definition Data
// ============================================================================

/// A user-defined class: its header syntax plus generation-tagged caches
/// for everything derived from it.
#[derive(Debug)]
pub struct ClassData {
    pub name: String,
    pub module: ModuleId,
    /// Span of the whole `class` statement.
    pub span: Span,
    /// Span of the class name in the header (the definition location).
    pub name_span: Span,
    /// Base-class expressions, evaluated lazily in the parent scope.
    pub bases: Vec<ast::Expr>,
    /// Class body, shared with the scope builder.
    pub body: Arc<Vec<ast::Stmt>>,
    /// Lexical parent scope (where base expressions evaluate).
    pub parent: ScopeId,
    pub scope: Cell<ScopeId>,
    pub superclasses: Cell<Vec<ObjectId>>,
    pub concluded: Cell<HashMap<String, NameRef>>,
}

/// Parameter kinds as declared in a function header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    KeywordOnly,
    Vararg,
    Kwarg,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub span: Span,
}

/// A user-defined function or method.
#[derive(Debug)]
pub struct FunctionData {
    pub name: String,
    pub module: ModuleId,
    pub span: Span,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub body: Arc<Vec<ast::Stmt>>,
    /// Dotted decorator names (`staticmethod`, `functools.wraps`, ...).
    pub decorators: Vec<String>,
    /// The owning class when this function is a method.
    pub owner: Option<ObjectId>,
    pub parent: ScopeId,
    pub scope: Cell<ScopeId>,
    /// Structurally inferred return type.
    pub returned: Cell<ObjectId>,
    /// Structurally inferred parameter types.
    pub parameters: Cell<Vec<ObjectId>>,
}

impl FunctionData {
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| d == name)
    }
}

/// A lambda: a function-like object with an expression body.
#[derive(Debug)]
pub struct LambdaData {
    pub module: ModuleId,
    pub span: Span,
    pub params: Vec<Param>,
    pub body: Box<ast::Expr>,
    pub parent: ScopeId,
    pub scope: Cell<ScopeId>,
}

// ============================================================================
// Errors
// ============================================================================

/// An attribute was absent from an object's merged attribute map.
///
/// Always caught by evaluator-level callers and converted to Unknown; it
/// never propagates out of the facade.
#[derive(Debug, Clone, Error)]
#[error("attribute not found: {name}")]
pub struct AttributeNotFound {
    pub name: String,
}

// ============================================================================
// Object Accessors
// ============================================================================

impl Analyzer {
    /// The canonical Unknown object.
    pub fn unknown(&self) -> ObjectId {
        ObjectId::unknown()
    }

    /// Base-type singleton: the type of classes.
    pub fn type_type(&self) -> ObjectId {
        ObjectId::from_usize(1)
    }

    /// Base-type singleton: the type of functions.
    pub fn function_type(&self) -> ObjectId {
        ObjectId::from_usize(2)
    }

    /// Base-type singleton: the type of modules.
    pub fn module_type(&self) -> ObjectId {
        ObjectId::from_usize(3)
    }

    /// The canonical object for a builtin scalar kind.
    pub fn scalar(&mut self, kind: ScalarKind) -> ObjectId {
        if let Some(&id) = self.scalars.get(&kind) {
            return id;
        }
        let id = self.objects.alloc(PyObject::Scalar(kind));
        self.scalars.insert(kind, id);
        id
    }

    /// The canonical container object for `(kind, holding)`. Memoized so
    /// repeated construction for the same element types returns the same id.
    pub fn container(&mut self, kind: ContainerKind, holding: Vec<ObjectId>) -> ObjectId {
        let key = (kind, holding.clone());
        if let Some(&id) = self.containers.get(&key) {
            return id;
        }
        let id = self.objects.alloc(PyObject::Container { kind, holding });
        self.containers.insert(key, id);
        id
    }

    /// The canonical instance object for a class.
    pub fn instance_of(&mut self, class: ObjectId) -> ObjectId {
        if class.is_unknown() {
            return self.unknown();
        }
        if let Some(&id) = self.instances.get(&class) {
            return id;
        }
        let id = self.objects.alloc(PyObject::Instance { class });
        self.instances.insert(class, id);
        id
    }

    /// A synthesized builtin method returning `returns` when called.
    pub fn builtin_method(&mut self, returns: ObjectId) -> ObjectId {
        self.objects.alloc(PyObject::BuiltinMethod { returns })
    }

    /// The "class of this object". Base kinds map onto the closed singleton
    /// set; instances map to their class; builtins without a modeled class
    /// degrade to Unknown.
    pub fn type_of(&self, object: ObjectId) -> ObjectId {
        match &self.objects[object] {
            PyObject::Class(_) | PyObject::TypeType => self.type_type(),
            PyObject::Function(_)
            | PyObject::Lambda(_)
            | PyObject::BuiltinMethod { .. }
            | PyObject::FunctionType => self.function_type(),
            PyObject::Module(_) | PyObject::Package { .. } | PyObject::ModuleType => {
                self.module_type()
            }
            PyObject::Instance { class } => *class,
            PyObject::Unknown | PyObject::Scalar(_) | PyObject::Container { .. } => self.unknown(),
        }
    }
}

// ============================================================================
// Attribute Resolution
// ============================================================================

impl Analyzer {
    /// Resolve `name` on `object`, per-kind:
    /// - modules/packages: scope names, star-import expansion, submodules
    /// - classes: structural names, then concluded (inherited) names
    /// - instances: the class's attributes
    /// - containers, scalars: synthesized protocol methods
    ///
    /// Fails with [`AttributeNotFound`] when the name is absent; callers in
    /// the evaluator substitute Unknown.
    pub fn get_attribute(
        &mut self,
        object: ObjectId,
        name: &str,
    ) -> Result<NameRef, AttributeNotFound> {
        let missing = || AttributeNotFound {
            name: name.to_string(),
        };
        match &self.objects[object] {
            PyObject::Module(module) => {
                let module = *module;
                self.module_attribute(module, name).ok_or_else(missing)
            }
            PyObject::Package { module, folder } => {
                let (module, folder) = (*module, folder.clone());
                if let Some(found) = self.module_attribute(module, name) {
                    return Ok(found);
                }
                self.package_submodule(module, &folder, name)
                    .map(NameRef::Value)
                    .ok_or_else(missing)
            }
            PyObject::Class(_) => self.class_attribute(object, name).ok_or_else(missing),
            PyObject::Instance { class } => {
                let class = *class;
                self.class_attribute(class, name).ok_or_else(missing)
            }
            PyObject::Container { kind, holding } => {
                let (kind, holding) = (*kind, holding.clone());
                crate::builtins::container_attribute(self, kind, &holding, name)
                    .map(NameRef::Value)
                    .ok_or_else(missing)
            }
            PyObject::Scalar(kind) => {
                let kind = *kind;
                crate::builtins::scalar_attribute(self, kind, name)
                    .map(NameRef::Value)
                    .ok_or_else(missing)
            }
            _ => Err(missing()),
        }
    }

    /// A module-scope name, consulting star imports after the local map.
    fn module_attribute(&mut self, module: ModuleId, name: &str) -> Option<NameRef> {
        let scope = self.module_scope(module)?;
        self.scope_local_lookup(scope, name)
    }

    /// Class attribute lookup: structural first, then concluded.
    pub fn class_attribute(&mut self, class: ObjectId, name: &str) -> Option<NameRef> {
        let scope = self.scope_of(class)?;
        if let Some(&binding) = self.scopes[scope].names.get(name) {
            return Some(NameRef::Binding(binding));
        }
        self.concluded_attributes(class).get(name).copied()
    }

    /// The full attribute map of a class: concluded names overlaid with
    /// structural names (structural wins).
    pub fn class_attribute_map(&mut self, class: ObjectId) -> HashMap<String, NameRef> {
        let mut merged = self.concluded_attributes(class);
        if let Some(scope) = self.scope_of(class) {
            for (name, &binding) in &self.scopes[scope].names {
                merged.insert(name.clone(), NameRef::Binding(binding));
            }
        }
        merged
    }

    /// Attributes inherited from base classes, merged in reverse declaration
    /// order so the first-listed base wins. Cached per module generation.
    pub fn concluded_attributes(&mut self, class: ObjectId) -> HashMap<String, NameRef> {
        let generation = match &self.objects[class] {
            PyObject::Class(data) => {
                let generation = self.generation_of(data.module);
                match data.concluded.query(generation) {
                    CellQuery::Hit(map) => return map.clone(),
                    CellQuery::InProgress => {
                        self.pending_seen = true;
                        return HashMap::new();
                    }
                    CellQuery::Miss => generation,
                }
            }
            _ => return HashMap::new(),
        };

        if let PyObject::Class(data) = &mut self.objects[class] {
            data.concluded.begin();
        }
        let saved = std::mem::replace(&mut self.pending_seen, false);

        let mut merged = HashMap::new();
        let bases = self.superclasses(class);
        for base in bases.iter().rev() {
            if matches!(self.objects[*base], PyObject::Class(_)) {
                merged.extend(self.class_attribute_map(*base));
            }
        }

        let tainted = self.pending_seen;
        self.pending_seen = tainted || saved;
        if let PyObject::Class(data) = &mut self.objects[class] {
            if tainted {
                data.concluded.reset();
            } else {
                data.concluded.fill(generation, merged.clone());
            }
        }
        merged
    }

    /// The ordered base classes of a class, from its base expressions,
    /// evaluated in the class's lexical parent scope. Non-class bases are
    /// dropped. Cached per module generation.
    pub fn superclasses(&mut self, class: ObjectId) -> Vec<ObjectId> {
        let (generation, bases, parent) = match &self.objects[class] {
            PyObject::Class(data) => {
                let generation = self.generation_of(data.module);
                match data.superclasses.query(generation) {
                    CellQuery::Hit(bases) => return bases.clone(),
                    CellQuery::InProgress => {
                        self.pending_seen = true;
                        return Vec::new();
                    }
                    CellQuery::Miss => (generation, data.bases.clone(), data.parent),
                }
            }
            _ => return Vec::new(),
        };

        if let PyObject::Class(data) = &mut self.objects[class] {
            data.superclasses.begin();
        }
        let saved = std::mem::replace(&mut self.pending_seen, false);

        let mut resolved = Vec::new();
        for base in &bases {
            let object = self.evaluate_object(parent, base);
            if matches!(self.objects[object], PyObject::Class(_)) {
                resolved.push(object);
            }
        }

        let tainted = self.pending_seen;
        self.pending_seen = tainted || saved;
        if let PyObject::Class(data) = &mut self.objects[class] {
            if tainted {
                data.superclasses.reset();
            } else {
                data.superclasses.fill(generation, resolved.clone());
            }
        }
        resolved
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::analyzer_with;

    mod identity {
        use super::*;

        #[test]
        fn unknown_is_slot_zero() {
            let (analyzer, _) = analyzer_with("x = 1\n");
            assert!(analyzer.unknown().is_unknown());
        }

        #[test]
        fn containers_are_memoized_per_element_type() {
            let (mut analyzer, _) = analyzer_with("x = 1\n");
            let int = analyzer.scalar(ScalarKind::Int);
            let a = analyzer.container(ContainerKind::List, vec![int]);
            let b = analyzer.container(ContainerKind::List, vec![int]);
            assert_eq!(a, b);
            let str_obj = analyzer.scalar(ScalarKind::Str);
            let c = analyzer.container(ContainerKind::List, vec![str_obj]);
            assert_ne!(a, c);
        }

        #[test]
        fn instances_are_memoized_per_class() {
            let (mut analyzer, module) = analyzer_with("class C:\n    pass\n");
            let class = analyzer.global_object(module, "C").unwrap();
            let a = analyzer.instance_of(class);
            let b = analyzer.instance_of(class);
            assert_eq!(a, b);
            assert_eq!(analyzer.type_of(a), class);
        }
    }

    mod class_attributes {
        use super::*;

        #[test]
        fn structural_wins_over_inherited() {
            let source = "\
class A:
    def f(self):
        pass

class B(A):
    def f(self):
        pass
";
            let (mut analyzer, module) = analyzer_with(source);
            let a = analyzer.global_object(module, "A").unwrap();
            let b = analyzer.global_object(module, "B").unwrap();
            let a_f = analyzer.class_attribute(a, "f").unwrap();
            let b_f = analyzer.class_attribute(b, "f").unwrap();
            // Overriding methods are different bindings, not the same one
            // seen through inheritance.
            assert_ne!(a_f, b_f);
        }

        #[test]
        fn first_listed_base_wins_on_conflict() {
            let source = "\
class Left:
    def shared(self):
        pass

class Right:
    def shared(self):
        pass

class Child(Left, Right):
    pass
";
            let (mut analyzer, module) = analyzer_with(source);
            let left = analyzer.global_object(module, "Left").unwrap();
            let child = analyzer.global_object(module, "Child").unwrap();
            let from_left = analyzer.class_attribute(left, "shared").unwrap();
            let inherited = analyzer.class_attribute(child, "shared").unwrap();
            assert_eq!(from_left, inherited);
        }

        #[test]
        fn inherited_attributes_are_visible() {
            let source = "\
class Base:
    def greet(self):
        pass

class Sub(Base):
    pass
";
            let (mut analyzer, module) = analyzer_with(source);
            let sub = analyzer.global_object(module, "Sub").unwrap();
            assert!(analyzer.class_attribute(sub, "greet").is_some());
            assert!(analyzer.class_attribute(sub, "missing").is_none());
        }

        #[test]
        fn inheritance_cycles_terminate() {
            // B is not yet defined when A's bases are declared; Python would
            // raise at runtime, the analyzer must simply degrade.
            let source = "\
class A(B):
    pass

class B(A):
    pass
";
            let (mut analyzer, module) = analyzer_with(source);
            let a = analyzer.global_object(module, "A").unwrap();
            let _ = analyzer.class_attribute(a, "anything");
        }
    }
}
