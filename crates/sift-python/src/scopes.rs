//! Lexical scope construction and chained lookup.
//!
//! One scope exists per defined object (module, class, function, lambda).
//! Building a scope walks the object's syntax subtree once: nested
//! `def`/`class` statements create their objects eagerly (so the scope's
//! attribute map is complete) but the nested bodies are not walked until
//! their own scopes are requested.
//!
//! Lookup follows the lexical chain innermost to outermost with the class
//! exception: a class scope's names are visible only when the class scope
//! itself is the starting point, never to nested scopes. A binding that is
//! currently being resolved is treated as absent at its scope level, which
//! is what makes `a_var = a_var` in a class body see the module-level
//! `a_var` on the right-hand side.

use std::collections::HashMap;
use std::sync::Arc;

use rustpython_parser::ast;
use tracing::trace;

use sift_core::cache::{Cell, CellQuery};
use sift_core::define_idx;
use sift_core::text::Span;

use crate::analyzer::{Analyzer, ModuleId};
use crate::names::{
    AssignedExpr, Binding, BindingId, BindingKind, EvaluatedExpr, NameRef, PathStep, Protocol,
};
use crate::objects::{ClassData, FunctionData, ObjectId, Param, ParamKind, PyObject};
use crate::syntax::{self, attribute_name_span, node_span};

define_idx! {
    /// Index of a scope in the analyzer's scope arena.
    pub struct ScopeId
}

// ============================================================================
// Scopes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
}

/// A lexical scope: its binding map, nested defined objects, and (for
/// function scopes) the collected return/yield expressions.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub owner: ObjectId,
    pub module: ModuleId,
    pub parent: Option<ScopeId>,
    pub span: Span,
    pub names: HashMap<String, BindingId>,
    /// Nested defined objects in source order; their scopes build lazily.
    pub children: Vec<ObjectId>,
    /// Return and yield value expressions in source order.
    pub returned: Vec<ast::Expr>,
    pub is_generator: bool,
    /// `from m import *` module bindings, expanded lazily at lookup time.
    pub star_imports: Vec<BindingId>,
}

impl Scope {
    fn empty(
        kind: ScopeKind,
        owner: ObjectId,
        module: ModuleId,
        parent: Option<ScopeId>,
        span: Span,
    ) -> Self {
        Scope {
            kind,
            owner,
            module,
            parent,
            span,
            names: HashMap::new(),
            children: Vec::new(),
            returned: Vec::new(),
            is_generator: false,
            star_imports: Vec::new(),
        }
    }
}

// ============================================================================
// Collection Draft
// ============================================================================

#[derive(Default)]
struct Draft {
    names: HashMap<String, BindingId>,
    children: Vec<ObjectId>,
    returned: Vec<ast::Expr>,
    is_generator: bool,
    star_imports: Vec<BindingId>,
    globals: Vec<String>,
    nonlocals: Vec<String>,
}

// ============================================================================
// Scope Access
// ============================================================================

impl Analyzer {
    /// The scope of a defined object, building it on first access.
    pub fn scope_of(&mut self, owner: ObjectId) -> Option<ScopeId> {
        match &self.objects[owner] {
            PyObject::Module(module) | PyObject::Package { module, .. } => {
                let module = *module;
                self.module_scope(module)
            }
            PyObject::Class(data) => {
                let generation = self.generation_of(data.module);
                if let CellQuery::Hit(&scope) = data.scope.query(generation) {
                    return Some(scope);
                }
                Some(self.build_class_scope(owner))
            }
            PyObject::Function(data) => {
                let generation = self.generation_of(data.module);
                if let CellQuery::Hit(&scope) = data.scope.query(generation) {
                    return Some(scope);
                }
                Some(self.build_function_scope(owner))
            }
            PyObject::Lambda(data) => {
                let generation = self.generation_of(data.module);
                if let CellQuery::Hit(&scope) = data.scope.query(generation) {
                    return Some(scope);
                }
                Some(self.build_lambda_scope(owner))
            }
            _ => None,
        }
    }

    /// The module-level scope, rebuilt whenever the module's generation
    /// moves. A module that failed to parse gets an empty scope so lookups
    /// degrade instead of dangling.
    pub fn module_scope(&mut self, module: ModuleId) -> Option<ScopeId> {
        let generation = self.modules[module].generation;
        if let CellQuery::Hit(&scope) = self.modules[module].scope.query(generation) {
            return Some(scope);
        }
        trace!(module = %self.modules[module].name, "building module scope");
        let owner = self.modules[module].object;
        let span = Span::new(0, self.modules[module].source.len());
        let suite = self.modules[module].suite.clone();
        let scope = match suite {
            Some(suite) => {
                self.build_scope_in(owner, ScopeKind::Module, module, None, span, &suite)
            }
            None => self
                .scopes
                .alloc(Scope::empty(ScopeKind::Module, owner, module, None, span)),
        };
        self.modules[module].scope.fill(generation, scope);
        Some(scope)
    }

    fn build_class_scope(&mut self, owner: ObjectId) -> ScopeId {
        let PyObject::Class(data) = &self.objects[owner] else {
            unreachable!("build_class_scope on non-class");
        };
        let (module, parent, span, body) =
            (data.module, data.parent, data.span, Arc::clone(&data.body));
        let generation = self.generation_of(module);
        let scope = self.build_scope_in(owner, ScopeKind::Class, module, Some(parent), span, &body);
        self.hoist_instance_attributes(scope);
        if let PyObject::Class(data) = &mut self.objects[owner] {
            data.scope.fill(generation, scope);
        }
        scope
    }

    fn build_function_scope(&mut self, owner: ObjectId) -> ScopeId {
        let PyObject::Function(data) = &self.objects[owner] else {
            unreachable!("build_function_scope on non-function");
        };
        let (module, parent, span, body, params) = (
            data.module,
            data.parent,
            data.span,
            Arc::clone(&data.body),
            data.params.clone(),
        );
        let generation = self.generation_of(module);
        let scope =
            self.build_scope_in(owner, ScopeKind::Function, module, Some(parent), span, &body);
        self.bind_parameters(scope, owner, module, &params);
        if let PyObject::Function(data) = &mut self.objects[owner] {
            data.scope.fill(generation, scope);
        }
        scope
    }

    fn build_lambda_scope(&mut self, owner: ObjectId) -> ScopeId {
        let PyObject::Lambda(data) = &self.objects[owner] else {
            unreachable!("build_lambda_scope on non-lambda");
        };
        let (module, parent, span, params, body) = (
            data.module,
            data.parent,
            data.span,
            data.params.clone(),
            (*data.body).clone(),
        );
        let generation = self.generation_of(module);
        let scope = self.scopes.alloc(Scope::empty(
            ScopeKind::Function,
            owner,
            module,
            Some(parent),
            span,
        ));
        self.scopes[scope].returned = vec![body];
        self.bind_parameters(scope, owner, module, &params);
        if let PyObject::Lambda(data) = &mut self.objects[owner] {
            data.scope.fill(generation, scope);
        }
        scope
    }

    fn bind_parameters(&mut self, scope: ScopeId, owner: ObjectId, module: ModuleId, params: &[Param]) {
        for (index, param) in params.iter().enumerate() {
            let binding = self.bindings.alloc(Binding::new(
                BindingKind::Parameter {
                    function: owner,
                    index,
                },
                module,
                Some(param.span),
            ));
            self.scopes[scope]
                .names
                .entry(param.name.clone())
                .or_insert(binding);
        }
    }
}

// ============================================================================
// Scope Construction
// ============================================================================

impl Analyzer {
    fn build_scope_in(
        &mut self,
        owner: ObjectId,
        kind: ScopeKind,
        module: ModuleId,
        parent: Option<ScopeId>,
        span: Span,
        body: &[ast::Stmt],
    ) -> ScopeId {
        let scope = self
            .scopes
            .alloc(Scope::empty(kind, owner, module, parent, span));
        let mut draft = Draft::default();
        let in_class = kind == ScopeKind::Class;
        syntax::walk_same_scope(body, &mut |stmt| {
            self.collect_stmt(&mut draft, scope, owner, module, in_class, stmt);
        });
        self.apply_globals(&mut draft, scope, module);
        self.apply_nonlocals(&mut draft, parent);

        let slot = &mut self.scopes[scope];
        slot.names.extend(draft.names);
        slot.children = draft.children;
        slot.returned = draft.returned;
        slot.is_generator = draft.is_generator;
        slot.star_imports = draft.star_imports;
        scope
    }

    #[allow(clippy::too_many_lines)]
    fn collect_stmt(
        &mut self,
        draft: &mut Draft,
        scope: ScopeId,
        owner: ObjectId,
        module: ModuleId,
        in_class: bool,
        stmt: &ast::Stmt,
    ) {
        match stmt {
            ast::Stmt::FunctionDef(def) => {
                self.collect_function(
                    draft,
                    scope,
                    owner,
                    module,
                    in_class,
                    def.name.as_str(),
                    node_span(def),
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                );
            }
            ast::Stmt::AsyncFunctionDef(def) => {
                self.collect_function(
                    draft,
                    scope,
                    owner,
                    module,
                    in_class,
                    def.name.as_str(),
                    node_span(def),
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                );
            }
            ast::Stmt::ClassDef(def) => {
                let span = node_span(def);
                let name_span = self
                    .find_name_span(module, span, def.name.as_str())
                    .unwrap_or(span);
                let object = self.objects.alloc(PyObject::Class(Box::new(ClassData {
                    name: def.name.to_string(),
                    module,
                    span,
                    name_span,
                    bases: def.bases.clone(),
                    body: Arc::new(def.body.clone()),
                    parent: scope,
                    scope: Cell::new(),
                    superclasses: Cell::new(),
                    concluded: Cell::new(),
                })));
                let binding = self.bindings.alloc(Binding::new(
                    BindingKind::Defined(object),
                    module,
                    Some(name_span),
                ));
                draft.names.insert(def.name.to_string(), binding);
                draft.children.push(object);
            }
            ast::Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.collect_target(draft, owner, module, target, Vec::new(), &assign.value);
                }
            }
            ast::Stmt::AnnAssign(assign) => {
                if let ast::Expr::Name(name) = &*assign.target {
                    match &assign.value {
                        Some(value) => self.add_assigned(
                            draft,
                            module,
                            name.id.as_str(),
                            node_span(name),
                            AssignedExpr {
                                holder: owner,
                                expr: (**value).clone(),
                                path: Vec::new(),
                            },
                        ),
                        None => self.add_empty_assigned(
                            draft,
                            module,
                            name.id.as_str(),
                            node_span(name),
                        ),
                    }
                }
            }
            ast::Stmt::AugAssign(assign) => {
                if let ast::Expr::Name(name) = &*assign.target {
                    // x += e keeps x's binding; the RHS is a coarse stand-in
                    // for the combined value.
                    self.add_assigned(
                        draft,
                        module,
                        name.id.as_str(),
                        node_span(name),
                        AssignedExpr {
                            holder: owner,
                            expr: (*assign.value).clone(),
                            path: Vec::new(),
                        },
                    );
                }
            }
            ast::Stmt::For(for_stmt) => {
                self.collect_protocol_target(
                    draft,
                    owner,
                    module,
                    &for_stmt.target,
                    Vec::new(),
                    &for_stmt.iter,
                    Protocol::Iterated,
                );
            }
            ast::Stmt::AsyncFor(for_stmt) => {
                self.collect_protocol_target(
                    draft,
                    owner,
                    module,
                    &for_stmt.target,
                    Vec::new(),
                    &for_stmt.iter,
                    Protocol::Iterated,
                );
            }
            ast::Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(vars) = &item.optional_vars {
                        self.collect_protocol_target(
                            draft,
                            owner,
                            module,
                            vars,
                            Vec::new(),
                            &item.context_expr,
                            Protocol::Entered,
                        );
                    }
                }
            }
            ast::Stmt::AsyncWith(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(vars) = &item.optional_vars {
                        self.collect_protocol_target(
                            draft,
                            owner,
                            module,
                            vars,
                            Vec::new(),
                            &item.context_expr,
                            Protocol::Entered,
                        );
                    }
                }
            }
            ast::Stmt::Try(try_stmt) => {
                self.collect_handlers(draft, owner, module, &try_stmt.handlers);
            }
            ast::Stmt::TryStar(try_stmt) => {
                self.collect_handlers(draft, owner, module, &try_stmt.handlers);
            }
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    let full = alias.name.to_string();
                    let (bound, target) = match &alias.asname {
                        Some(asname) => (asname.to_string(), full.clone()),
                        None => {
                            let first = full.split('.').next().unwrap_or(&full).to_string();
                            (first.clone(), first)
                        }
                    };
                    let def_span = self.find_name_span(module, node_span(import), &bound);
                    let binding = self.bindings.alloc(Binding::new(
                        BindingKind::ImportedModule { target, level: 0 },
                        module,
                        def_span,
                    ));
                    draft.names.insert(bound, binding);
                }
            }
            ast::Stmt::ImportFrom(import) => {
                let target = import
                    .module
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_default();
                let level = import.level.map(|l| l.to_u32()).unwrap_or(0);
                let source_binding = self.bindings.alloc(Binding::new(
                    BindingKind::ImportedModule { target, level },
                    module,
                    None,
                ));
                let names_span = self.import_names_span(module, node_span(import));
                for alias in &import.names {
                    if alias.name.as_str() == "*" {
                        draft.star_imports.push(source_binding);
                        continue;
                    }
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(|a| a.to_string())
                        .unwrap_or_else(|| alias.name.to_string());
                    let def_span = self.find_name_span(module, names_span, &bound);
                    let binding = self.bindings.alloc(Binding::new(
                        BindingKind::ImportedName {
                            source: source_binding,
                            name: alias.name.to_string(),
                        },
                        module,
                        def_span,
                    ));
                    draft.names.insert(bound, binding);
                }
            }
            ast::Stmt::Global(global) => {
                draft
                    .globals
                    .extend(global.names.iter().map(|n| n.to_string()));
            }
            ast::Stmt::Nonlocal(nonlocal) => {
                draft
                    .nonlocals
                    .extend(nonlocal.names.iter().map(|n| n.to_string()));
            }
            ast::Stmt::Return(ret) => {
                if let Some(value) = &ret.value {
                    draft.returned.push((**value).clone());
                }
            }
            _ => {}
        }

        // Yields and walrus targets can appear in any expression position.
        if !matches!(
            stmt,
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_)
        ) {
            self.collect_expr_bindings(draft, owner, module, stmt);
            self.collect_yields(draft, stmt);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_function(
        &mut self,
        draft: &mut Draft,
        scope: ScopeId,
        owner: ObjectId,
        module: ModuleId,
        in_class: bool,
        name: &str,
        span: Span,
        args: &ast::Arguments,
        body: &[ast::Stmt],
        decorator_list: &[ast::Expr],
    ) {
        let name_span = self.find_name_span(module, span, name).unwrap_or(span);
        let decorators = decorator_list
            .iter()
            .filter_map(syntax::decorator_name)
            .collect();
        let object = self.objects.alloc(PyObject::Function(Box::new(FunctionData {
            name: name.to_string(),
            module,
            span,
            name_span,
            params: flatten_params(args),
            body: Arc::new(body.to_vec()),
            decorators,
            owner: if in_class { Some(owner) } else { None },
            parent: scope,
            scope: Cell::new(),
            returned: Cell::new(),
            parameters: Cell::new(),
        })));
        let binding = self.bindings.alloc(Binding::new(
            BindingKind::Defined(object),
            module,
            Some(name_span),
        ));
        draft.names.insert(name.to_string(), binding);
        draft.children.push(object);
    }

    /// Decompose an assignment target, recording a destructure path per
    /// leaf name. Attribute and subscript targets introduce no scope names.
    fn collect_target(
        &mut self,
        draft: &mut Draft,
        owner: ObjectId,
        module: ModuleId,
        target: &ast::Expr,
        path: Vec<PathStep>,
        value: &ast::Expr,
    ) {
        match target {
            ast::Expr::Name(name) => {
                self.add_assigned(
                    draft,
                    module,
                    name.id.as_str(),
                    node_span(name),
                    AssignedExpr {
                        holder: owner,
                        expr: value.clone(),
                        path,
                    },
                );
            }
            ast::Expr::Tuple(tuple) => {
                for (index, elt) in tuple.elts.iter().enumerate() {
                    let mut elt_path = path.clone();
                    elt_path.push(PathStep::Index(index));
                    self.collect_target(draft, owner, module, elt, elt_path, value);
                }
            }
            ast::Expr::List(list) => {
                for (index, elt) in list.elts.iter().enumerate() {
                    let mut elt_path = path.clone();
                    elt_path.push(PathStep::Index(index));
                    self.collect_target(draft, owner, module, elt, elt_path, value);
                }
            }
            ast::Expr::Starred(starred) => {
                let mut star_path = path;
                star_path.push(PathStep::Splat);
                self.collect_target(draft, owner, module, &starred.value, star_path, value);
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_protocol_target(
        &mut self,
        draft: &mut Draft,
        owner: ObjectId,
        module: ModuleId,
        target: &ast::Expr,
        path: Vec<PathStep>,
        source: &ast::Expr,
        protocol: Protocol,
    ) {
        match target {
            ast::Expr::Name(name) => {
                let binding = self.bindings.alloc(Binding::new(
                    BindingKind::Evaluated(Box::new(EvaluatedExpr {
                        holder: owner,
                        expr: source.clone(),
                        protocol,
                        path,
                    })),
                    module,
                    Some(node_span(name)),
                ));
                draft.names.entry(name.id.to_string()).or_insert(binding);
            }
            ast::Expr::Tuple(tuple) => {
                for (index, elt) in tuple.elts.iter().enumerate() {
                    let mut elt_path = path.clone();
                    elt_path.push(PathStep::Index(index));
                    self.collect_protocol_target(
                        draft, owner, module, elt, elt_path, source, protocol,
                    );
                }
            }
            ast::Expr::List(list) => {
                for (index, elt) in list.elts.iter().enumerate() {
                    let mut elt_path = path.clone();
                    elt_path.push(PathStep::Index(index));
                    self.collect_protocol_target(
                        draft, owner, module, elt, elt_path, source, protocol,
                    );
                }
            }
            ast::Expr::Starred(starred) => {
                let mut star_path = path;
                star_path.push(PathStep::Splat);
                self.collect_protocol_target(
                    draft,
                    owner,
                    module,
                    &starred.value,
                    star_path,
                    source,
                    protocol,
                );
            }
            _ => {}
        }
    }

    fn collect_handlers(
        &mut self,
        draft: &mut Draft,
        owner: ObjectId,
        module: ModuleId,
        handlers: &[ast::ExceptHandler],
    ) {
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(h) = handler;
            let Some(bound) = &h.name else { continue };
            let binding = match &h.type_ {
                Some(class_expr) => self.bindings.alloc(Binding::new(
                    BindingKind::Evaluated(Box::new(EvaluatedExpr {
                        holder: owner,
                        expr: (**class_expr).clone(),
                        protocol: Protocol::Raised,
                        path: Vec::new(),
                    })),
                    module,
                    None,
                )),
                None => {
                    let unknown = self.unknown();
                    self.bindings
                        .alloc(Binding::new(BindingKind::Unbound(unknown), module, None))
                }
            };
            draft.names.entry(bound.to_string()).or_insert(binding);
        }
    }

    /// Record walrus (`:=`) targets appearing in the statement's expressions.
    fn collect_expr_bindings(
        &mut self,
        draft: &mut Draft,
        owner: ObjectId,
        module: ModuleId,
        stmt: &ast::Stmt,
    ) {
        let mut walruses: Vec<(String, Span, ast::Expr)> = Vec::new();
        for expr in syntax::stmt_exprs(stmt) {
            syntax::walk_expr(expr, &mut |node| {
                if let ast::Expr::NamedExpr(named) = node {
                    if let ast::Expr::Name(name) = &*named.target {
                        walruses.push((
                            name.id.to_string(),
                            node_span(name),
                            (*named.value).clone(),
                        ));
                    }
                }
                true
            });
        }
        for (name, span, value) in walruses {
            self.add_assigned(
                draft,
                module,
                &name,
                span,
                AssignedExpr {
                    holder: owner,
                    expr: value,
                    path: Vec::new(),
                },
            );
        }
    }

    fn collect_yields(&mut self, draft: &mut Draft, stmt: &ast::Stmt) {
        for expr in syntax::stmt_exprs(stmt) {
            syntax::walk_expr(expr, &mut |node| {
                match node {
                    ast::Expr::Yield(y) => {
                        draft.is_generator = true;
                        if let Some(value) = &y.value {
                            draft.returned.push((**value).clone());
                        }
                    }
                    ast::Expr::YieldFrom(_) => {
                        draft.is_generator = true;
                    }
                    _ => {}
                }
                true
            });
        }
    }

    fn add_assigned(
        &mut self,
        draft: &mut Draft,
        module: ModuleId,
        name: &str,
        span: Span,
        assigned: AssignedExpr,
    ) {
        match draft.names.get(name) {
            Some(&existing) => {
                if let BindingKind::Assigned(list) = &mut self.bindings[existing].kind {
                    list.push(assigned);
                }
                // Defined/parameter/protocol bindings keep their identity;
                // later plain assignments only feed inference when the name
                // was introduced by assignment.
            }
            None => {
                let binding = self.bindings.alloc(Binding::new(
                    BindingKind::Assigned(vec![assigned]),
                    module,
                    Some(span),
                ));
                draft.names.insert(name.to_string(), binding);
            }
        }
    }

    fn add_empty_assigned(&mut self, draft: &mut Draft, module: ModuleId, name: &str, span: Span) {
        if !draft.names.contains_key(name) {
            let binding = self.bindings.alloc(Binding::new(
                BindingKind::Assigned(Vec::new()),
                module,
                Some(span),
            ));
            draft.names.insert(name.to_string(), binding);
        }
    }

    /// `global x`: the name maps to the module-level binding, synthesizing
    /// one when the module body never assigns it.
    fn apply_globals(&mut self, draft: &mut Draft, scope: ScopeId, module: ModuleId) {
        if draft.globals.is_empty() {
            return;
        }
        let globals = std::mem::take(&mut draft.globals);
        let Some(module_scope) = self.module_scope_of(scope, module) else {
            return;
        };
        for name in globals {
            let binding = match self.scopes[module_scope].names.get(&name) {
                Some(&binding) => binding,
                None => {
                    let binding = self.bindings.alloc(Binding::new(
                        BindingKind::Assigned(Vec::new()),
                        module,
                        None,
                    ));
                    self.scopes[module_scope].names.insert(name.clone(), binding);
                    binding
                }
            };
            draft.names.insert(name, binding);
        }
    }

    /// `nonlocal x`: bind to the nearest enclosing function scope's name.
    fn apply_nonlocals(&mut self, draft: &mut Draft, parent: Option<ScopeId>) {
        if draft.nonlocals.is_empty() {
            return;
        }
        let nonlocals = std::mem::take(&mut draft.nonlocals);
        for name in nonlocals {
            let mut current = parent;
            while let Some(scope) = current {
                if self.scopes[scope].kind == ScopeKind::Function {
                    if let Some(&binding) = self.scopes[scope].names.get(&name) {
                        draft.names.insert(name.clone(), binding);
                        break;
                    }
                }
                current = self.scopes[scope].parent;
            }
        }
    }

    fn module_scope_of(&mut self, scope: ScopeId, module: ModuleId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if self.scopes[s].kind == ScopeKind::Module {
                return Some(s);
            }
            current = self.scopes[s].parent;
        }
        self.module_scope(module)
    }

    /// Hoist `self.attr = ...` assignments from method bodies into the
    /// class's own binding map. Class-level names win; hoisted attributes
    /// evaluate in their method's scope so the self parameter resolves.
    fn hoist_instance_attributes(&mut self, scope: ScopeId) {
        let methods = self.scopes[scope].children.clone();
        for method in methods {
            let (body, self_name) = match &self.objects[method] {
                PyObject::Function(data) => {
                    if data.has_decorator("staticmethod") {
                        continue;
                    }
                    let Some(first) = data
                        .params
                        .iter()
                        .find(|p| p.kind == ParamKind::Positional)
                    else {
                        continue;
                    };
                    (Arc::clone(&data.body), first.name.clone())
                }
                _ => continue,
            };
            let module = self.scopes[scope].module;
            let mut hoisted: Vec<(String, Span, ast::Expr)> = Vec::new();
            syntax::walk_same_scope(&body, &mut |stmt| {
                if let ast::Stmt::Assign(assign) = stmt {
                    for target in &assign.targets {
                        if let ast::Expr::Attribute(attr) = target {
                            if let ast::Expr::Name(base) = &*attr.value {
                                if base.id.as_str() == self_name {
                                    hoisted.push((
                                        attr.attr.to_string(),
                                        attribute_name_span(attr),
                                        (*assign.value).clone(),
                                    ));
                                }
                            }
                        }
                    }
                }
            });
            for (attr, span, value) in hoisted {
                if self.scopes[scope].names.contains_key(&attr) {
                    let existing = self.scopes[scope].names[&attr];
                    if let BindingKind::Assigned(list) = &mut self.bindings[existing].kind {
                        list.push(AssignedExpr {
                            holder: method,
                            expr: value,
                            path: Vec::new(),
                        });
                    }
                    continue;
                }
                let binding = self.bindings.alloc(Binding::new(
                    BindingKind::Assigned(vec![AssignedExpr {
                        holder: method,
                        expr: value,
                        path: Vec::new(),
                    }]),
                    module,
                    Some(span),
                ));
                self.scopes[scope].names.insert(attr, binding);
            }
        }
    }

    fn find_name_span(&self, module: ModuleId, within: Span, name: &str) -> Option<Span> {
        syntax::find_word_in(&self.modules[module].source, within, name)
    }

    /// The span of the name list after the `import` keyword, for locating
    /// from-import alias definitions.
    fn import_names_span(&self, module: ModuleId, stmt_span: Span) -> Span {
        let source = &self.modules[module].source;
        let end = stmt_span.end.min(source.len());
        if let Some(text) = source.get(stmt_span.start..end) {
            if let Some(at) = text.find("import") {
                return Span::new(stmt_span.start + at + "import".len(), end);
            }
        }
        stmt_span
    }
}

// ============================================================================
// Lookup
// ============================================================================

impl Analyzer {
    /// Look a name up in a single scope, consulting star imports after the
    /// local map. Underscore names do not travel through star imports.
    pub fn scope_local_lookup(&mut self, scope: ScopeId, name: &str) -> Option<NameRef> {
        if let Some(&binding) = self.scopes[scope].names.get(name) {
            return Some(NameRef::Binding(binding));
        }
        if name.starts_with('_') {
            return None;
        }
        let stars = self.scopes[scope].star_imports.clone();
        for star in stars {
            if !self.star_guard.insert(star) {
                continue;
            }
            let resolved = self.resolve_binding(star);
            let found = match resolved {
                crate::names::Resolved::Object(object) => match &self.objects[object] {
                    PyObject::Module(m) | PyObject::Package { module: m, .. } => {
                        let m = *m;
                        self.module_scope(m)
                            .and_then(|s| self.scope_local_lookup(s, name))
                    }
                    _ => None,
                },
                crate::names::Resolved::InProgress => {
                    self.pending_seen = true;
                    None
                }
            };
            self.star_guard.remove(&star);
            if found.is_some() {
                return found;
            }
        }
        None
    }

    /// Chained lookup from a scope outward. Class scopes are skipped for
    /// nested scopes, and a binding that is mid-resolution is treated as
    /// absent at its level so lookup continues outward.
    pub fn lookup(&mut self, start: ScopeId, name: &str) -> Option<NameRef> {
        let mut current = Some(start);
        while let Some(scope) = current {
            let visible = scope == start || self.scopes[scope].kind != ScopeKind::Class;
            if visible {
                if let Some(found) = self.scope_local_lookup(scope, name) {
                    let in_progress = match found {
                        NameRef::Binding(binding) => {
                            let generation = self.generation_of(self.bindings[binding].module);
                            matches!(
                                self.bindings[binding].cache.query(generation),
                                CellQuery::InProgress
                            )
                        }
                        NameRef::Value(_) => false,
                    };
                    if !in_progress {
                        return Some(found);
                    }
                }
            }
            current = self.scopes[scope].parent;
        }
        None
    }

    /// The innermost scope whose owning object's span contains `offset`,
    /// building scopes lazily along the descent.
    pub fn innermost_scope_at(&mut self, module: ModuleId, offset: usize) -> Option<ScopeId> {
        let mut scope = self.module_scope(module)?;
        loop {
            let children = self.scopes[scope].children.clone();
            let mut descended = false;
            for child in children {
                let Some(span) = self.object_span(child) else {
                    continue;
                };
                if span.contains(offset) {
                    if let Some(inner) = self.scope_of(child) {
                        scope = inner;
                        descended = true;
                        break;
                    }
                }
            }
            if !descended {
                return Some(scope);
            }
        }
    }

    pub(crate) fn object_span(&self, object: ObjectId) -> Option<Span> {
        match &self.objects[object] {
            PyObject::Class(data) => Some(data.span),
            PyObject::Function(data) => Some(data.span),
            PyObject::Lambda(data) => Some(data.span),
            _ => None,
        }
    }
}

// ============================================================================
// Parameter Flattening
// ============================================================================

/// Flatten the parser's argument structure into an ordered parameter list.
pub fn flatten_params(args: &ast::Arguments) -> Vec<Param> {
    let mut params = Vec::new();
    let arg_param = |arg: &ast::Arg, kind: ParamKind| {
        let span = node_span(arg);
        let name = arg.arg.to_string();
        let name_len = name.len();
        Param {
            name,
            kind,
            span: Span::new(span.start, span.start + name_len),
        }
    };
    for arg in &args.posonlyargs {
        params.push(arg_param(&arg.def, ParamKind::Positional));
    }
    for arg in &args.args {
        params.push(arg_param(&arg.def, ParamKind::Positional));
    }
    if let Some(vararg) = &args.vararg {
        params.push(arg_param(vararg, ParamKind::Vararg));
    }
    for arg in &args.kwonlyargs {
        params.push(arg_param(&arg.def, ParamKind::KeywordOnly));
    }
    if let Some(kwarg) = &args.kwarg {
        params.push(arg_param(kwarg, ParamKind::Kwarg));
    }
    params
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use crate::test_support::analyzer_with;

    mod construction {
        use super::*;

        #[test]
        fn module_scope_binds_defs_classes_and_assignments() {
            let source = "\
import os
from collections import OrderedDict

x = 1

def f():
    pass

class C:
    pass
";
            let (mut analyzer, module) = analyzer_with(source);
            let scope = analyzer.module_scope(module).unwrap();
            for name in ["os", "OrderedDict", "x", "f", "C"] {
                assert!(
                    analyzer.scopes[scope].names.contains_key(name),
                    "missing {name}"
                );
            }
        }

        #[test]
        fn nested_suites_bind_in_the_same_scope() {
            let source = "\
if cond:
    inside_if = 1
for item in items:
    inside_for = item
";
            let (mut analyzer, module) = analyzer_with(source);
            let scope = analyzer.module_scope(module).unwrap();
            assert!(analyzer.scopes[scope].names.contains_key("inside_if"));
            assert!(analyzer.scopes[scope].names.contains_key("inside_for"));
            assert!(analyzer.scopes[scope].names.contains_key("item"));
        }

        #[test]
        fn function_scope_collects_returns_and_generator_flag() {
            let source = "\
def gen():
    yield 1

def plain():
    return 2
";
            let (mut analyzer, module) = analyzer_with(source);
            let gen = analyzer.global_object(module, "gen").unwrap();
            let plain = analyzer.global_object(module, "plain").unwrap();
            let gen_scope = analyzer.scope_of(gen).unwrap();
            let plain_scope = analyzer.scope_of(plain).unwrap();
            assert!(analyzer.scopes[gen_scope].is_generator);
            assert_eq!(analyzer.scopes[gen_scope].returned.len(), 1);
            assert!(!analyzer.scopes[plain_scope].is_generator);
            assert_eq!(analyzer.scopes[plain_scope].returned.len(), 1);
        }

        #[test]
        fn self_attributes_hoist_into_the_class() {
            let source = "\
class C:
    def __init__(self):
        self.handler = make()

    def use(self):
        return self.handler
";
            let (mut analyzer, module) = analyzer_with(source);
            let class = analyzer.global_object(module, "C").unwrap();
            let scope = analyzer.scope_of(class).unwrap();
            assert!(analyzer.scopes[scope].names.contains_key("handler"));
        }

        #[test]
        fn static_methods_do_not_hoist() {
            let source = "\
class C:
    @staticmethod
    def helper(self):
        self.sneaky = 1
";
            let (mut analyzer, module) = analyzer_with(source);
            let class = analyzer.global_object(module, "C").unwrap();
            let scope = analyzer.scope_of(class).unwrap();
            assert!(!analyzer.scopes[scope].names.contains_key("sneaky"));
        }
    }

    mod lookup_rules {
        use super::*;

        #[test]
        fn function_scopes_see_module_names() {
            let source = "\
top = 1

def f():
    return top
";
            let (mut analyzer, module) = analyzer_with(source);
            let f = analyzer.global_object(module, "f").unwrap();
            let scope = analyzer.scope_of(f).unwrap();
            assert!(analyzer.lookup(scope, "top").is_some());
        }

        #[test]
        fn class_names_do_not_reach_method_bodies() {
            let source = "\
class C:
    class_level = 1

    def method(self):
        return class_level
";
            let (mut analyzer, module) = analyzer_with(source);
            let class = analyzer.global_object(module, "C").unwrap();
            let class_scope = analyzer.scope_of(class).unwrap();
            let method = analyzer.scopes[class_scope].children[0];
            let method_scope = analyzer.scope_of(method).unwrap();
            assert!(analyzer.lookup(method_scope, "class_level").is_none());
            // But the class body itself sees them.
            assert!(analyzer.lookup(class_scope, "class_level").is_some());
        }

        #[test]
        fn global_statement_binds_to_module_scope() {
            let source = "\
counter = 0

def bump():
    global counter
    counter = 1
";
            let (mut analyzer, module) = analyzer_with(source);
            let module_scope = analyzer.module_scope(module).unwrap();
            let bump = analyzer.global_object(module, "bump").unwrap();
            let bump_scope = analyzer.scope_of(bump).unwrap();
            let at_module = analyzer.scopes[module_scope].names["counter"];
            let in_function = analyzer.scopes[bump_scope].names["counter"];
            assert_eq!(at_module, in_function);
        }

        #[test]
        fn innermost_scope_descends_into_functions() {
            let source = "\
def outer():
    def inner():
        x = 1
    return inner
";
            let (mut analyzer, module) = analyzer_with(source);
            let offset = source.find("x = 1").unwrap();
            let scope = analyzer.innermost_scope_at(module, offset).unwrap();
            assert!(analyzer.scopes[scope].names.contains_key("x"));
        }
    }
}
