//! Function conclusions: returns and parameters.
//!
//! Two strategies feed these conclusions. The structural strategy reads the
//! function's own body (return and yield expressions). The call-based
//! strategy reads the call table, which accumulates one sample per
//! definition site as call expressions are evaluated. Merging is
//! newest-known-wins: a fresh known object replaces the stored one, and
//! Unknown never erases a known value, so results only improve as more of
//! the project is analyzed.

use std::collections::HashMap;
use std::mem;

use sift_core::cache::CellQuery;

use crate::analyzer::Analyzer;
use crate::names::Resolved;
use crate::objects::{ContainerKind, ObjectId, ParamKind, PyObject, ScalarKind};

// ============================================================================
// Call Table
// ============================================================================

/// Per-function observations gathered from call sites and dynamic samples.
#[derive(Debug, Default)]
pub struct CallTable {
    records: HashMap<ObjectId, CallRecord>,
}

#[derive(Debug)]
struct CallRecord {
    parameters: Vec<ObjectId>,
    returned: ObjectId,
}

impl CallTable {
    pub fn new() -> Self {
        CallTable::default()
    }

    /// Merge one call's argument objects, element-wise. The newest known
    /// object takes each slot; Unknown never erases one.
    pub fn record_parameters(&mut self, function: ObjectId, parameters: &[ObjectId]) {
        let record = self.records.entry(function).or_insert_with(|| CallRecord {
            parameters: Vec::new(),
            returned: ObjectId::unknown(),
        });
        if record.parameters.len() < parameters.len() {
            record.parameters.resize(parameters.len(), ObjectId::unknown());
        }
        for (slot, &incoming) in record.parameters.iter_mut().zip(parameters) {
            if !incoming.is_unknown() {
                *slot = incoming;
            }
        }
    }

    /// Merge an observed return object. The newest known one wins; Unknown
    /// never erases it.
    pub fn record_returned(&mut self, function: ObjectId, returned: ObjectId) {
        let record = self.records.entry(function).or_insert_with(|| CallRecord {
            parameters: Vec::new(),
            returned: ObjectId::unknown(),
        });
        if !returned.is_unknown() {
            record.returned = returned;
        }
    }

    pub fn parameter(&self, function: ObjectId, index: usize) -> Option<ObjectId> {
        self.records
            .get(&function)
            .and_then(|record| record.parameters.get(index))
            .copied()
            .filter(|object| !object.is_unknown())
    }

    pub fn returned(&self, function: ObjectId) -> Option<ObjectId> {
        self.records
            .get(&function)
            .map(|record| record.returned)
            .filter(|object| !object.is_unknown())
    }
}

// ============================================================================
// Returns
// ============================================================================

impl Analyzer {
    /// What a call to `callable` produces. Structural first; if the body
    /// concludes nothing, fall back to the call table.
    pub fn returned_object(&mut self, callable: ObjectId) -> ObjectId {
        match &self.objects[callable] {
            PyObject::Function(data) => {
                let generation = self.generation_of(data.module);
                match data.returned.query(generation) {
                    CellQuery::Hit(&object) => return object,
                    CellQuery::InProgress => {
                        self.pending_seen = true;
                        return self.unknown();
                    }
                    CellQuery::Miss => {}
                }
            }
            PyObject::Lambda(_) => return self.lambda_returned(callable),
            PyObject::BuiltinMethod { returns } => return *returns,
            _ => return self.unknown(),
        }

        if let PyObject::Function(data) = &mut self.objects[callable] {
            data.returned.begin();
        }
        let saved = mem::replace(&mut self.pending_seen, false);
        let object = self.compute_returned(callable);
        let tainted = self.pending_seen;
        self.pending_seen = tainted || saved;

        let generation = match &self.objects[callable] {
            PyObject::Function(data) => self.generation_of(data.module),
            _ => return object,
        };
        if let PyObject::Function(data) = &mut self.objects[callable] {
            if tainted {
                data.returned.reset();
            } else {
                data.returned.fill(generation, object);
            }
        }
        object
    }

    fn compute_returned(&mut self, function: ObjectId) -> ObjectId {
        let structural = self.structural_returned(function);
        if !structural.is_unknown() {
            return structural;
        }
        self.calls
            .returned(function)
            .unwrap_or_else(|| self.unknown())
    }

    /// Evaluate the body's return expressions, later ones first. Generator
    /// bodies conclude a generator of the yielded element.
    fn structural_returned(&mut self, function: ObjectId) -> ObjectId {
        let Some(scope) = self.scope_of(function) else {
            return self.unknown();
        };
        let exprs = self.scopes[scope].returned.clone();
        let is_generator = self.scopes[scope].is_generator;
        let mut concluded = self.unknown();
        for expr in exprs.iter().rev() {
            let object = self.evaluate_object(scope, expr);
            if !object.is_unknown() {
                concluded = object;
                break;
            }
        }
        if is_generator {
            return self.container(ContainerKind::Generator, vec![concluded]);
        }
        concluded
    }

    fn lambda_returned(&mut self, lambda: ObjectId) -> ObjectId {
        let Some(scope) = self.scope_of(lambda) else {
            return self.unknown();
        };
        let exprs = self.scopes[scope].returned.clone();
        for expr in &exprs {
            let object = self.evaluate_object(scope, expr);
            if !object.is_unknown() {
                return object;
            }
        }
        self.calls.returned(lambda).unwrap_or_else(|| self.unknown())
    }
}

// ============================================================================
// Parameters
// ============================================================================

impl Analyzer {
    /// The object flowing into one parameter slot.
    ///
    /// The first parameter of a method is implicit: the instance for plain
    /// methods, the class for classmethods, nothing special for
    /// staticmethods. Vararg and kwarg slots get their container shapes.
    /// Every other slot reads the call table.
    pub fn parameter_object(&mut self, callable: ObjectId, index: usize) -> ObjectId {
        let (kind, owner, is_static, is_classmethod) = match &self.objects[callable] {
            PyObject::Function(data) => (
                data.params.get(index).map(|p| p.kind),
                data.owner,
                data.has_decorator("staticmethod"),
                data.has_decorator("classmethod"),
            ),
            PyObject::Lambda(data) => (data.params.get(index).map(|p| p.kind), None, false, false),
            _ => return self.unknown(),
        };
        let Some(kind) = kind else {
            return self.unknown();
        };
        match kind {
            ParamKind::Vararg => {
                let unknown = self.unknown();
                return self.container(ContainerKind::Tuple, vec![unknown]);
            }
            ParamKind::Kwarg => {
                let key = self.scalar(ScalarKind::Str);
                let unknown = self.unknown();
                return self.container(ContainerKind::Dict, vec![key, unknown]);
            }
            ParamKind::Positional | ParamKind::KeywordOnly => {}
        }
        if index == 0 && !is_static {
            if let Some(owner) = owner {
                if is_classmethod {
                    return owner;
                }
                return self.instance_of(owner);
            }
        }
        self.calls
            .parameter(callable, index)
            .unwrap_or_else(|| self.unknown())
    }

    /// All parameter conclusions of a callable, in declaration order.
    pub fn parameter_objects(&mut self, callable: ObjectId) -> Vec<ObjectId> {
        let count = match &self.objects[callable] {
            PyObject::Function(data) => data.params.len(),
            PyObject::Lambda(data) => data.params.len(),
            _ => 0,
        };
        (0..count)
            .map(|index| self.parameter_object(callable, index))
            .collect()
    }

    /// Resolve a name binding inside a function scope to its object, for
    /// callers that already hold the scope. Unresolvable names conclude
    /// Unknown.
    #[allow(dead_code)]
    pub(crate) fn scope_name_object(&mut self, scope: crate::scopes::ScopeId, name: &str) -> ObjectId {
        let Some(&binding) = self.scopes[scope].names.get(name) else {
            return self.unknown();
        };
        match self.resolve_binding(binding) {
            Resolved::Object(object) => object,
            Resolved::InProgress => {
                self.pending_seen = true;
                self.unknown()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
