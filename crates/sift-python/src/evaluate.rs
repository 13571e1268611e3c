//! Symbolic expression evaluation.
//!
//! [`Analyzer::evaluate`] maps an expression in a scope to a [`NameRef`]:
//! plain names keep their binding identity (so occurrence search can compare
//! definition sites), everything else produces an object directly. Anything
//! outside the modeled surface evaluates to Unknown rather than erroring.
//!
//! Call expressions are where inference strategies meet: evaluating a call
//! records the argument objects and the resulting object in the call table
//! as a side effect, and the call's own result comes from the callee's
//! structural conclusion first, the call table second.

use std::mem;

use rustpython_parser::ast;

use sift_core::cache::Cell;

use crate::analyzer::Analyzer;
use crate::names::NameRef;
use crate::objects::{ContainerKind, LambdaData, ObjectId, Param, PyObject, ScalarKind};
use crate::scopes::{flatten_params, ScopeId};
use crate::syntax::node_span;

// ============================================================================
// Evaluation
// ============================================================================

impl Analyzer {
    /// Evaluate an expression to a name reference.
    pub fn evaluate(&mut self, scope: ScopeId, expr: &ast::Expr) -> NameRef {
        match expr {
            ast::Expr::Name(name) => self
                .lookup(scope, name.id.as_str())
                .unwrap_or(NameRef::Value(self.unknown())),
            ast::Expr::Attribute(attr) => {
                let primary = self.evaluate_object(scope, &attr.value);
                match self.get_attribute(primary, attr.attr.as_str()) {
                    Ok(found) => found,
                    Err(_) => NameRef::Value(self.unknown()),
                }
            }
            ast::Expr::Call(call) => NameRef::Value(self.evaluate_call(scope, call)),
            _ => NameRef::Value(self.evaluate_value(scope, expr)),
        }
    }

    /// Evaluate an expression directly to an object.
    pub fn evaluate_object(&mut self, scope: ScopeId, expr: &ast::Expr) -> ObjectId {
        let found = self.evaluate(scope, expr);
        self.object_of(found)
    }

    fn evaluate_value(&mut self, scope: ScopeId, expr: &ast::Expr) -> ObjectId {
        match expr {
            ast::Expr::Constant(constant) => self.constant_object(&constant.value),
            ast::Expr::List(list) => {
                let element = self.first_element(scope, &list.elts);
                self.container(ContainerKind::List, vec![element])
            }
            ast::Expr::Set(set) => {
                let element = self.first_element(scope, &set.elts);
                self.container(ContainerKind::Set, vec![element])
            }
            ast::Expr::Tuple(tuple) => {
                let elements: Vec<ObjectId> = tuple
                    .elts
                    .iter()
                    .map(|elt| self.evaluate_object(scope, elt))
                    .collect();
                self.container(ContainerKind::Tuple, elements)
            }
            ast::Expr::Dict(dict) => {
                let key = match dict.keys.iter().flatten().next() {
                    Some(key) => self.evaluate_object(scope, key),
                    None => self.unknown(),
                };
                let value = match dict.values.first() {
                    Some(value) => self.evaluate_object(scope, value),
                    None => self.unknown(),
                };
                self.container(ContainerKind::Dict, vec![key, value])
            }
            ast::Expr::ListComp(comp) => {
                let element = self.evaluate_object(scope, &comp.elt);
                self.container(ContainerKind::List, vec![element])
            }
            ast::Expr::SetComp(comp) => {
                let element = self.evaluate_object(scope, &comp.elt);
                self.container(ContainerKind::Set, vec![element])
            }
            ast::Expr::DictComp(comp) => {
                let key = self.evaluate_object(scope, &comp.key);
                let value = self.evaluate_object(scope, &comp.value);
                self.container(ContainerKind::Dict, vec![key, value])
            }
            ast::Expr::GeneratorExp(comp) => {
                let element = self.evaluate_object(scope, &comp.elt);
                self.container(ContainerKind::Generator, vec![element])
            }
            ast::Expr::Subscript(subscript) => {
                let primary = self.evaluate_object(scope, &subscript.value);
                match &*subscript.slice {
                    ast::Expr::Slice(_) => self.sliced_object(primary),
                    index => {
                        let position = constant_index(index);
                        self.subscript_element(primary, position)
                    }
                }
            }
            ast::Expr::Lambda(lambda) => self.lambda_object(scope, lambda),
            ast::Expr::BoolOp(op) => self.first_known(scope, &op.values),
            ast::Expr::BinOp(op) => self.binary_result(scope, op),
            ast::Expr::UnaryOp(op) => match op.op {
                ast::UnaryOp::Not => self.scalar(ScalarKind::Bool),
                _ => self.evaluate_object(scope, &op.operand),
            },
            ast::Expr::Compare(_) => self.scalar(ScalarKind::Bool),
            ast::Expr::IfExp(ifexp) => {
                let body = self.evaluate_object(scope, &ifexp.body);
                if !body.is_unknown() {
                    return body;
                }
                self.evaluate_object(scope, &ifexp.orelse)
            }
            ast::Expr::JoinedStr(_) | ast::Expr::FormattedValue(_) => {
                self.scalar(ScalarKind::Str)
            }
            ast::Expr::NamedExpr(named) => self.evaluate_object(scope, &named.value),
            ast::Expr::Starred(starred) => self.evaluate_object(scope, &starred.value),
            ast::Expr::Await(await_expr) => self.evaluate_object(scope, &await_expr.value),
            _ => self.unknown(),
        }
    }

    fn constant_object(&mut self, value: &ast::Constant) -> ObjectId {
        match value {
            ast::Constant::Bool(_) => self.scalar(ScalarKind::Bool),
            ast::Constant::Int(_) => self.scalar(ScalarKind::Int),
            ast::Constant::Float(_) => self.scalar(ScalarKind::Float),
            ast::Constant::Complex { .. } => self.scalar(ScalarKind::Complex),
            ast::Constant::Str(_) => self.scalar(ScalarKind::Str),
            ast::Constant::Bytes(_) => self.scalar(ScalarKind::Bytes),
            ast::Constant::None => self.scalar(ScalarKind::NoneType),
            _ => self.unknown(),
        }
    }

    fn first_element(&mut self, scope: ScopeId, elts: &[ast::Expr]) -> ObjectId {
        match elts.first() {
            Some(first) => self.evaluate_object(scope, first),
            None => self.unknown(),
        }
    }

    fn first_known(&mut self, scope: ScopeId, exprs: &[ast::Expr]) -> ObjectId {
        for expr in exprs {
            let object = self.evaluate_object(scope, expr);
            if !object.is_unknown() {
                return object;
            }
        }
        self.unknown()
    }

    fn binary_result(&mut self, scope: ScopeId, op: &ast::ExprBinOp) -> ObjectId {
        let left = self.evaluate_object(scope, &op.left);
        let right = self.evaluate_object(scope, &op.right);
        let str_object = self.scalar(ScalarKind::Str);
        if left == str_object {
            // Concatenation and %-formatting both keep str.
            return str_object;
        }
        let float_object = self.scalar(ScalarKind::Float);
        let int_object = self.scalar(ScalarKind::Int);
        if left == float_object || right == float_object {
            return float_object;
        }
        if left == int_object && right == int_object {
            if matches!(op.op, ast::Operator::Div) {
                return float_object;
            }
            return int_object;
        }
        if left == right
            && matches!(
                self.objects[left],
                PyObject::Container {
                    kind: ContainerKind::List,
                    ..
                }
            )
        {
            return left;
        }
        self.unknown()
    }

    fn lambda_object(&mut self, scope: ScopeId, lambda: &ast::ExprLambda) -> ObjectId {
        let module = self.scopes[scope].module;
        let span = node_span(lambda);
        if let Some(&object) = self.lambdas.get(&(module, span)) {
            return object;
        }
        let object = self.objects.alloc(PyObject::Lambda(Box::new(LambdaData {
            module,
            span,
            params: flatten_params(&lambda.args),
            body: lambda.body.clone(),
            parent: scope,
            scope: Cell::new(),
        })));
        self.lambdas.insert((module, span), object);
        object
    }
}

// ============================================================================
// Calls
// ============================================================================

impl Analyzer {
    fn evaluate_call(&mut self, scope: ScopeId, call: &ast::ExprCall) -> ObjectId {
        let (callee, receiver) = self.callee_of(scope, call);
        enum Callee {
            Class,
            Callable,
            Builtin(ObjectId),
            Instance(ObjectId),
            Type,
            Other,
        }
        let kind = match &self.objects[callee] {
            PyObject::Class(_) => Callee::Class,
            PyObject::Function(_) | PyObject::Lambda(_) => Callee::Callable,
            PyObject::BuiltinMethod { returns } => Callee::Builtin(*returns),
            PyObject::Instance { class } => Callee::Instance(*class),
            PyObject::TypeType => Callee::Type,
            _ => Callee::Other,
        };
        match kind {
            Callee::Class => self.construct_instance(scope, call, callee),
            Callee::Callable => {
                self.record_call(scope, call, callee, receiver);
                self.concluded_call(callee)
            }
            Callee::Builtin(returns) => returns,
            Callee::Instance(class) => {
                let Some(found) = self.class_attribute(class, "__call__") else {
                    return self.unknown();
                };
                let method = self.object_of(found);
                if !matches!(self.objects[method], PyObject::Function(_)) {
                    return self.unknown();
                }
                self.record_call(scope, call, method, Some(callee));
                self.concluded_call(method)
            }
            Callee::Type => match call.args.first() {
                Some(arg) => {
                    let object = self.evaluate_object(scope, arg);
                    self.type_of(object)
                }
                None => self.unknown(),
            },
            Callee::Other => self.builtin_call(scope, call),
        }
    }

    /// Resolve the called object, distinguishing bound-method receivers:
    /// `obj.method(...)` on an instance maps `obj` onto the self parameter,
    /// `Class.method(...)` does not.
    fn callee_of(
        &mut self,
        scope: ScopeId,
        call: &ast::ExprCall,
    ) -> (ObjectId, Option<ObjectId>) {
        if let ast::Expr::Attribute(attr) = &*call.func {
            let primary = self.evaluate_object(scope, &attr.value);
            let method = match self.get_attribute(primary, attr.attr.as_str()) {
                Ok(found) => self.object_of(found),
                Err(_) => self.unknown(),
            };
            let receiver = match &self.objects[primary] {
                PyObject::Instance { .. }
                | PyObject::Container { .. }
                | PyObject::Scalar(_) => Some(primary),
                _ => None,
            };
            return (method, receiver);
        }
        (self.evaluate_object(scope, &call.func), None)
    }

    /// Constructor call: conclude through `__new__` when it returns
    /// something other than an instance of this class, otherwise produce
    /// the canonical instance and feed `__init__`'s parameters.
    fn construct_instance(
        &mut self,
        scope: ScopeId,
        call: &ast::ExprCall,
        class: ObjectId,
    ) -> ObjectId {
        let instance = self.instance_of(class);
        if let Some(found) = self.class_attribute(class, "__init__") {
            let init = self.object_of(found);
            if matches!(self.objects[init], PyObject::Function(_)) {
                self.record_call(scope, call, init, Some(instance));
            }
        }
        if let Some(found) = self.class_attribute(class, "__new__") {
            let new = self.object_of(found);
            if matches!(self.objects[new], PyObject::Function(_)) {
                let returned = self.returned_object(new);
                if !returned.is_unknown() && returned != instance {
                    return returned;
                }
            }
        }
        instance
    }

    /// The object a call to `function` produces, recorded back into the
    /// call table so a later query can conclude the return even when the
    /// body alone cannot. Results observed while a sub-resolution was
    /// pending are returned but not recorded.
    fn concluded_call(&mut self, function: ObjectId) -> ObjectId {
        let saved = mem::replace(&mut self.pending_seen, false);
        let returned = self.returned_object(function);
        let tainted = self.pending_seen;
        self.pending_seen = tainted || saved;
        if !tainted {
            self.calls.record_returned(function, returned);
        }
        returned
    }

    /// Map argument expressions onto the callee's parameter list and feed
    /// the call table. One sample per site; the newest known object wins
    /// each slot.
    fn record_call(
        &mut self,
        scope: ScopeId,
        call: &ast::ExprCall,
        function: ObjectId,
        receiver: Option<ObjectId>,
    ) {
        let params: Vec<Param> = match &self.objects[function] {
            PyObject::Function(data) => data.params.clone(),
            PyObject::Lambda(data) => data.params.clone(),
            _ => return,
        };
        if params.is_empty() {
            return;
        }
        let mut positional: Vec<ObjectId> = Vec::new();
        if let Some(receiver) = receiver {
            positional.push(receiver);
        }
        for arg in &call.args {
            if matches!(arg, ast::Expr::Starred(_)) {
                break;
            }
            positional.push(self.evaluate_object(scope, arg));
        }
        let mut mapped = vec![self.unknown(); params.len()];
        let mut next_positional = positional.into_iter();
        for (index, param) in params.iter().enumerate() {
            match param.kind {
                crate::objects::ParamKind::Positional => {
                    if let Some(object) = next_positional.next() {
                        mapped[index] = object;
                    }
                }
                crate::objects::ParamKind::Vararg => {
                    let rest: Vec<ObjectId> = next_positional.by_ref().collect();
                    mapped[index] = self.container(ContainerKind::Tuple, rest);
                }
                crate::objects::ParamKind::KeywordOnly | crate::objects::ParamKind::Kwarg => {}
            }
        }
        for keyword in &call.keywords {
            let Some(name) = &keyword.arg else { continue };
            let Some(index) = params.iter().position(|p| p.name == name.as_str()) else {
                continue;
            };
            mapped[index] = self.evaluate_object(scope, &keyword.value);
        }
        for (index, param) in params.iter().enumerate() {
            if param.kind == crate::objects::ParamKind::Kwarg && mapped[index].is_unknown() {
                let key = self.scalar(ScalarKind::Str);
                let unknown = self.unknown();
                mapped[index] = self.container(ContainerKind::Dict, vec![key, unknown]);
            }
        }
        self.calls.record_parameters(function, &mapped);
    }

    /// Built-in constructors and a few well-known callables, consulted when
    /// the callee is not a modeled object.
    fn builtin_call(&mut self, scope: ScopeId, call: &ast::ExprCall) -> ObjectId {
        let ast::Expr::Name(name) = &*call.func else {
            return self.unknown();
        };
        // Only applies when the name has no user binding.
        if self.lookup(scope, name.id.as_str()).is_some() {
            return self.unknown();
        }
        let first = call.args.first().cloned();
        match name.id.as_str() {
            "list" => {
                let element = match first {
                    Some(arg) => {
                        let source = self.evaluate_object(scope, &arg);
                        self.iterated_element(source)
                    }
                    None => self.unknown(),
                };
                self.container(ContainerKind::List, vec![element])
            }
            "set" => {
                let element = match first {
                    Some(arg) => {
                        let source = self.evaluate_object(scope, &arg);
                        self.iterated_element(source)
                    }
                    None => self.unknown(),
                };
                self.container(ContainerKind::Set, vec![element])
            }
            "tuple" => {
                let element = match first {
                    Some(arg) => {
                        let source = self.evaluate_object(scope, &arg);
                        self.iterated_element(source)
                    }
                    None => self.unknown(),
                };
                self.container(ContainerKind::Tuple, vec![element])
            }
            "dict" => {
                let unknown = self.unknown();
                self.container(ContainerKind::Dict, vec![unknown, unknown])
            }
            "iter" => {
                let element = match first {
                    Some(arg) => {
                        let source = self.evaluate_object(scope, &arg);
                        self.iterated_element(source)
                    }
                    None => self.unknown(),
                };
                self.container(ContainerKind::Iterator, vec![element])
            }
            "next" => match first {
                Some(arg) => {
                    let source = self.evaluate_object(scope, &arg);
                    self.iterated_element(source)
                }
                None => self.unknown(),
            },
            "str" | "repr" | "format" => self.scalar(ScalarKind::Str),
            "int" | "len" | "ord" | "id" | "hash" => self.scalar(ScalarKind::Int),
            "float" => self.scalar(ScalarKind::Float),
            "bool" | "isinstance" | "issubclass" | "hasattr" | "callable" => {
                self.scalar(ScalarKind::Bool)
            }
            "bytes" => self.scalar(ScalarKind::Bytes),
            "sorted" => {
                let element = match first {
                    Some(arg) => {
                        let source = self.evaluate_object(scope, &arg);
                        self.iterated_element(source)
                    }
                    None => self.unknown(),
                };
                self.container(ContainerKind::List, vec![element])
            }
            "type" => match first {
                Some(arg) => {
                    let object = self.evaluate_object(scope, &arg);
                    self.type_of(object)
                }
                None => self.unknown(),
            },
            _ => self.unknown(),
        }
    }
}

fn constant_index(expr: &ast::Expr) -> Option<usize> {
    let ast::Expr::Constant(constant) = expr else {
        return None;
    };
    let ast::Constant::Int(value) = &constant.value else {
        return None;
    };
    value.to_string().parse().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::analyzer_with;

    mod literals {
        use super::*;

        #[test]
        fn constants_evaluate_to_scalars() {
            let source = "\
number = 42
text = 'hi'
nothing = None
flag = True
";
            let (mut analyzer, module) = analyzer_with(source);
            let number = analyzer.global_object(module, "number").unwrap();
            let text = analyzer.global_object(module, "text").unwrap();
            let nothing = analyzer.global_object(module, "nothing").unwrap();
            let flag = analyzer.global_object(module, "flag").unwrap();
            assert_eq!(number, analyzer.scalar(ScalarKind::Int));
            assert_eq!(text, analyzer.scalar(ScalarKind::Str));
            assert_eq!(nothing, analyzer.scalar(ScalarKind::NoneType));
            assert_eq!(flag, analyzer.scalar(ScalarKind::Bool));
        }

        #[test]
        fn list_literals_carry_their_element() {
            let (mut analyzer, module) = analyzer_with("names = ['a', 'b']\n");
            let names = analyzer.global_object(module, "names").unwrap();
            let element = analyzer.scalar(ScalarKind::Str);
            let expected = analyzer.container(ContainerKind::List, vec![element]);
            assert_eq!(names, expected);
        }

        #[test]
        fn dict_literals_carry_key_and_value() {
            let (mut analyzer, module) = analyzer_with("table = {'a': 1}\n");
            let table = analyzer.global_object(module, "table").unwrap();
            let key = analyzer.scalar(ScalarKind::Str);
            let value = analyzer.scalar(ScalarKind::Int);
            let expected = analyzer.container(ContainerKind::Dict, vec![key, value]);
            assert_eq!(table, expected);
        }
    }

    mod round_trips {
        use super::*;

        #[test]
        fn elements_survive_pop_index_slice_and_iteration() {
            let source = "\
items = ['x']
popped = items.pop()
first = items[0]
tail = items[1:]
for each in items:
    current = each
";
            let (mut analyzer, module) = analyzer_with(source);
            let text = analyzer.scalar(ScalarKind::Str);
            let list = analyzer.container(ContainerKind::List, vec![text]);
            assert_eq!(analyzer.global_object(module, "popped").unwrap(), text);
            assert_eq!(analyzer.global_object(module, "first").unwrap(), text);
            assert_eq!(analyzer.global_object(module, "tail").unwrap(), list);
            assert_eq!(analyzer.global_object(module, "each").unwrap(), text);
            assert_eq!(analyzer.global_object(module, "current").unwrap(), text);
        }

        #[test]
        fn dict_items_unpack_into_key_and_value() {
            let source = "\
table = {'a': 1}
pair = list(table.items())[0]
k, v = pair
";
            let (mut analyzer, module) = analyzer_with(source);
            let k = analyzer.global_object(module, "k").unwrap();
            let v = analyzer.global_object(module, "v").unwrap();
            assert_eq!(k, analyzer.scalar(ScalarKind::Str));
            assert_eq!(v, analyzer.scalar(ScalarKind::Int));
        }

        #[test]
        fn tuple_unpacking_is_positional() {
            let (mut analyzer, module) = analyzer_with("a, b = 1, 'two'\n");
            let a = analyzer.global_object(module, "a").unwrap();
            let b = analyzer.global_object(module, "b").unwrap();
            assert_eq!(a, analyzer.scalar(ScalarKind::Int));
            assert_eq!(b, analyzer.scalar(ScalarKind::Str));
        }
    }

    mod calls {
        use super::*;

        #[test]
        fn constructor_calls_yield_instances() {
            let source = "\
class Widget:
    pass

w = Widget()
";
            let (mut analyzer, module) = analyzer_with(source);
            let class = analyzer.global_object(module, "Widget").unwrap();
            let w = analyzer.global_object(module, "w").unwrap();
            let expected = analyzer.instance_of(class);
            assert_eq!(w, expected);
        }

        #[test]
        fn function_calls_use_the_structural_return() {
            let source = "\
def make():
    return []

result = make()
";
            let (mut analyzer, module) = analyzer_with(source);
            let result = analyzer.global_object(module, "result").unwrap();
            assert!(matches!(
                analyzer.objects[result],
                PyObject::Container {
                    kind: ContainerKind::List,
                    ..
                }
            ));
        }

        #[test]
        fn method_calls_bind_the_receiver() {
            let source = "\
class Widget:
    def clone(self):
        return self

w = Widget()
w2 = w.clone()
";
            let (mut analyzer, module) = analyzer_with(source);
            let w = analyzer.global_object(module, "w").unwrap();
            let w2 = analyzer.global_object(module, "w2").unwrap();
            assert_eq!(w, w2);
        }

        #[test]
        fn lambda_calls_evaluate_the_body() {
            let source = "\
double = lambda value: 'x'
result = double(1)
";
            let (mut analyzer, module) = analyzer_with(source);
            let result = analyzer.global_object(module, "result").unwrap();
            assert_eq!(result, analyzer.scalar(ScalarKind::Str));
        }

        #[test]
        fn unknown_callees_degrade_to_unknown() {
            let (mut analyzer, module) = analyzer_with("mystery = undefined_thing()\n");
            let mystery = analyzer.global_object(module, "mystery").unwrap();
            assert!(mystery.is_unknown());
        }
    }

    mod operators {
        use super::*;

        #[test]
        fn arithmetic_follows_numeric_promotion() {
            let source = "\
quotient = 7 / 2
total = 1 + 2
scaled = 1.5 * 3
label = 'a' + 'b'
";
            let (mut analyzer, module) = analyzer_with(source);
            let quotient = analyzer.global_object(module, "quotient").unwrap();
            let total = analyzer.global_object(module, "total").unwrap();
            let scaled = analyzer.global_object(module, "scaled").unwrap();
            let label = analyzer.global_object(module, "label").unwrap();
            assert_eq!(quotient, analyzer.scalar(ScalarKind::Float));
            assert_eq!(total, analyzer.scalar(ScalarKind::Int));
            assert_eq!(scaled, analyzer.scalar(ScalarKind::Float));
            assert_eq!(label, analyzer.scalar(ScalarKind::Str));
        }

        #[test]
        fn comparisons_are_bool() {
            let (mut analyzer, module) = analyzer_with("check = 1 < 2\n");
            let check = analyzer.global_object(module, "check").unwrap();
            assert_eq!(check, analyzer.scalar(ScalarKind::Bool));
        }
    }
}
