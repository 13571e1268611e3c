//! The name-resolution facade.
//!
//! Callers hand over a module and a byte offset (or line/column pair) and
//! get back what the name there means: where it was defined, what kind of
//! thing it is, and a human-readable account of the concluded object.
//!
//! Resolution is layered over the raw text:
//! 1. the word under the offset is recovered textually,
//! 2. definition sites (the name in a `def`/`class` header, an import, a
//!    parameter, an assignment target) short-circuit to their own binding,
//! 3. keyword arguments resolve against the called function's parameters,
//! 4. everything else re-parses the dotted primary ending at the word and
//!    evaluates it in the innermost scope.

use serde::Serialize;

use sift_core::error::SiftError;
use sift_core::text::Span;

use crate::analyzer::{Analyzer, ModuleId};
use crate::codescan;
use crate::names::{BindingKind, NameRef};
use crate::objects::{ContainerKind, ObjectId, PyObject, ScalarKind};
use crate::syntax;

// ============================================================================
// Results
// ============================================================================

/// What kind of thing a name turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameKind {
    Module,
    Class,
    Function,
    Parameter,
    Variable,
    Unknown,
}

/// The caller-facing conclusion for one resolved name.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedName {
    pub name: String,
    pub kind: NameKind,
    /// Concluded object, described for humans (`instance of pkg.C`, `list`).
    pub object: String,
    /// Module holding the definition, when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 1-indexed definition position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

/// Internal resolution product, carrying identity for occurrence matching.
#[derive(Debug, Clone)]
pub(crate) struct NameAt {
    pub text: String,
    pub found: NameRef,
}

// ============================================================================
// Facade
// ============================================================================

impl Analyzer {
    /// Resolve the name at a 1-indexed line/column position.
    pub fn resolve_position(
        &mut self,
        module: ModuleId,
        line: u32,
        col: u32,
    ) -> Result<ResolvedName, SiftError> {
        let offset = self
            .modules[module]
            .lines
            .offset_of(line, col)
            .ok_or_else(|| SiftError::invalid_args(format!("position {line}:{col} out of range")))?;
        self.resolve_offset(module, offset)
    }

    /// Resolve the name at a byte offset.
    pub fn resolve_offset(
        &mut self,
        module: ModuleId,
        offset: usize,
    ) -> Result<ResolvedName, SiftError> {
        let name = self.name_at(module, offset)?;
        Ok(self.describe(module, name))
    }

    pub(crate) fn name_at(&mut self, module: ModuleId, offset: usize) -> Result<NameAt, SiftError> {
        if let Some(err) = &self.modules[module].parse_error {
            return Err(SiftError::Syntax {
                file: self.file_label(module),
                line: err.line,
                message: err.message.clone(),
            });
        }
        let source = self.modules[module].source.clone();
        let Some(word) = codescan::word_at(&source, offset) else {
            let (line, col) = self.modules[module].lines.position_of(offset);
            return Err(SiftError::BadIdentifier {
                file: self.file_label(module),
                line,
                col,
            });
        };
        let text = source[word.start..word.end].to_string();

        if let Some(found) = self.definition_site_at(module, word, &text) {
            return Ok(NameAt { text, found });
        }
        if codescan::is_keyword_argument(&source, word) {
            if let Some(found) = self.keyword_parameter(module, &source, word, &text) {
                return Ok(NameAt { text, found });
            }
            return Err(self.name_not_found(module, word, &text));
        }

        let primary = codescan::primary_range(&source, word);
        let Some(scope) = self.innermost_scope_at(module, word.start) else {
            return Err(self.name_not_found(module, word, &text));
        };
        if primary == word {
            let found = self
                .lookup(scope, &text)
                .ok_or_else(|| self.name_not_found(module, word, &text))?;
            return Ok(NameAt { text, found });
        }

        let receiver = self
            .receiver_object(module, &source, primary, word)
            .ok_or_else(|| self.name_not_found(module, word, &text))?;
        match self.get_attribute(receiver, &text) {
            Ok(found) => Ok(NameAt { text, found }),
            Err(_) => Err(self.name_not_found(module, word, &text)),
        }
    }

    /// A binding whose recorded definition span covers the word: headers,
    /// parameters, imports, first assignment targets.
    fn definition_site_at(&mut self, module: ModuleId, word: Span, text: &str) -> Option<NameRef> {
        let mut scope = self.innermost_scope_at(module, word.start);
        while let Some(current) = scope {
            if let Some(&binding) = self.scopes[current].names.get(text) {
                if let Some(span) = self.bindings[binding].def_span {
                    if span == word {
                        return Some(NameRef::Binding(binding));
                    }
                }
            }
            scope = self.scopes[current].parent;
        }
        None
    }

    /// `f(name=...)`: the word names a parameter of the called function.
    fn keyword_parameter(
        &mut self,
        module: ModuleId,
        source: &str,
        word: Span,
        text: &str,
    ) -> Option<NameRef> {
        let callee_span = codescan::keyword_call_primary(source, word)?;
        let scope = self.innermost_scope_at(module, word.start)?;
        let callee_expr = parse_primary(&source[callee_span.start..callee_span.end])?;
        let mut callee = self.evaluate_object(scope, &callee_expr);
        if let PyObject::Class(_) = &self.objects[callee] {
            let init = self.class_attribute(callee, "__init__")?;
            callee = self.object_of(init);
        }
        let function_scope = self.scope_of(callee)?;
        let binding = *self.scopes[function_scope].names.get(text)?;
        Some(NameRef::Binding(binding))
    }

    /// Evaluate the receiver part of `receiver.word` by re-parsing its text.
    fn receiver_object(
        &mut self,
        module: ModuleId,
        source: &str,
        primary: Span,
        word: Span,
    ) -> Option<ObjectId> {
        let mut end = word.start;
        let bytes = source.as_bytes();
        while end > primary.start && bytes[end - 1] != b'.' {
            end -= 1;
        }
        let end = end.checked_sub(1)?;
        let text = &source[primary.start..end];
        let expr = parse_primary(text)?;
        let scope = self.innermost_scope_at(module, word.start)?;
        Some(self.evaluate_object(scope, &expr))
    }

    fn name_not_found(&self, module: ModuleId, word: Span, text: &str) -> SiftError {
        let (line, col) = self.modules[module].lines.position_of(word.start);
        SiftError::NameNotFound {
            name: text.to_string(),
            file: self.file_label(module),
            line,
            col,
        }
    }

    pub(crate) fn file_label(&self, module: ModuleId) -> String {
        match &self.modules[module].resource {
            Some(path) => path.display().to_string(),
            None => format!("<{}>", self.modules[module].name),
        }
    }
}

// ============================================================================
// Descriptions
// ============================================================================

impl Analyzer {
    fn describe(&mut self, module: ModuleId, name: NameAt) -> ResolvedName {
        let object = self.object_of(name.found);
        let kind = self.name_kind(name.found, object);
        let description = self.describe_object(object);
        let location = self.def_location(name.found);
        let (def_module, path, line, column, span) = match location {
            Some((def_module, span)) => {
                let state = &self.modules[def_module];
                let (line, column) = state.lines.position_of(span.start);
                (
                    Some(state.name.clone()),
                    state.resource.as_ref().map(|p| p.display().to_string()),
                    Some(line),
                    Some(column),
                    Some(span),
                )
            }
            None => (Some(self.modules[module].name.clone()), None, None, None, None),
        };
        ResolvedName {
            name: name.text,
            kind,
            object: description,
            module: def_module,
            path,
            line,
            column,
            span,
        }
    }

    fn name_kind(&self, found: NameRef, object: ObjectId) -> NameKind {
        if let NameRef::Binding(binding) = found {
            if matches!(self.bindings[binding].kind, BindingKind::Parameter { .. }) {
                return NameKind::Parameter;
            }
        }
        match &self.objects[object] {
            PyObject::Module(_) | PyObject::Package { .. } | PyObject::ModuleType => {
                NameKind::Module
            }
            PyObject::Class(_) | PyObject::TypeType => NameKind::Class,
            PyObject::Function(_) | PyObject::Lambda(_) | PyObject::FunctionType
            | PyObject::BuiltinMethod { .. } => NameKind::Function,
            PyObject::Unknown => match found {
                NameRef::Binding(_) => NameKind::Variable,
                NameRef::Value(_) => NameKind::Unknown,
            },
            _ => NameKind::Variable,
        }
    }

    /// A short human-readable account of a concluded object.
    pub fn describe_object(&self, object: ObjectId) -> String {
        match &self.objects[object] {
            PyObject::Unknown => "unknown".to_string(),
            PyObject::TypeType => "type".to_string(),
            PyObject::FunctionType => "function".to_string(),
            PyObject::ModuleType => "module".to_string(),
            PyObject::Module(m) => format!("module {}", self.modules[*m].name),
            PyObject::Package { module, .. } => {
                format!("package {}", self.modules[*module].name)
            }
            PyObject::Class(data) => {
                format!("class {}.{}", self.modules[data.module].name, data.name)
            }
            PyObject::Function(data) => {
                format!("function {}.{}", self.modules[data.module].name, data.name)
            }
            PyObject::Lambda(_) => "lambda".to_string(),
            PyObject::Instance { class } => match &self.objects[*class] {
                PyObject::Class(data) => format!(
                    "instance of {}.{}",
                    self.modules[data.module].name, data.name
                ),
                _ => "instance".to_string(),
            },
            PyObject::Scalar(kind) => scalar_label(*kind).to_string(),
            PyObject::Container { kind, .. } => container_label(*kind).to_string(),
            PyObject::BuiltinMethod { .. } => "builtin method".to_string(),
        }
    }
}

fn scalar_label(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Int => "int",
        ScalarKind::Float => "float",
        ScalarKind::Bool => "bool",
        ScalarKind::Bytes => "bytes",
        ScalarKind::Complex => "complex",
        ScalarKind::NoneType => "None",
        ScalarKind::Str => "str",
    }
}

fn container_label(kind: ContainerKind) -> &'static str {
    match kind {
        ContainerKind::List => "list",
        ContainerKind::Set => "set",
        ContainerKind::Tuple => "tuple",
        ContainerKind::Dict => "dict",
        ContainerKind::Iterator => "iterator",
        ContainerKind::Generator => "generator",
    }
}

/// Parse a primary expression snippet back into a syntax tree. Escaped
/// newlines are flattened first; anything unparseable yields `None`.
fn parse_primary(text: &str) -> Option<rustpython_parser::ast::Expr> {
    let flattened = text.replace("\\\n", " ").replace(['\n', '\r'], " ");
    let parsed = syntax::parse_module(&flattened).ok()?;
    let suite = parsed.suite;
    match suite.first() {
        Some(rustpython_parser::ast::Stmt::Expr(stmt)) => Some((*stmt.value).clone()),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{analyzer_with, analyzer_with_modules};

    fn resolve_at(source: &str, needle: &str) -> Result<ResolvedName, SiftError> {
        let (mut analyzer, module) = analyzer_with(source);
        let offset = source.find(needle).expect("needle in source");
        analyzer.resolve_offset(module, offset)
    }

    mod definitions {
        use super::*;

        #[test]
        fn a_use_points_at_its_definition() {
            let source = "\
value = make()
print(value)
";
            let (mut analyzer, module) = analyzer_with(source);
            let use_offset = source.rfind("value").unwrap();
            let resolved = analyzer.resolve_offset(module, use_offset).unwrap();
            assert_eq!(resolved.name, "value");
            assert_eq!(resolved.line, Some(1));
            assert_eq!(resolved.column, Some(1));
        }

        #[test]
        fn a_definition_site_resolves_to_itself() {
            let source = "\
def compute():
    pass
";
            let resolved = resolve_at(source, "compute").unwrap();
            assert_eq!(resolved.kind, NameKind::Function);
            assert_eq!(resolved.line, Some(1));
        }

        #[test]
        fn method_attributes_resolve_through_the_receiver() {
            let source = "\
class Widget:
    def render(self):
        pass

w = Widget()
w.render()
";
            let (mut analyzer, module) = analyzer_with(source);
            let offset = source.rfind("render").unwrap();
            let resolved = analyzer.resolve_offset(module, offset).unwrap();
            assert_eq!(resolved.kind, NameKind::Function);
            let def_line = analyzer.modules[module]
                .lines
                .line_of(source.find("def render").unwrap());
            assert_eq!(resolved.line, Some(def_line));
        }

        #[test]
        fn keyword_arguments_resolve_to_parameters() {
            let source = "\
def draw(color):
    pass

draw(color='red')
";
            let (mut analyzer, module) = analyzer_with(source);
            let offset = source.rfind("color").unwrap();
            let resolved = analyzer.resolve_offset(module, offset).unwrap();
            assert_eq!(resolved.kind, NameKind::Parameter);
        }

        #[test]
        fn imported_names_point_into_the_source_module() {
            let (mut analyzer, modules) = analyzer_with_modules(&[
                ("lib", "def helper():\n    pass\n"),
                ("app", "from lib import helper\nhelper()\n"),
            ]);
            let source = "from lib import helper\nhelper()\n";
            let offset = source.rfind("helper").unwrap();
            let resolved = analyzer.resolve_offset(modules[1], offset).unwrap();
            assert_eq!(resolved.module.as_deref(), Some("lib"));
            assert_eq!(resolved.kind, NameKind::Function);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn offsets_outside_identifiers_are_rejected() {
            let err = resolve_at("x = 1 + 2\n", "+").unwrap_err();
            assert!(matches!(err, SiftError::BadIdentifier { .. }));
        }

        #[test]
        fn unbound_names_are_not_found() {
            let err = resolve_at("print(missing_name)\n", "missing_name").unwrap_err();
            assert!(matches!(err, SiftError::NameNotFound { .. }));
        }

        #[test]
        fn syntax_errors_surface_as_such() {
            let source = "def broken(:\n";
            let (mut analyzer, module) = analyzer_with(source);
            let err = analyzer.resolve_offset(module, 4).unwrap_err();
            assert!(matches!(err, SiftError::Syntax { .. }));
        }
    }

    mod descriptions {
        use super::*;

        #[test]
        fn concluded_objects_are_described() {
            let source = "\
class Widget:
    pass

w = Widget()
items = [1]
";
            let (mut analyzer, module) = analyzer_with(source);
            let w = source.rfind("w =").unwrap();
            let items = source.find("items").unwrap();
            let w_resolved = analyzer.resolve_offset(module, w).unwrap();
            let items_resolved = analyzer.resolve_offset(module, items).unwrap();
            assert_eq!(w_resolved.object, "instance of mod.Widget");
            assert_eq!(items_resolved.object, "list");
        }
    }
}
