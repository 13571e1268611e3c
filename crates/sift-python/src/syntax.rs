//! Syntax adapter over the external Python parser.
//!
//! Wraps rustpython-parser behind a narrow surface: source normalization,
//! parsing with best-effort error line numbers, span conversion, and the
//! generic tree-walk helpers every higher layer dispatches through.
//!
//! Walkers here are closed matches over the node enums with an explicit
//! default arm that recurses into children; unhandled kinds are never an
//! error.

use std::sync::Arc;

use rustpython_parser::ast::{self, Ranged};
use rustpython_parser::Parse;
use thiserror::Error;

use sift_core::text::{is_identifier_char, is_identifier_start, LineIndex, Span};

// ============================================================================
// Errors
// ============================================================================

/// A parse failure with a best-effort 1-indexed line number.
#[derive(Debug, Clone, Error)]
#[error("syntax error at line {line}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

// ============================================================================
// Parsed Modules
// ============================================================================

/// A parsed module: normalized source, its statement list, and a line index.
#[derive(Debug, Clone)]
pub struct ParsedModule {
    /// Normalized source text (`\n` line endings, trailing newline).
    pub source: String,
    /// Top-level statements.
    pub suite: Arc<Vec<ast::Stmt>>,
    /// Offset/position mapping for `source`.
    pub lines: LineIndex,
}

/// Normalize line endings to `\n` and guarantee a trailing newline.
pub fn normalize_source(raw: &str) -> String {
    let mut text = raw.replace("\r\n", "\n").replace('\r', "\n");
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

/// Parse Python source into a [`ParsedModule`].
///
/// The input is normalized before parsing; parse failures surface as a
/// single [`SyntaxError`] carrying the line computed from the error offset.
pub fn parse_module(raw: &str) -> Result<ParsedModule, SyntaxError> {
    let source = normalize_source(raw);
    let lines = LineIndex::new(&source);
    match ast::Suite::parse(&source, "<module>") {
        Ok(suite) => Ok(ParsedModule {
            source,
            suite: Arc::new(suite),
            lines,
        }),
        Err(err) => {
            let offset = (u32::from(err.offset) as usize).min(source.len());
            Err(SyntaxError {
                line: lines.line_of(offset),
                message: err.error.to_string(),
            })
        }
    }
}

// ============================================================================
// Spans
// ============================================================================

/// Byte span of any ranged node.
pub fn node_span(node: &impl Ranged) -> Span {
    Span::new(
        u32::from(node.range().start()) as usize,
        u32::from(node.range().end()) as usize,
    )
}

/// Find `name` as a whole word within `within`, returning its span.
///
/// The parser does not attach ranges to identifiers themselves (only to
/// nodes), so definition-name spans are recovered textually from the
/// defining statement's span.
pub fn find_word_in(source: &str, within: Span, name: &str) -> Option<Span> {
    let end = within.end.min(source.len());
    let text = source.get(within.start..end)?;
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(rel) = text[search..].find(name) {
        let at = search + rel;
        let before_ok = at == 0 || !is_identifier_char(bytes[at - 1] as char);
        let after = at + name.len();
        let after_ok = after >= bytes.len() || !is_identifier_char(bytes[after] as char);
        if before_ok && after_ok {
            return Some(Span::new(within.start + at, within.start + after));
        }
        search = at + 1;
    }
    None
}

/// Span of the attribute name in an `a.b` access (the `b` part).
pub fn attribute_name_span(node: &ast::ExprAttribute) -> Span {
    let span = node_span(node);
    let len = node.attr.as_str().len();
    Span::new(span.end.saturating_sub(len), span.end)
}

// ============================================================================
// Statement Walkers
// ============================================================================

/// The suites nested inside a statement that belong to the *same* scope
/// (bodies of `if`/`while`/`for`/`with`/`try`), excluding the bodies of
/// nested `def`/`class` which open scopes of their own.
pub fn same_scope_suites(stmt: &ast::Stmt) -> Vec<&[ast::Stmt]> {
    match stmt {
        ast::Stmt::For(s) => vec![&s.body, &s.orelse],
        ast::Stmt::AsyncFor(s) => vec![&s.body, &s.orelse],
        ast::Stmt::While(s) => vec![&s.body, &s.orelse],
        ast::Stmt::If(s) => vec![&s.body, &s.orelse],
        ast::Stmt::With(s) => vec![&s.body],
        ast::Stmt::AsyncWith(s) => vec![&s.body],
        ast::Stmt::Try(s) => {
            let mut suites: Vec<&[ast::Stmt]> = vec![&s.body, &s.orelse, &s.finalbody];
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                suites.push(&h.body);
            }
            suites
        }
        ast::Stmt::TryStar(s) => {
            let mut suites: Vec<&[ast::Stmt]> = vec![&s.body, &s.orelse, &s.finalbody];
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                suites.push(&h.body);
            }
            suites
        }
        _ => Vec::new(),
    }
}

/// The expressions appearing directly in a statement (not those inside
/// nested suites or nested definition bodies).
pub fn stmt_exprs(stmt: &ast::Stmt) -> Vec<&ast::Expr> {
    match stmt {
        ast::Stmt::Expr(s) => vec![&s.value],
        ast::Stmt::Assign(s) => {
            let mut exprs: Vec<&ast::Expr> = s.targets.iter().collect();
            exprs.push(&s.value);
            exprs
        }
        ast::Stmt::AugAssign(s) => vec![&s.target, &s.value],
        ast::Stmt::AnnAssign(s) => {
            let mut exprs = vec![&*s.target, &*s.annotation];
            if let Some(value) = &s.value {
                exprs.push(value);
            }
            exprs
        }
        ast::Stmt::Return(s) => s.value.iter().map(|e| &**e).collect(),
        ast::Stmt::Delete(s) => s.targets.iter().collect(),
        ast::Stmt::For(s) => vec![&s.target, &s.iter],
        ast::Stmt::AsyncFor(s) => vec![&s.target, &s.iter],
        ast::Stmt::While(s) => vec![&s.test],
        ast::Stmt::If(s) => vec![&s.test],
        ast::Stmt::With(s) => s.items.iter().map(|item| &item.context_expr).collect(),
        ast::Stmt::AsyncWith(s) => s.items.iter().map(|item| &item.context_expr).collect(),
        ast::Stmt::Raise(s) => {
            let mut exprs = Vec::new();
            if let Some(exc) = &s.exc {
                exprs.push(&**exc);
            }
            if let Some(cause) = &s.cause {
                exprs.push(&**cause);
            }
            exprs
        }
        ast::Stmt::Assert(s) => {
            let mut exprs = vec![&*s.test];
            if let Some(msg) = &s.msg {
                exprs.push(msg);
            }
            exprs
        }
        _ => Vec::new(),
    }
}

/// Walk every statement of a suite including same-scope nested suites,
/// skipping the bodies of nested `def`/`class`.
pub fn walk_same_scope<'a>(suite: &'a [ast::Stmt], visit: &mut impl FnMut(&'a ast::Stmt)) {
    for stmt in suite {
        visit(stmt);
        match stmt {
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_) => {
            }
            _ => {
                for nested in same_scope_suites(stmt) {
                    walk_same_scope(nested, visit);
                }
            }
        }
    }
}

// ============================================================================
// Expression Walkers
// ============================================================================

/// Pre-order walk of an expression tree, skipping lambda bodies (which form
/// their own scope). The visitor returns `false` to prune a subtree.
pub fn walk_expr<'a>(expr: &'a ast::Expr, visit: &mut impl FnMut(&'a ast::Expr) -> bool) {
    if !visit(expr) {
        return;
    }
    match expr {
        ast::Expr::BoolOp(e) => {
            for value in &e.values {
                walk_expr(value, visit);
            }
        }
        ast::Expr::NamedExpr(e) => {
            walk_expr(&e.target, visit);
            walk_expr(&e.value, visit);
        }
        ast::Expr::BinOp(e) => {
            walk_expr(&e.left, visit);
            walk_expr(&e.right, visit);
        }
        ast::Expr::UnaryOp(e) => walk_expr(&e.operand, visit),
        ast::Expr::Lambda(_) => {}
        ast::Expr::IfExp(e) => {
            walk_expr(&e.test, visit);
            walk_expr(&e.body, visit);
            walk_expr(&e.orelse, visit);
        }
        ast::Expr::Dict(e) => {
            for key in e.keys.iter().flatten() {
                walk_expr(key, visit);
            }
            for value in &e.values {
                walk_expr(value, visit);
            }
        }
        ast::Expr::Set(e) => {
            for elt in &e.elts {
                walk_expr(elt, visit);
            }
        }
        ast::Expr::ListComp(e) => {
            walk_expr(&e.elt, visit);
            for gen in &e.generators {
                walk_expr(&gen.iter, visit);
                for cond in &gen.ifs {
                    walk_expr(cond, visit);
                }
            }
        }
        ast::Expr::SetComp(e) => {
            walk_expr(&e.elt, visit);
            for gen in &e.generators {
                walk_expr(&gen.iter, visit);
            }
        }
        ast::Expr::DictComp(e) => {
            walk_expr(&e.key, visit);
            walk_expr(&e.value, visit);
            for gen in &e.generators {
                walk_expr(&gen.iter, visit);
            }
        }
        ast::Expr::GeneratorExp(e) => {
            walk_expr(&e.elt, visit);
            for gen in &e.generators {
                walk_expr(&gen.iter, visit);
            }
        }
        ast::Expr::Await(e) => walk_expr(&e.value, visit),
        ast::Expr::Yield(e) => {
            if let Some(value) = &e.value {
                walk_expr(value, visit);
            }
        }
        ast::Expr::YieldFrom(e) => walk_expr(&e.value, visit),
        ast::Expr::Compare(e) => {
            walk_expr(&e.left, visit);
            for comparator in &e.comparators {
                walk_expr(comparator, visit);
            }
        }
        ast::Expr::Call(e) => {
            walk_expr(&e.func, visit);
            for arg in &e.args {
                walk_expr(arg, visit);
            }
            for keyword in &e.keywords {
                walk_expr(&keyword.value, visit);
            }
        }
        ast::Expr::FormattedValue(e) => walk_expr(&e.value, visit),
        ast::Expr::JoinedStr(e) => {
            for value in &e.values {
                walk_expr(value, visit);
            }
        }
        ast::Expr::Attribute(e) => walk_expr(&e.value, visit),
        ast::Expr::Subscript(e) => {
            walk_expr(&e.value, visit);
            walk_expr(&e.slice, visit);
        }
        ast::Expr::Starred(e) => walk_expr(&e.value, visit),
        ast::Expr::List(e) => {
            for elt in &e.elts {
                walk_expr(elt, visit);
            }
        }
        ast::Expr::Tuple(e) => {
            for elt in &e.elts {
                walk_expr(elt, visit);
            }
        }
        ast::Expr::Slice(e) => {
            for part in [&e.lower, &e.upper, &e.step].into_iter().flatten() {
                walk_expr(part, visit);
            }
        }
        _ => {}
    }
}

/// Dotted name of a decorator expression (`staticmethod`, `abc.abstractmethod`),
/// unwrapping a decorator-factory call. `None` for anything more dynamic.
pub fn decorator_name(expr: &ast::Expr) -> Option<String> {
    match expr {
        ast::Expr::Name(e) => Some(e.id.to_string()),
        ast::Expr::Attribute(e) => {
            decorator_name(&e.value).map(|base| format!("{}.{}", base, e.attr.as_str()))
        }
        ast::Expr::Call(e) => decorator_name(&e.func),
        _ => None,
    }
}

/// Whether a word at the given byte offset starts an identifier.
pub fn starts_identifier_at(source: &str, offset: usize) -> bool {
    source[offset..]
        .chars()
        .next()
        .is_some_and(is_identifier_start)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn normalizes_line_endings_and_trailing_newline() {
            let parsed = parse_module("a = 1\r\nb = 2").unwrap();
            assert_eq!(parsed.source, "a = 1\nb = 2\n");
            assert_eq!(parsed.suite.len(), 2);
        }

        #[test]
        fn parse_failure_carries_line_number() {
            let err = parse_module("x = 1\ny = (\n").unwrap_err();
            assert!(err.line >= 2, "expected line >= 2, got {}", err.line);
        }

        #[test]
        fn unterminated_string_is_an_error_not_a_panic() {
            assert!(parse_module("s = 'oops\n").is_err());
        }
    }

    mod word_search {
        use super::*;

        #[test]
        fn finds_whole_words_only() {
            let source = "def foobar(foo):\n    return foo\n";
            let span = Span::new(0, source.len());
            let found = find_word_in(source, span, "foo").unwrap();
            assert_eq!(&source[found.start..found.end], "foo");
            assert_eq!(found.start, 11);
        }

        #[test]
        fn missing_word_is_none() {
            let source = "x = 1\n";
            assert!(find_word_in(source, Span::new(0, source.len()), "y").is_none());
        }
    }

    mod walkers {
        use super::*;

        #[test]
        fn same_scope_walk_skips_nested_defs() {
            let parsed = parse_module(
                "if cond:\n    x = 1\ndef f():\n    y = 2\nwhile other:\n    z = 3\n",
            )
            .unwrap();
            let mut assigns = 0;
            walk_same_scope(&parsed.suite, &mut |stmt| {
                if matches!(stmt, ast::Stmt::Assign(_)) {
                    assigns += 1;
                }
            });
            // y = 2 lives in f's scope and must not be visited.
            assert_eq!(assigns, 2);
        }

        #[test]
        fn expr_walk_reaches_call_arguments() {
            let parsed = parse_module("f(g(h), k=v)\n").unwrap();
            let ast::Stmt::Expr(stmt) = &parsed.suite[0] else {
                panic!("expected expression statement");
            };
            let mut names = Vec::new();
            walk_expr(&stmt.value, &mut |expr| {
                if let ast::Expr::Name(name) = expr {
                    names.push(name.id.to_string());
                }
                true
            });
            assert_eq!(names, vec!["f", "g", "h", "v"]);
        }

        #[test]
        fn decorator_names_unwrap_calls_and_attributes() {
            let parsed = parse_module(
                "@staticmethod\n@abc.abstractmethod\n@functools.wraps(f)\ndef g():\n    pass\n",
            )
            .unwrap();
            let ast::Stmt::FunctionDef(def) = &parsed.suite[0] else {
                panic!("expected def");
            };
            let names: Vec<_> = def
                .decorator_list
                .iter()
                .filter_map(decorator_name)
                .collect();
            assert_eq!(names, vec!["staticmethod", "abc.abstractmethod", "functools.wraps"]);
        }
    }
}
