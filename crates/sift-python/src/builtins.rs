//! Synthesized attributes for built-in containers and scalars.
//!
//! Containers and scalars have no syntax to analyze, so their protocol
//! surface is generated here: each known method becomes a `BuiltinMethod`
//! object whose return is precomputed from the container's element types.
//! This is what lets an element survive a round trip through `pop()`,
//! indexing, slicing, or iteration.

use crate::analyzer::Analyzer;
use crate::objects::{ContainerKind, ObjectId, PyObject, ScalarKind};

// ============================================================================
// Container Attributes
// ============================================================================

/// The attribute of a container object, as a `BuiltinMethod` with a
/// precomputed return. `None` for names outside the modeled surface.
pub fn container_attribute(
    analyzer: &mut Analyzer,
    kind: ContainerKind,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    let returns = match kind {
        ContainerKind::List => list_method_return(analyzer, holding, name)?,
        ContainerKind::Set => set_method_return(analyzer, holding, name)?,
        ContainerKind::Tuple => tuple_method_return(analyzer, holding, name)?,
        ContainerKind::Dict => dict_method_return(analyzer, holding, name)?,
        ContainerKind::Iterator | ContainerKind::Generator => {
            iterator_method_return(analyzer, holding, name)?
        }
    };
    Some(analyzer.builtin_method(returns))
}

fn element_of(analyzer: &mut Analyzer, holding: &[ObjectId]) -> ObjectId {
    holding.first().copied().unwrap_or_else(|| analyzer.unknown())
}

fn list_method_return(
    analyzer: &mut Analyzer,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    let element = element_of(analyzer, holding);
    Some(match name {
        "pop" | "__getitem__" => element,
        "__getslice__" | "copy" => analyzer.container(ContainerKind::List, vec![element]),
        "__iter__" => analyzer.container(ContainerKind::Iterator, vec![element]),
        "count" | "index" => analyzer.scalar(ScalarKind::Int),
        "append" | "extend" | "insert" | "remove" | "reverse" | "sort" | "clear" => {
            analyzer.scalar(ScalarKind::NoneType)
        }
        _ => return None,
    })
}

fn set_method_return(
    analyzer: &mut Analyzer,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    let element = element_of(analyzer, holding);
    Some(match name {
        "pop" => element,
        "copy" => analyzer.container(ContainerKind::Set, vec![element]),
        "__iter__" => analyzer.container(ContainerKind::Iterator, vec![element]),
        "add" | "discard" | "remove" | "clear" | "update" => analyzer.scalar(ScalarKind::NoneType),
        "union" | "intersection" | "difference" => {
            analyzer.container(ContainerKind::Set, vec![element])
        }
        _ => return None,
    })
}

fn tuple_method_return(
    analyzer: &mut Analyzer,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    Some(match name {
        "__getitem__" => uniform_element(analyzer, holding),
        "__iter__" => {
            let element = uniform_element(analyzer, holding);
            analyzer.container(ContainerKind::Iterator, vec![element])
        }
        "count" | "index" => analyzer.scalar(ScalarKind::Int),
        _ => return None,
    })
}

fn dict_method_return(
    analyzer: &mut Analyzer,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    let unknown = analyzer.unknown();
    let key = holding.first().copied().unwrap_or(unknown);
    let value = holding.get(1).copied().unwrap_or(unknown);
    Some(match name {
        "keys" => analyzer.container(ContainerKind::List, vec![key]),
        "values" => analyzer.container(ContainerKind::List, vec![value]),
        "items" => {
            let pair = analyzer.container(ContainerKind::Tuple, vec![key, value]);
            analyzer.container(ContainerKind::List, vec![pair])
        }
        "get" | "pop" | "setdefault" | "__getitem__" => value,
        "popitem" => analyzer.container(ContainerKind::Tuple, vec![key, value]),
        "copy" => analyzer.container(ContainerKind::Dict, vec![key, value]),
        "__iter__" => analyzer.container(ContainerKind::Iterator, vec![key]),
        "update" | "clear" => analyzer.scalar(ScalarKind::NoneType),
        _ => return None,
    })
}

fn iterator_method_return(
    analyzer: &mut Analyzer,
    holding: &[ObjectId],
    name: &str,
) -> Option<ObjectId> {
    let element = element_of(analyzer, holding);
    Some(match name {
        "__next__" | "next" | "send" => element,
        "__iter__" => analyzer.container(ContainerKind::Iterator, vec![element]),
        "close" => analyzer.scalar(ScalarKind::NoneType),
        _ => return None,
    })
}

fn uniform_element(analyzer: &mut Analyzer, holding: &[ObjectId]) -> ObjectId {
    match holding.split_first() {
        Some((&first, rest)) if rest.iter().all(|&other| other == first) => first,
        _ => analyzer.unknown(),
    }
}

// ============================================================================
// Scalar Attributes
// ============================================================================

const STR_TO_STR: &[&str] = &[
    "capitalize", "casefold", "center", "expandtabs", "format", "join", "ljust", "lower", "lstrip",
    "replace", "rjust", "rstrip", "strip", "swapcase", "title", "translate", "upper", "zfill",
    "__getitem__", "__getslice__",
];

const STR_TO_INT: &[&str] = &["count", "find", "index", "rfind", "rindex"];

const STR_TO_BOOL: &[&str] = &[
    "startswith", "endswith", "isalnum", "isalpha", "isdigit", "isidentifier", "islower",
    "isnumeric", "isspace", "istitle", "isupper",
];

/// The attribute of a scalar object. Only the string surface is modeled in
/// any depth; other scalars expose nothing.
pub fn scalar_attribute(analyzer: &mut Analyzer, kind: ScalarKind, name: &str) -> Option<ObjectId> {
    let returns = match kind {
        ScalarKind::Str => {
            if STR_TO_STR.contains(&name) {
                analyzer.scalar(ScalarKind::Str)
            } else if STR_TO_INT.contains(&name) {
                analyzer.scalar(ScalarKind::Int)
            } else if STR_TO_BOOL.contains(&name) {
                analyzer.scalar(ScalarKind::Bool)
            } else {
                match name {
                    "split" | "rsplit" | "splitlines" => {
                        let s = analyzer.scalar(ScalarKind::Str);
                        analyzer.container(ContainerKind::List, vec![s])
                    }
                    "partition" | "rpartition" => {
                        let s = analyzer.scalar(ScalarKind::Str);
                        analyzer.container(ContainerKind::Tuple, vec![s, s, s])
                    }
                    "encode" => analyzer.scalar(ScalarKind::Bytes),
                    "__iter__" => {
                        let s = analyzer.scalar(ScalarKind::Str);
                        analyzer.container(ContainerKind::Iterator, vec![s])
                    }
                    _ => return None,
                }
            }
        }
        ScalarKind::Bytes => match name {
            "decode" => analyzer.scalar(ScalarKind::Str),
            _ => return None,
        },
        _ => return None,
    };
    Some(analyzer.builtin_method(returns))
}

// ============================================================================
// Protocol Helpers
// ============================================================================

impl Analyzer {
    /// The object produced by iterating over `object` (`for x in object`).
    pub(crate) fn iterated_element(&mut self, object: ObjectId) -> ObjectId {
        match &self.objects[object] {
            PyObject::Container { kind, holding } => match kind {
                ContainerKind::List
                | ContainerKind::Set
                | ContainerKind::Iterator
                | ContainerKind::Generator => {
                    let holding = holding.clone();
                    element_of(self, &holding)
                }
                ContainerKind::Dict => {
                    let key = holding.first().copied();
                    key.unwrap_or_else(|| self.unknown())
                }
                ContainerKind::Tuple => {
                    let holding = holding.clone();
                    uniform_element(self, &holding)
                }
            },
            PyObject::Scalar(ScalarKind::Str) => self.scalar(ScalarKind::Str),
            PyObject::Instance { .. } => {
                let iterator = self.protocol_return(object, "__iter__");
                if iterator.is_unknown() {
                    return iterator;
                }
                self.iterated_element(iterator)
            }
            _ => self.unknown(),
        }
    }

    /// The object bound by `with object as name`.
    pub(crate) fn entered_object(&mut self, object: ObjectId) -> ObjectId {
        match &self.objects[object] {
            PyObject::Instance { .. } => self.protocol_return(object, "__enter__"),
            _ => self.unknown(),
        }
    }

    /// Subscript semantics: `object[index]` with an optional constant index.
    /// Tuples honor the position; everything else yields its element type.
    pub(crate) fn subscript_element(&mut self, object: ObjectId, index: Option<usize>) -> ObjectId {
        match &self.objects[object] {
            PyObject::Container { kind, holding } => match kind {
                ContainerKind::Tuple => match index {
                    Some(i) => holding.get(i).copied().unwrap_or_else(|| self.unknown()),
                    None => {
                        let holding = holding.clone();
                        uniform_element(self, &holding)
                    }
                },
                ContainerKind::Dict => {
                    let value = holding.get(1).copied();
                    value.unwrap_or_else(|| self.unknown())
                }
                _ => {
                    let holding = holding.clone();
                    element_of(self, &holding)
                }
            },
            PyObject::Scalar(ScalarKind::Str) => self.scalar(ScalarKind::Str),
            PyObject::Instance { .. } => self.protocol_return(object, "__getitem__"),
            _ => self.unknown(),
        }
    }

    /// Slice semantics: `object[a:b]` keeps the container type.
    pub(crate) fn sliced_object(&mut self, object: ObjectId) -> ObjectId {
        match &self.objects[object] {
            PyObject::Container { kind, holding } => match kind {
                ContainerKind::List | ContainerKind::Tuple => {
                    let (kind, holding) = (*kind, holding.clone());
                    self.container(kind, holding)
                }
                _ => self.unknown(),
            },
            PyObject::Scalar(ScalarKind::Str) => self.scalar(ScalarKind::Str),
            PyObject::Instance { .. } => self.protocol_return(object, "__getitem__"),
            _ => self.unknown(),
        }
    }

    /// Resolve a dunder on `object` and return what calling it would yield.
    fn protocol_return(&mut self, object: ObjectId, name: &str) -> ObjectId {
        let Ok(found) = self.get_attribute(object, name) else {
            return self.unknown();
        };
        let method = self.object_of(found);
        match &self.objects[method] {
            PyObject::Function(_) => self.returned_object(method),
            PyObject::BuiltinMethod { returns } => *returns,
            _ => self.unknown(),
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

    fn str_list(analyzer: &mut Analyzer) -> (ObjectId, ObjectId) {
        let element = analyzer.scalar(ScalarKind::Str);
        let list = analyzer.container(ContainerKind::List, vec![element]);
        (list, element)
    }

    mod containers {
        use super::*;

        #[test]
        fn list_pop_returns_the_element() {
            let (mut analyzer, _) = analyzer_with("");
            let (list, element) = str_list(&mut analyzer);
            let pop = analyzer.get_attribute(list, "pop").unwrap();
            let method = analyzer.object_of(pop);
            assert!(matches!(
                analyzer.objects[method],
                PyObject::BuiltinMethod { returns } if returns == element
            ));
        }

        #[test]
        fn dict_items_is_a_list_of_pairs() {
            let (mut analyzer, _) = analyzer_with("");
            let key = analyzer.scalar(ScalarKind::Str);
            let value = analyzer.scalar(ScalarKind::Int);
            let dict = analyzer.container(ContainerKind::Dict, vec![key, value]);
            let items = analyzer.get_attribute(dict, "items").unwrap();
            let method = analyzer.object_of(items);
            let PyObject::BuiltinMethod { returns } = analyzer.objects[method] else {
                panic!("expected a builtin method");
            };
            let pair = analyzer.container(ContainerKind::Tuple, vec![key, value]);
            let expected = analyzer.container(ContainerKind::List, vec![pair]);
            assert_eq!(returns, expected);
        }

        #[test]
        fn iteration_round_trips_the_element() {
            let (mut analyzer, _) = analyzer_with("");
            let (list, element) = str_list(&mut analyzer);
            assert_eq!(analyzer.iterated_element(list), element);
        }

        #[test]
        fn slicing_keeps_the_container() {
            let (mut analyzer, _) = analyzer_with("");
            let (list, _) = str_list(&mut analyzer);
            assert_eq!(analyzer.sliced_object(list), list);
        }

        #[test]
        fn tuple_subscript_honors_position() {
            let (mut analyzer, _) = analyzer_with("");
            let first = analyzer.scalar(ScalarKind::Int);
            let second = analyzer.scalar(ScalarKind::Str);
            let tuple = analyzer.container(ContainerKind::Tuple, vec![first, second]);
            assert_eq!(analyzer.subscript_element(tuple, Some(1)), second);
            assert!(analyzer.subscript_element(tuple, None).is_unknown());
        }
    }

    mod scalars {
        use super::*;

        #[test]
        fn str_methods_return_strings() {
            let (mut analyzer, _) = analyzer_with("");
            let text = analyzer.scalar(ScalarKind::Str);
            let strip = analyzer.get_attribute(text, "strip").unwrap();
            let method = analyzer.object_of(strip);
            let expected = analyzer.scalar(ScalarKind::Str);
            assert!(matches!(
                analyzer.objects[method],
                PyObject::BuiltinMethod { returns } if returns == expected
            ));
        }

        #[test]
        fn unmodeled_attributes_are_absent() {
            let (mut analyzer, _) = analyzer_with("");
            let number = analyzer.scalar(ScalarKind::Int);
            assert!(analyzer.get_attribute(number, "bit_length").is_err());
        }
    }

    mod protocols {
        use super::*;

        #[test]
        fn custom_iterator_chains_through_dunders() {
            let source = "\
class Numbers:
    def __iter__(self):
        return self

    def __next__(self):
        return 1

nums = Numbers()
";
            let (mut analyzer, module) = analyzer_with(source);
            let nums = analyzer.global_object(module, "nums").unwrap();
            let element = analyzer.iterated_element(nums);
            let expected = analyzer.scalar(ScalarKind::Int);
            assert_eq!(element, expected);
        }
    }
}
