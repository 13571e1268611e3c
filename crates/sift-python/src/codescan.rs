//! Character-level scanning around an offset.
//!
//! The resolution facade works from a byte offset in raw source text, so it
//! needs answers the syntax tree does not give directly: what word the
//! offset touches, whether that position is inside a string or comment, and
//! the textual extent of the dotted/called/subscripted primary ending at the
//! word. These scanners are deliberately tolerant; they only ever narrow
//! what the evaluator is asked to parse.

use sift_core::text::{is_identifier_char, is_identifier_start, Span};

// ============================================================================
// Words
// ============================================================================

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

pub fn is_python_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// The identifier at (or immediately before the end of) `offset`, rejecting
/// keywords, number literals, and positions inside strings or comments.
pub fn word_at(source: &str, offset: usize) -> Option<Span> {
    if offset > source.len() {
        return None;
    }
    let bytes = source.as_bytes();
    let mut start = offset;
    while start > 0 && is_identifier_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = offset;
    while end < bytes.len() && is_identifier_byte(bytes[end]) {
        end += 1;
    }
    if start == end {
        return None;
    }
    let word = &source[start..end];
    let mut chars = word.chars();
    if !chars.next().is_some_and(is_identifier_start) {
        return None;
    }
    if !word.chars().all(is_identifier_char) || is_python_keyword(word) {
        return None;
    }
    if in_string_or_comment(source, start) {
        return None;
    }
    Some(Span::new(start, end))
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte >= 0x80
}

// ============================================================================
// String and Comment Detection
// ============================================================================

/// Whether `offset` falls inside a string literal or a comment. Scans from
/// the start of the source so triple-quoted strings are handled.
pub fn in_string_or_comment(source: &str, offset: usize) -> bool {
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() && i < offset {
        match bytes[i] {
            b'#' => {
                let line_end = line_end_from(bytes, i);
                if offset <= line_end {
                    return true;
                }
                i = line_end;
            }
            b'\'' | b'"' => {
                let quote = bytes[i];
                let (body_start, closer_len) = if bytes[i..].starts_with(&[quote, quote, quote]) {
                    (i + 3, 3)
                } else {
                    (i + 1, 1)
                };
                let end = string_end(bytes, body_start, quote, closer_len);
                if offset < end {
                    return true;
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    false
}

fn line_end_from(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|at| from + at)
        .unwrap_or(bytes.len())
}

fn string_end(bytes: &[u8], from: usize, quote: u8, closer_len: usize) -> usize {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if closer_len == 1 => return i + 1,
            b if b == quote => {
                if closer_len == 1 {
                    return i + 1;
                }
                if bytes[i..].starts_with(&[quote, quote, quote]) {
                    return i + 3;
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

// ============================================================================
// Primaries
// ============================================================================

/// The textual extent of the primary expression ending at `word`: the chain
/// of attribute accesses, calls, and subscripts whose last segment is the
/// word. `a.b(x).c` with the word at `c` yields the whole chain.
pub fn primary_range(source: &str, word: Span) -> Span {
    let bytes = source.as_bytes();
    let mut start = word.start;
    'chain: loop {
        let mut cursor = start;
        while cursor > 0 && matches!(bytes[cursor - 1], b' ' | b'\t') {
            cursor -= 1;
        }
        if cursor == 0 || bytes[cursor - 1] != b'.' {
            break;
        }
        cursor -= 1;
        loop {
            while cursor > 0 && matches!(bytes[cursor - 1], b' ' | b'\t' | b'\r' | b'\n' | b'\\') {
                cursor -= 1;
            }
            let Some(&before) = cursor.checked_sub(1).and_then(|i| bytes.get(i)) else {
                break 'chain;
            };
            match before {
                b')' => match balance_backward(bytes, cursor - 1, b'(', b')') {
                    Some(open) => {
                        cursor = open;
                        start = cursor;
                    }
                    None => break 'chain,
                },
                b']' => match balance_backward(bytes, cursor - 1, b'[', b']') {
                    Some(open) => {
                        cursor = open;
                        start = cursor;
                    }
                    None => break 'chain,
                },
                b'\'' | b'"' => {
                    match string_start_backward(bytes, cursor - 1) {
                        Some(open) => {
                            start = open;
                            continue 'chain;
                        }
                        None => break 'chain,
                    }
                }
                b if is_identifier_byte(b) => {
                    while cursor > 0 && is_identifier_byte(bytes[cursor - 1]) {
                        cursor -= 1;
                    }
                    start = cursor;
                    continue 'chain;
                }
                _ => break 'chain,
            }
        }
    }
    Span::new(start, word.end)
}

/// Walk backward from a closing bracket to its opener, skipping nested
/// groups and single-line strings.
fn balance_backward(bytes: &[u8], close: usize, open: u8, shut: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = close;
    loop {
        let b = bytes[i];
        if b == shut {
            depth += 1;
        } else if b == open {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        } else if b == b'\'' || b == b'"' {
            i = string_start_backward(bytes, i)?;
            if i == 0 {
                return None;
            }
            i -= 1;
            continue;
        }
        if i == 0 {
            return None;
        }
        i -= 1;
    }
}

/// The opening quote position of the string literal whose closing quote is
/// at `close`. Only single-line and triple-quoted forms are recognized.
fn string_start_backward(bytes: &[u8], close: usize) -> Option<usize> {
    let quote = bytes[close];
    let triple = close >= 2 && bytes[close - 1] == quote && bytes[close - 2] == quote;
    if triple {
        let mut i = close.checked_sub(3)?;
        loop {
            if bytes[i] == quote && i + 2 < close && bytes[i + 1] == quote && bytes[i + 2] == quote
            {
                return Some(i);
            }
            i = i.checked_sub(1)?;
        }
    }
    let mut i = close.checked_sub(1)?;
    loop {
        if bytes[i] == quote && (i == 0 || bytes[i - 1] != b'\\') {
            return Some(i);
        }
        if bytes[i] == b'\n' {
            return None;
        }
        i = i.checked_sub(1)?;
    }
}

// ============================================================================
// Call Context
// ============================================================================

/// Whether the word is the name side of a keyword argument (`f(name=...)`),
/// which names a parameter rather than a scope-level name.
pub fn is_keyword_argument(source: &str, word: Span) -> bool {
    let bytes = source.as_bytes();
    let mut after = word.end;
    while after < bytes.len() && matches!(bytes[after], b' ' | b'\t') {
        after += 1;
    }
    if after >= bytes.len() || bytes[after] != b'=' {
        return false;
    }
    if bytes.get(after + 1) == Some(&b'=') {
        return false;
    }
    let mut before = word.start;
    while before > 0 && matches!(bytes[before - 1], b' ' | b'\t' | b'\r' | b'\n' | b'\\') {
        before -= 1;
    }
    before > 0 && matches!(bytes[before - 1], b'(' | b',')
}

/// The called primary a keyword argument belongs to: the word before the
/// unbalanced `(` enclosing `word`.
pub fn keyword_call_primary(source: &str, word: Span) -> Option<Span> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = word.start;
    loop {
        i = i.checked_sub(1)?;
        match bytes[i] {
            b')' | b']' => depth += 1,
            b'[' if depth > 0 => depth -= 1,
            b'(' => {
                if depth > 0 {
                    depth -= 1;
                    continue;
                }
                let mut end = i;
                while end > 0 && matches!(bytes[end - 1], b' ' | b'\t') {
                    end -= 1;
                }
                if end == 0 || !is_identifier_byte(bytes[end - 1]) {
                    return None;
                }
                let callee = word_at(source, end - 1)?;
                return Some(primary_range(source, callee));
            }
            b'\'' | b'"' => {
                i = string_start_backward(bytes, i)?;
            }
            _ => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod words {
        use super::*;

        #[test]
        fn finds_the_word_around_an_offset() {
            let source = "result = compute()\n";
            let offset = source.find("compute").unwrap() + 3;
            let word = word_at(source, offset).unwrap();
            assert_eq!(&source[word.start..word.end], "compute");
        }

        #[test]
        fn rejects_keywords_and_numbers() {
            let source = "def f():\n    return 123\n";
            assert!(word_at(source, 1).is_none());
            let number = source.find("123").unwrap();
            assert!(word_at(source, number + 1).is_none());
        }

        #[test]
        fn rejects_words_inside_strings_and_comments() {
            let source = "x = 'hello there'  # hello again\n";
            let in_string = source.find("there").unwrap();
            let in_comment = source.find("again").unwrap();
            assert!(word_at(source, in_string).is_none());
            assert!(word_at(source, in_comment).is_none());
        }

        #[test]
        fn triple_quoted_strings_span_lines() {
            let source = "doc = '''\nfirst line\n'''\nfirst = 1\n";
            let inside = source.find("first line").unwrap();
            let outside = source.rfind("first").unwrap();
            assert!(word_at(source, inside).is_none());
            assert!(word_at(source, outside).is_some());
        }
    }

    mod primaries {
        use super::*;

        #[test]
        fn dotted_chains_extend_to_the_left() {
            let source = "value = config.section.entry\n";
            let offset = source.find("entry").unwrap();
            let word = word_at(source, offset).unwrap();
            let primary = primary_range(source, word);
            assert_eq!(&source[primary.start..primary.end], "config.section.entry");
        }

        #[test]
        fn calls_and_subscripts_stay_in_the_chain() {
            let source = "name = table[key].fetch(1).strip\n";
            let offset = source.find("strip").unwrap();
            let word = word_at(source, offset).unwrap();
            let primary = primary_range(source, word);
            assert_eq!(
                &source[primary.start..primary.end],
                "table[key].fetch(1).strip"
            );
        }

        #[test]
        fn string_receivers_are_included() {
            let source = "parts = 'a b'.split()\n";
            let offset = source.find("split").unwrap();
            let word = word_at(source, offset).unwrap();
            let primary = primary_range(source, word);
            assert_eq!(&source[primary.start..primary.end], "'a b'.split");
        }

        #[test]
        fn plain_words_are_their_own_primary() {
            let source = "plain = other\n";
            let offset = source.find("other").unwrap();
            let word = word_at(source, offset).unwrap();
            let primary = primary_range(source, word);
            assert_eq!(primary, word);
        }
    }

    mod keyword_arguments {
        use super::*;

        #[test]
        fn detects_keyword_argument_names() {
            let source = "draw(color='red', width=2)\n";
            let color = word_at(source, source.find("color").unwrap()).unwrap();
            let width = word_at(source, source.find("width").unwrap()).unwrap();
            let red = source.find("red").unwrap();
            assert!(is_keyword_argument(source, color));
            assert!(is_keyword_argument(source, width));
            assert!(word_at(source, red).is_none());
        }

        #[test]
        fn comparison_is_not_a_keyword_argument() {
            let source = "check(a == b)\n";
            let a = word_at(source, source.find('a').unwrap()).unwrap();
            assert!(!is_keyword_argument(source, a));
        }

        #[test]
        fn finds_the_called_primary() {
            let source = "shapes.draw(color='red')\n";
            let color = word_at(source, source.find("color").unwrap()).unwrap();
            let callee = keyword_call_primary(source, color).unwrap();
            assert_eq!(&source[callee.start..callee.end], "shapes.draw");
        }
    }
}
