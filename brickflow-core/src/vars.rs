//! Context variable paths and identifier helpers.
//!
//! Variable references are dotted paths (`@foo.bar`, `array.0`) with an
//! optional bracket form (`a["b.c"]`, `arr[0]`) and an optional-chaining
//! suffix `?` on any segment that tolerates missing intermediates.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// Strip the optional-chaining suffix from a path segment: `foo?` -> `foo`.
pub fn strip_optional_chaining(segment: &str) -> &str {
    segment.trim_end_matches('?')
}

/// Split a path into lookup segments.
///
/// Dots separate segments outside brackets; `[0]` and `["quoted.key"]`
/// produce one segment each.
pub fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
                let quote = match chars.peek() {
                    Some(&q @ ('"' | '\'')) => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut segment = String::new();
                for inner in chars.by_ref() {
                    match quote {
                        Some(q) if inner == q => continue,
                        _ if inner == ']' => break,
                        _ => segment.push(inner),
                    }
                }
                parts.push(segment);
            }
            _ => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Resolve a path against a context value. Missing paths are `None`, never an
/// error; the empty path is also `None`.
pub fn get_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let parts = split_path(path);
    if parts.is_empty() {
        return None;
    }

    let mut current = context;
    for part in &parts {
        let key = strip_optional_chaining(part);
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether `text` is shaped like a bare context path (implicit mode tries
/// these as lookups before falling back to the template engine).
pub fn is_simple_path(text: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let re = REGEX.get_or_init(|| {
        Regex::new(r"^[\w$@]+(\.[\w$?]+)*$").expect("simple path pattern is valid")
    });
    re.is_match(text)
}

/// Options for [`fresh_identifier`] numbering.
#[derive(Debug, Clone, Copy)]
pub struct FreshIdentifierOptions {
    /// Emit `root1` instead of `root` for the first identifier.
    pub include_first_number: bool,
    pub start_number: u32,
}

impl Default for FreshIdentifierOptions {
    fn default() -> Self {
        Self {
            include_first_number: false,
            start_number: 1,
        }
    }
}

/// Return a fresh variable name based on `root` and the identifiers already
/// in use: `foo`, then `foo2`, `foo3`, ...
pub fn fresh_identifier(
    root: &str,
    identifiers: &[String],
    options: FreshIdentifierOptions,
) -> String {
    let numbered = Regex::new(&format!(r"^{}(?<number>\d+)$", regex::escape(root)))
        .expect("escaped identifier pattern is valid");

    let mut max_used: Option<u32> = None;
    for identifier in identifiers {
        let number = if identifier == root {
            Some(options.start_number)
        } else {
            numbered
                .captures(identifier)
                .and_then(|c| c.name("number"))
                .and_then(|m| m.as_str().parse().ok())
        };
        if let Some(number) = number {
            max_used = Some(max_used.map_or(number, |m| m.max(number)));
        }
    }

    let floor = options.start_number.saturating_sub(1);
    let next = max_used.map_or(floor, |m| m.max(floor)) + 1;

    if next == options.start_number && !options.include_first_number {
        root.to_string()
    } else {
        format!("{root}{next}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_dotted_paths() {
        let context = json!({ "@foo": { "bar": 42 }, "array": ["bar"] });
        assert_eq!(get_path(&context, "@foo.bar"), Some(&json!(42)));
        assert_eq!(get_path(&context, "array.0"), Some(&json!("bar")));
        assert_eq!(get_path(&context, "array.1"), None);
        assert_eq!(get_path(&context, "missing.deep"), None);
    }

    #[test]
    fn empty_path_is_undefined() {
        assert_eq!(get_path(&json!({ "a": 1 }), ""), None);
    }

    #[test]
    fn optional_chaining_suffix_is_stripped() {
        let context = json!({ "a": { "b": 1 } });
        assert_eq!(get_path(&context, "a?.b"), Some(&json!(1)));
        assert_eq!(get_path(&context, "a.c?"), None);
    }

    #[test]
    fn bracket_segments() {
        let context = json!({ "a": { "b.c": 1 }, "arr": [10, 20] });
        assert_eq!(get_path(&context, r#"a["b.c"]"#), Some(&json!(1)));
        assert_eq!(get_path(&context, "arr[1]"), Some(&json!(20)));
    }

    #[test]
    fn path_through_scalar_is_undefined() {
        let context = json!({ "a": 1 });
        assert_eq!(get_path(&context, "a.b"), None);
    }

    #[test]
    fn simple_path_shapes() {
        assert!(is_simple_path("array.0"));
        assert!(is_simple_path("@input.title"));
        assert!(is_simple_path("a.b?.c"));
        assert!(!is_simple_path("{{ array.0 }}"));
        assert!(!is_simple_path("two words"));
        assert!(!is_simple_path(""));
    }

    #[test]
    fn fresh_identifier_numbering() {
        let opts = FreshIdentifierOptions::default();
        assert_eq!(fresh_identifier("foo", &[], opts), "foo");
        assert_eq!(fresh_identifier("foo", &["foo".into()], opts), "foo2");
        assert_eq!(
            fresh_identifier("foo", &["foo".into(), "foo2".into()], opts),
            "foo3"
        );
        // Unrelated identifiers are ignored
        assert_eq!(fresh_identifier("foo", &["bar".into()], opts), "foo");
    }

    #[test]
    fn fresh_identifier_first_number() {
        let opts = FreshIdentifierOptions {
            include_first_number: true,
            start_number: 1,
        };
        assert_eq!(fresh_identifier("foo", &[], opts), "foo1");
    }
}
