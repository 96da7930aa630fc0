//! Regex extraction brick.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};

use brickflow_core::{expression_tag, ExpressionTag, RegistryId, VALUE_FIELD};

use crate::brick::{Brick, BrickContext, BrickKind, BrickOutput};
use crate::error::{PipelineError, PipelineResult};

/// Finds named-group declarations in a pattern without compiling it, so the
/// output schema can be derived even when the pattern is still a template.
fn group_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\(\?P?<([A-Za-z_][A-Za-z0-9_]*)>").expect("group name pattern is valid")
    })
}

fn group_names(pattern: &str) -> Vec<String> {
    group_name_regex()
        .captures_iter(pattern)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

/// The pattern as literal text: a bare string, or a template expression's
/// source. `None` for anything whose text cannot be known statically.
fn pattern_literal(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Value::String(pattern) = value {
        return Some(pattern.clone());
    }
    let tag = expression_tag(value)?;
    if !tag.is_template() {
        return None;
    }
    value.get(VALUE_FIELD)?.as_str().map(str::to_string)
}

/// Match one input against the pattern.
///
/// Named groups produce `{group: text}` with `null` for optional groups that
/// did not participate; a pattern without named groups produces
/// `{match: text}`; no match at all produces `{}`.
fn extract(regex: &Regex, text: &str) -> Value {
    let names: Vec<&str> = regex.capture_names().flatten().collect();

    let Some(captures) = regex.captures(text) else {
        return Value::Object(Map::new());
    };

    let mut out = Map::new();
    if names.is_empty() {
        let matched = captures
            .get(0)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        out.insert("match".to_string(), Value::String(matched));
        return Value::Object(out);
    }

    for name in names {
        let value = captures
            .name(name)
            .map(|m| Value::String(m.as_str().to_string()))
            .unwrap_or(Value::Null);
        out.insert(name.to_string(), value);
    }
    Value::Object(out)
}

/// Extract values from text with a regular expression.
pub struct RegexTransformer;

#[async_trait]
impl Brick for RegexTransformer {
    fn id(&self) -> RegistryId {
        RegistryId::of("regex")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_pure(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "regex": {
                    "type": "string",
                    "description": "Pattern; use named groups to shape the output",
                },
                "input": {
                    "oneOf": [
                        { "type": "string" },
                        { "type": "array", "items": { "type": "string" } },
                    ],
                },
                "ignoreCase": { "type": "boolean" },
            },
            "required": ["regex", "input"],
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "oneOf": [
                { "type": "object", "additionalProperties": { "type": ["string", "null"] } },
                {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": { "type": ["string", "null"] },
                    },
                },
            ],
        })
    }

    /// Refine the output schema from the configured pattern's named groups.
    /// A `var` pattern or `var` input keeps the static schema; an array
    /// input wraps the per-item schema.
    fn output_schema_for(&self, config: &Value) -> Value {
        let Some(pattern) = pattern_literal(config.get("regex")) else {
            return self.output_schema();
        };

        let names = group_names(&pattern);
        let mut properties = Map::new();
        if names.is_empty() {
            properties.insert("match".to_string(), json!({ "type": "string" }));
        } else {
            for name in names {
                properties.insert(name, json!({ "type": "string" }));
            }
        }
        let item = json!({ "type": "object", "properties": properties });

        match config.get("input") {
            Some(Value::Array(_)) => json!({ "type": "array", "items": item }),
            Some(value) if expression_tag(value) == Some(ExpressionTag::Var) => {
                self.output_schema()
            }
            _ => item,
        }
    }

    async fn run(&self, args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let pattern = args.get("regex").and_then(Value::as_str).unwrap_or_default();
        let ignore_case = args
            .get("ignoreCase")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let regex = RegexBuilder::new(pattern)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| PipelineError::business(format!("Invalid regular expression: {e}")))?;

        let output = match args.get("input") {
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .map(|item| extract(&regex, item.as_str().unwrap_or_default()))
                    .collect(),
            ),
            Some(Value::String(text)) => extract(&regex, text),
            _ => Value::Object(Map::new()),
        };
        Ok(BrickOutput::Value(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use pretty_assertions::assert_eq;

    #[test]
    fn group_names_from_literal_and_p_style_patterns() {
        assert_eq!(
            group_names(r"(?<first>\w+) (?<second>\w+)"),
            vec!["first", "second"]
        );
        assert_eq!(group_names(r"(?P<year>\d{4})"), vec!["year"]);
        assert!(group_names(r"(\d+)-(\d+)").is_empty());
    }

    #[test]
    fn pattern_literal_accepts_strings_and_templates() {
        assert_eq!(
            pattern_literal(Some(&json!(r"(?<foo>\d+)"))),
            Some(r"(?<foo>\d+)".to_string())
        );
        assert_eq!(
            pattern_literal(Some(&json!({
                "__type__": "nunjucks",
                "__value__": r"(?<foo>\d+)",
            }))),
            Some(r"(?<foo>\d+)".to_string())
        );
        assert_eq!(
            pattern_literal(Some(&json!({ "__type__": "var", "__value__": "@pattern" }))),
            None
        );
        assert_eq!(pattern_literal(None), None);
    }

    #[test]
    fn output_schema_follows_the_configured_pattern() {
        let brick = RegexTransformer;

        let schema = brick.output_schema_for(&json!({
            "regex": r"(?<date>\d{4}-\d{2}-\d{2})",
            "input": "text",
        }));
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": { "date": { "type": "string" } },
            })
        );

        let array_schema = brick.output_schema_for(&json!({
            "regex": r"(?<date>\d+)",
            "input": ["a", "b"],
        }));
        assert_eq!(
            array_schema,
            json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "date": { "type": "string" } },
                },
            })
        );

        let unnamed = brick.output_schema_for(&json!({ "regex": r"\d+", "input": "text" }));
        assert_eq!(
            unnamed,
            json!({
                "type": "object",
                "properties": { "match": { "type": "string" } },
            })
        );

        // A var pattern cannot be known statically.
        let fallback = brick.output_schema_for(&json!({
            "regex": { "__type__": "var", "__value__": "@pattern" },
            "input": "text",
        }));
        assert_eq!(fallback, brick.output_schema());
    }

    #[test]
    fn extract_binds_named_groups_with_null_for_absent_optionals() {
        let regex = Regex::new(r"(?<first>\w+)(?: (?<second>\w+))?").unwrap();

        assert_eq!(
            extract(&regex, "alpha beta"),
            json!({ "first": "alpha", "second": "beta" })
        );
        assert_eq!(
            extract(&regex, "alpha"),
            json!({ "first": "alpha", "second": null })
        );
    }

    #[test]
    fn extract_without_named_groups_binds_the_match() {
        let regex = Regex::new(r"\d+").unwrap();
        assert_eq!(extract(&regex, "order 1234"), json!({ "match": "1234" }));
        assert_eq!(extract(&regex, "no digits"), json!({}));
    }

    #[tokio::test]
    async fn array_input_yields_one_result_per_item() {
        let output = RegexTransformer
            .run(
                json!({ "regex": r"(?<name>ABC)", "input": ["ABC", "XYZ"] }),
                test_context(),
            )
            .await
            .unwrap();
        assert_eq!(output, BrickOutput::Value(json!([{ "name": "ABC" }, {}])));
    }

    #[tokio::test]
    async fn matching_is_case_sensitive_unless_ignore_case_is_set() {
        let sensitive = RegexTransformer
            .run(json!({ "regex": r"(?<name>abc)", "input": "ABC" }), test_context())
            .await
            .unwrap();
        assert_eq!(sensitive, BrickOutput::Value(json!({})));

        let insensitive = RegexTransformer
            .run(
                json!({ "regex": r"(?<name>abc)", "input": "ABC", "ignoreCase": true }),
                test_context(),
            )
            .await
            .unwrap();
        assert_eq!(insensitive, BrickOutput::Value(json!({ "name": "ABC" })));
    }

    #[tokio::test]
    async fn invalid_pattern_is_a_business_error() {
        let err = RegexTransformer
            .run(json!({ "regex": "(", "input": "text" }), test_context())
            .await
            .unwrap_err();
        assert!(err.is_business());
        assert!(err.to_string().starts_with("Invalid regular expression: "));
    }
}
