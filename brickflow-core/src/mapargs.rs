//! Argument mapping: recursive rendering of a brick's configuration.
//!
//! Walks a config value, rendering every contained expression against the
//! context. `pipeline` and `defer` expressions are stop points: they pass
//! through byte-for-byte and the consuming brick decides when (and against
//! which sub-context) to render their contents. The walk is deep and
//! side-effect free; neither the config nor the context is ever mutated.

use serde_json::{Map, Value};

use crate::error::{RenderError, RenderResult};
use crate::expression::{expression_tag, Expression, VALUE_FIELD};
use crate::policy::ApiVersionOptions;
use crate::render::{render_expression, render_template};
use crate::types::TemplateEngine;
use crate::vars::{get_path, is_simple_path};

/// Render `config` according to the policy: explicit expression rendering
/// under v3, implicit bare-string rendering under v1/v2. `engine` selects
/// the template engine for implicit strings (steps default to mustache).
pub fn map_args(
    config: &Value,
    context: &Value,
    options: &ApiVersionOptions,
    engine: TemplateEngine,
) -> RenderResult<Value> {
    if options.explicit_render {
        render_explicit(config, context, options)
    } else {
        render_implicit(config, context, options, engine)
    }
}

/// Explicit mode: only tagged expressions render; bare strings are literals.
///
/// Object properties whose rendered value is nullish are omitted from the
/// output (a `var` that does not resolve, or a literal `null`), while empty
/// template results (`""`) are kept.
pub fn render_explicit(
    config: &Value,
    context: &Value,
    options: &ApiVersionOptions,
) -> RenderResult<Value> {
    Ok(render_explicit_value(config, context, options)?.unwrap_or(Value::Null))
}

fn render_explicit_value(
    value: &Value,
    context: &Value,
    options: &ApiVersionOptions,
) -> RenderResult<Option<Value>> {
    if let Some(rendered) = render_tagged(value, context, options)? {
        return Ok(rendered);
    }

    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, entry) in map {
                match render_explicit_value(entry, context, options)? {
                    Some(rendered) if !rendered.is_null() => {
                        out.insert(key.clone(), rendered);
                    }
                    // Nullish entries are excluded from rendered objects
                    _ => {}
                }
            }
            Ok(Some(Value::Object(out)))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                // Arrays keep their length; undefined elements become null
                out.push(render_explicit_value(item, context, options)?.unwrap_or(Value::Null));
            }
            Ok(Some(Value::Array(out)))
        }
        Value::Null => Ok(None),
        other => Ok(Some(other.clone())),
    }
}

/// Implicit mode (v1/v2): a bare string that is shaped like a context path
/// and resolves is replaced by the resolved value; otherwise the string runs
/// through the template engine, which leaves plain text unchanged.
pub fn render_implicit(
    config: &Value,
    context: &Value,
    options: &ApiVersionOptions,
    engine: TemplateEngine,
) -> RenderResult<Value> {
    if let Some(rendered) = render_tagged(config, context, options)? {
        return Ok(rendered.unwrap_or(Value::Null));
    }

    match config {
        Value::String(text) => {
            if is_simple_path(text) {
                if let Some(found) = get_path(context, text) {
                    return Ok(found.clone());
                }
            }
            render_template(engine, text, context, options.autoescape).map(Value::String)
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, entry) in map {
                out.insert(
                    key.clone(),
                    render_implicit(entry, context, options, engine)?,
                );
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render_implicit(item, context, options, engine)?);
            }
            Ok(Value::Array(out))
        }
        other => Ok(other.clone()),
    }
}

/// Handle an expression-shaped value: stop points pass through unchanged,
/// other tags render. Returns `None` when `value` is not expression-shaped.
fn render_tagged(
    value: &Value,
    context: &Value,
    options: &ApiVersionOptions,
) -> RenderResult<Option<Option<Value>>> {
    let Some(tag) = expression_tag(value) else {
        return Ok(None);
    };

    if tag.is_stop_point() {
        return Ok(Some(Some(value.clone())));
    }

    let raw = value.get(VALUE_FIELD).cloned().unwrap_or(Value::Null);
    let expression =
        Expression::from_tagged(tag, raw).map_err(|message| RenderError::MalformedExpression {
            tag: tag.as_str().to_string(),
            message,
        })?;
    render_expression(&expression, context, options).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ApiVersion, ApiVersionOptions};
    use crate::types::{BrickInvocation, RegistryId};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn v3() -> ApiVersionOptions {
        ApiVersionOptions::for_version(ApiVersion::V3)
    }

    fn expr(expression: &Expression) -> Value {
        serde_json::to_value(expression).unwrap()
    }

    #[test]
    fn renders_var_path() {
        let rendered = render_explicit(
            &json!({ "foo": expr(&Expression::var("array.0")) }),
            &json!({ "array": ["bar"] }),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "bar" }));
    }

    #[test]
    fn renders_mustache_template() {
        let rendered = render_explicit(
            &json!({ "foo": expr(&Expression::mustache("{{ obj.prop }}!")) }),
            &json!({ "obj": { "prop": "bar" } }),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "bar!" }));
    }

    #[test]
    fn empty_templates_render_to_empty_string() {
        for tag in ["mustache", "nunjucks", "handlebars"] {
            let rendered = render_explicit(
                &json!({ "foo": { "__type__": tag } }),
                &json!({}),
                &v3(),
            )
            .unwrap();
            assert_eq!(rendered, json!({ "foo": "" }), "tag: {tag}");
        }
    }

    #[test]
    fn empty_var_is_dropped() {
        let rendered = render_explicit(
            &json!({ "foo": { "__type__": "var" } }),
            &json!({}),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, json!({}));
    }

    #[test]
    fn null_literal_is_excluded() {
        let rendered = render_explicit(&json!({ "foo": null }), &json!({}), &v3()).unwrap();
        assert_eq!(rendered, json!({}));
    }

    #[test]
    fn unresolved_var_is_excluded() {
        let rendered = render_explicit(
            &json!({ "foo": expr(&Expression::var("missing")) }),
            &json!({}),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, json!({}));
    }

    #[test]
    fn bare_strings_are_literals_in_explicit_mode() {
        let rendered = render_explicit(
            &json!({ "foo": "array.0" }),
            &json!({ "array": ["bar"] }),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "array.0" }));
    }

    #[test]
    fn implicit_prefers_path_to_renderer() {
        let rendered = render_implicit(
            &json!({ "foo": "array.0" }),
            &json!({ "array": ["bar"] }),
            &ApiVersionOptions::for_version(ApiVersion::V1),
            TemplateEngine::Mustache,
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "bar" }));
    }

    #[test]
    fn implicit_falls_back_to_raw_string() {
        let rendered = render_implicit(
            &json!({ "foo": "array.0" }),
            &json!({ "otherVar": ["bar"] }),
            &ApiVersionOptions::for_version(ApiVersion::V1),
            TemplateEngine::Mustache,
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "array.0" }));
    }

    #[test]
    fn implicit_renders_template_strings() {
        let rendered = render_implicit(
            &json!({ "foo": "{{ obj.prop }}" }),
            &json!({ "obj": { "prop": 42 } }),
            &ApiVersionOptions {
                autoescape: false,
                ..ApiVersionOptions::for_version(ApiVersion::V2)
            },
            TemplateEngine::Handlebars,
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "42" }));
    }

    // Handlebars reserves @ for data variables; an @-prefixed context key is
    // unreachable and renders as empty.
    #[test]
    fn implicit_handlebars_cannot_render_at_prefixed_variable() {
        let rendered = render_implicit(
            &json!({ "foo": "{{ obj.prop }}" }),
            &json!({ "@obj": { "prop": 42 } }),
            &ApiVersionOptions {
                autoescape: false,
                ..ApiVersionOptions::for_version(ApiVersion::V2)
            },
            TemplateEngine::Handlebars,
        )
        .unwrap();
        assert_eq!(rendered, json!({ "foo": "" }));
    }

    #[test]
    fn deep_clones_plain_objects_and_arrays() {
        let config = json!({
            "filter": {
                "operator": "and",
                "operands": [{
                    "operator": "or",
                    "operands": [{
                        "operator": "substring",
                        "field": "process",
                        "value": "Email Proof of Funds",
                    }],
                }],
            },
            "sort": { "field": "id", "direction": "desc" },
            "page": { "offset": 0, "length": 80 },
        });

        let rendered = render_explicit(&config, &json!({}), &v3()).unwrap();
        assert_eq!(rendered, config);
    }

    #[test]
    fn deep_clones_complex_var() {
        let payload = json!({ "sort": { "field": "id" }, "page": { "offset": 0 } });
        let rendered = render_explicit(
            &expr(&Expression::var("@payload")),
            &json!({ "@payload": payload }),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, payload);
    }

    #[test]
    fn defer_is_a_stop_point() {
        let inner = json!({ "foo": expr(&Expression::var("foo")) });
        let config = json!({
            "foo": expr(&Expression::defer(inner.clone())),
            "bar": inner.clone(),
        });

        let rendered = render_explicit(&config, &json!({ "foo": 42 }), &v3()).unwrap();
        assert_eq!(
            rendered,
            json!({
                "foo": expr(&Expression::defer(inner)),
                "bar": { "foo": 42 },
            })
        );
    }

    #[test]
    fn pipeline_is_a_stop_point() {
        let inner = json!({ "foo": expr(&Expression::var("foo")) });
        let pipeline = Expression::pipeline(vec![BrickInvocation {
            config: inner.as_object().unwrap().clone(),
            ..BrickInvocation::new(RegistryId::new("contrib/confetti").unwrap())
        }]);
        let config = json!({
            "foo": expr(&pipeline),
            "bar": inner,
        });

        let rendered = render_explicit(&config, &json!({ "foo": 42 }), &v3()).unwrap();
        assert_eq!(rendered["foo"], expr(&pipeline));
        assert_eq!(rendered["bar"], json!({ "foo": 42 }));
    }

    #[test]
    fn autoescape_applies_to_each_engine() {
        for tag in ["mustache", "nunjucks", "handlebars"] {
            let config = json!({ "foo": { "__type__": tag, "__value__": "{{ special }}" } });
            let context = json!({ "special": "a & b" });

            let escaped = render_explicit(
                &config,
                &context,
                &ApiVersionOptions { autoescape: true, ..v3() },
            )
            .unwrap();
            assert_eq!(escaped, json!({ "foo": "a &amp; b" }), "tag: {tag}");

            let raw = render_explicit(
                &config,
                &context,
                &ApiVersionOptions { autoescape: false, ..v3() },
            )
            .unwrap();
            assert_eq!(raw, json!({ "foo": "a & b" }), "tag: {tag}");
        }
    }

    #[test]
    fn rendering_is_idempotent_and_non_mutating() {
        let config = json!({ "foo": expr(&Expression::var("array.0")), "bar": [1, 2] });
        let context = json!({ "array": ["bar"] });
        let config_before = config.clone();
        let context_before = context.clone();

        let first = render_explicit(&config, &context, &v3()).unwrap();
        let second = render_explicit(&config, &context, &v3()).unwrap();

        assert_eq!(first, second);
        assert_eq!(config, config_before);
        assert_eq!(context, context_before);
    }
}
