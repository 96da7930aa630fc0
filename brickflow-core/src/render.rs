//! Expression and template rendering.
//!
//! Dispatches a single expression against a context value. Template syntax is
//! the engine's own business: this module only selects the engine, supplies
//! the data scope, and applies the autoescape policy. `pipeline` and `defer`
//! expressions are stop points and pass through unrendered.

use handlebars::Handlebars;
use minijinja::AutoEscape;
use serde_json::Value;
use tracing::trace;

use crate::error::{RenderError, RenderResult};
use crate::expression::Expression;
use crate::policy::ApiVersionOptions;
use crate::types::TemplateEngine;
use crate::vars::get_path;

/// Render template `source` against `context` with the named engine.
///
/// Engines tolerate missing interpolation sources: an absent variable renders
/// as the empty string rather than failing. Note that handlebars reserves `@`
/// for its own data variables, so `@`-prefixed context keys are not reachable
/// from handlebars or mustache templates.
pub fn render_template(
    engine: TemplateEngine,
    source: &str,
    context: &Value,
    autoescape: bool,
) -> RenderResult<String> {
    match engine {
        // Mustache interpolation is handled by the handlebars engine; the
        // editor-facing analyzer flags mustache-only syntax separately.
        TemplateEngine::Mustache | TemplateEngine::Handlebars => {
            let mut registry = Handlebars::new();
            if !autoescape {
                registry.register_escape_fn(handlebars::no_escape);
            }
            registry
                .render_template(source, context)
                .map_err(|e| RenderError::Template {
                    engine: engine.as_str(),
                    message: e.to_string(),
                })
        }
        TemplateEngine::Nunjucks => {
            let mut env = minijinja::Environment::new();
            env.set_auto_escape_callback(move |_| {
                if autoescape {
                    AutoEscape::Html
                } else {
                    AutoEscape::None
                }
            });
            env.render_str(source, context)
                .map_err(|e| RenderError::Template {
                    engine: engine.as_str(),
                    message: e.to_string(),
                })
        }
    }
}

/// Render one expression. `None` models an undefined result (a `var` path
/// that does not resolve); templates always produce a string.
pub fn render_expression(
    expression: &Expression,
    context: &Value,
    options: &ApiVersionOptions,
) -> RenderResult<Option<Value>> {
    match expression {
        Expression::Var(path) => {
            let resolved = get_path(context, path).cloned();
            if resolved.is_none() {
                trace!(path = %path, "var path did not resolve");
            }
            Ok(resolved)
        }
        Expression::Mustache(source) => {
            render_template(TemplateEngine::Mustache, source, context, options.autoescape)
                .map(|s| Some(Value::String(s)))
        }
        Expression::Handlebars(source) => {
            render_template(TemplateEngine::Handlebars, source, context, options.autoescape)
                .map(|s| Some(Value::String(s)))
        }
        Expression::Nunjucks(source) => {
            render_template(TemplateEngine::Nunjucks, source, context, options.autoescape)
                .map(|s| Some(Value::String(s)))
        }
        // Stop points: returned unchanged in their tagged wire form.
        Expression::Pipeline(_) | Expression::Defer(_) => serde_json::to_value(expression)
            .map(Some)
            .map_err(|e| RenderError::MalformedExpression {
                tag: expression.tag().as_str().to_string(),
                message: e.to_string(),
            }),
    }
}

/// Permissive boolean coercion used for step conditions.
///
/// Exactly `false`, `0`, `""`, `"false"`, `null`, and undefined are falsy;
/// everything else (including `"0"`, empty arrays, and empty objects) is
/// truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// [`is_truthy`] over an optional (possibly undefined) value.
pub fn is_truthy_option(value: Option<&Value>) -> bool {
    value.map(is_truthy).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ApiVersion, ApiVersionOptions};
    use serde_json::json;

    fn v3() -> ApiVersionOptions {
        ApiVersionOptions::for_version(ApiVersion::V3)
    }

    #[test]
    fn renders_var_path() {
        let rendered = render_expression(
            &Expression::var("array.0"),
            &json!({ "array": ["bar"] }),
            &v3(),
        )
        .unwrap();
        assert_eq!(rendered, Some(json!("bar")));
    }

    #[test]
    fn missing_var_path_is_undefined() {
        let rendered =
            render_expression(&Expression::var("missing.path"), &json!({}), &v3()).unwrap();
        assert_eq!(rendered, None);
    }

    #[test]
    fn empty_var_path_is_undefined() {
        let rendered = render_expression(&Expression::var(""), &json!({}), &v3()).unwrap();
        assert_eq!(rendered, None);
    }

    #[test]
    fn empty_template_renders_empty_string() {
        for expression in [
            Expression::mustache(""),
            Expression::handlebars(""),
            Expression::nunjucks(""),
        ] {
            let rendered = render_expression(&expression, &json!({}), &v3()).unwrap();
            assert_eq!(rendered, Some(json!("")));
        }
    }

    #[test]
    fn autoescape_on_escapes_html() {
        let context = json!({ "special": "a & b" });
        for engine in [
            TemplateEngine::Mustache,
            TemplateEngine::Handlebars,
            TemplateEngine::Nunjucks,
        ] {
            let rendered = render_template(engine, "{{ special }}", &context, true).unwrap();
            assert_eq!(rendered, "a &amp; b", "engine: {}", engine.as_str());
        }
    }

    #[test]
    fn autoescape_off_renders_raw() {
        let context = json!({ "special": "a & b" });
        for engine in [
            TemplateEngine::Mustache,
            TemplateEngine::Handlebars,
            TemplateEngine::Nunjucks,
        ] {
            let rendered = render_template(engine, "{{ special }}", &context, false).unwrap();
            assert_eq!(rendered, "a & b", "engine: {}", engine.as_str());
        }
    }

    #[test]
    fn handlebars_renders_object_path() {
        let rendered = render_template(
            TemplateEngine::Handlebars,
            "{{ obj.prop }}",
            &json!({ "obj": { "prop": 42 } }),
            false,
        )
        .unwrap();
        assert_eq!(rendered, "42");
    }

    // Handlebars reserves @ for data variables, so @-prefixed context keys
    // render as empty rather than resolving.
    #[test]
    fn handlebars_cannot_reach_at_prefixed_keys() {
        let rendered = render_template(
            TemplateEngine::Handlebars,
            "{{ obj.prop }}",
            &json!({ "@obj": { "prop": 42 } }),
            false,
        )
        .unwrap();
        assert_eq!(rendered, "");
    }

    #[test]
    fn nunjucks_undefined_renders_empty() {
        let rendered =
            render_template(TemplateEngine::Nunjucks, "{{ missing }}", &json!({}), false).unwrap();
        assert_eq!(rendered, "");
    }

    #[test]
    fn invalid_template_is_an_error() {
        let result = render_template(TemplateEngine::Nunjucks, "{% bad", &json!({}), false);
        assert!(matches!(
            result,
            Err(RenderError::Template { engine: "nunjucks", .. })
        ));
    }

    #[test]
    fn stop_points_pass_through_unchanged() {
        let expression = Expression::defer(json!({ "foo": { "__type__": "var", "__value__": "x" } }));
        let rendered = render_expression(&expression, &json!({ "x": 1 }), &v3()).unwrap();
        assert_eq!(rendered, Some(serde_json::to_value(&expression).unwrap()));
    }

    #[test]
    fn truthiness_table() {
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("false")));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy_option(None));

        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!({})));
    }

    #[test]
    fn rendering_does_not_mutate_context() {
        let context = json!({ "array": ["bar"] });
        let before = context.clone();
        let _ = render_expression(&Expression::var("array.0"), &context, &v3()).unwrap();
        let _ = render_expression(&Expression::var("array.0"), &context, &v3()).unwrap();
        assert_eq!(context, before);
    }
}
