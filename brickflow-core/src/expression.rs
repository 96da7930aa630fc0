//! Tagged expression model.
//!
//! Configuration values arrive as untrusted JSON/YAML. An expression is a map
//! of the exact shape `{ "__type__": tag, "__value__": value }`; anything else
//! is a literal. Classification is driven solely by the `__type__`
//! discriminant, never by duck typing, and the closed [`Expression`] enum is
//! the only sanctioned in-memory form.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::{BrickInvocation, TemplateEngine};

pub const TYPE_FIELD: &str = "__type__";
pub const VALUE_FIELD: &str = "__value__";

/// The six recognized expression tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionTag {
    Var,
    Mustache,
    Handlebars,
    Nunjucks,
    Pipeline,
    Defer,
}

impl ExpressionTag {
    pub const ALL: [ExpressionTag; 6] = [
        Self::Var,
        Self::Mustache,
        Self::Handlebars,
        Self::Nunjucks,
        Self::Pipeline,
        Self::Defer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Mustache => "mustache",
            Self::Handlebars => "handlebars",
            Self::Nunjucks => "nunjucks",
            Self::Pipeline => "pipeline",
            Self::Defer => "defer",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Tags whose `__value__` is template source text.
    pub fn is_template(self) -> bool {
        matches!(self, Self::Mustache | Self::Handlebars | Self::Nunjucks)
    }

    /// Tags the argument mapper must pass through unrendered.
    pub fn is_stop_point(self) -> bool {
        matches!(self, Self::Pipeline | Self::Defer)
    }

    /// The engine that renders this tag's source, if it is a template tag.
    pub fn engine(self) -> Option<TemplateEngine> {
        match self {
            Self::Mustache => Some(TemplateEngine::Mustache),
            Self::Handlebars => Some(TemplateEngine::Handlebars),
            Self::Nunjucks => Some(TemplateEngine::Nunjucks),
            _ => None,
        }
    }
}

/// A parsed expression. The wire form is the `{__type__, __value__}` map.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Dotted path into the render context, e.g. `@foo.bar` or `array.0`.
    Var(String),
    Mustache(String),
    Handlebars(String),
    Nunjucks(String),
    /// An unrendered sub-pipeline, reduced later by the consuming brick.
    Pipeline(Vec<BrickInvocation>),
    /// Opaque structure whose rendering is deliberately postponed.
    Defer(Value),
}

impl Expression {
    pub fn var(path: impl Into<String>) -> Self {
        Self::Var(path.into())
    }

    pub fn mustache(source: impl Into<String>) -> Self {
        Self::Mustache(source.into())
    }

    pub fn handlebars(source: impl Into<String>) -> Self {
        Self::Handlebars(source.into())
    }

    pub fn nunjucks(source: impl Into<String>) -> Self {
        Self::Nunjucks(source.into())
    }

    pub fn pipeline(steps: Vec<BrickInvocation>) -> Self {
        Self::Pipeline(steps)
    }

    pub fn defer(value: Value) -> Self {
        Self::Defer(value)
    }

    pub fn tag(&self) -> ExpressionTag {
        match self {
            Self::Var(_) => ExpressionTag::Var,
            Self::Mustache(_) => ExpressionTag::Mustache,
            Self::Handlebars(_) => ExpressionTag::Handlebars,
            Self::Nunjucks(_) => ExpressionTag::Nunjucks,
            Self::Pipeline(_) => ExpressionTag::Pipeline,
            Self::Defer(_) => ExpressionTag::Defer,
        }
    }

    /// Build from a tag and a raw `__value__`.
    ///
    /// A missing or null value on var/template tags normalizes to the empty
    /// string: historical configs omit `__value__` and expect templates to
    /// render as `""` and vars to resolve to nothing.
    pub fn from_tagged(tag: ExpressionTag, value: Value) -> Result<Self, String> {
        fn text(tag: ExpressionTag, value: Value) -> Result<String, String> {
            match value {
                Value::Null => Ok(String::new()),
                Value::String(s) => Ok(s),
                other => Err(format!(
                    "{} expression expects a string __value__, got {}",
                    tag.as_str(),
                    type_name(&other)
                )),
            }
        }

        match tag {
            ExpressionTag::Var => text(tag, value).map(Self::Var),
            ExpressionTag::Mustache => text(tag, value).map(Self::Mustache),
            ExpressionTag::Handlebars => text(tag, value).map(Self::Handlebars),
            ExpressionTag::Nunjucks => text(tag, value).map(Self::Nunjucks),
            ExpressionTag::Pipeline => serde_json::from_value::<Vec<BrickInvocation>>(value)
                .map(Self::Pipeline)
                .map_err(|e| format!("pipeline expression: {e}")),
            ExpressionTag::Defer => Ok(Self::Defer(value)),
        }
    }

    /// Classify and parse an arbitrary value. `None` means literal.
    pub fn from_value(value: &Value) -> Result<Option<Self>, String> {
        match expression_tag(value) {
            None => Ok(None),
            Some(tag) => {
                let raw = value
                    .get(VALUE_FIELD)
                    .cloned()
                    .unwrap_or(Value::Null);
                Self::from_tagged(tag, raw).map(Some)
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The expression tag of `value`, if it is expression-shaped.
///
/// A map with an unrecognized `__type__` is a literal; it classifies as
/// `None` and recursive rendering descends into it like any plain object.
pub fn expression_tag(value: &Value) -> Option<ExpressionTag> {
    let tag = value.as_object()?.get(TYPE_FIELD)?.as_str()?;
    ExpressionTag::parse(tag)
}

pub fn is_expression_value(value: &Value) -> bool {
    expression_tag(value).is_some()
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(TYPE_FIELD, self.tag().as_str())?;
        match self {
            Self::Var(s) | Self::Mustache(s) | Self::Handlebars(s) | Self::Nunjucks(s) => {
                map.serialize_entry(VALUE_FIELD, s)?;
            }
            Self::Pipeline(steps) => map.serialize_entry(VALUE_FIELD, steps)?,
            Self::Defer(value) => map.serialize_entry(VALUE_FIELD, value)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "__type__")]
            tag: String,
            #[serde(rename = "__value__", default)]
            value: Value,
        }

        let wire = Wire::deserialize(deserializer)?;
        let tag = ExpressionTag::parse(&wire.tag)
            .ok_or_else(|| D::Error::custom(format!("unknown expression tag: {}", wire.tag)))?;
        Expression::from_tagged(tag, wire.value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryId;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_to_tagged_map() {
        let expr = Expression::var("@foo.bar");
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(value, json!({ "__type__": "var", "__value__": "@foo.bar" }));
    }

    #[test]
    fn deserializes_tagged_map() {
        let expr: Expression =
            serde_json::from_value(json!({ "__type__": "nunjucks", "__value__": "{{ a }}" }))
                .unwrap();
        assert_eq!(expr, Expression::nunjucks("{{ a }}"));
    }

    #[test]
    fn missing_value_normalizes_to_empty_string() {
        let expr: Expression =
            serde_json::from_value(json!({ "__type__": "mustache" })).unwrap();
        assert_eq!(expr, Expression::mustache(""));

        let expr: Expression =
            serde_json::from_value(json!({ "__type__": "var", "__value__": null })).unwrap();
        assert_eq!(expr, Expression::var(""));
    }

    #[test]
    fn unknown_tag_is_not_an_expression() {
        let value = json!({ "__type__": "bogus", "__value__": 1 });
        assert_eq!(expression_tag(&value), None);
        assert!(Expression::from_value(&value).unwrap().is_none());
    }

    #[test]
    fn plain_values_are_literals() {
        assert!(!is_expression_value(&json!("text")));
        assert!(!is_expression_value(&json!({ "foo": 1 })));
        assert!(!is_expression_value(&json!(null)));
    }

    #[test]
    fn pipeline_round_trip() {
        let expr = Expression::pipeline(vec![BrickInvocation::new(
            RegistryId::new("test/echo").unwrap(),
        )]);
        let value = serde_json::to_value(&expr).unwrap();
        assert_eq!(value["__type__"], "pipeline");
        assert_eq!(value["__value__"][0]["id"], "test/echo");

        let back: Expression = serde_json::from_value(value).unwrap();
        assert_eq!(back, expr);
    }

    #[test]
    fn malformed_pipeline_body_is_an_error() {
        let value = json!({ "__type__": "pipeline", "__value__": 42 });
        assert!(Expression::from_value(&value).is_err());
    }

    #[test]
    fn non_string_template_value_is_an_error() {
        let value = json!({ "__type__": "var", "__value__": 42 });
        assert!(Expression::from_value(&value).is_err());
    }
}
