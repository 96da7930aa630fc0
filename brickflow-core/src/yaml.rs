//! Brick YAML codec.
//!
//! Pipelines serialize to YAML with custom tags for expressions: `!var`,
//! `!mustache`, `!handlebars`, `!nunjucks` (scalar), `!pipeline` (sequence),
//! and `!defer` (mapping). Loading converts tagged nodes into the
//! `{__type__, __value__}` wire maps; dumping emits the tags back. Round
//! trips reproduce semantically identical structures, minus server-injected
//! fields stripped on dump.

use serde_json::{Map, Value as Json};
use serde_yaml::value::{Tag, TaggedValue};
use serde_yaml::Value as Yaml;
use tracing::trace;

use crate::error::{YamlError, YamlResult};
use crate::expression::{expression_tag, ExpressionTag, TYPE_FIELD, VALUE_FIELD};

/// Parse brick YAML, resolving the custom expression tags.
pub fn load_brick_yaml(text: &str) -> YamlResult<Json> {
    let value: Yaml = serde_yaml::from_str(text)?;
    yaml_to_json(value)
}

/// Serialize a definition to YAML, emitting expression tags and stripping
/// non-schema props first.
pub fn dump_brick_yaml(value: &Json) -> YamlResult<String> {
    let stripped = strip_non_schema_props(value);
    let yaml = json_to_yaml(&stripped)?;
    Ok(serde_yaml::to_string(&yaml)?)
}

/// Remove auxiliary fields injected by the package server: root-level `id`,
/// `sharing`, and `updated_at`, and `sharing`/`updated_at` inside `metadata`.
/// They are not part of the schema contract.
pub fn strip_non_schema_props(value: &Json) -> Json {
    let mut out = value.clone();
    if let Json::Object(map) = &mut out {
        for prop in ["id", "sharing", "updated_at"] {
            if map.remove(prop).is_some() {
                trace!(prop, "stripped non-schema prop");
            }
        }
        if let Some(Json::Object(metadata)) = map.get_mut("metadata") {
            for prop in ["sharing", "updated_at"] {
                metadata.remove(prop);
            }
        }
    }
    out
}

fn tag_name(tag: &Tag) -> String {
    tag.to_string().trim_start_matches('!').to_string()
}

fn yaml_to_json(value: Yaml) -> YamlResult<Json> {
    match value {
        Yaml::Null => Ok(Json::Null),
        Yaml::Bool(b) => Ok(Json::Bool(b)),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Json::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Json::from(u))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Json::Number)
                    .ok_or_else(|| YamlError::Number { value: n.to_string() })
            } else {
                Err(YamlError::Number { value: n.to_string() })
            }
        }
        Yaml::String(s) => Ok(Json::String(s)),
        Yaml::Sequence(items) => items
            .into_iter()
            .map(yaml_to_json)
            .collect::<YamlResult<Vec<_>>>()
            .map(Json::Array),
        Yaml::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (key, entry) in mapping {
                let Yaml::String(key) = key else {
                    return Err(YamlError::NonStringKey { key: format!("{key:?}") });
                };
                out.insert(key, yaml_to_json(entry)?);
            }
            Ok(Json::Object(out))
        }
        Yaml::Tagged(tagged) => tagged_to_expression(*tagged),
    }
}

fn tagged_to_expression(tagged: TaggedValue) -> YamlResult<Json> {
    let name = tag_name(&tagged.tag);
    let Some(tag) = ExpressionTag::parse(&name) else {
        return Err(YamlError::UnknownTag { tag: name });
    };

    let value = match tag {
        ExpressionTag::Var
        | ExpressionTag::Mustache
        | ExpressionTag::Handlebars
        | ExpressionTag::Nunjucks => match tagged.value {
            Yaml::String(s) => Json::String(s),
            Yaml::Null => Json::String(String::new()),
            _ => {
                return Err(YamlError::TagKind { tag: name, expected: "string scalar" });
            }
        },
        ExpressionTag::Pipeline => match tagged.value {
            Yaml::Sequence(items) => Json::Array(
                items
                    .into_iter()
                    .map(yaml_to_json)
                    .collect::<YamlResult<Vec<_>>>()?,
            ),
            _ => {
                return Err(YamlError::TagKind { tag: name, expected: "sequence" });
            }
        },
        ExpressionTag::Defer => match tagged.value {
            mapping @ Yaml::Mapping(_) => yaml_to_json(mapping)?,
            _ => {
                return Err(YamlError::TagKind { tag: name, expected: "mapping" });
            }
        },
    };

    let mut expression = Map::with_capacity(2);
    expression.insert(TYPE_FIELD.to_string(), Json::String(tag.as_str().to_string()));
    expression.insert(VALUE_FIELD.to_string(), value);
    Ok(Json::Object(expression))
}

fn json_to_yaml(value: &Json) -> YamlResult<Yaml> {
    if let Some(tag) = expression_tag(value) {
        let raw = value.get(VALUE_FIELD).unwrap_or(&Json::Null);
        let inner = match tag {
            ExpressionTag::Var
            | ExpressionTag::Mustache
            | ExpressionTag::Handlebars
            | ExpressionTag::Nunjucks => match raw {
                Json::String(s) => Yaml::String(s.clone()),
                Json::Null => Yaml::String(String::new()),
                _ => {
                    return Err(YamlError::TagKind {
                        tag: tag.as_str().to_string(),
                        expected: "string scalar",
                    });
                }
            },
            ExpressionTag::Pipeline => match raw {
                Json::Array(items) => Yaml::Sequence(
                    items.iter().map(json_to_yaml).collect::<YamlResult<Vec<_>>>()?,
                ),
                _ => {
                    return Err(YamlError::TagKind {
                        tag: tag.as_str().to_string(),
                        expected: "sequence",
                    });
                }
            },
            ExpressionTag::Defer => match raw {
                Json::Object(_) => json_to_yaml(raw)?,
                _ => {
                    return Err(YamlError::TagKind {
                        tag: tag.as_str().to_string(),
                        expected: "mapping",
                    });
                }
            },
        };
        return Ok(Yaml::Tagged(Box::new(TaggedValue {
            tag: Tag::new(tag.as_str()),
            value: inner,
        })));
    }

    match value {
        Json::Null => Ok(Yaml::Null),
        Json::Bool(b) => Ok(Yaml::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Yaml::Number(i.into()))
            } else if let Some(u) = n.as_u64() {
                Ok(Yaml::Number(u.into()))
            } else if let Some(f) = n.as_f64() {
                Ok(Yaml::Number(f.into()))
            } else {
                Err(YamlError::Number { value: n.to_string() })
            }
        }
        Json::String(s) => Ok(Yaml::String(s.clone())),
        Json::Array(items) => items
            .iter()
            .map(json_to_yaml)
            .collect::<YamlResult<Vec<_>>>()
            .map(Yaml::Sequence),
        Json::Object(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (key, entry) in map {
                out.insert(Yaml::String(key.clone()), json_to_yaml(entry)?);
            }
            Ok(Yaml::Mapping(out))
        }
    }
}
