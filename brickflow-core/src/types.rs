//! Pipeline data model: registry ids, output keys, and brick invocations.
//!
//! These types are the deserialized form of a pipeline definition. They carry
//! no execution state; the runtime crate interprets them.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::KeyError;

/// Pattern for valid output keys, anchored. At most 31 characters.
const OUTPUT_KEY_PATTERN: &str = r"^[A-Za-z_][0-9A-Za-z_]{0,30}$";

fn output_key_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(OUTPUT_KEY_PATTERN).expect("output key pattern is valid"))
}

// =============================================================================
// REGISTRY ID
// =============================================================================

/// Identifier of a brick in the registry, e.g. `contrib/regex` or
/// `test/echo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegistryId(String);

impl RegistryId {
    pub fn new(id: impl Into<String>) -> Result<Self, KeyError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(KeyError::InvalidRegistryId { id });
        }
        Ok(Self(id))
    }

    /// Build an id from a literal known to satisfy the rules. Panics on an
    /// invalid literal; use [`RegistryId::new`] for untrusted input.
    pub fn of(id: &'static str) -> Self {
        Self::new(id).expect("literal registry id is valid")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegistryId {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegistryId> for String {
    fn from(id: RegistryId) -> Self {
        id.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RegistryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// OUTPUT KEY
// =============================================================================

/// Variable name under which a step's result is bound into context.
///
/// The bound variable is referenced as `@<key>` by later steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputKey(String);

impl OutputKey {
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        if !is_output_key(&key) {
            return Err(KeyError::InvalidOutputKey { key });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `@`-prefixed variable name for this key.
    pub fn reference(&self) -> String {
        format!("@{}", self.0)
    }
}

/// Whether `key` is a valid output key.
pub fn is_output_key(key: &str) -> bool {
    output_key_regex().is_match(key)
}

impl TryFrom<String> for OutputKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OutputKey> for String {
    fn from(key: OutputKey) -> Self {
        key.0
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// INVOCATION
// =============================================================================

/// Template engine used for implicit (bare string) rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateEngine {
    Mustache,
    Handlebars,
    Nunjucks,
}

impl TemplateEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mustache => "mustache",
            Self::Handlebars => "handlebars",
            Self::Nunjucks => "nunjucks",
        }
    }
}

/// Bounded retry declared on a single step.
///
/// An attempt failing with a cancellation is never retried. The backoff
/// doubles per attempt starting from `interval_millis` (default 100ms),
/// capped at 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "maxRetries")]
    pub max_retries: u32,
    #[serde(rename = "intervalMillis", default, skip_serializing_if = "Option::is_none")]
    pub interval_millis: Option<u64>,
}

/// One step of a pipeline: which brick to run and how.
///
/// `config` values may be literals or tagged expressions; rendering happens
/// just before invocation. `condition` gates the step; `output_key` binds the
/// result into context for later steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrickInvocation {
    pub id: RegistryId,

    #[serde(default)]
    pub config: serde_json::Map<String, Value>,

    #[serde(rename = "outputKey", default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<OutputKey>,

    /// Boolean, string, or expression; falsy skips the step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,

    /// Selector for the step's root element. Resolution is a host concern;
    /// the reducer only threads the resolved root descriptor through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,

    /// Target window/frame selector. Cross-frame dispatch is a host concern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,

    #[serde(rename = "onError", default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<RetryPolicy>,

    #[serde(rename = "templateEngine", default, skip_serializing_if = "Option::is_none")]
    pub template_engine: Option<TemplateEngine>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "instanceId", default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<Uuid>,
}

impl BrickInvocation {
    /// A minimal invocation of `id` with an empty config.
    pub fn new(id: RegistryId) -> Self {
        Self {
            id,
            config: serde_json::Map::new(),
            output_key: None,
            condition: None,
            root: None,
            window: None,
            on_error: None,
            template_engine: None,
            label: None,
            instance_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_id_rejects_whitespace() {
        assert!(RegistryId::new("contrib/regex").is_ok());
        assert!(RegistryId::new("").is_err());
        assert!(RegistryId::new("has space").is_err());
    }

    #[test]
    fn output_key_pattern() {
        assert!(is_output_key("foo"));
        assert!(is_output_key("_foo2"));
        assert!(is_output_key("A"));
        // 31 chars is the maximum
        assert!(is_output_key(&"a".repeat(31)));
        assert!(!is_output_key(&"a".repeat(32)));
        assert!(!is_output_key(""));
        assert!(!is_output_key("2foo"));
        assert!(!is_output_key("foo-bar"));
        assert!(!is_output_key("@foo"));
    }

    #[test]
    fn output_key_reference() {
        let key = OutputKey::new("result").unwrap();
        assert_eq!(key.reference(), "@result");
    }

    #[test]
    fn invocation_round_trips_field_names() {
        let value = json!({
            "id": "test/echo",
            "config": { "message": "hi" },
            "outputKey": "echoed",
            "condition": true,
        });

        let step: BrickInvocation = serde_json::from_value(value).unwrap();
        assert_eq!(step.id.as_str(), "test/echo");
        assert_eq!(step.output_key.as_ref().unwrap().as_str(), "echoed");

        let back = serde_json::to_value(&step).unwrap();
        assert_eq!(back["outputKey"], "echoed");
        assert!(back.get("root").is_none());
    }

    #[test]
    fn invalid_output_key_fails_deserialization() {
        let value = json!({ "id": "test/echo", "outputKey": "not valid" });
        assert!(serde_json::from_value::<BrickInvocation>(value).is_err());
    }

    #[test]
    fn retry_policy_field_names() {
        let policy: RetryPolicy =
            serde_json::from_value(json!({ "maxRetries": 3, "intervalMillis": 50 })).unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.interval_millis, Some(50));
    }
}
