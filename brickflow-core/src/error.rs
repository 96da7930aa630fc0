//! Error types for the core data model and renderers.
//!
//! Library errors are concrete `thiserror` enums; callers that need an
//! umbrella type wrap these at the runtime layer.

use thiserror::Error;

/// Errors raised while rendering expressions and templates.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template engine rejected its source or data.
    #[error("{engine} template failed: {message}")]
    Template { engine: &'static str, message: String },

    /// A tagged expression carried a `__value__` of the wrong shape.
    #[error("malformed {tag} expression: {message}")]
    MalformedExpression { tag: String, message: String },
}

/// Errors raised while validating identifiers.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Output keys must be short identifiers: `[A-Za-z_][0-9A-Za-z_]{0,30}`.
    #[error("invalid output key {key:?}")]
    InvalidOutputKey { key: String },

    /// Registry ids must be non-empty and contain no whitespace.
    #[error("invalid registry id {id:?}")]
    InvalidRegistryId { id: String },
}

/// Errors raised by the brick YAML codec.
#[derive(Debug, Error)]
pub enum YamlError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A custom tag was applied to the wrong node kind, e.g. `!pipeline` on
    /// a mapping.
    #[error("tag !{tag} expects a {expected} node")]
    TagKind { tag: String, expected: &'static str },

    #[error("unrecognized tag !{tag}")]
    UnknownTag { tag: String },

    #[error("mapping key is not a string: {key}")]
    NonStringKey { key: String },

    /// YAML permits floats JSON cannot represent (NaN, infinities).
    #[error("number {value} has no JSON representation")]
    Number { value: String },
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type YamlResult<T> = std::result::Result<T, YamlError>;
