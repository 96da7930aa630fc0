//! Brickflow core - expression model, template rendering, and brick YAML
//!
//! This crate holds the pure, side-effect-free half of the brick runtime:
//! the tagged expression model (`!var`, `!mustache`, `!handlebars`,
//! `!nunjucks`, `!pipeline`, `!defer`), the argument mapper that renders a
//! brick configuration against a context, the API version policy table, and
//! the YAML codec that moves definitions between tagged YAML and the
//! `{__type__, __value__}` wire form.
//!
//! ## Quick Start
//!
//! ```rust
//! use brickflow_core::{map_args, ApiVersionOptions, TemplateEngine};
//! use serde_json::json;
//!
//! let config = json!({
//!     "greeting": { "__type__": "nunjucks", "__value__": "Hello, {{ name }}!" },
//!     "city": { "__type__": "var", "__value__": "person.city" },
//! });
//! let context = json!({ "name": "Ada", "person": { "city": "London" } });
//!
//! let rendered = map_args(
//!     &config,
//!     &context,
//!     &ApiVersionOptions::default(),
//!     TemplateEngine::Mustache,
//! )
//! .unwrap();
//! assert_eq!(rendered, json!({ "greeting": "Hello, Ada!", "city": "London" }));
//! ```

// Error taxonomy for rendering and the YAML codec
pub mod error;

// Identifiers, engines, and the brick invocation record
pub mod types;

// Tagged expression model
pub mod expression;

// API version policy table
pub mod policy;

// Context path resolution and identifier helpers
pub mod vars;

// Template engines and single-expression rendering
pub mod render;

// Recursive configuration rendering (explicit and implicit modes)
pub mod mapargs;

// Static template checks for editor tooling
pub mod analysis;

// Brick YAML codec with custom expression tags
pub mod yaml;

// Expression model
pub use expression::{
    expression_tag, is_expression_value, Expression, ExpressionTag, TYPE_FIELD, VALUE_FIELD,
};

// Invocation record and identifier types
pub use types::{
    is_output_key, BrickInvocation, OutputKey, RegistryId, RetryPolicy, TemplateEngine,
};

// Version policy
pub use policy::{ApiVersion, ApiVersionOptions};

// Rendering entry points
pub use mapargs::{map_args, render_explicit, render_implicit};
pub use render::{is_truthy, is_truthy_option, render_expression, render_template};

// Context paths
pub use vars::{fresh_identifier, get_path, is_simple_path, FreshIdentifierOptions};

// YAML codec
pub use yaml::{dump_brick_yaml, load_brick_yaml, strip_non_schema_props};

// Template analysis
pub use analysis::{check_template, is_mustache_only};

// Error types
pub use error::{KeyError, RenderError, RenderResult, YamlError, YamlResult};
