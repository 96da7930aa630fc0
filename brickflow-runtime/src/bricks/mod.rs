//! Built-in bricks.

use std::sync::Arc;

use crate::registry::BrickRegistry;

pub mod control_flow;
pub mod parse_json;
pub mod regex;

pub use control_flow::{ForEach, IfElse, Retry};
pub use parse_json::ParseJson;
pub use regex::RegexTransformer;

/// Registry pre-loaded with every built-in brick.
pub fn builtin_registry() -> BrickRegistry {
    let mut registry = BrickRegistry::new();
    registry.register(Arc::new(IfElse));
    registry.register(Arc::new(Retry));
    registry.register(Arc::new(ForEach));
    registry.register(Arc::new(RegexTransformer));
    registry.register(Arc::new(ParseJson));
    registry
}
