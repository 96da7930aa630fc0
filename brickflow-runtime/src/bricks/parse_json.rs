//! JSON parsing brick.

use async_trait::async_trait;
use serde_json::{json, Value};

use brickflow_core::RegistryId;

use crate::brick::{Brick, BrickContext, BrickKind, BrickOutput};
use crate::error::{PipelineError, PipelineResult};

/// Parse a JSON document from a string argument.
pub struct ParseJson;

#[async_trait]
impl Brick for ParseJson {
    fn id(&self) -> RegistryId {
        RegistryId::of("parse-json")
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
                "content": { "type": "string" },
            },
            "required": ["content"],
        })
    }

    async fn run(&self, args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| PipelineError::business(format!("Invalid JSON: {e}")))?;
        Ok(BrickOutput::Value(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn parses_valid_json() {
        let output = ParseJson
            .run(json!({ "content": r#"{"a": [1, 2]}"# }), test_context())
            .await
            .unwrap();
        assert_eq!(output, BrickOutput::Value(json!({ "a": [1, 2] })));
    }

    #[tokio::test]
    async fn malformed_json_is_a_business_error() {
        let err = ParseJson
            .run(json!({ "content": "{nope" }), test_context())
            .await
            .unwrap_err();
        assert!(err.is_business());
        assert!(err.to_string().starts_with("Invalid JSON:"));
    }
}
