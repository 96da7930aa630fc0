//! Control-flow bricks: branching, retry, iteration.
//!
//! These are ordinary bricks whose `run` recursively reduces a nested
//! pipeline. Branch bodies arrive as unrendered `!pipeline` expressions
//! (stop points); each sub-run gets a copied context, so bindings made
//! inside a branch never leak back to the parent. Root, policy, and the
//! cancellation token are shared with the outer run.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{trace, warn};

use brickflow_core::{
    expression_tag, is_truthy_option, BrickInvocation, ExpressionTag, OutputKey, RegistryId,
    VALUE_FIELD,
};

use crate::brick::{Brick, BrickContext, BrickKind, BrickOutput};
use crate::error::{PipelineError, PipelineResult};
use crate::reducer::{
    reduce_pipeline, InitialValues, PipelineOutcome, RunOptions, RETRY_BASE_MS, RETRY_CAP_MS,
};

/// Parse a `!pipeline` expression value into its steps.
fn pipeline_steps(value: &Value) -> PipelineResult<Vec<BrickInvocation>> {
    if expression_tag(value) != Some(ExpressionTag::Pipeline) {
        return Err(PipelineError::business(
            "expected a pipeline value; declare the field with the !pipeline tag",
        ));
    }
    let body = value.get(VALUE_FIELD).cloned().unwrap_or_else(|| json!([]));
    serde_json::from_value(body)
        .map_err(|e| PipelineError::business(format!("malformed pipeline body: {e}")))
}

/// Reduce a branch pipeline against a copy of the caller's scope, with an
/// optional extra binding (for-each's element).
async fn reduce_branch(
    body: &Value,
    ctx: &BrickContext,
    binding: Option<(String, Value)>,
) -> PipelineResult<BrickOutput> {
    let steps = pipeline_steps(body)?;

    let mut context = match &ctx.scope {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Some((key, value)) = binding {
        if context.insert(key.clone(), value).is_some() {
            warn!(key = %key, "branch binding shadows an existing binding");
        }
    }

    let mut initial = InitialValues::with_context(Value::Object(context), Value::Null);
    initial.root = ctx.root.clone();

    let options = RunOptions {
        api: ctx.api,
        headless: ctx.headless,
        cancel: ctx.cancel.clone(),
        meta: ctx.meta.clone(),
    };

    match reduce_pipeline(&steps, initial, &ctx.registry, &options).await? {
        PipelineOutcome::Completed(value) => Ok(BrickOutput::Value(value)),
        PipelineOutcome::RenderIntent(intent) => Ok(BrickOutput::Render(intent)),
    }
}

// =============================================================================
// IF-ELSE
// =============================================================================

/// Run one of two branch pipelines depending on a condition.
///
/// The untaken branch never runs. A falsy condition with no `else` branch
/// produces `null`.
pub struct IfElse;

#[async_trait]
impl Brick for IfElse {
    fn id(&self) -> RegistryId {
        RegistryId::of("if-else")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_root_aware(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "condition": {
                    "description": "Branch selector; truthiness decides",
                },
                "if": {
                    "type": "object",
                    "description": "Pipeline to run when the condition holds",
                },
                "else": {
                    "type": "object",
                    "description": "Pipeline to run otherwise",
                },
            },
            "required": ["if"],
        })
    }

    async fn run(&self, args: Value, ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let condition = is_truthy_option(args.get("condition"));
        let branch = if condition {
            args.get("if")
        } else {
            args.get("else")
        };

        match branch {
            Some(body) if !body.is_null() => reduce_branch(body, &ctx, None).await,
            _ => Ok(BrickOutput::Value(Value::Null)),
        }
    }
}

// =============================================================================
// RETRY
// =============================================================================

/// Re-run a body pipeline until it succeeds or attempts run out.
///
/// Backoff doubles from `intervalMillis` (default 100ms), capped at 30s.
/// Cancellation aborts immediately and is never retried; the last error
/// propagates when attempts are exhausted.
pub struct Retry;

#[async_trait]
impl Brick for Retry {
    fn id(&self) -> RegistryId {
        RegistryId::of("retry")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_root_aware(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "maxRetries": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Retries after the first attempt",
                },
                "intervalMillis": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Base backoff between attempts",
                },
                "body": {
                    "type": "object",
                    "description": "Pipeline to attempt",
                },
            },
            "required": ["maxRetries", "body"],
        })
    }

    async fn run(&self, args: Value, ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let max_retries = args.get("maxRetries").and_then(Value::as_u64).unwrap_or(0);
        let interval = args.get("intervalMillis").and_then(Value::as_u64);
        let body = args
            .get("body")
            .ok_or_else(|| PipelineError::business("retry requires a body pipeline"))?;

        let mut backoff = Duration::from_millis(interval.unwrap_or(RETRY_BASE_MS));
        let cap = Duration::from_millis(RETRY_CAP_MS);
        let mut attempt: u64 = 0;

        loop {
            match reduce_branch(body, &ctx, None).await {
                Ok(output) => return Ok(output),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    if attempt >= max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retry body failed; backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = ctx.cancel.cancelled() => {
                            return Err(PipelineError::cancelled("pipeline run cancelled"));
                        }
                    }
                    backoff = (backoff * 2).min(cap);
                }
            }
        }
    }
}

// =============================================================================
// FOR-EACH
// =============================================================================

/// Reduce a body pipeline once per element, sequentially.
///
/// Each element is bound at `@<elementKey>` (default `@element`) in the
/// branch context. The result is the last iteration's output; an empty input
/// produces `null`.
pub struct ForEach;

#[async_trait]
impl Brick for ForEach {
    fn id(&self) -> RegistryId {
        RegistryId::of("for-each")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_root_aware(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "elements": {
                    "type": "array",
                    "description": "Values to iterate over",
                },
                "body": {
                    "type": "object",
                    "description": "Pipeline to run per element",
                },
                "elementKey": {
                    "type": "string",
                    "description": "Context variable name for the element",
                },
            },
            "required": ["elements", "body"],
        })
    }

    async fn run(&self, args: Value, ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let elements = args
            .get("elements")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let element_key = args
            .get("elementKey")
            .and_then(Value::as_str)
            .unwrap_or("element");
        let reference = OutputKey::new(element_key)?.reference();
        let body = args
            .get("body")
            .ok_or_else(|| PipelineError::business("for-each requires a body pipeline"))?;

        let mut last = BrickOutput::Value(Value::Null);
        for (index, element) in elements.into_iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::cancelled("pipeline run cancelled"));
            }
            trace!(index, "reducing for-each body");
            let output = reduce_branch(body, &ctx, Some((reference.clone(), element))).await?;
            if matches!(output, BrickOutput::Render(_)) {
                return Ok(output);
            }
            last = output;
        }
        Ok(last)
    }
}
