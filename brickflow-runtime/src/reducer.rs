//! The pipeline reducer.
//!
//! Reduces a sequence of brick invocations against an accumulating context.
//! Each step: resolve the brick, evaluate the gating condition, render the
//! arguments, validate them, invoke, and bind the output under
//! `@<outputKey>`. Strictly sequential within one run; cancellation is
//! cooperative between steps and between retry sleeps.
//!
//! Headless execution is signalled in the return type: reaching a
//! renderer-kind brick yields [`PipelineOutcome::RenderIntent`] instead of
//! running it. The caller that owns the rendering surface consumes the
//! intent; the reducer never treats it as a failure.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use brickflow_core::{
    expression_tag, is_truthy, is_truthy_option, map_args, render_expression, ApiVersionOptions,
    BrickInvocation, Expression, OutputKey, RegistryId, RenderError, RetryPolicy, TemplateEngine,
    VALUE_FIELD,
};

use crate::brick::{Brick, BrickContext, BrickKind, BrickOutput, RunMetadata};
use crate::error::{InputValidationError, PipelineError, PipelineResult, ValidationErrorDetail};
use crate::registry::BrickRegistry;

/// Default base backoff between retry attempts.
pub(crate) const RETRY_BASE_MS: u64 = 100;
/// Backoff ceiling; doubling stops here.
pub(crate) const RETRY_CAP_MS: u64 = 30_000;

// =============================================================================
// RUN INPUTS
// =============================================================================

/// Seed values for a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct InitialValues {
    /// The run's input. Becomes the first `previous_output`; when it is an
    /// object its entries seed the context.
    pub input: Value,
    /// Integration bindings merged over the input entries (merge shadows,
    /// with a warning).
    pub service_context: Option<Value>,
    /// Resolved root descriptor, handed only to root-aware bricks.
    pub root: Option<Value>,
    /// Exact context snapshot; overrides the input/service merge. Used by
    /// control-flow bricks to seed sub-runs.
    pub context: Option<Value>,
}

impl InitialValues {
    pub fn new(input: Value) -> Self {
        Self {
            input,
            service_context: None,
            root: None,
            context: None,
        }
    }

    /// Sub-run seeding: start from an exact context snapshot.
    pub fn with_context(context: Value, input: Value) -> Self {
        Self {
            input,
            service_context: None,
            root: None,
            context: Some(context),
        }
    }
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub api: ApiVersionOptions,
    /// Stop at renderer bricks and yield their intent instead of running
    /// them.
    pub headless: bool,
    pub cancel: CancellationToken,
    pub meta: RunMetadata,
}

impl RunOptions {
    pub fn new(api: ApiVersionOptions) -> Self {
        Self {
            api,
            headless: false,
            cancel: CancellationToken::new(),
            meta: RunMetadata::new(),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new(ApiVersionOptions::default())
    }
}

// =============================================================================
// OUTCOME
// =============================================================================

/// How a pipeline run ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// All steps ran; carries the final output value.
    Completed(Value),
    /// A headless run reached a renderer. The brick did not run; the caller
    /// owns the rendering surface.
    RenderIntent(RenderIntent),
}

/// Everything a rendering surface needs to finish a headless run.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderIntent {
    pub brick_id: RegistryId,
    /// Fully rendered renderer arguments.
    pub args: Value,
    /// The scope the arguments were rendered against.
    pub context: Value,
    pub output_key: Option<OutputKey>,
}

// =============================================================================
// REDUCTION
// =============================================================================

/// Run `pipeline` to completion.
///
/// Fails fast: every referenced brick id (including ids inside nested
/// `!pipeline` bodies) is resolved before the first step runs. Aborts on the
/// first unhandled step failure; there is no partial-result reporting beyond
/// the error's step frame.
#[instrument(skip_all, fields(run = %options.meta.run_id))]
pub async fn reduce_pipeline(
    pipeline: &[BrickInvocation],
    initial: InitialValues,
    registry: &Arc<BrickRegistry>,
    options: &RunOptions,
) -> PipelineResult<PipelineOutcome> {
    registry.check_pipeline(pipeline)?;

    let InitialValues {
        input,
        service_context,
        root,
        context: seeded,
    } = initial;

    let mut context = seed_context(seeded, &input, service_context.as_ref());
    let mut previous_output = input;

    debug!(
        steps = pipeline.len(),
        api = %options.api.version,
        headless = options.headless,
        "reducing pipeline"
    );

    for (step_index, step) in pipeline.iter().enumerate() {
        if options.cancel.is_cancelled() {
            return Err(PipelineError::cancelled("pipeline run cancelled"));
        }

        // check_pipeline resolved every id up front; this fetches the
        // instance.
        let brick = registry
            .lookup(&step.id)
            .ok_or_else(|| PipelineError::BrickNotFound {
                id: step.id.clone(),
            })?;

        let scope = step_scope(&context, &previous_output, &options.api);

        let run = reduce_step(
            step,
            step_index,
            brick.as_ref(),
            &scope,
            &root,
            registry,
            options,
        )
        .await;

        match run {
            Ok(StepRun::Skipped) => {
                debug!(brick = %step.id, step = step_index, "condition falsy; step skipped");
            }
            Ok(StepRun::Output(output)) => {
                if let Some(key) = &step.output_key {
                    let reference = key.reference();
                    if context.contains_key(&reference) {
                        warn!(key = %reference, brick = %step.id, "output key shadows an existing binding");
                    }
                    context.insert(reference, output.clone());
                }
                previous_output = output;
            }
            Ok(StepRun::Render(intent)) => {
                return Ok(PipelineOutcome::RenderIntent(intent));
            }
            Err(err) => {
                if err.is_business() {
                    debug!(brick = %step.id, step = step_index, %err, "step raised a business error");
                } else {
                    warn!(
                        brick = %step.id,
                        step = step_index,
                        instance = ?step.instance_id,
                        mod_id = ?options.meta.mod_id,
                        component = ?options.meta.component_id,
                        %err,
                        "step failed"
                    );
                }
                return Err(frame_step_error(err, step, step_index));
            }
        }
    }

    Ok(PipelineOutcome::Completed(previous_output))
}

/// Reduce in headless mode and unwrap the render intent. A pipeline that
/// completes without reaching a renderer is an error at this boundary.
pub async fn run_headless(
    pipeline: &[BrickInvocation],
    initial: InitialValues,
    registry: &Arc<BrickRegistry>,
    options: &RunOptions,
) -> PipelineResult<RenderIntent> {
    let mut options = options.clone();
    options.headless = true;

    match reduce_pipeline(pipeline, initial, registry, &options).await? {
        PipelineOutcome::RenderIntent(intent) => Ok(intent),
        PipelineOutcome::Completed(_) => Err(PipelineError::NoRenderer),
    }
}

enum StepRun {
    Skipped,
    Output(Value),
    Render(RenderIntent),
}

async fn reduce_step(
    step: &BrickInvocation,
    step_index: usize,
    brick: &dyn Brick,
    scope: &Value,
    root: &Option<Value>,
    registry: &Arc<BrickRegistry>,
    options: &RunOptions,
) -> PipelineResult<StepRun> {
    if let Some(condition) = &step.condition {
        if !condition_holds(condition, scope, &options.api)? {
            return Ok(StepRun::Skipped);
        }
    }

    // Root/window selectors resolve host-side; the reducer records them.
    if let Some(selector) = &step.root {
        trace!(brick = %step.id, %selector, "step declares a root selector");
    }
    if let Some(window) = &step.window {
        trace!(brick = %step.id, %window, "step declares a window target");
    }

    let engine = step.template_engine.unwrap_or(TemplateEngine::Mustache);
    let config = Value::Object(step.config.clone());
    let args = map_args(&config, scope, &options.api, engine)?;

    validate_brick_input(brick, &step.id, &args)?;

    if options.headless && brick.kind() == BrickKind::Renderer {
        debug!(brick = %step.id, step = step_index, "renderer reached in headless mode");
        return Ok(StepRun::Render(RenderIntent {
            brick_id: step.id.clone(),
            args,
            context: scope.clone(),
            output_key: step.output_key.clone(),
        }));
    }

    let ctx = BrickContext {
        scope: scope.clone(),
        root: if brick.is_root_aware() {
            root.clone()
        } else {
            None
        },
        api: options.api,
        headless: options.headless,
        cancel: options.cancel.clone(),
        registry: Arc::clone(registry),
        meta: options.meta.clone(),
        instance_id: step.instance_id,
    };

    debug!(brick = %step.id, step = step_index, "running brick");
    match invoke_with_retry(brick, &args, &ctx, step.on_error.as_ref()).await? {
        BrickOutput::Value(output) => Ok(StepRun::Output(output)),
        // A nested headless reduction reached a renderer; pass it up.
        BrickOutput::Render(intent) => Ok(StepRun::Render(intent)),
    }
}

/// Build the starting context: an exact seed when given, otherwise the
/// input's entries with the service context merged on top.
fn seed_context(
    seeded: Option<Value>,
    input: &Value,
    service_context: Option<&Value>,
) -> Map<String, Value> {
    if let Some(seed) = seeded {
        return match seed {
            Value::Object(map) => map,
            other => {
                trace!(?other, "non-object context seed ignored");
                Map::new()
            }
        };
    }

    let mut context = Map::new();
    if let Value::Object(entries) = input {
        for (key, value) in entries {
            context.insert(key.clone(), value.clone());
        }
    }
    if let Some(Value::Object(services)) = service_context {
        for (key, value) in services {
            if context.insert(key.clone(), value.clone()).is_some() {
                warn!(%key, "service context shadows an input binding");
            }
        }
    }
    context
}

/// The scope a step renders against. Explicit data flow exposes the context
/// alone; implicit (v1) chaining also merges the previous output's entries
/// over it.
fn step_scope(
    context: &Map<String, Value>,
    previous_output: &Value,
    api: &ApiVersionOptions,
) -> Value {
    let mut scope = context.clone();
    if !api.explicit_data_flow {
        if let Value::Object(entries) = previous_output {
            for (key, value) in entries {
                scope.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(scope)
}

/// Evaluate a step's gating condition. Expressions render against the step
/// scope first; bare values coerce directly. An unresolved `var` is falsy.
fn condition_holds(
    condition: &Value,
    scope: &Value,
    api: &ApiVersionOptions,
) -> PipelineResult<bool> {
    let Some(tag) = expression_tag(condition) else {
        return Ok(is_truthy(condition));
    };

    if tag.is_stop_point() {
        // The expression map itself is an object, and objects are truthy.
        return Ok(true);
    }

    let raw = condition.get(VALUE_FIELD).cloned().unwrap_or(Value::Null);
    let expression =
        Expression::from_tagged(tag, raw).map_err(|message| RenderError::MalformedExpression {
            tag: tag.as_str().to_string(),
            message,
        })?;
    let rendered = render_expression(&expression, scope, api)?;
    Ok(is_truthy_option(rendered.as_ref()))
}

/// Validate rendered arguments against the brick's input schema. A `null`,
/// `true`, or empty-object schema accepts anything and skips the validator.
fn validate_brick_input(brick: &dyn Brick, id: &RegistryId, args: &Value) -> PipelineResult<()> {
    let schema = brick.input_schema();
    let unconstrained = match &schema {
        Value::Null | Value::Bool(true) => true,
        Value::Object(map) if map.is_empty() => true,
        _ => false,
    };
    if unconstrained {
        return Ok(());
    }

    let validator = jsonschema::validator_for(&schema).map_err(|e| {
        PipelineError::Other(anyhow::anyhow!("invalid input schema for {id}: {e}"))
    })?;

    let details: Vec<ValidationErrorDetail> = validator
        .iter_errors(args)
        .map(|e| ValidationErrorDetail {
            error: e.to_string(),
            keyword_location: format!("#{}", e.schema_path),
        })
        .collect();

    if details.is_empty() {
        return Ok(());
    }
    Err(PipelineError::InputValidation(Box::new(
        InputValidationError {
            message: "Invalid inputs for brick".to_string(),
            schema,
            errors: details,
        },
    )))
}

/// Invoke the brick, honoring the step's retry policy. Backoff doubles from
/// the configured interval, capped; cancellation aborts immediately and is
/// never retried.
async fn invoke_with_retry(
    brick: &dyn Brick,
    args: &Value,
    ctx: &BrickContext,
    policy: Option<&RetryPolicy>,
) -> PipelineResult<BrickOutput> {
    let Some(policy) = policy else {
        return brick.run(args.clone(), ctx.clone()).await;
    };

    let mut backoff = Duration::from_millis(policy.interval_millis.unwrap_or(RETRY_BASE_MS));
    let cap = Duration::from_millis(RETRY_CAP_MS);
    let mut attempt: u32 = 0;

    loop {
        match brick.run(args.clone(), ctx.clone()).await {
            Ok(output) => return Ok(output),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                warn!(
                    brick = %brick.id(),
                    attempt,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "brick failed; retrying"
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

/// Business errors (including cancellation) carry their own meaning and pass
/// through bare; faults get a step frame recording where they happened.
fn frame_step_error(err: PipelineError, step: &BrickInvocation, step_index: usize) -> PipelineError {
    if err.is_business() {
        return err;
    }
    PipelineError::Step {
        brick_id: step.id.clone(),
        step_index,
        instance_id: step.instance_id,
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickflow_core::ApiVersion;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other:?}"),
        }
    }

    #[test]
    fn seed_context_merges_input_and_services() {
        let context = seed_context(
            None,
            &json!({ "@input": { "url": "https://example.com" } }),
            Some(&json!({ "@service": { "token": "abc" } })),
        );
        assert_eq!(
            Value::Object(context),
            json!({
                "@input": { "url": "https://example.com" },
                "@service": { "token": "abc" },
            })
        );
    }

    #[test]
    fn seed_context_prefers_exact_seed() {
        let context = seed_context(
            Some(json!({ "@element": 1 })),
            &json!({ "@input": {} }),
            None,
        );
        assert_eq!(Value::Object(context), json!({ "@element": 1 }));
    }

    #[test]
    fn step_scope_merges_previous_output_only_when_implicit() {
        let context = object(json!({ "@input": { "a": 1 }, "shared": "ctx" }));
        let previous = json!({ "fresh": true, "shared": "prev" });

        let implicit = step_scope(
            &context,
            &previous,
            &ApiVersionOptions::for_version(ApiVersion::V1),
        );
        assert_eq!(
            implicit,
            json!({ "@input": { "a": 1 }, "shared": "prev", "fresh": true })
        );

        let explicit = step_scope(
            &context,
            &previous,
            &ApiVersionOptions::for_version(ApiVersion::V3),
        );
        assert_eq!(explicit, json!({ "@input": { "a": 1 }, "shared": "ctx" }));
    }

    #[test]
    fn condition_accepts_bare_and_expression_values() {
        let api = ApiVersionOptions::default();
        let scope = json!({ "@flag": true, "@empty": "" });

        assert!(condition_holds(&json!(true), &scope, &api).unwrap());
        assert!(!condition_holds(&json!("false"), &scope, &api).unwrap());
        assert!(condition_holds(
            &json!({ "__type__": "var", "__value__": "@flag" }),
            &scope,
            &api
        )
        .unwrap());
        assert!(!condition_holds(
            &json!({ "__type__": "var", "__value__": "@empty" }),
            &scope,
            &api
        )
        .unwrap());
        // Unresolved variables are falsy, not an error.
        assert!(!condition_holds(
            &json!({ "__type__": "var", "__value__": "@missing" }),
            &scope,
            &api
        )
        .unwrap());
    }
}
