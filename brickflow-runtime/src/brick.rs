//! The brick capability interface.
//!
//! A brick is one unit of pipeline functionality behind an object-safe async
//! trait. The reducer owns sequencing, rendering, validation, and binding;
//! a brick only sees its rendered arguments and a [`BrickContext`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use brickflow_core::{ApiVersionOptions, RegistryId};

use crate::error::PipelineResult;
use crate::reducer::RenderIntent;
use crate::registry::BrickRegistry;

/// What a brick does with its inputs. Renderers are special under headless
/// execution: the reducer stops at them instead of running them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrickKind {
    /// Produces data from the environment.
    Reader,
    /// Computes an output from its arguments.
    Transform,
    /// Acts on the environment; output is incidental.
    Effect,
    /// Produces a payload for a rendering surface.
    Renderer,
}

impl BrickKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Transform => "transform",
            Self::Effect => "effect",
            Self::Renderer => "renderer",
        }
    }
}

/// Identity of one pipeline run, attached to log lines for correlation.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub mod_id: Option<String>,
    pub component_id: Option<String>,
}

impl RunMetadata {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mod_id: None,
            component_id: None,
        }
    }
}

/// Everything a brick may consult while running.
///
/// Cheap to clone; control-flow bricks clone it per branch and hand copies
/// to their sub-runs.
#[derive(Clone)]
pub struct BrickContext {
    /// The step scope the arguments were rendered against.
    pub scope: Value,
    /// Inherited root descriptor. `None` unless the brick is root-aware.
    pub root: Option<Value>,
    pub api: ApiVersionOptions,
    pub headless: bool,
    pub cancel: CancellationToken,
    /// Registry handle for control-flow bricks that reduce sub-pipelines.
    pub registry: Arc<BrickRegistry>,
    pub meta: RunMetadata,
    /// Step instance id from the editor, for log correlation.
    pub instance_id: Option<Uuid>,
}

/// What a brick's `run` produced.
///
/// Almost always a plain value. Control-flow bricks that reduce a nested
/// pipeline may instead surface a render intent from a headless sub-run; it
/// bubbles through untouched until the reducer returns it to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum BrickOutput {
    Value(Value),
    Render(RenderIntent),
}

impl From<Value> for BrickOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// A unit of functionality executable inside a pipeline.
///
/// Implementations are shared: the registry holds one instance per id and
/// independent runs may call `run` concurrently, so state must live in the
/// arguments and context. (Test doubles that count calls use atomics.)
#[async_trait]
pub trait Brick: Send + Sync {
    /// Registry id, e.g. `contrib/regex`.
    fn id(&self) -> RegistryId;

    fn kind(&self) -> BrickKind;

    /// Whether the brick consumes the inherited root descriptor. The reducer
    /// withholds the root from bricks that do not opt in.
    fn is_root_aware(&self) -> bool {
        false
    }

    /// Pure bricks compute from arguments alone and may be re-run freely.
    fn is_pure(&self) -> bool {
        false
    }

    /// JSON Schema the rendered arguments must satisfy. `null` disables
    /// validation.
    fn input_schema(&self) -> Value {
        Value::Null
    }

    /// JSON Schema of the produced output, when statically known.
    fn output_schema(&self) -> Value {
        Value::Null
    }

    /// Config-dependent refinement of [`Brick::output_schema`], computed from
    /// the raw (unrendered) step config.
    fn output_schema_for(&self, _config: &Value) -> Value {
        self.output_schema()
    }

    /// Execute with rendered arguments. Expression-valued fields declared as
    /// stop points (`pipeline`, `defer`) arrive unrendered.
    async fn run(&self, args: Value, ctx: BrickContext) -> PipelineResult<BrickOutput>;
}
