//! Test doubles: tiny bricks with predictable behavior.
//!
//! Public so downstream crates can exercise pipelines without real bricks.
//! All doubles are stateless except [`FlakyBrick`], which counts attempts
//! with an atomic so a shared instance stays `Sync`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use brickflow_core::{ApiVersionOptions, RegistryId};

use crate::brick::{Brick, BrickContext, BrickKind, BrickOutput, RunMetadata};
use crate::bricks::builtin_registry;
use crate::error::{PipelineError, PipelineResult};
use crate::registry::BrickRegistry;

/// Echoes its `message` argument back.
pub struct EchoBrick;

#[async_trait]
impl Brick for EchoBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/echo")
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
                "message": { "type": "string" },
            },
            "required": ["message"],
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
            },
        })
    }

    async fn run(&self, args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let message = args.get("message").cloned().unwrap_or(Value::Null);
        Ok(BrickOutput::Value(json!({ "message": message })))
    }
}

/// Returns a fixed object, ignoring its arguments.
pub struct TeapotBrick;

#[async_trait]
impl Brick for TeapotBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/teapot")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    fn is_pure(&self) -> bool {
        true
    }

    async fn run(&self, _args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        Ok(BrickOutput::Value(json!({ "prop": "I'm a teapot" })))
    }
}

/// Fails with a business error carrying the configured message.
pub struct ThrowBrick;

#[async_trait]
impl Brick for ThrowBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/throw")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Effect
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" },
            },
        })
    }

    async fn run(&self, args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        Err(PipelineError::business(message))
    }
}

/// Fails the first `failures` attempts, then succeeds with the attempt
/// count. Share one instance between the registry and the test assertion.
pub struct FlakyBrick {
    failures: u64,
    attempts: AtomicU64,
}

impl FlakyBrick {
    pub fn new(failures: u64) -> Self {
        Self {
            failures,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Brick for FlakyBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/flaky")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Transform
    }

    async fn run(&self, _args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(PipelineError::business(format!("flaky failure {attempt}")));
        }
        Ok(BrickOutput::Value(json!({ "attempts": attempt })))
    }
}

/// Reports the tag name of the root it was given. Only receives a root
/// because it opts in via `is_root_aware`.
pub struct RootAwareBrick;

#[async_trait]
impl Brick for RootAwareBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/root-aware")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Reader
    }

    fn is_root_aware(&self) -> bool {
        true
    }

    async fn run(&self, _args: Value, ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let tag_name = ctx
            .root
            .as_ref()
            .and_then(|root| root.get("tagName"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(BrickOutput::Value(json!({ "tagName": tag_name })))
    }
}

/// Renderer-kind double. Under headless reduction the reducer stops at it
/// and yields a render intent; run normally it returns its payload.
pub struct RendererBrick;

#[async_trait]
impl Brick for RendererBrick {
    fn id(&self) -> RegistryId {
        RegistryId::of("test/render")
    }

    fn kind(&self) -> BrickKind {
        BrickKind::Renderer
    }

    async fn run(&self, args: Value, _ctx: BrickContext) -> PipelineResult<BrickOutput> {
        let payload = args.get("payload").cloned().unwrap_or(Value::Null);
        Ok(BrickOutput::Value(payload))
    }
}

/// Built-ins plus every stateless double, ready to extend with per-test
/// bricks before wrapping in an `Arc`.
pub fn base_registry() -> BrickRegistry {
    let mut registry = builtin_registry();
    registry.register(Arc::new(EchoBrick));
    registry.register(Arc::new(TeapotBrick));
    registry.register(Arc::new(ThrowBrick));
    registry.register(Arc::new(RootAwareBrick));
    registry.register(Arc::new(RendererBrick));
    registry
}

/// [`base_registry`] wrapped for the reducer.
pub fn registry() -> Arc<BrickRegistry> {
    Arc::new(base_registry())
}

/// A context for running a brick directly, outside the reducer.
pub fn test_context() -> BrickContext {
    BrickContext {
        scope: Value::Object(Map::new()),
        root: None,
        api: ApiVersionOptions::default(),
        headless: false,
        cancel: CancellationToken::new(),
        registry: registry(),
        meta: RunMetadata::new(),
        instance_id: None,
    }
}
