//! Brickflow runtime - sequential brick pipeline execution
//!
//! This crate runs pipelines built from the `brickflow-core` data model: a
//! registry of [`Brick`] implementations, a strictly sequential reducer that
//! renders each step's arguments against the accumulating context, built-in
//! control-flow and transform bricks, and test doubles for exercising
//! pipelines end to end.
//!
//! ## Quick Start
//!
//! ```rust
//! use brickflow_core::BrickInvocation;
//! use brickflow_runtime::{reduce_pipeline, testing, InitialValues, PipelineOutcome, RunOptions};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pipeline: Vec<BrickInvocation> = serde_json::from_value(json!([
//!     {
//!         "id": "test/echo",
//!         "config": {
//!             "message": { "__type__": "nunjucks", "__value__": "Hello, {{ name }}!" },
//!         },
//!     },
//! ]))
//! .unwrap();
//!
//! let outcome = reduce_pipeline(
//!     &pipeline,
//!     InitialValues::new(json!({ "name": "Ada" })),
//!     &testing::registry(),
//!     &RunOptions::default(),
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(
//!     outcome,
//!     PipelineOutcome::Completed(json!({ "message": "Hello, Ada!" }))
//! );
//! # }
//! ```

// Brick trait, run context, and outputs
pub mod brick;

// Built-in bricks (control flow, regex, JSON parsing)
pub mod bricks;

// Runtime error taxonomy
pub mod error;

// The sequential pipeline reducer
pub mod reducer;

// Brick registry and pipeline pre-flight checks
pub mod registry;

// Test doubles
pub mod testing;

// Brick surface
pub use brick::{Brick, BrickContext, BrickKind, BrickOutput, RunMetadata};

// Registry
pub use registry::BrickRegistry;

// Built-ins
pub use bricks::builtin_registry;

// Reduction entry points and outcomes
pub use reducer::{
    reduce_pipeline, run_headless, InitialValues, PipelineOutcome, RenderIntent, RunOptions,
};

// Errors
pub use error::{
    BusinessError, InputValidationError, PipelineError, PipelineResult, ValidationErrorDetail,
};
