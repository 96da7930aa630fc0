//! Execution error taxonomy.
//!
//! Two families matter to callers: business errors, which a brick raises
//! deliberately as part of its contract (including cancellation), and runtime
//! faults, which get wrapped in a step frame recording where in the pipeline
//! they happened. Classification drives retry, logging, and exit reporting.

use brickflow_core::{KeyError, RegistryId, RenderError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Deliberate, user-facing failure raised by a brick.
///
/// Business errors propagate bare: they carry their own meaning and never
/// get a step frame.
#[derive(Debug, Clone, Error)]
pub enum BusinessError {
    #[error("{0}")]
    General(String),

    /// Cancellation is a business outcome, not a fault: stop the run without
    /// a reportable failure. Never retried.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

/// One schema violation inside an [`InputValidationError`].
#[derive(Debug, Clone, Serialize)]
pub struct ValidationErrorDetail {
    pub error: String,
    #[serde(rename = "keywordLocation")]
    pub keyword_location: String,
}

/// Rendered arguments rejected by the brick's input schema.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct InputValidationError {
    pub message: String,
    pub schema: serde_json::Value,
    pub errors: Vec<ValidationErrorDetail>,
}

/// Anything that can stop a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Business(#[from] BusinessError),

    /// A step names a brick the registry does not know. Raised before the
    /// first step runs; ids nested in `!pipeline` bodies are checked too.
    #[error("brick not registered: {id}")]
    BrickNotFound { id: RegistryId },

    #[error(transparent)]
    InputValidation(Box<InputValidationError>),

    /// Headless run ended without reaching a renderer brick.
    #[error("pipeline completed without a renderer")]
    NoRenderer,

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Key(#[from] KeyError),

    /// Step frame around a fault: which brick, at which position. The cause
    /// chain stays intact through `source`.
    #[error("brick {brick_id} failed at step {step_index}")]
    Step {
        brick_id: RegistryId,
        step_index: usize,
        instance_id: Option<Uuid>,
        #[source]
        source: Box<PipelineError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn business(message: impl Into<String>) -> Self {
        Self::Business(BusinessError::General(message.into()))
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Business(BusinessError::Cancelled(reason.into()))
    }

    /// Whether this is a deliberate brick outcome rather than a fault.
    pub fn is_business(&self) -> bool {
        match self {
            Self::Business(_) => true,
            Self::Step { source, .. } => source.is_business(),
            _ => false,
        }
    }

    /// Whether the run stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Business(BusinessError::Cancelled(_)) => true,
            Self::Step { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
