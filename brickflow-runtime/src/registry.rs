//! Brick registry: explicit id-to-instance table.
//!
//! There is no global singleton. A registry is built once, wrapped in an
//! `Arc`, and handed to the reducer; control-flow bricks receive the same
//! handle through their context for recursive reduction.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use brickflow_core::{expression_tag, BrickInvocation, ExpressionTag, RegistryId, VALUE_FIELD};

use crate::brick::Brick;
use crate::error::{PipelineError, PipelineResult};

#[derive(Default)]
pub struct BrickRegistry {
    bricks: HashMap<RegistryId, Arc<dyn Brick>>,
}

impl BrickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a brick under its own id. Re-registering an id replaces the
    /// previous instance.
    pub fn register(&mut self, brick: Arc<dyn Brick>) {
        let id = brick.id();
        if self.bricks.insert(id.clone(), brick).is_some() {
            warn!(%id, "replaced existing brick registration");
        }
    }

    pub fn lookup(&self, id: &RegistryId) -> Option<Arc<dyn Brick>> {
        self.bricks.get(id).cloned()
    }

    pub fn contains(&self, id: &RegistryId) -> bool {
        self.bricks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.bricks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bricks.is_empty()
    }

    /// All registered bricks, ordered by id.
    pub fn all_bricks(&self) -> Vec<&Arc<dyn Brick>> {
        let mut entries: Vec<_> = self.bricks.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries.into_iter().map(|(_, brick)| brick).collect()
    }

    // -----------------------------------------------------------------------
    // Fail-fast resolution
    // -----------------------------------------------------------------------

    /// Resolve every brick id a pipeline references, including ids inside
    /// nested `!pipeline` expression bodies, before anything runs. The first
    /// unknown id fails the whole run up front rather than mid-pipeline.
    pub fn check_pipeline(&self, pipeline: &[BrickInvocation]) -> PipelineResult<()> {
        for step in pipeline {
            if !self.contains(&step.id) {
                return Err(PipelineError::BrickNotFound { id: step.id.clone() });
            }
            for value in step.config.values() {
                self.check_config_value(value)?;
            }
        }
        Ok(())
    }

    fn check_config_value(&self, value: &Value) -> PipelineResult<()> {
        if expression_tag(value) == Some(ExpressionTag::Pipeline) {
            let Some(Value::Array(steps)) = value.get(VALUE_FIELD) else {
                return Ok(());
            };
            for step in steps {
                if let Some(id) = step.get("id").and_then(Value::as_str) {
                    let id = RegistryId::new(id)?;
                    if !self.contains(&id) {
                        return Err(PipelineError::BrickNotFound { id });
                    }
                }
                if let Some(Value::Object(config)) = step.get("config") {
                    for entry in config.values() {
                        self.check_config_value(entry)?;
                    }
                }
            }
            return Ok(());
        }

        // Pipelines may also hide under defer bodies or plain containers.
        match value {
            Value::Object(map) => {
                for entry in map.values() {
                    self.check_config_value(entry)?;
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    self.check_config_value(item)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
