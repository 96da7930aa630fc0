//! Editor-facing template analysis.
//!
//! The runtime treats template source as opaque; these helpers let editing
//! surfaces flag strings that cannot round-trip through simpler dotted-path
//! substitution and validate template syntax ahead of execution.

use std::sync::OnceLock;

use handlebars::Handlebars;
use regex::Regex;

use crate::error::{RenderError, RenderResult};
use crate::types::TemplateEngine;

/// Whether `text` contains mustache-specific syntax: triple-stache literals,
/// `&` unescaping, set-delimiter blocks, comments, sections, partials, or
/// inverted sections. Plain `{{variable}}` interpolation does not count.
pub fn is_mustache_only(text: &str) -> bool {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let re = REGEX.get_or_init(|| {
        Regex::new(r"\{\{\{|\{\{\s*[!#>^&=]").expect("mustache syntax pattern is valid")
    });
    re.is_match(text)
}

/// Compile-check a template without rendering it, surfacing the engine's
/// own error message for invalid syntax.
pub fn check_template(engine: TemplateEngine, source: &str) -> RenderResult<()> {
    match engine {
        TemplateEngine::Mustache | TemplateEngine::Handlebars => {
            let mut registry = Handlebars::new();
            registry
                .register_template_string("check", source)
                .map_err(|e| RenderError::Template {
                    engine: engine.as_str(),
                    message: e.to_string(),
                })
        }
        TemplateEngine::Nunjucks => {
            let env = minijinja::Environment::new();
            env.template_from_str(source)
                .map(|_| ())
                .map_err(|e| RenderError::Template {
                    engine: engine.as_str(),
                    message: e.to_string(),
                })
        }
    }
}
