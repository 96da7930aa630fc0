//! Command line runner for brick pipelines.
//!
//! Loads a definition from brick YAML (custom `!var`, `!mustache`,
//! `!nunjucks`, `!handlebars`, `!pipeline`, and `!defer` tags), reduces it
//! against the built-in registry, and prints the outcome as JSON. Logging
//! goes to stderr and is controlled through `RUST_LOG`.
//!
//! # Usage
//!
//! ```bash
//! # Run a pipeline with input bindings
//! brickflow run pipeline.yaml --input '{"name": "Ada"}'
//!
//! # Stop at the first renderer and print its render intent
//! brickflow run pipeline.yaml --headless
//!
//! # Structural check without running
//! brickflow check pipeline.yaml --resolve
//!
//! # List available bricks
//! brickflow bricks --verbose
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use brickflow_core::{
    expression_tag, load_brick_yaml, ApiVersion, ApiVersionOptions, BrickInvocation,
    ExpressionTag, VALUE_FIELD,
};
use brickflow_runtime::{
    builtin_registry, reduce_pipeline, run_headless, InitialValues, PipelineError,
    PipelineOutcome, RenderIntent, RunOptions,
};

#[derive(Parser)]
#[command(name = "brickflow")]
#[command(version)]
#[command(about = "Run and inspect brick pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline definition to completion
    Run {
        /// Pipeline YAML file (`-` reads stdin)
        file: PathBuf,

        /// Input bindings as a JSON object
        #[arg(long, default_value = "{}")]
        input: String,

        /// Root element descriptor as a JSON object
        #[arg(long)]
        root: Option<String>,

        /// Schema version governing rendering: v1, v2, or v3. Overrides the
        /// definition's `apiVersion`.
        #[arg(long)]
        api_version: Option<String>,

        /// Stop at the first renderer and print its render intent
        #[arg(long)]
        headless: bool,
    },

    /// Load and check a definition without running it
    Check {
        /// Pipeline YAML file (`-` reads stdin)
        file: PathBuf,

        /// Also resolve every brick id against the built-in registry
        #[arg(long)]
        resolve: bool,
    },

    /// List registered bricks
    Bricks {
        /// Include input schemas
        #[arg(long)]
        verbose: bool,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            file,
            input,
            root,
            api_version,
            headless,
        } => cmd_run(file, input, root, api_version, headless).await,
        Commands::Check { file, resolve } => cmd_check(file, resolve),
        Commands::Bricks { verbose } => cmd_bricks(verbose),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

/// Business failures print their own message; faults print the whole cause
/// chain.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<PipelineError>() {
        Some(pipeline_err) if pipeline_err.is_business() => {
            eprintln!("{}: {pipeline_err}", "error".red().bold());
        }
        _ => {
            eprintln!("{}: {err:#}", "error".red().bold());
        }
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_run(
    file: PathBuf,
    input: String,
    root: Option<String>,
    api_version: Option<String>,
    headless: bool,
) -> Result<()> {
    let definition = load_definition(&file)?;
    let api = resolve_api(&definition, api_version.as_deref())?;
    let pipeline = pipeline_steps(&definition)?;
    debug!(steps = pipeline.len(), api = %api.version, "definition loaded");

    let input: Value = serde_json::from_str(&input).context("--input is not valid JSON")?;
    let root: Option<Value> = root
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .context("--root is not valid JSON")?;

    let initial = InitialValues {
        root,
        ..InitialValues::new(input)
    };
    let registry = Arc::new(builtin_registry());
    let options = RunOptions::new(api);

    if headless {
        let intent = run_headless(&pipeline, initial, &registry, &options).await?;
        println!("{}", intent_json(&intent)?);
        return Ok(());
    }

    match reduce_pipeline(&pipeline, initial, &registry, &options).await? {
        PipelineOutcome::Completed(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        // Only headless runs yield intents, but print one if it ever shows up.
        PipelineOutcome::RenderIntent(intent) => {
            println!("{}", intent_json(&intent)?);
        }
    }
    Ok(())
}

fn cmd_check(file: PathBuf, resolve: bool) -> Result<()> {
    let definition = load_definition(&file)?;
    let pipeline = pipeline_steps(&definition)?;

    if resolve {
        builtin_registry().check_pipeline(&pipeline)?;
    }

    println!("{} {} step(s)", "OK".green().bold(), pipeline.len());
    Ok(())
}

fn cmd_bricks(verbose: bool) -> Result<()> {
    let registry = builtin_registry();
    for brick in registry.all_bricks() {
        let mut flags = Vec::new();
        if brick.is_root_aware() {
            flags.push("root-aware");
        }
        if brick.is_pure() {
            flags.push("pure");
        }
        let suffix = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        println!(
            "{} {}{}",
            brick.id().to_string().green().bold(),
            brick.kind().as_str().cyan(),
            suffix.dimmed()
        );

        if verbose {
            let schema = brick.input_schema();
            if !schema.is_null() {
                println!("{}", indent(&serde_json::to_string_pretty(&schema)?));
            }
        }
    }
    Ok(())
}

// =============================================================================
// HELPERS
// =============================================================================

fn load_definition(file: &Path) -> Result<Value> {
    let raw = if file == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?
    };
    load_brick_yaml(&raw).context("failed to load brick YAML")
}

/// A definition is either a bare step sequence or a mapping with a
/// `pipeline` entry (and optionally an `apiVersion`). The entry may be a
/// plain sequence or a `!pipeline` tagged expression.
fn pipeline_steps(definition: &Value) -> Result<Vec<BrickInvocation>> {
    let mut steps = match definition {
        Value::Array(_) => definition.clone(),
        Value::Object(map) => map
            .get("pipeline")
            .cloned()
            .ok_or_else(|| anyhow!("definition has no `pipeline` entry"))?,
        _ => bail!("definition must be a step sequence or a mapping with a `pipeline` entry"),
    };
    if expression_tag(&steps) == Some(ExpressionTag::Pipeline) {
        steps = steps.get(VALUE_FIELD).cloned().unwrap_or_else(|| json!([]));
    }
    serde_json::from_value(steps).context("invalid pipeline steps")
}

fn resolve_api(definition: &Value, flag: Option<&str>) -> Result<ApiVersionOptions> {
    let declared = definition.get("apiVersion").and_then(Value::as_str);
    let version = match flag.or(declared) {
        Some(tag) => ApiVersion::parse(tag).ok_or_else(|| anyhow!("unknown api version: {tag}"))?,
        None => ApiVersion::V3,
    };
    Ok(ApiVersionOptions::for_version(version))
}

fn intent_json(intent: &RenderIntent) -> Result<String> {
    let value = json!({
        "renderer": intent.brick_id.as_str(),
        "args": intent.args,
        "outputKey": intent.output_key.as_ref().map(|key| key.as_str()),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
