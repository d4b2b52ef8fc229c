//! `strata` CLI.
//!
//! Usage:
//!   strata generate --model gpt-3.5-turbo --template "..." --var key=value [--debug]
//!   strata models

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use strata::config::Config;
use strata::{LlmService, ModelDescriptor, PromptTemplate};

#[derive(Parser)]
#[command(name = "strata", version, about = "Run prompt templates against language models")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "strata.yaml", value_name = "FILE")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill a template and run it against a model
    Generate {
        /// Registered model name
        #[arg(short, long)]
        model: String,

        /// Prompt template with `{name}` placeholders
        #[arg(short, long)]
        template: String,

        /// Template value as key=value (repeatable)
        #[arg(long = "var", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Include the debug report in the output
        #[arg(long)]
        debug: bool,

        /// API key (defaults to the model's configured environment variable)
        #[arg(long)]
        api_key: Option<String>,
    },

    /// List registered models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let service = LlmService::from_config(&config);

    match cli.command {
        Commands::Generate {
            model,
            template,
            vars,
            debug,
            api_key,
        } => cmd_generate(&service, model, &template, vars, debug, api_key).await,
        Commands::Models => {
            cmd_models(&service);
            Ok(())
        }
    }
}

async fn cmd_generate(
    service: &LlmService,
    model: String,
    template: &str,
    vars: Vec<(String, String)>,
    debug: bool,
    api_key: Option<String>,
) -> Result<()> {
    let api_key = api_key.or_else(|| {
        service
            .registry()
            .get(&model)
            .and_then(|spec| spec.api_key_env.as_deref())
            .and_then(|var| std::env::var(var).ok())
    });
    let mut descriptor = ModelDescriptor::new(model);
    descriptor.api_key = api_key;

    let template = PromptTemplate::from_template(template).context("invalid template")?;
    let variables: HashMap<String, String> = vars.into_iter().collect();

    match service
        .generate_output(&descriptor, &template, &variables, debug)
        .await
    {
        Ok(generation) => {
            println!("{}", serde_json::to_string_pretty(&generation)?);
            Ok(())
        }
        Err(e) => bail!("{} ({})", e, e.code()),
    }
}

fn cmd_models(service: &LlmService) {
    for name in service.registry().names() {
        if let Some(spec) = service.registry().get(name) {
            println!("{:<24} {:<10} {}", spec.name, spec.provider, spec.model);
        }
    }
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}
