use anyhow::{anyhow, bail, Context, Result};
use api_docs::{DocumentService, EndpointDescription};
use clap::{Parser, Subcommand, ValueEnum};
use modkit_openapi::Document;
use runtime::{AppConfig, CliArgs};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// HyperSpot OpenAPI - builds deduplicated OpenAPI documents from a route table dump
#[derive(Parser)]
#[command(name = "hyperspot-openapi")]
#[command(about = "HyperSpot OpenAPI - builds deduplicated OpenAPI documents from endpoint descriptions")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint descriptions (.json, .yaml or .yml)
    #[arg(short, long)]
    endpoints: Option<PathBuf>,

    /// Document to build (repeatable; default: every configured document)
    #[arg(short, long = "document")]
    documents: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Write one file per document into this directory instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Application name used in document titles (overrides config)
    #[arg(long)]
    app_name: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the documents
    Build,
    /// Validate configuration and endpoint descriptions
    Check,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    fn render(self, doc: &Document) -> Result<String> {
        match self {
            OutputFormat::Json => {
                serde_json::to_string_pretty(doc).context("Failed to serialize document to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(doc).context("Failed to serialize document to YAML")
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        app_name: cli.app_name.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.clone().unwrap_or_default();
    runtime::init_logging_from_config(&logging_config, &config.app.home_path());
    tracing::info!("HyperSpot OpenAPI starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.as_ref().unwrap_or(&Commands::Build) {
        Commands::Build => build(&cli, &config).await,
        Commands::Check => check(&cli, &config),
    }
}

fn load_endpoints(path: &Path) -> Result<Vec<EndpointDescription>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read endpoints from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid endpoint descriptions in {}", path.display())),
        _ => serde_json::from_str(&raw)
            .with_context(|| format!("Invalid endpoint descriptions in {}", path.display())),
    }
}

fn require_endpoints(cli: &Cli) -> Result<Vec<EndpointDescription>> {
    let path = cli
        .endpoints
        .as_deref()
        .ok_or_else(|| anyhow!("No endpoint descriptions given (use --endpoints <file>)"))?;
    load_endpoints(path)
}

/// Requested document names, validated against the configuration.
fn selected_documents(cli: &Cli, service: &DocumentService) -> Result<Vec<String>> {
    let known = service.document_names();
    if cli.documents.is_empty() {
        return Ok(known);
    }
    for name in &cli.documents {
        if !known.contains(name) {
            bail!("Unknown document '{}' (configured: {})", name, known.join(", "));
        }
    }
    Ok(cli.documents.clone())
}

async fn build(cli: &Cli, config: &AppConfig) -> Result<()> {
    let endpoints: Arc<[EndpointDescription]> = require_endpoints(cli)?.into();
    let service = DocumentService::from_app_config(config)?;
    let names = selected_documents(cli, &service)?;

    let mut results = service.build_selected(endpoints, &names).await;
    let mut failed = Vec::new();
    for name in names {
        let Some(result) = results.remove(&name) else {
            continue;
        };
        match result {
            Ok(doc) => emit(cli, &name, &doc)?,
            Err(e) => {
                eprintln!("Document '{name}' failed: {e}");
                failed.push(name);
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!("Failed to build: {}", failed.join(", ")))
    }
}

fn emit(cli: &Cli, name: &str, doc: &Document) -> Result<()> {
    let rendered = cli.format.render(doc)?;
    match &cli.out {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let path = dir.join(format!("{name}.{}", cli.format.extension()));
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(document = %name, path = %path.display(), "Wrote OpenAPI document");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn check(cli: &Cli, config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let service = DocumentService::from_app_config(config)?;
    let names = selected_documents(cli, &service)?;

    println!("Configuration check passed");
    println!("Documents: {}", names.join(", "));

    if cli.endpoints.is_some() {
        let endpoints = require_endpoints(cli)?;
        println!("Endpoints: {}", endpoints.len());
    }
    Ok(())
}
