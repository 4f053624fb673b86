//! Schema Build CLI
//!
//! Compiles schema documents into a package plus migrations and prints the
//! build response.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use schema_dsl::{
    build, BuildRequest, CommentBinding, CompilerConfig, JsonCodec, OutputFormat, ResponseCodec,
    SchemaLoader,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-build")]
#[command(about = "Compile schema documents into a package")]
struct Cli {
    /// Explicit config file, layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a package and print the response
    Build {
        /// Schema documents, or directories searched for *.json
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Appended to the package name
        #[arg(short, long)]
        file_name: Option<String>,

        /// Ship migrations starting at this schema version
        #[arg(long)]
        from_version: Option<u64>,

        /// Comment bindings (JSON array)
        #[arg(long)]
        comments: Option<PathBuf>,

        /// Write the response here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compact JSON output
        #[arg(long)]
        compact: bool,
    },

    /// Check documents for errors without printing the package
    Check {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write the effective configuration to a file
    Init {
        #[arg(default_value = "schema-dsl.toml")]
        path: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Ok(false) when the build reported schema errors
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = CompilerConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Build {
            inputs,
            file_name,
            from_version,
            comments,
            output,
            compact,
        } => {
            if file_name.is_some() {
                config.package.file_name = file_name;
            }
            if compact {
                config.output.format = OutputFormat::Compact;
            }
            let comment_bindings = match comments {
                Some(path) => read_comment_bindings(&path)?,
                None => Vec::new(),
            };
            let response = run_build(&config, &inputs, from_version, comment_bindings)?;
            let ok = response.is_ok();

            let bytes = JsonCodec::new(config.output.format).encode(&response)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), "wrote response");
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
            Ok(ok)
        }
        Commands::Check { inputs } => {
            let response = run_build(&config, &inputs, None, Vec::new())?;
            for error in &response.errors {
                eprintln!("{}: {}", error.code, error.message);
            }
            if let Some(checksum) = &response.package_checksum {
                println!("ok {}", checksum);
            }
            Ok(response.is_ok())
        }
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => print!("{}", toml::to_string_pretty(&config)?),
                ConfigAction::Init { path } => {
                    config
                        .save(&path)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
            }
            Ok(true)
        }
    }
}

fn run_build(
    config: &CompilerConfig,
    inputs: &[PathBuf],
    from_version: Option<u64>,
    comment_bindings: Vec<CommentBinding>,
) -> anyhow::Result<schema_dsl::DslResponse> {
    let mut loader = SchemaLoader::new();
    for path in collect_documents(inputs) {
        loader
            .add_path(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }

    let mut config = config.clone();
    let schema = match loader.finish() {
        Ok(schema) => schema,
        // registration problems are schema errors, not tool failures
        Err(e) => return Ok(schema_dsl::DslResponse::from_errors(vec![e.details()])),
    };
    if let Some(defaults) = schema.defaults.clone() {
        config.defaults = defaults;
    }

    let request = BuildRequest {
        exports: schema.exports,
        migrations: schema.migrations,
        options: config.assembly_options(),
        from_version,
        comment_bindings,
    };
    Ok(build(&schema.registry, &request))
}

fn collect_documents(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_file() {
            documents.push(input.clone());
            continue;
        }
        let mut found: Vec<PathBuf> = walkdir::WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        found.sort();
        debug!(dir = %input.display(), documents = found.len(), "scanned directory");
        documents.extend(found);
    }
    documents
}

fn read_comment_bindings(path: &Path) -> anyhow::Result<Vec<CommentBinding>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse comment bindings in {}", path.display()))
}
