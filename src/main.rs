//! # Check Studio CLI (`studio`)
//!
//! The `studio` binary is the primary interface for Check Studio. It provides
//! commands for indexing a check inventory, generating new checks and fixers,
//! updating compliance documents, and starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! studio --config ./config/studio.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `studio build-check-rag <path>` | Scan a check tree and build/refresh the index |
//! | `studio create-check "<prompt>"` | Generate a new check from a description |
//! | `studio create-fixer <check-id>` | Generate a fixer for an indexed check |
//! | `studio update-compliance <file>` | Attach checks to a compliance document |
//! | `studio serve api` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Index an existing check inventory
//! studio build-check-rag ./prowler --config ./config/studio.toml
//!
//! # Generate a check together with its remediation function
//! studio create-check "aws s3 buckets must block public access" \
//!     --with-fixer --save-check --output-directory ./generated
//!
//! # Generate a fixer for a check that already exists in the inventory
//! studio create-fixer s3_bucket_public_access
//!
//! # Map a compliance framework onto the indexed checks
//! studio update-compliance ./cis_1.5_aws.json --confidence-threshold 0.7
//!
//! # Start the HTTP API
//! studio serve api --config ./config/studio.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

use check_studio::config::{self, Config};
use check_studio::error::StudioError;
use check_studio::inventory;
use check_studio::llm;
use check_studio::models::ComplianceDocument;
use check_studio::output;
use check_studio::server;
use check_studio::store::VectorStore;
use check_studio::workflow::{check_creation, compliance, fixer_creation};

/// Check Studio CLI — an AI-assisted generator of cloud security checks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/studio.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "studio",
    about = "Check Studio — an AI-assisted generator of cloud security checks and fixers",
    version,
    long_about = "Check Studio indexes an existing inventory of cloud security checks as \
    embeddings and uses retrieval-augmented generation to draft new checks, remediation \
    functions, and compliance mappings that follow the conventions of the existing tree."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/studio.toml`. The store path, model, embedding,
    /// retrieval, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/studio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Scan a check source tree and build the metadata index.
    ///
    /// Walks `<path>/providers/`, embeds every check description, and
    /// persists the index in SQLite. When an index already exists the scan
    /// is diffed against it and only changed checks are re-embedded; pass
    /// `--overwrite` to rebuild from scratch instead.
    BuildCheckRag {
        /// Root of the check source tree (the directory containing `providers/`).
        path: PathBuf,

        /// Discard any existing index and rebuild it completely.
        #[arg(long)]
        overwrite: bool,
    },

    /// Generate a new check from a natural-language description.
    ///
    /// Retrieves the closest existing checks as examples, asks the
    /// configured LLM for metadata and code, and prints the result as JSON.
    /// If the request is already covered by an existing check, prints the
    /// covering checks instead of generating a duplicate.
    CreateCheck {
        /// What the new check must verify.
        prompt: String,

        /// Override the configured LLM provider (`gemini` or `openai`).
        #[arg(long)]
        model_provider: Option<String>,

        /// Override the configured model reference.
        #[arg(long)]
        model_reference: Option<String>,

        /// Also generate a remediation function for the check.
        #[arg(long)]
        with_fixer: bool,

        /// Write the generated check to disk instead of only printing it.
        #[arg(long)]
        save_check: bool,

        /// Directory the check is written under with `--save-check`.
        #[arg(long, default_value = "./generated_checks")]
        output_directory: PathBuf,
    },

    /// Generate a remediation function for an existing indexed check.
    ///
    /// Looks the check up in the index by name and asks the configured LLM
    /// for a fixer grounded in the check's stored code and description.
    CreateFixer {
        /// Name of the indexed check (e.g. `s3_bucket_public_access`).
        check_id: String,

        /// Override the configured LLM provider (`gemini` or `openai`).
        #[arg(long)]
        model_provider: Option<String>,

        /// Override the configured model reference.
        #[arg(long)]
        model_reference: Option<String>,
    },

    /// Attach related checks to a compliance framework document.
    ///
    /// Reads a JSON compliance document, searches the index with each
    /// requirement's description, fills in the `Checks` lists, and writes
    /// the document back in place.
    UpdateCompliance {
        /// Path to the compliance document (JSON).
        file: PathBuf,

        /// Override the configured cap on checks attached per requirement.
        #[arg(long)]
        max_check_number_per_requirement: Option<usize>,

        /// Override the configured minimum similarity for a match.
        #[arg(long)]
        confidence_threshold: Option<f32>,
    },

    /// Start the HTTP API server.
    ///
    /// Exposes the check creation and compliance workflows as a JSON API
    /// on the address configured in `[server].bind`.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the JSON API server.
    Api,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::BuildCheckRag { path, overwrite } => {
            run_build(&cfg, &path, overwrite).await?;
        }
        Commands::CreateCheck {
            prompt,
            model_provider,
            model_reference,
            with_fixer,
            save_check,
            output_directory,
        } => {
            run_create_check(
                &cfg,
                &prompt,
                model_provider.as_deref(),
                model_reference.as_deref(),
                with_fixer,
                save_check,
                &output_directory,
            )
            .await?;
        }
        Commands::CreateFixer {
            check_id,
            model_provider,
            model_reference,
        } => {
            run_create_fixer(
                &cfg,
                &check_id,
                model_provider.as_deref(),
                model_reference.as_deref(),
            )
            .await?;
        }
        Commands::UpdateCompliance {
            file,
            max_check_number_per_requirement,
            confidence_threshold,
        } => {
            run_update_compliance(
                &cfg,
                &file,
                max_check_number_per_requirement,
                confidence_threshold,
            )
            .await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => {
                server::run_server(&cfg).await?;
            }
        },
    }

    Ok(())
}

async fn run_build(cfg: &Config, path: &PathBuf, overwrite: bool) -> anyhow::Result<()> {
    let outcome = inventory::scan(path)?;
    for malformed in &outcome.malformed {
        warn!("{}", malformed);
    }

    let store = VectorStore::connect(&cfg.store.path, &cfg.embedding, None).await?;

    if store.has_index().await? && !overwrite {
        let previous = store.snapshot().await?;
        let delta = inventory::diff(&previous, &outcome.checks);
        // Even with no check delta the update refreshes the service table.
        store.update(&delta, &outcome.services).await?;
        if delta.is_empty() {
            println!("Index is up to date ({} checks).", outcome.checks.len());
        } else {
            println!(
                "Updating index: {} added, {} updated, {} removed.",
                delta.added.len(),
                delta.updated.len(),
                delta.removed.len()
            );
        }
    } else {
        store
            .build(&outcome.checks, &outcome.services, overwrite)
            .await?;
        println!(
            "Indexed {} checks across {} services.",
            outcome.checks.len(),
            outcome.services.len()
        );
    }

    if !outcome.malformed.is_empty() {
        println!("Skipped {} malformed checks.", outcome.malformed.len());
    }
    Ok(())
}

async fn run_create_check(
    cfg: &Config,
    prompt: &str,
    model_provider: Option<&str>,
    model_reference: Option<&str>,
    with_fixer: bool,
    save_check: bool,
    output_directory: &PathBuf,
) -> anyhow::Result<()> {
    let store = VectorStore::connect(&cfg.store.path, &cfg.embedding, None).await?;

    let provider = model_provider.unwrap_or(&cfg.models.llm_provider);
    let reference = model_reference.unwrap_or(&cfg.models.llm_reference);
    let model = llm::create_model(provider, reference, None, cfg.models.timeout_secs)?;

    let request = check_creation::CheckCreationRequest {
        user_query: prompt.to_string(),
        with_fixer,
    };

    match check_creation::run(&store, model.as_ref(), &cfg.retrieval, &request).await {
        Ok(check_creation::CheckCreationOutcome::Generated(check)) => {
            if save_check {
                let dir = output::write_check(output_directory, &check)?;
                println!("Check written to {}", dir.display());
            } else {
                println!("{}", serde_json::to_string_pretty(&check)?);
            }
            Ok(())
        }
        Ok(check_creation::CheckCreationOutcome::AlreadyCovered { existing }) => {
            println!("The request is already covered by existing checks:");
            for related in existing {
                println!("  {} (score {:.2})", related.id, related.score);
            }
            Ok(())
        }
        Err(err) => {
            if let StudioError::GenerationFailed { step, .. } = &err {
                eprintln!("Generation failed at step '{}'.", step);
            }
            Err(err.into())
        }
    }
}

async fn run_create_fixer(
    cfg: &Config,
    check_id: &str,
    model_provider: Option<&str>,
    model_reference: Option<&str>,
) -> anyhow::Result<()> {
    let store = VectorStore::connect(&cfg.store.path, &cfg.embedding, None).await?;

    let provider = model_provider.unwrap_or(&cfg.models.llm_provider);
    let reference = model_reference.unwrap_or(&cfg.models.llm_reference);
    let model = llm::create_model(provider, reference, None, cfg.models.timeout_secs)?;

    match fixer_creation::run(&store, model.as_ref(), check_id).await {
        Ok(generated) => {
            println!("{}", generated.fixer_code);
            Ok(())
        }
        Err(err) => {
            if let StudioError::GenerationFailed { step, .. } = &err {
                eprintln!("Generation failed at step '{}'.", step);
            }
            Err(err.into())
        }
    }
}

async fn run_update_compliance(
    cfg: &Config,
    file: &PathBuf,
    max_checks: Option<usize>,
    threshold: Option<f32>,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let mut document: ComplianceDocument = serde_json::from_str(&content).map_err(|e| {
        StudioError::InvalidArgument(format!(
            "{} is not a valid compliance document: {}",
            file.display(),
            e
        ))
    })?;

    let max_checks = max_checks.unwrap_or(cfg.retrieval.max_checks_per_requirement);
    let threshold = threshold.unwrap_or(cfg.retrieval.confidence_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("--confidence-threshold must be between 0.0 and 1.0");
    }

    let store = VectorStore::connect(&cfg.store.path, &cfg.embedding, None).await?;
    let report = compliance::update_compliance(&store, &mut document, max_checks, threshold).await?;

    std::fs::write(file, serde_json::to_string_pretty(&document)?)?;
    println!(
        "Processed {} requirements, attached {} checks.",
        report.requirements_processed, report.checks_attached
    );
    Ok(())
}
