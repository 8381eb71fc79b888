///
/// This module implements the CLI interface for msgraph-convert: command parsing,
/// argument validation, and the async entrypoint shared by `main` and the tests.
///
/// All conversion logic (pipeline, slicing, token caching) lives in the
/// [`msgraph-convert-core`] crate; HTTP wiring lives in [`crate::graph`] and
/// [`crate::auth`]. This module is strictly CLI glue.
///
/// ## Subcommands
/// - `convert`: convert one document (or stdin with `-`) and write the PDF.
/// - `check-auth`: perform the client-credentials exchange and report the token lifetime.
///
/// [`msgraph-convert-core`]: ../../msgraph-convert-core/
use crate::auth::ClientSecretCredential;
use crate::graph::build_converter;
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use msgraph_convert_core::contract::CredentialProvider;
use msgraph_convert_core::convert::ConversionSource;
use std::path::{Path, PathBuf};

/// CLI for msgraph-convert: Office documents to PDF through Microsoft Graph.
#[derive(Parser)]
#[clap(
    name = "msgraph-convert",
    version,
    about = "Convert DOCX/XLSX/PPTX to PDF by round-tripping through a SharePoint site drive"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert a document to PDF
    Convert {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Document to convert, or `-` to read from stdin
        #[clap(long)]
        input: PathBuf,
        /// Where to write the PDF (defaults to the input path with a .pdf extension)
        #[clap(long)]
        output: Option<PathBuf>,
        /// Document extension, e.g. `.xlsx` (defaults to the input file's, then `.docx`)
        #[clap(long)]
        ext: Option<String>,
    },
    /// Acquire an access token to verify the configured credentials
    CheckAuth {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

fn is_stdin(input: &Path) -> bool {
    input.as_os_str() == "-"
}

/// Output path when none was given: the input with its extension swapped for `.pdf`.
pub fn default_output(input: &Path) -> Option<PathBuf> {
    if is_stdin(input) {
        None
    } else {
        Some(input.with_extension("pdf"))
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert {
            config,
            input,
            output,
            ext,
        } => {
            let output = match output.or_else(|| default_output(&input)) {
                Some(path) => path,
                None => anyhow::bail!("--output is required when reading from stdin"),
            };
            let config = load_config(config)?;
            tracing::info!(command = "convert", input = %input.display(), "Starting conversion");

            let converter = build_converter(
                config.auth,
                config.converter,
                Some(config.request_timeout),
            )?;
            let source = if is_stdin(&input) {
                ConversionSource::Stream {
                    reader: Box::new(tokio::io::stdin()),
                    length: None,
                }
            } else {
                ConversionSource::File(input.clone())
            };

            match converter.convert(source, ext.as_deref()).await {
                Ok(pdf) => {
                    tokio::fs::write(&output, &pdf)
                        .await
                        .with_context(|| format!("Failed to write {}", output.display()))?;
                    tracing::info!(command = "convert", bytes = pdf.len(), "Conversion complete");
                    println!(
                        "Converted {} -> {} ({} bytes)",
                        input.display(),
                        output.display(),
                        pdf.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "convert", error = %e, "Conversion failed");
                    Err(anyhow::Error::new(e).context(format!("Converting {}", input.display())))
                }
            }
        }
        Commands::CheckAuth { config } => {
            let config = load_config(config)?;
            let http = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .context("Failed to build HTTP client")?;
            let credential = ClientSecretCredential::new(config.auth, http);
            let token = credential
                .get_token()
                .await
                .context("Client-credentials exchange failed")?;
            tracing::info!(command = "check-auth", "Token acquired");
            println!(
                "Authenticated; token expires in {}s",
                token.remaining().as_secs()
            );
            Ok(())
        }
    }
}
