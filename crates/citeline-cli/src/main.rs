use citeline_core::wml::{locate_reference_section, split_paragraphs};
use citeline_core::{
    ChangeRequest, CitationEngine, DocxPackage, EngineSettings, ReferenceEntry, ZipStore,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "citeline")]
#[command(about = "DOCX citation rewriting tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a change set to a document, producing a rewritten package and
    /// a summary.
    Apply {
        /// Input document package
        #[arg(short, long)]
        input: PathBuf,

        /// Change-set JSON: {"changes": [...], "references": [...]}
        #[arg(short, long)]
        changes: PathBuf,

        /// Output document package
        #[arg(short, long)]
        output: PathBuf,

        /// Apply edits cleanly instead of emitting revision markup
        #[arg(long)]
        accept: bool,

        /// Write the summary JSON here instead of stdout
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Tenant identifier for admission control
        #[arg(long, default_value = "cli")]
        tenant: String,
    },
    /// Inspect a document package.
    Info {
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Deserialize)]
struct ChangeSet {
    changes: Vec<ChangeRequest>,
    #[serde(default)]
    references: Vec<ReferenceEntry>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Apply {
            input,
            changes,
            output,
            accept,
            summary,
            tenant,
        } => {
            let package_bytes = std::fs::read(&input)
                .map_err(|e| format!("reading {}: {e}", input.display()))?;
            let change_set: ChangeSet = serde_json::from_slice(
                &std::fs::read(&changes)
                    .map_err(|e| format!("reading {}: {e}", changes.display()))?,
            )
            .map_err(|e| format!("parsing {}: {e}", changes.display()))?;

            let engine =
                CitationEngine::new(EngineSettings::default().with_accept_changes(accept));
            let result = engine
                .apply(
                    &package_bytes,
                    &tenant,
                    &change_set.changes,
                    &change_set.references,
                )
                .map_err(|e| format!("{} ({})", e, e.code()))?;

            std::fs::write(&output, &result.bytes)
                .map_err(|e| format!("writing {}: {e}", output.display()))?;

            let summary_json = serde_json::to_string_pretty(&result.summary)
                .map_err(|e| e.to_string())?;
            match summary {
                Some(path) => std::fs::write(&path, summary_json)
                    .map_err(|e| format!("writing {}: {e}", path.display()))?,
                None => println!("{summary_json}"),
            }
            Ok(())
        }
        Commands::Info { file } => {
            let bytes =
                std::fs::read(&file).map_err(|e| format!("reading {}: {e}", file.display()))?;
            let package = DocxPackage::new(ZipStore::in_memory(bytes));
            let xml = package
                .document_xml()
                .map_err(|e| format!("{} ({})", e, e.code()))?;
            let xml = String::from_utf8(xml).map_err(|e| e.to_string())?;

            let settings = EngineSettings::default();
            let paragraphs = split_paragraphs(&xml, &settings.scan);
            let section = locate_reference_section(&xml, &settings);
            let track_changes = package
                .track_changes_enabled()
                .map_err(|e| e.to_string())?;

            println!("Document: {}", file.display());
            println!("  Paragraphs: {}", paragraphs.len());
            match section {
                Some(split) => {
                    println!("  Reference section: \"{}\"", split.header.text.trim());
                    println!("  Reference entries: {}", split.entries.len());
                }
                None => println!("  Reference section: not found"),
            }
            println!("  Track changes enabled: {track_changes}");
            Ok(())
        }
    }
}
