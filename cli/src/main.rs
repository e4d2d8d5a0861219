//! modflow operator CLI
//!
//! Runs relationship rules against a schema snapshot without a server:
//!
//!   modflow apply --schema schema.json --records records.json --module <id> --record <id>
//!   modflow ref build <moduleId> <fieldId>
//!   modflow ref parse '$<moduleId>-$<fieldId>' --schema schema.json
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use modflow_cli::{ApplyArgs, apply, build_ref, load_registry, parse_ref};
use modflow_types::{FieldId, ModuleId};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modflow")]
#[command(about = "Evaluate modflow relationship rules against a schema snapshot")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Raise one lifecycle event and print the evaluation report
    Apply(ApplyArgs),

    /// Build or parse `$<moduleId>-$<fieldId>` field references
    Ref {
        #[command(subcommand)]
        command: RefCommand,
    },
}

#[derive(Subcommand, Debug)]
enum RefCommand {
    /// Print the reference for a module field
    Build { module: ModuleId, field: FieldId },

    /// Split a reference into its ids
    Parse {
        reference: String,

        /// Registry snapshot to resolve names against
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    match args.command {
        Command::Apply(apply_args) => {
            let output = apply(&apply_args).await?;
            if output.report.is_clean() {
                info!("{} rule outcomes, no failures", output.report.outcomes.len());
            } else {
                warn!(
                    "{} failed rules, {} warnings",
                    output.report.failed().count(),
                    output.report.warnings.len()
                );
            }
            print_json(&output)?;
        }
        Command::Ref { command } => match command {
            RefCommand::Build { module, field } => println!("{}", build_ref(&module, &field)),
            RefCommand::Parse { reference, schema } => {
                let registry = schema.as_deref().map(load_registry).transpose()?;
                let parsed = parse_ref(&reference, registry.as_ref()).await?;
                print_json(&parsed)?;
            }
        },
    }
    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
