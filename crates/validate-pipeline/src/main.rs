/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Command-line front end for pipeline templates and expressions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "validate-pipeline")]
#[command(about = "Check CI pipeline templates and evaluate expressions", long_about = None)]
struct Cli {
    /// Verbose output (-v for debug logging, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a pipeline document and report template errors
    Check {
        /// YAML or JSON document
        file: PathBuf,

        /// Byte budget for the document
        #[arg(long)]
        max_bytes: Option<usize>,

        /// Maximum nesting depth
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Evaluate a single expression and print the result as JSON
    Eval {
        /// Expression text, without the ${{ }} markers
        expression: String,

        /// JSON file whose top-level keys become named values
        #[arg(long, value_name = "FILE")]
        context: Option<PathBuf>,

        /// Root directory for hashFiles()
        #[arg(long, value_name = "DIR")]
        workspace: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "validate_pipeline=info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Check {
            file,
            max_bytes,
            max_depth,
        } => commands::check::execute(&file, max_bytes, max_depth),
        Commands::Eval {
            expression,
            context,
            workspace,
        } => commands::eval::execute(&expression, context.as_deref(), workspace),
    }
}
