//! `codepori` command-line entry point.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use codepori::logging;
use codepori::run::{RunOptions, run_extract, run_health, run_init, run_pipeline};

#[derive(Parser)]
#[command(
    name = "codepori",
    version,
    about = "Plan, generate, test and repair a project with a text-generation backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Directory holding `codepori.toml`, the guidance texts and the output root.
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
    /// Config file (defaults to `<project-dir>/codepori.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend base address (overrides `GEMINI_PROXY_BASE` and the config file).
    #[arg(long)]
    base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: plan, generate, finalize, test and repair.
    Run {
        #[command(flatten)]
        backend: BackendArgs,
        /// Maximum debug-repair iterations.
        #[arg(long)]
        max_iters: Option<u32>,
        /// Output root, relative to the project directory unless absolute.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Probe the backend `/health` endpoint and print the report.
    Health {
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Recover the first JSON value from a file (or stdin) and pretty-print it.
    Extract {
        /// Input file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Write a default `codepori.toml` into the project directory.
    Init {
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

impl BackendArgs {
    fn into_options(self) -> RunOptions {
        RunOptions {
            project_dir: self.project_dir,
            config_path: self.config,
            base_url: self.base_url,
            ..RunOptions::default()
        }
    }
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run {
            backend,
            max_iters,
            output_dir,
        } => run_pipeline(&RunOptions {
            max_iters,
            output_dir,
            ..backend.into_options()
        }),
        Command::Health { backend } => run_health(&backend.into_options()),
        Command::Extract { file } => run_extract(file.as_deref()),
        Command::Init { project_dir, force } => run_init(&project_dir, force),
    };
    std::process::exit(code);
}
