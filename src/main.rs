//! # docpass CLI
//!
//! The `docpass` binary runs long documents through a language-model
//! service chunk by chunk.
//!
//! ## Usage
//!
//! ```bash
//! docpass --config ./docpass.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docpass run <input>` | Transform a file, or every eligible file under a directory |
//! | `docpass split <input>` | Print chunk boundaries without calling the service |
//! | `docpass extract <pdf>` | Convert a PDF to plain text |
//! | `docpass tasks` | List built-in tasks |
//!
//! ## Examples
//!
//! ```bash
//! # Add Doxygen comments to every header under include/ -> include_doxygen/
//! docpass run include/
//!
//! # Clean a PDF-extracted paper with a smaller chunk bound
//! docpass run paper.pdf --task clean-text --max-chunk-units 4000
//!
//! # Keep every raw chunk and reply for inspection
//! docpass run foo.h --debug-dir debug_chunks
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use docpass::chunk::BoundaryPolicy;
use docpass::commands;
use docpass::config::{self, Config};
use docpass::continuation::CancelFlag;
use docpass::progress::ProgressMode;
use docpass::tokenize::LengthUnit;
use docpass::transform::CompletionProtocol;

/// docpass: pass long documents through an LLM in bounded chunks.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "docpass",
    about = "Pass long documents through an LLM in bounded chunks with continuation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Optional.
    #[arg(long, global = true, default_value = "./docpass.toml")]
    config: PathBuf,

    /// Progress on stderr. Defaults to `human` on a terminal, else `off`.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform a file or a directory tree.
    ///
    /// A directory is processed recursively into a mirrored output tree;
    /// files whose output already exists are skipped, other files are copied
    /// untouched. Nothing is written for a document with a failed chunk.
    Run {
        /// Input file or directory.
        input: PathBuf,

        /// Output file (file input) or output root (directory input).
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print chunk boundaries without calling any service.
    Split {
        input: PathBuf,

        /// Verify that the chunks rejoin to the original text.
        #[arg(long)]
        check: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Extract text from a PDF (pages joined by newlines).
    Extract {
        pdf: PathBuf,

        /// Output text file. Defaults to the input with a `.txt` extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List built-in tasks and their defaults.
    Tasks,
}

/// Command-line overrides for configuration values.
#[derive(Args)]
struct Overrides {
    /// Task name (`doxygen`, `clean-text`).
    #[arg(long)]
    task: Option<String>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Service provider (`openai`, `anthropic`, `echo`).
    #[arg(long)]
    provider: Option<String>,

    /// Chunk size bound, in the task's length unit.
    #[arg(long)]
    max_chunk_units: Option<usize>,

    /// Continuation rounds allowed per chunk.
    #[arg(long)]
    max_continuations: Option<u32>,

    #[arg(long, value_enum)]
    policy: Option<BoundaryPolicy>,

    #[arg(long, value_enum)]
    unit: Option<LengthUnit>,

    #[arg(long, value_enum)]
    protocol: Option<CompletionProtocol>,

    /// Directory for per-chunk debug artifacts.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Per-call timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl Overrides {
    fn apply(self, cfg: &mut Config) {
        if let Some(task) = self.task {
            cfg.task.name = task;
        }
        if let Some(model) = self.model {
            cfg.model.name = model;
        }
        if let Some(provider) = self.provider {
            cfg.model.provider = provider;
        }
        if let Some(max) = self.max_chunk_units {
            cfg.chunking.max_units = Some(max);
        }
        if let Some(max) = self.max_continuations {
            cfg.continuation.max_continuations = max;
        }
        if let Some(policy) = self.policy {
            cfg.chunking.policy = Some(policy);
        }
        if let Some(unit) = self.unit {
            cfg.chunking.unit = Some(unit);
        }
        if let Some(protocol) = self.protocol {
            cfg.continuation.protocol = Some(protocol);
        }
        if let Some(dir) = self.debug_dir {
            cfg.output.debug_dir = Some(dir);
        }
        if let Some(secs) = self.timeout_secs {
            cfg.model.timeout_secs = secs;
        }
    }
}

fn load_with_overrides(cli_config: &std::path::Path, overrides: Overrides) -> anyhow::Result<Config> {
    let mut cfg = config::load_or_default(cli_config)?;
    overrides.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Run {
            input,
            output,
            overrides,
        } => {
            let cfg = load_with_overrides(&cli.config, overrides)?;
            let progress = mode.reporter();

            let cancel = CancelFlag::new();
            let flag = cancel.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if flag.cancel() {
                        eprintln!(
                            "interrupt received; stopping before the next service call (Ctrl-C again to exit now)"
                        );
                    } else {
                        eprintln!("second interrupt; exiting without writing output");
                        std::process::exit(130);
                    }
                }
            });

            commands::run_documents(&cfg, &input, output, progress.as_ref(), cancel).await?;
        }
        Commands::Split {
            input,
            check,
            overrides,
        } => {
            let cfg = load_with_overrides(&cli.config, overrides)?;
            commands::run_split(&cfg, &input, check)?;
        }
        Commands::Extract { pdf, output } => {
            commands::run_extract(&pdf, output)?;
        }
        Commands::Tasks => {
            commands::list_tasks();
        }
    }

    Ok(())
}
