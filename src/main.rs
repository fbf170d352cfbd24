//! semnext-reconcile CLI: gene resolution and knowledge-graph reconciliation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use semnext_reconcile::config::PipelineConfig;
use semnext_reconcile::pipeline::{Pipeline, StageRun};
use semnext_reconcile::resolve::cascade::Cascade;
use semnext_reconcile::resolve::Symbol;

#[derive(Parser)]
#[command(
    name = "semnext-reconcile",
    version,
    about = "Resolve gene symbols and reconcile the SemNExT knowledge graph"
)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides `paths.data_dir`).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage in order, skipping stages whose artifact exists.
    Run {
        /// SETL descriptor of the intersection ingest (recorded, not executed).
        setl: Option<PathBuf>,
    },

    /// Clean the association table and write the intersection file.
    Prepare,

    /// Resolve placeholder gene symbols into the mapping table.
    Resolve,

    /// Filter the corpus and merge in the derived dataset.
    Reconcile,

    /// Resolve symbols given on the command line and print the candidates.
    Lookup {
        /// Gene symbols, e.g. BRCA1 C9orf72.
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Show which stage artifacts already exist.
    Stages,

    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.paths.data_dir = dir;
    }

    match cli.command {
        Commands::Run { setl } => {
            if let Some(setl) = setl {
                tracing::info!(descriptor = %setl.display(), "SETL descriptor noted; ingest runs outside this tool");
            }
            let cascade = Cascade::from_config(&config)?;
            let runs = Pipeline::new(config).run_all(&cascade)?;
            print_runs(&runs);
        }

        Commands::Prepare => {
            let runs = Pipeline::new(config).prepare()?;
            print_runs(&runs);
        }

        Commands::Resolve => {
            let cascade = Cascade::from_config(&config)?;
            let run = Pipeline::new(config).resolve_genes(&cascade)?;
            print_runs(std::slice::from_ref(&run));
        }

        Commands::Reconcile => {
            let runs = Pipeline::new(config).reconcile()?;
            print_runs(&runs);
        }

        Commands::Lookup { symbols } => {
            let cascade = Cascade::from_config(&config)?;
            let report = cascade.resolve_all(symbols.into_iter().map(Symbol::new));
            for (symbol, resolution) in &report.resolutions {
                if resolution.is_empty() {
                    println!("{symbol}\t(unresolved)");
                    continue;
                }
                for candidate in resolution.candidates() {
                    println!("{symbol}\t{}\t{}", candidate.uri, candidate.class);
                }
            }
        }

        Commands::Stages => {
            let pipeline = Pipeline::new(config);
            println!("Artifacts in {}:", pipeline.artifacts().output_dir.display());
            for (stage, path, produced) in pipeline.artifacts().status() {
                let mark = if produced { "done" } else { "pending" };
                println!("  {:<20} {:<8} {}", stage.name(), mark, path.display());
            }
        }

        Commands::Config => {
            let text = config.to_toml()?;
            print!("{text}");
            std::io::Write::flush(&mut std::io::stdout()).into_diagnostic()?;
        }
    }

    Ok(())
}

fn print_runs(runs: &[StageRun]) {
    for run in runs {
        if run.skipped {
            println!("{:<20} {:<8} {}", run.stage.name(), "skipped", run.artifact.display());
        } else {
            println!(
                "{:<20} {:<8} {}  ({})",
                run.stage.name(),
                "produced",
                run.artifact.display(),
                run.counts
            );
        }
    }
}
