use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use genomehubs_fill::config::{ConfigLoader, Overrides};
use genomehubs_fill::domain::Direction;
use genomehubs_fill::error::FillError;
use genomehubs_fill::fill::{FillOptions, Filler};
use genomehubs_fill::output::JsonOutput;
use genomehubs_fill::registry::TypeRegistry;
use genomehubs_fill::store::EsHttpStore;

#[derive(Parser)]
#[command(name = "gh-fill")]
#[command(about = "Taxonomy-aware attribute aggregation for GenomeHubs indexes")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Summarize attributes tips-to-root and propagate root-to-tips")]
    Fill(FillArgs),
}

#[derive(Args)]
struct FillArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    store_url: Option<String>,

    #[arg(long)]
    index: Option<String>,

    #[arg(long)]
    root: Option<String>,

    #[arg(long)]
    types: Option<String>,

    #[arg(long, value_enum)]
    direction: Option<Direction>,

    #[arg(long)]
    page_size: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(fill) = report.downcast_ref::<FillError>() {
            return ExitCode::from(map_exit_code(fill));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FillError) -> u8 {
    match error {
        FillError::StoreHttp(_)
        | FillError::StoreStatus { .. }
        | FillError::StoreResponse(_) => 3,
        FillError::MissingConfig
        | FillError::ConfigRead(_)
        | FillError::ConfigParse(_)
        | FillError::TypesRead(_)
        | FillError::TypesParse(_)
        | FillError::TraverseStatNotInSummary { .. }
        | FillError::InvalidTaxonId(_)
        | FillError::InvalidSummaryStat(_)
        | FillError::InvalidValueType(_)
        | FillError::MissingRoot
        | FillError::MissingIndex => 2,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fill(args) => run_fill(args),
    }
}

fn run_fill(args: FillArgs) -> miette::Result<()> {
    let overrides = Overrides {
        store_url: args.store_url,
        index: args.index,
        root: args.root,
        types: args.types,
        direction: args.direction,
        page_size: args.page_size,
        batch_size: args.batch_size,
    };
    let resolved = ConfigLoader::resolve(args.config.as_deref(), overrides)?;
    let registry = TypeRegistry::load(&resolved.types_path)?;
    if registry.is_empty() {
        tracing::warn!("attribute type registry is empty; nothing will be aggregated");
    }

    let store = EsHttpStore::new(&resolved.store_url)?;
    let options = FillOptions {
        direction: resolved.direction,
        page_size: resolved.page_size,
        batch_size: resolved.batch_size,
        dry_run: args.dry_run,
    };
    let filler = Filler::new(&store, &registry, &resolved.index, &resolved.root, options);
    let report = filler.run()?;
    JsonOutput::print_report(&report).into_diagnostic()?;
    Ok(())
}
