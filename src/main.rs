//! CLI entry point for the embedding comparison preprocessor.
//!
//! Provides commands for preprocessing an embedding matrix into per-object
//! records, comparing two preprocessed datasets, and managing settings.

use anyhow::Context;
use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use embedding_comparator::compare::{self, ComparisonReport};
use embedding_comparator::display::{StageProgress, THEME, Theme};
use embedding_comparator::io::{ExitCode, OutputFormat, OutputManager, load_dataset, write_records};
use embedding_comparator::{DistanceMetric, Pipeline, PipelineError, ProjectionMethod, Settings};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

const QUICK_START: &str = "Examples:
  embcmp init
  embcmp preprocess -e vectors.tsv -m metadata.tsv -o model_a.json --max-k 100
  embcmp preprocess -e vectors.tsv -m metadata.tsv -o model_a.json --projection pca --projection umap
  embcmp compare model_a.json model_b.json --k 10 --metric cosine";

/// Embedding comparison preprocessor
#[derive(Parser)]
#[command(
    name = "embcmp",
    version = env!("CARGO_PKG_VERSION"),
    about = "Neighborhood and projection preprocessing for embedding model comparison",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = QUICK_START
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "EMBCMP_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    #[command(about = "Set up .embcmp directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display the effective settings")]
    Config,

    #[command(
        about = "Compute neighbors and projections for every embedding",
        after_help = "Output: a JSON array with one record per embedding, in input order:\n  {\"idx\", \"word\", \"embedding\"?, \"nearest_neighbors\": {metric: {\"knn_ind\", \"knn_dist\"}}, \"embedding_<method>\": [x, y]}"
    )]
    Preprocess(PreprocessArgs),

    #[command(
        about = "Rank objects by neighborhood overlap between two preprocessed files",
        after_help = "Examples:\n  embcmp compare model_a.json model_b.json\n  embcmp compare model_a.json model_b.json --k 25 --metric euclidean --json"
    )]
    Compare {
        /// First preprocessed file
        a: PathBuf,

        /// Second preprocessed file, over the same labels in the same order
        b: PathBuf,

        /// Neighbors per object to compare
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Metric whose neighbor lists are compared
        #[arg(long, default_value = "cosine")]
        metric: DistanceMetric,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct PreprocessArgs {
    /// Embedding TSV, one vector per line
    #[arg(short, long)]
    embeddings: PathBuf,

    /// Label TSV, one label per line
    #[arg(short, long)]
    metadata: PathBuf,

    /// Output JSON file
    #[arg(short, long)]
    outfile: PathBuf,

    /// Neighbors stored per object and metric
    #[arg(long)]
    max_k: Option<usize>,

    /// Distance metric (repeatable, replaces configured metrics)
    #[arg(long = "metric")]
    metrics: Vec<DistanceMetric>,

    /// Projection method (repeatable, replaces configured methods)
    #[arg(long = "projection")]
    projections: Vec<ProjectionMethod>,

    /// Decimal places kept in the output
    #[arg(long)]
    precision: Option<u32>,

    /// Seed for umap and tsne
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Leave raw embeddings out of the records
    #[arg(long)]
    no_embedding: bool,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Show stage progress
    #[arg(long)]
    progress: bool,

    /// Output the run summary in JSON format
    #[arg(long)]
    json: bool,
}

impl PreprocessArgs {
    /// CLI flags are the last configuration layer.
    fn apply(&self, settings: &mut Settings) {
        if let Some(max_k) = self.max_k {
            settings.neighbors.max_k = max_k;
        }
        if !self.metrics.is_empty() {
            settings.neighbors.metrics = self.metrics.clone();
        }
        if !self.projections.is_empty() {
            settings.projection.methods = self.projections.clone();
        }
        if let Some(precision) = self.precision {
            settings.output.precision = precision;
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if let Some(threads) = self.threads {
            settings.parallel_threads = threads;
        }
        if self.no_embedding {
            settings.output.include_embedding = false;
        }
        if self.pretty {
            settings.output.pretty = true;
        }
    }
}

#[derive(Debug, Serialize)]
struct PreprocessSummary {
    records: usize,
    dimension: usize,
    metrics: Vec<DistanceMetric>,
    projections: Vec<ProjectionMethod>,
    outfile: PathBuf,
    elapsed_ms: u64,
}

impl fmt::Display for PreprocessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let metrics: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        let methods: Vec<&str> = self.projections.iter().map(|m| m.name()).collect();
        writeln!(
            f,
            "{}",
            THEME.success_with_icon(&format!(
                "Preprocessed {} embeddings ({} dims)",
                self.records, self.dimension
            ))
        )?;
        writeln!(f, "  Metrics:     {}", metrics.join(", "))?;
        writeln!(f, "  Projections: {}", methods.join(", "))?;
        writeln!(f, "  Output:      {}", THEME.apply(&THEME.path, self.outfile.display()))?;
        write!(
            f,
            "  Elapsed:     {}",
            THEME.apply(&THEME.number, format!("{}ms", self.elapsed_ms))
        )
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "embedding_comparator=debug"
    } else {
        "embedding_comparator=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(config: Option<&PathBuf>) -> Result<Settings, PipelineError> {
    let loaded = match config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    loaded.map_err(|e| PipelineError::Config {
        reason: e.to_string(),
    })
}

fn preprocess(
    args: &PreprocessArgs,
    config: Option<&PathBuf>,
    output: &mut OutputManager,
) -> anyhow::Result<ExitCode> {
    let start = Instant::now();
    let mut settings = load_settings(config)?;
    args.apply(&mut settings);

    let progress = StageProgress::new(args.progress && console::Term::stderr().is_term());

    progress.stage("validating settings");
    let pipeline = Pipeline::from_settings(&settings)?;

    progress.stage("loading embeddings");
    let dataset = load_dataset(&args.embeddings, &args.metadata, &settings.input.delimiter)?;
    pipeline.validate(&dataset)?;

    progress.stage("computing neighbors and projections");
    let records = pipeline.run(&dataset)?;

    progress.stage("writing records");
    write_records(&args.outfile, &records, settings.output.pretty)?;
    progress.finish("done");

    let summary = PreprocessSummary {
        records: records.len(),
        dimension: dataset.embeddings().dimension(),
        metrics: settings.neighbors.metrics.clone(),
        projections: settings.projection.methods.clone(),
        outfile: args.outfile.clone(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    Ok(output.success(summary)?)
}

fn run(cli: Cli, output: &mut OutputManager) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Init { force } => {
            let root = std::env::current_dir().context("Failed to resolve current directory")?;
            let path = Settings::init_config_file(&root, force)
                .map_err(|e| PipelineError::Config {
                    reason: e.to_string(),
                })?;
            output.info(&THEME.success_with_icon(&format!(
                "Created configuration file at {}",
                path.display()
            )))?;
            Ok(ExitCode::Success)
        }
        Commands::Config => {
            let settings = load_settings(cli.config.as_ref())?;
            let rendered = toml::to_string_pretty(&settings)
                .context("Failed to render settings as TOML")?;
            if Settings::find_workspace_config().is_none() && cli.config.is_none() {
                output.info(&THEME.warning_with_icon(
                    "No .embcmp/settings.toml found; showing defaults and environment overrides",
                ))?;
            }
            output.info(&rendered)?;
            Ok(ExitCode::Success)
        }
        Commands::Preprocess(args) => preprocess(&args, cli.config.as_ref(), output),
        Commands::Compare {
            a,
            b,
            k,
            metric,
            json: _,
        } => {
            let first = compare::load_records(&a)?;
            let second = compare::load_records(&b)?;
            let report = ComparisonReport::build(&first, &second, k, metric)?;
            Ok(output.success(report)?)
        }
    }
}

fn wants_json(command: &Commands) -> bool {
    match command {
        Commands::Preprocess(args) => args.json,
        Commands::Compare { json, .. } => *json,
        Commands::Init { .. } | Commands::Config => false,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut output = OutputManager::new(OutputFormat::from_json_flag(wants_json(&cli.command)));
    let code = match run(cli, &mut output) {
        Ok(code) => code,
        Err(err) => match err.downcast_ref::<PipelineError>() {
            Some(pipeline_error) => output
                .error(pipeline_error)
                .unwrap_or(ExitCode::from_error(pipeline_error)),
            None => {
                if Theme::should_disable_colors() {
                    eprintln!("Error: {err:#}");
                } else {
                    eprintln!("{} {err:#}", THEME.error.apply_to("Error:"));
                }
                ExitCode::GeneralError
            }
        },
    };
    code.into()
}
