use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use centrifuge_batch::app::{self, App, ProgressSink, RunOptions};
use centrifuge_batch::config::{
    Config, ConfigLoader, DEFAULT_MAX_SEQS_PER_FILE, ExcludeEntry, RunSettings,
};
use centrifuge_batch::domain::SeqFormat;
use centrifuge_batch::error::BatchError;
use centrifuge_batch::executor::ProcessRunner;
use centrifuge_batch::output::{self, JsonOutput, OutputMode, SpinnerProgress};

#[derive(Parser)]
#[command(name = "cfbatch")]
#[command(about = "Run Centrifuge over large sequence batches and collapse the reports per sample")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "Print a JSON summary on stdout")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Split, classify and collapse")]
    Run(RunArgs),
    #[command(about = "Split sequence files into chunks")]
    Split(SplitArgs),
    #[command(about = "Collapse chunk reports into one report per sample")]
    Collapse(CollapseArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long = "query", required = true, num_args = 1.., help = "Input files or directories")]
    queries: Vec<Utf8PathBuf>,

    #[arg(long)]
    config: Option<String>,

    #[arg(short = 'x', long)]
    index: Option<String>,

    #[arg(short = 'i', long)]
    index_dir: Option<Utf8PathBuf>,

    #[arg(short, long)]
    out_dir: Option<Utf8PathBuf>,

    #[arg(short, long)]
    format: Option<SeqFormat>,

    #[arg(short, long, help = "Threads per classifier job")]
    threads: Option<usize>,

    #[arg(short, long, help = "Classifier jobs run at once")]
    procs: Option<usize>,

    #[arg(short, long = "max-seqs-per-file")]
    max_seqs_per_file: Option<usize>,

    #[arg(long, help = "Stop starting jobs after this many failures (0 never stops)")]
    halt_after: Option<usize>,

    #[arg(long, help = "Comma-separated taxonomy ids to exclude")]
    exclude_taxids: Option<String>,

    #[arg(long)]
    reads_not_paired: bool,

    #[arg(long)]
    no_split: bool,

    #[arg(long, help = "Classifier executable")]
    classifier: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn overrides(&self) -> Config {
        Config {
            classifier: self.classifier.clone(),
            index: self.index.clone(),
            index_dir: self.index_dir.clone(),
            out_dir: self.out_dir.clone(),
            format: self.format,
            threads: self.threads,
            procs: self.procs,
            max_seqs_per_file: self.max_seqs_per_file,
            halt_after: self.halt_after,
            reads_not_paired: self.reads_not_paired.then_some(true),
            no_split: self.no_split.then_some(true),
            exclude_taxids: self.exclude_taxids.clone().map(ExcludeEntry::Shorthand),
            extensions: None,
        }
    }
}

#[derive(Args)]
struct SplitArgs {
    #[arg(required = true, num_args = 1..)]
    files: Vec<Utf8PathBuf>,

    #[arg(short, long = "out-dir")]
    out_dir: Utf8PathBuf,

    #[arg(short = 'n', long = "num", default_value_t = DEFAULT_MAX_SEQS_PER_FILE)]
    max_records: usize,

    #[arg(short, long)]
    format: Option<SeqFormat>,
}

#[derive(Args)]
struct CollapseArgs {
    #[arg(short, long = "query", required = true, num_args = 1..)]
    queries: Vec<Utf8PathBuf>,

    #[arg(short, long)]
    reports_dir: Utf8PathBuf,

    /// Directory holding the split manifests, to detect chunks with no report at all
    #[arg(short, long)]
    split_dir: Option<Utf8PathBuf>,

    #[arg(short, long)]
    out_dir: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<BatchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BatchError) -> u8 {
    match error {
        BatchError::Config(_)
        | BatchError::ConfigRead(_)
        | BatchError::ConfigParse(_)
        | BatchError::InvalidIndex(_)
        | BatchError::InvalidTaxId(_)
        | BatchError::Discovery(_)
        | BatchError::UnrecognizedFormat(_) => 2,
        BatchError::MissingTool(_) | BatchError::Launch { .. } => 3,
        BatchError::BatchAborted { .. } | BatchError::JobsFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_batch(args, output_mode),
        Commands::Split(args) => run_split(args, output_mode),
        Commands::Collapse(args) => run_collapse(args, output_mode),
    }
}

fn run_batch(args: RunArgs, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?.overlay(args.overrides());
    let settings = RunSettings::resolve(config)?;
    let runner = ProcessRunner::new(&settings.classifier.program);
    let app = App::new(settings, runner);
    let options = RunOptions {
        dry_run: args.dry_run,
    };

    let summary = match output_mode {
        OutputMode::Interactive => {
            let progress = SpinnerProgress::new();
            let result = app.run(&args.queries, options, &progress);
            progress.finish("done");
            let summary = result?;
            output::print_run_summary(&summary);
            summary
        }
        OutputMode::NonInteractive => {
            let summary = app.run(&args.queries, options, &JsonOutput)?;
            JsonOutput::print_run(&summary).into_diagnostic()?;
            summary
        }
    };

    match summary.abort_error() {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn run_split(args: SplitArgs, output_mode: OutputMode) -> miette::Result<()> {
    with_sink(output_mode, |sink| {
        app::split_inputs(&args.files, args.format, args.max_records, &args.out_dir, sink)
    })
    .and_then(|splits| match output_mode {
        OutputMode::Interactive => {
            output::print_split_summary(&splits);
            Ok(())
        }
        OutputMode::NonInteractive => JsonOutput::print_splits(&splits).into_diagnostic(),
    })
}

fn run_collapse(args: CollapseArgs, output_mode: OutputMode) -> miette::Result<()> {
    with_sink(output_mode, |sink| {
        app::collapse_reports(
            &args.queries,
            &args.reports_dir,
            args.split_dir.as_deref(),
            &args.out_dir,
            sink,
        )
    })
    .and_then(|summary| match output_mode {
        OutputMode::Interactive => {
            output::print_collapse_summary(&summary);
            Ok(())
        }
        OutputMode::NonInteractive => JsonOutput::print_collapse(&summary).into_diagnostic(),
    })
}

fn with_sink<T>(
    output_mode: OutputMode,
    f: impl FnOnce(&dyn ProgressSink) -> Result<T, BatchError>,
) -> miette::Result<T> {
    match output_mode {
        OutputMode::Interactive => {
            let progress = SpinnerProgress::new();
            let result = f(&progress);
            progress.finish("done");
            Ok(result?)
        }
        OutputMode::NonInteractive => Ok(f(&JsonOutput)?),
    }
}
