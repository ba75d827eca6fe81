use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use raven::config::{ConfigLoader, LooseValue, RunConfig, RunParams, SampleList};
use raven::domain::AssemblerMode;
use raven::error::RavenError;
use raven::output::{self, JsonOutput, LogProgress, OutputMode};
use raven::pipeline::PipelineDriver;
use raven::stages::StageKind;
use raven::tool::SystemExecutor;

#[derive(Parser)]
#[command(name = "raven")]
#[command(about = "Virus discovery in public RNA-seq data: download, trim, assemble, classify")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full pipeline for one project and sample set")]
    #[command(disable_help_flag = true)]
    Run(RunArgs),
    #[command(about = "Resolve parameters and print the run plan without executing")]
    #[command(disable_help_flag = true)]
    Plan(RunArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    #[arg(short = 'p', long)]
    project: Option<String>,

    #[arg(short = 's', long, help = "Comma-separated run accessions")]
    samples: Option<String>,

    #[arg(short = 'l', long, help = "paired or single; detected after download when omitted")]
    library: Option<String>,

    #[arg(short = 'm', long, help = "Memory budget in GB (e.g. 30 or 30GB)")]
    memory: Option<String>,

    #[arg(short = 'n', long)]
    threads: Option<String>,

    #[arg(short = 'w', long)]
    working_dir: Option<Utf8PathBuf>,

    #[arg(short = 'f', long)]
    final_dir: Option<Utf8PathBuf>,

    #[arg(short = 't', long)]
    temp_dir: Option<Utf8PathBuf>,

    #[arg(short = 'h', long)]
    home_dir: Option<Utf8PathBuf>,

    #[arg(short = 'd', long)]
    diamond_db: Option<Utf8PathBuf>,

    #[arg(short = 'a', long)]
    assembler: Option<AssemblerMode>,

    #[arg(long, help = "Protein FASTA used to build the DIAMOND database when it is missing")]
    db_fasta: Option<Utf8PathBuf>,

    #[arg(long, help = "Protein accession to taxid map (prot.accession2taxid) for --db-fasta builds")]
    taxonmap: Option<Utf8PathBuf>,

    #[arg(long, help = "Environment prefix whose bin/ is searched before PATH")]
    tool_env: Option<Utf8PathBuf>,

    #[arg(long, help = "JSON parameter file; command-line flags take precedence")]
    config: Option<Utf8PathBuf>,

    #[arg(long, help = "Skip stage steps whose outputs already exist")]
    resume: bool,

    #[arg(long)]
    json: bool,

    #[arg(long, action = ArgAction::Help, help = "Print help")]
    help: Option<bool>,
}

impl RunArgs {
    fn params(&self) -> Result<RunParams, RavenError> {
        let cli = RunParams {
            project: self.project.clone(),
            samples: self.samples.clone().map(SampleList::Joined),
            library: self.library.clone(),
            memory: self.memory.clone().map(LooseValue::Text),
            threads: self.threads.clone().map(LooseValue::Text),
            working_dir: self.working_dir.clone(),
            temp_dir: self.temp_dir.clone(),
            final_dir: self.final_dir.clone(),
            home_dir: self.home_dir.clone(),
            diamond_db: self.diamond_db.clone(),
            db_fasta: self.db_fasta.clone(),
            taxonmap: self.taxonmap.clone(),
            assembler: self.assembler,
            tool_env: self.tool_env.clone(),
            resume: self.resume.then_some(true),
        };
        match &self.config {
            Some(path) => Ok(ConfigLoader::load(path)?.merge(cli)),
            None => Ok(cli),
        }
    }

    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

#[derive(Serialize)]
struct PlanView<'a> {
    config: &'a RunConfig,
    stages: Vec<&'static str>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Usage errors share the configuration exit code.
            return if err.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if let Err(report) = run(cli) {
        eprintln!("{report:?}");
        if let Some(raven) = report.downcast_ref::<RavenError>() {
            return ExitCode::from(raven.exit_code());
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run_pipeline(&args),
        Commands::Plan(args) => run_plan(&args),
    }
}

fn run_pipeline(args: &RunArgs) -> miette::Result<()> {
    let config = RunConfig::resolve(args.params()?)?;
    let executor = SystemExecutor::new(config.tool_env())?;
    let mut driver = PipelineDriver::new(config, executor);
    let report = match args.output_mode() {
        OutputMode::Json => driver.run(&JsonOutput)?,
        OutputMode::Text => driver.run(&LogProgress)?,
    };
    match args.output_mode() {
        OutputMode::Json => JsonOutput::print_report(&report)
            .map_err(|err| RavenError::Filesystem(err.to_string()))?,
        OutputMode::Text => output::print_summary(&report),
    }
    Ok(())
}

fn run_plan(args: &RunArgs) -> miette::Result<()> {
    let config = RunConfig::resolve(args.params()?)?;
    let stages: Vec<&'static str> = StageKind::ALL
        .into_iter()
        .filter(|kind| {
            *kind != StageKind::DetermineLibraryType || !config.library_type().is_resolved()
        })
        .map(StageKind::name)
        .collect();

    match args.output_mode() {
        OutputMode::Json => JsonOutput::print_json(&PlanView {
            config: &config,
            stages,
        })
        .map_err(|err| RavenError::Filesystem(err.to_string()))?,
        OutputMode::Text => {
            println!("project:     {}", config.project_id());
            println!("run label:   {}", config.run_label());
            println!("samples:     {}", config.sample_accessions().len());
            println!("library:     {}", config.library_type());
            println!("assembler:   {}", config.assembler());
            println!(
                "resources:   {} threads, {} GB",
                config.thread_count(),
                config.memory_budget_gb()
            );
            println!("working dir: {}", config.working_dir());
            println!("temp dir:    {}", config.temp_dir());
            println!("final dir:   {}", config.final_dir());
            println!("database:    {}", config.diamond_db_path());
            println!("stages:      {}", stages.join(" -> "));
        }
    }
    Ok(())
}
