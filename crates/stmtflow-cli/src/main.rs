use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stmtflow_core::{Config, TextDumpOptions};
use stmtflow_engine::Loader;
use stmtflow_executor::{ConnectionProvider, EvalOptions, MockProvider, MySqlProvider, SequentialExecutor};
use stmtflow_runner::{
    collect_files, generate, play, result_paths, Driver, DriverOptions, GenerateOptions, PlayOptions,
    DEFAULT_CASE_NAME, SCRIPT_EXTENSIONS,
};
use stmtflow_script::TestFilter;

/// Environment variable holding the database URL
const DSN_ENV: &str = "STMTFLOW_DSN";

/// stmtflow - statement-flow tests for SQL databases
#[derive(Parser)]
#[command(name = "stmtflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: stmtflow.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database URL, e.g. mysql://root@127.0.0.1:4000/test
    #[arg(long, global = true)]
    dsn: Option<String>,

    /// Execution timeout of one test run, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// How long a wait statement may run before it is reported as blocked, in milliseconds
    #[arg(long, global = true, default_value_t = 500)]
    block_time: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run annotated SQL scripts and print their trace
    Play {
        /// Scripts or directories of scripts
        #[arg(required = true)]
        scripts: Vec<PathBuf>,

        /// Write expected result files next to each script
        #[arg(short, long)]
        write: bool,

        /// Print row counts instead of rows
        #[arg(long)]
        terse: bool,

        /// Print the latency of each statement
        #[arg(long)]
        with_lat: bool,
    },

    /// Run structured tests
    Test {
        /// Spec files or directories of spec files
        #[arg(required = true)]
        specs: Vec<PathBuf>,

        /// Select tests with an expression over `test`, e.g. "test.name is startingwith('lock')"
        #[arg(short, long)]
        filter: Option<String>,

        /// Just list the tests to be run
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Diff text output of failed tests if available
        #[arg(long)]
        diff: bool,

        /// Diff command to use (empty for the built-in unified diff)
        #[arg(long)]
        diff_cmd: Option<String>,

        /// Write a JSON run report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a test case with an external statement generator
    Generate {
        /// Directory to write the case into
        dir: PathBuf,

        /// Generator command printing {"init": [...], "test": [...]}
        #[arg(long)]
        generator: String,

        /// File name of the generated case
        #[arg(long, default_value = DEFAULT_CASE_NAME)]
        case_name: String,

        /// Also record the expected results of the case
        #[arg(short = 'r', long)]
        with_results: bool,
    },

    /// Print version information
    Version,
}

/// Config file merged with command-line overrides
struct Settings {
    config: Config,
    eval: EvalOptions,
}

impl Settings {
    fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    fn provider(&self) -> Result<MySqlProvider> {
        let dsn = self.config.dsn.as_deref().with_context(|| {
            format!("no database configured; pass --dsn, set {} or add `dsn` to stmtflow.toml", DSN_ENV)
        })?;
        let provider = MySqlProvider::from_url(dsn)?;
        tracing::debug!(url = %provider.display_url(), "using {} backend", provider.name());
        Ok(provider)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may provide STMTFLOW_DSN
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Play {
            scripts,
            write,
            terse,
            with_lat,
        } => {
            let dump = TextDumpOptions {
                verbose: settings.config.dump.verbose && !terse,
                with_latency: settings.config.dump.with_latency || with_lat,
            };
            play_command(&settings, &scripts, write, dump).await
        }
        Commands::Test {
            specs,
            filter,
            dry_run,
            diff,
            diff_cmd,
            output,
        } => {
            let opts = DriverOptions {
                timeout: settings.timeout(),
                dry_run,
                diff,
                diff_cmd: diff_cmd.unwrap_or_else(|| settings.config.diff_cmd.clone()),
                eval: settings.eval,
            };
            test_command(&settings, &specs, filter.as_deref(), opts, output.as_deref()).await
        }
        Commands::Generate {
            dir,
            generator,
            case_name,
            with_results,
        } => {
            let opts = GenerateOptions { generator, case_name };
            generate_command(&settings, &dir, &opts, with_results).await
        }
        Commands::Version => {
            println!("{}@{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Load stmtflow.toml and apply command-line overrides
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("stmtflow.toml").exists() {
        Config::from_file(Path::new("stmtflow.toml"))?
    } else {
        tracing::debug!("No config file found, using defaults");
        Config::default()
    };

    if let Some(dsn) = cli.dsn.clone().or_else(|| std::env::var(DSN_ENV).ok()) {
        config.dsn = Some(dsn);
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    let eval = EvalOptions {
        block_time: Duration::from_millis(cli.block_time),
        ..EvalOptions::default()
    };
    Ok(Settings { config, eval })
}

/// Play command - run raw scripts, optionally recording expected results
async fn play_command(settings: &Settings, scripts: &[PathBuf], write: bool, dump: TextDumpOptions) -> Result<()> {
    let provider = settings.provider()?;
    let executor = SequentialExecutor::new();
    let opts = PlayOptions {
        write,
        dump,
        timeout: settings.timeout(),
        eval: settings.eval,
    };

    let mut stdout = std::io::stdout();
    for script in collect_files(scripts, SCRIPT_EXTENSIONS)? {
        println!("# {}", script.display());
        play(&provider, &executor, &script, &opts, &mut stdout)
            .await
            .with_context(|| format!("Failed to play {}", script.display()))?;
        if write {
            eprintln!("{} {}", "Results saved to:".green(), result_paths(&script).0.display());
        }
    }
    Ok(())
}

/// Test command - load specs and run their tests
async fn test_command(
    settings: &Settings,
    specs: &[PathBuf],
    filter: Option<&str>,
    opts: DriverOptions,
    output: Option<&Path>,
) -> Result<()> {
    let mut loader = Loader::new(settings.config.digest);
    if let Some(expr) = filter {
        let filter = TestFilter::new(expr).with_context(|| format!("Invalid filter `{}`", expr))?;
        loader = loader.with_filter(filter);
    }

    // a dry run lists tests without ever connecting
    let dry_run = opts.dry_run;
    let mock;
    let mysql;
    let provider: &dyn ConnectionProvider = if dry_run {
        mock = MockProvider::new();
        &mock
    } else {
        mysql = settings.provider()?;
        &mysql
    };

    let report = Driver::new(provider, loader, opts).run_paths(specs).await?;

    if let Some(path) = output {
        report
            .save_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }
    if !dry_run {
        report.print_summary();
    }

    match report.tally.failure_message() {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

/// Generate command - write a case from the external generator
async fn generate_command(
    settings: &Settings,
    dir: &Path,
    opts: &GenerateOptions,
    with_results: bool,
) -> Result<()> {
    let path = generate(dir, opts)
        .await
        .with_context(|| format!("Failed to generate case in {}", dir.display()))?;
    eprintln!("{} {}", "Generated:".green(), path.display());

    if with_results {
        play_command(settings, &[path], true, TextDumpOptions::canonical()).await?;
    }
    Ok(())
}
