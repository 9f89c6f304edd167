//! PageRunner CLI Entry Point
//!
//! Provides command-line interface for scrape runs.
//!
//! # Usage
//!
//! ```bash
//! # Scrape every task in a file, saving to results.json
//! pagerunner tasks.json
//!
//! # Validate the task file only
//! pagerunner tasks.json --dry-run
//!
//! # Tune concurrency and timeouts
//! pagerunner tasks.yaml --workers 8 --max-pages 12 --task-timeout 45
//!
//! # Print the task timeline at the end
//! pagerunner tasks.json --timeline --output out/results.json
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use colored::Colorize;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use pagerunner::config::{default_workers, Timeouts, DEFAULT_MAX_PAGES};
use pagerunner::execution::{Engine, RunSummary};
use pagerunner::scrape::HttpBrowser;
use pagerunner::store::ResultStore;
use pagerunner::tasks::load_tasks;
use pagerunner::{APP_NAME, VERSION};

/// Default output file used when none is specified.
const DEFAULT_OUTPUT: &str = "results.json";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    tasks_path: Option<PathBuf>,
    output: PathBuf,
    workers: usize,
    max_pages: usize,
    task_timeout: u64,
    run_timeout: u64,
    grace: u64,
    dry_run: bool,
    timeline: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            tasks_path: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            workers: default_workers(),
            max_pages: DEFAULT_MAX_PAGES,
            task_timeout: timeouts.task.as_secs(),
            run_timeout: timeouts.run.map_or(0, |run| run.as_secs()),
            grace: timeouts.shutdown_grace.as_secs(),
            dry_run: false,
            timeline: false,
            verbose: false,
        }
    }
}

impl Config {
    fn timeouts(&self) -> Timeouts {
        Timeouts {
            run: (self.run_timeout > 0).then(|| Duration::from_secs(self.run_timeout)),
            task: Duration::from_secs(self.task_timeout),
            shutdown_grace: Duration::from_secs(self.grace),
            ..Timeouts::default()
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Concurrent Page Scraping Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    let defaults = Config::default();
    println!("Usage: pagerunner [OPTIONS] <TASKS_FILE>");
    println!();
    println!("Arguments:");
    println!("  <TASKS_FILE>          Path to task list (JSON, or YAML by extension)");
    println!();
    println!("Options:");
    println!("  --output PATH         Result file (default: {})", DEFAULT_OUTPUT);
    println!("  --workers N           Parallel workers (default: {})", defaults.workers);
    println!("  --max-pages N         Concurrently open pages (default: {})", defaults.max_pages);
    println!("  --task-timeout SECS   Budget per task (default: {})", defaults.task_timeout);
    println!("  --run-timeout SECS    Budget for the whole run, 0 = none (default: {})", defaults.run_timeout);
    println!("  --grace SECS          Shutdown grace period (default: {})", defaults.grace);
    println!("  --dry-run             Load and validate tasks without scraping");
    println!("  --timeline            Print the task timeline after the run");
    println!("  --verbose             Enable debug logging");
    println!("  --help                Show this help message");
    println!("  --version             Show version information");
}

fn parse_number<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> Result<T, String> {
    let value = args
        .get(i)
        .ok_or_else(|| format!("{} requires a number argument", flag))?;
    value
        .parse()
        .map_err(|_| format!("Invalid {} value: {}", flag, value))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => config.dry_run = true,
            "--timeline" => config.timeline = true,
            "--verbose" | "-v" => config.verbose = true,
            "--output" | "-o" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "--output requires a path argument".to_string())?;
                config.output = PathBuf::from(path);
            }
            "--workers" => {
                i += 1;
                config.workers = parse_number(args, i, "--workers")?;
            }
            "--max-pages" => {
                i += 1;
                config.max_pages = parse_number(args, i, "--max-pages")?;
            }
            "--task-timeout" => {
                i += 1;
                config.task_timeout = parse_number(args, i, "--task-timeout")?;
            }
            "--run-timeout" => {
                i += 1;
                config.run_timeout = parse_number(args, i, "--run-timeout")?;
            }
            "--grace" => {
                i += 1;
                config.grace = parse_number(args, i, "--grace")?;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.tasks_path.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.tasks_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Cancels `token` on Ctrl-C, or SIGTERM on unix.
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut terminate) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = terminate.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        warn!("Shutdown requested; cancelling run");
        token.cancel();
    });
}

/// Prints the run summary.
fn print_summary(summary: &RunSummary, output: &Path) {
    println!();
    if summary.is_clean() {
        println!("{}", "Run completed successfully".green().bold());
    } else {
        println!("{}", "Run completed with problems".yellow().bold());
    }
    println!("  Submitted:  {}", summary.submitted);
    println!("  Completed:  {}", summary.completed.to_string().green());
    println!("  Partial:    {}", summary.partial.to_string().yellow());
    println!("  Failed:     {}", summary.failed.to_string().red());
    if summary.rejected > 0 {
        println!("  Rejected:   {}", summary.rejected.to_string().red());
    }
    println!("  Saved:      {} -> {}", summary.saved, output.display());
    if summary.shutdown_timed_out {
        println!("  {}", "Shutdown grace period elapsed".red());
    }
    println!("Total execution time: {:.2?}", summary.elapsed);
}

/// Main application entry point.
async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    let Some(tasks_path) = config.tasks_path.clone() else {
        print_usage();
        return Err("No task file given".into());
    };

    setup_logging(config.verbose);
    print_banner();

    // Load tasks
    info!("Loading tasks: {}", tasks_path.display());
    let tasks = load_tasks(&tasks_path).map_err(|e| {
        error!("Failed to load tasks: {}", e);
        format!("Could not load tasks from '{}': {}", tasks_path.display(), e)
    })?;
    info!("Loaded {} tasks", tasks.len());

    let timeouts = config.timeouts();
    timeouts.validate()?;

    if config.dry_run {
        info!("Mode: DRY RUN (nothing will be scraped)");
        for task in &tasks {
            println!();
            println!("[DRY RUN] {} ({})", task.url, task.category);
            for (field, selector) in &task.selectors {
                println!("  {}: {:?}", field, selector);
            }
        }
        return Ok(());
    }

    let store = ResultStore::open(&config.output)?;

    // Create and configure engine
    let mut engine = Engine::new(tasks, HttpBrowser::new()?);
    engine.set_workers(config.workers);
    engine.set_max_pages(config.max_pages);
    engine.set_timeouts(timeouts);
    engine.set_store(store);
    engine.set_monitoring(true);

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone());

    let summary = engine.run(token).await?;

    print_summary(&summary, &config.output);
    if let Some(resources) = engine.resource_summary() {
        println!();
        println!("{}", resources);
    }
    if config.timeline {
        if let Ok(timeline) = engine.timeline().lock() {
            println!("{}", timeline.gantt_chart());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
