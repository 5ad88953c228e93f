//! cardtest - acceptance fixture scenario runner

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cardtest_common::Site;
use cardtest_driver::environment::DEFAULT_CONF_DIR;
use cardtest_driver::{build_driver, CoreVersion};
use cardtest_harness::runner::write_results;
use cardtest_harness::{HarnessConfig, ScenarioRunner, SuiteResult};

#[derive(Parser)]
#[command(name = "cardtest")]
#[command(about = "Acceptance fixture scenarios for the card sites")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "cardtest.toml", global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios and write a JSON report
    Run(RunArgs),

    /// Write settings and an empty database for a new site
    Install {
        /// Backend root directory
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Site directory under sites/
        #[arg(long, default_value = DEFAULT_CONF_DIR)]
        dir: String,
    },

    /// Show the request context and settings directory for a uri
    Env {
        /// Target uri, defaults to the configured one
        #[arg(long)]
        uri: Option<String>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Scenario directory
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Run only scenarios matching this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Run only a specific scenario by name
    #[arg(short, long)]
    name: Option<String>,

    /// Target uri, or "default"
    #[arg(long)]
    uri: Option<String>,

    /// Backend root directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Core version: legacy, current or blackbox
    #[arg(long, value_parser = parse_core)]
    core: Option<CoreVersion>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_core(s: &str) -> Result<CoreVersion, String> {
    s.parse().map_err(|e: cardtest_common::DriverError| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match execute(cli) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<bool> {
    let mut config = HarnessConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run(args) => {
            if let Some(dir) = args.scenarios {
                config.scenarios_dir = dir;
            }
            if let Some(uri) = args.uri {
                config.backend.uri = uri;
            }
            if let Some(root) = args.root {
                config.backend.root = root;
            }
            if let Some(core) = args.core {
                config.backend.core = core;
            }
            if let Some(output) = args.output {
                config.output_dir = output;
            }
            run(config, args.tag, args.name)
        }
        Commands::Install { root, dir } => {
            let site = Site::install(&root, &dir)?;
            info!("Site ready at {}", site.root().display());
            Ok(true)
        }
        Commands::Env { uri } => {
            let uri = uri.unwrap_or_else(|| config.backend.uri.clone());
            let driver = build_driver(&config.backend);
            let context = driver.validate_environment(&uri)?;
            println!("{}", serde_json::to_string_pretty(&context)?);
            println!("settings: {}", context.settings_file(&config.backend.root).display());
            Ok(true)
        }
    }
}

fn run(config: HarnessConfig, tag: Option<String>, name: Option<String>) -> anyhow::Result<bool> {
    info!("CardTest v{}", cardtest_common::VERSION);
    let results_path = config.results_path();
    let mut runner = ScenarioRunner::new(config);

    let results = if let Some(name) = name {
        let result = runner.run_named(&name)?;
        SuiteResult {
            total: 1,
            passed: usize::from(result.success),
            failed: usize::from(!result.success),
            teardown_failures: usize::from(result.teardown_error.is_some()),
            duration_ms: result.duration_ms,
            results: vec![result],
        }
    } else if let Some(tag) = tag {
        runner.run_tagged(&tag)?
    } else {
        runner.run_all()?
    };

    write_results(&results, &results_path)?;
    Ok(results.all_passed())
}
