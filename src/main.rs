use clap::{Parser, ValueEnum};
use globset::{Glob, GlobSetBuilder};
use runconf::discovery::DEFAULT_APPLICATION_GLOB;
use runconf::generator::{DEFAULT_ENVS_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_TEMPLATE_PATH, Plan, Skipped};
use runconf::{GeneratorConfig, PairStatus, PortRange, Result, RunReport};
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

const LONG_HELP: &str = r#"
Placeholders (environment values):
  HOOK_IP              - LAN address of this machine (192.168.0.* preferred)
  HOOK_PORT            - First free TCP port in --port-range
  HOOK_PORT:8080       - Same, falling back to 8080 when no port is free

Layout:
  tools/run/template.xml   - Run configuration template
  tools/run/envs/*.yml     - One environment per file (flat KEY: value)
  .run/                    - Generated <App><Env>.run.xml files

Examples:
  # Generate every run configuration for the current project
  runconf
  # Publish a fixed address instead of the detected one
  runconf --ip 192.168.0.20
  # Search a narrower port range
  runconf --port-range 20000-30000
  # Show planned configurations without resolving or writing
  runconf --list
  # Plan as JSON for scripting
  runconf --list=json
  # Resolve and render, but write nothing
  runconf --dry-run
"#;

/// Generate IDE run configurations for every application and environment.
#[derive(Parser, Debug)]
#[command(
    name = "runconf",
    version,
    about = "Generate IDE run configurations for every application and environment.",
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Project root used for discovery and relative paths
    #[arg(short, long, value_name = "DIR", env = "RUNCONF_BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Run configuration template
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_TEMPLATE_PATH)]
    template: PathBuf,

    /// Directory containing environment files
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_ENVS_DIR)]
    envs_dir: PathBuf,

    /// Directory receiving generated run configurations
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Glob selecting application entry points
    #[arg(short, long, value_name = "GLOB", default_value = DEFAULT_APPLICATION_GLOB)]
    pattern: String,

    /// Exclude glob patterns (repeatable). Patterns are relative to base-dir (default CWD)
    #[arg(short = 'x', long = "exclude", value_name = "GLOB", action = clap::ArgAction::Append)]
    exclude: Vec<String>,

    /// Disable compliance with .gitignore files
    #[arg(long)]
    no_gitignore: bool,

    /// Address substituted for HOOK_IP instead of the detected one
    #[arg(long, value_name = "IPV4", env = "RUNCONF_IP")]
    ip: Option<Ipv4Addr>,

    /// Ports searched for HOOK_PORT, as START-END
    #[arg(long, value_name = "RANGE", env = "RUNCONF_PORT_RANGE", default_value_t = PortRange::default())]
    port_range: PortRange,

    /// Resolve and render every configuration without writing files
    #[arg(long, conflicts_with = "list")]
    dry_run: bool,

    /// List planned configurations (optionally with format: plain, json)
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "plain", conflicts_with = "dry_run")]
    list: Option<ListFormat>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum ListFormat {
    /// One run identifier per line
    Plain,
    /// JSON output for scripting
    Json,
}

#[derive(Serialize)]
struct RunInfo {
    run_id: String,
    application: String,
    environment: String,
    main_class: String,
    module: String,
    output: String,
}

#[derive(Serialize)]
struct SkippedInfo {
    path: String,
    reason: String,
}

#[derive(Serialize)]
struct PlanInfo {
    runs: Vec<RunInfo>,
    skipped_applications: Vec<SkippedInfo>,
    skipped_environments: Vec<SkippedInfo>,
    duplicates: Vec<SkippedInfo>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    init_logging(log_level);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let result = if let Some(format) = cli.list {
        list_plan(&config, format).await
    } else {
        run_generation(&config).await
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}

fn build_config(cli: &Cli) -> Result<GeneratorConfig> {
    let mut config = GeneratorConfig::default();
    if let Some(dir) = cli.base_dir.clone() {
        config.base_dir = dir.canonicalize()?;
    }
    config.template_path = cli.template.clone();
    config.envs_dir = cli.envs_dir.clone();
    config.output_dir = cli.output_dir.clone();
    config.port_range = cli.port_range;
    config.ip_override = cli.ip;
    config.dry_run = cli.dry_run;

    // Validate eagerly so a typo fails before any discovery
    Glob::new(&cli.pattern)?;
    config.discovery.application_glob = cli.pattern.clone();
    config.discovery.use_gitignore = !cli.no_gitignore;

    if !cli.exclude.is_empty() {
        let mut builder = GlobSetBuilder::new();
        for pat in &cli.exclude {
            builder.add(Glob::new(pat)?);
        }
        config.discovery.exclude = Some(builder.build()?);
    }

    Ok(config)
}

async fn run_generation(config: &GeneratorConfig) -> Result<()> {
    info!("Generating run configurations in {}", config.base_dir.display());
    let report = runconf::generate(config).await?;
    print_summary(&report, config.dry_run);
    Ok(())
}

fn print_summary(report: &RunReport, dry_run: bool) {
    let verb = if dry_run { "rendered" } else { "written" };
    println!("\nSummary: {} configuration(s) planned", report.outcomes.len());
    if report.succeeded() > 0 {
        println!("  ✓ {} {verb}", report.succeeded());
    }
    for outcome in &report.outcomes {
        if let PairStatus::Failed(e) = &outcome.status {
            println!("  ✗ {}: {e}", outcome.run_id);
        }
    }
    for skipped in report
        .skipped_applications
        .iter()
        .chain(&report.skipped_environments)
        .chain(&report.duplicates)
    {
        println!("  - skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    if !report.ports.is_empty() {
        let ports: Vec<String> = report.ports.iter().map(u16::to_string).collect();
        println!("  ports: {}", ports.join(", "));
    }
}

async fn list_plan(config: &GeneratorConfig, format: ListFormat) -> Result<()> {
    let plan = runconf::plan(config).await?;

    match format {
        ListFormat::Plain => {
            for run in &plan.runs {
                println!("{}", run.run_id);
            }
        }
        ListFormat::Json => {
            let json = serde_json::to_string_pretty(&plan_info(&plan))?;
            println!("{json}");
        }
    }

    Ok(())
}

fn skipped_info(items: &[Skipped]) -> Vec<SkippedInfo> {
    items
        .iter()
        .map(|s| SkippedInfo {
            path: s.path.display().to_string(),
            reason: s.reason.clone(),
        })
        .collect()
}

fn plan_info(plan: &Plan) -> PlanInfo {
    PlanInfo {
        runs: plan
            .runs
            .iter()
            .map(|run| RunInfo {
                run_id: run.run_id.clone(),
                application: run.application.source_path.display().to_string(),
                environment: run.environment.path.display().to_string(),
                main_class: run.application.main_class(),
                module: run.application.gradle_project_name.clone(),
                output: run.output_file.display().to_string(),
            })
            .collect(),
        skipped_applications: skipped_info(&plan.skipped_applications),
        skipped_environments: skipped_info(&plan.skipped_environments),
        duplicates: skipped_info(&plan.duplicates),
    }
}
