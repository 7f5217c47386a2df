use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use aqmon_service::alert::notify::AnyNotifier;
use aqmon_service::cities::CityId;
use aqmon_service::config::{DEFAULT_CONFIG_PATH, ServiceConfig};
use aqmon_service::ingest::message::parse_message;
use aqmon_service::logging::{self, LogSource};
use aqmon_service::model::MonitorError;
use aqmon_service::pipeline::Pipeline;
use aqmon_service::report::build_status;
use aqmon_service::scheduler::{CycleReport, PollScheduler};
use aqmon_service::settings::Settings;
use aqmon_service::source::{LiveExtractor, SyntheticSource};
use aqmon_service::store::AnyStore;
use aqmon_service::verify;

type Service = Pipeline<AnyStore, AnyNotifier>;
type Scheduler = PollScheduler<AnyStore, AnyNotifier, LiveExtractor, SyntheticSource>;

#[derive(Parser)]
#[command(
    name = "aqmon",
    version,
    about = "Air-quality monitoring for Lipetsk, Moscow and Saint Petersburg"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "AQMON_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Minimum log level (overrides the config file)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every city on the configured schedule until Ctrl-C
    Run,
    /// Run a single polling cycle now
    Poll,
    /// Refresh one city immediately
    Refresh {
        #[arg(long)]
        city: CityId,
    },
    /// Show the stored record for the selected (or given) city
    Status {
        #[arg(long)]
        city: Option<CityId>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Inspect or change user settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Accept a reading message (JSON) from a file, or `-` for stdin
    Ingest { input: String },
    /// Check every city's page and the synthetic source without persisting
    Verify {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        /// AQI warning limit
        #[arg(long)]
        index_limit: Option<u32>,

        /// PM2.5 warning limit (µg/m³)
        #[arg(long = "pm25-limit")]
        pm25_limit: Option<f64>,

        /// City shown by `status` and re-checked after each cycle
        #[arg(long)]
        city: Option<CityId>,

        /// Enable or disable notifications (true/false)
        #[arg(long)]
        notifications: Option<bool>,

        /// Polling frequency in minutes
        #[arg(long)]
        frequency: Option<u32>,

        /// Use live pages (true) or synthetic readings only (false)
        #[arg(long)]
        real_data: Option<bool>,
    },
    /// Restore default settings. Stored city records are kept.
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let level_name = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let level = logging::parse_level(level_name)
        .with_context(|| format!("unknown log level '{}'", level_name))?;
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps);

    if let Commands::Verify { json } = cli.command {
        return verify_sources(&config, json).await;
    }

    let store = config.open_store().await.context("opening state store")?;
    let pipeline = Arc::new(Pipeline::new(store, config.notifier(), config.default_settings()));

    match cli.command {
        Commands::Run => {
            let scheduler = Arc::new(build_scheduler(&config, pipeline)?);
            run_daemon(scheduler).await;
        }
        Commands::Poll => {
            let scheduler = build_scheduler(&config, pipeline)?;
            let report = scheduler
                .run_cycle(&CancellationToken::new())
                .await
                .context("a polling cycle is already running")?;
            print_cycle(&report);
        }
        Commands::Refresh { city } => {
            let scheduler = build_scheduler(&config, pipeline)?;
            let outcome = scheduler.refresh_city(city).await?;
            println!(
                "{} refreshed ({} warning(s))",
                city.name(),
                outcome.warnings.len()
            );
            show_status(scheduler.pipeline(), Some(city), false).await?;
        }
        Commands::Status { city, json } => show_status(&pipeline, city, json).await?,
        Commands::Settings { action } => settings_command(&pipeline, action).await?,
        Commands::Ingest { input } => ingest_message(&pipeline, &input).await?,
        Commands::Verify { .. } => {}
    }

    Ok(())
}

fn build_scheduler(config: &ServiceConfig, pipeline: Arc<Service>) -> Result<Scheduler> {
    let live = LiveExtractor::new(config.page_load_timeout()).context("building HTTP client")?;
    Ok(PollScheduler::new(
        pipeline,
        live,
        SyntheticSource::new(),
        config.timing(),
    ))
}

async fn run_daemon(scheduler: Arc<Scheduler>) {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logging::info(LogSource::System, None, "shutdown requested");
            on_signal.cancel();
        }
    });

    logging::info(LogSource::System, None, "aqmon started");
    scheduler.run(cancel).await;
}

fn print_cycle(report: &CycleReport) {
    println!(
        "Polled {} cities: {} live, {} synthetic, {} fallback, {} failed",
        report.polled, report.live, report.synthetic, report.fallback, report.failed
    );
    for warning in &report.warnings {
        println!(
            "  ⚠ {} {} {:.1} (limit {:.1})",
            warning.city.name(),
            warning.metric,
            warning.observed,
            warning.limit
        );
    }
}

async fn show_status(pipeline: &Service, city: Option<CityId>, json: bool) -> Result<()> {
    let settings = pipeline.settings().await?;
    let city = city.unwrap_or(settings.selected_city);
    let status = build_status(pipeline.store(), city, &settings, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", status.render_text());
    }
    Ok(())
}

async fn settings_command(pipeline: &Service, action: SettingsAction) -> Result<()> {
    let settings = match action {
        SettingsAction::Show { json } => {
            let settings = pipeline.settings().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
                return Ok(());
            }
            settings
        }
        SettingsAction::Set {
            index_limit,
            pm25_limit,
            city,
            notifications,
            frequency,
            real_data,
        } => {
            let mut settings = pipeline.settings().await?;
            if let Some(limit) = index_limit {
                settings.thresholds.index_limit = limit;
            }
            if let Some(limit) = pm25_limit {
                anyhow::ensure!(limit.is_finite() && limit >= 0.0, "PM2.5 limit must be a non-negative number");
                settings.thresholds.fine_particulate_limit = limit;
            }
            if let Some(city) = city {
                settings.selected_city = city;
            }
            if let Some(enabled) = notifications {
                settings.notifications_enabled = enabled;
            }
            if let Some(minutes) = frequency {
                anyhow::ensure!(minutes >= 1, "frequency must be at least 1 minute");
                settings.frequency_minutes = minutes;
            }
            if let Some(real) = real_data {
                settings.use_real_data = real;
            }
            settings.save(pipeline.store()).await?;
            settings
        }
        SettingsAction::Reset => Settings::reset(pipeline.store(), pipeline.defaults()).await?,
    };

    print_settings(&settings);
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("AQI limit:          {}", settings.thresholds.index_limit);
    println!("PM2.5 limit:        {}", settings.thresholds.fine_particulate_limit);
    println!("Selected city:      {}", settings.selected_city.name());
    println!("Notifications:      {}", if settings.notifications_enabled { "on" } else { "off" });
    println!("Frequency:          every {} min", settings.frequency_minutes);
    println!("Data:               {}", if settings.use_real_data { "live pages" } else { "synthetic" });
}

async fn ingest_message(pipeline: &Service, input: &str) -> Result<()> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading message from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input))?
    };
    let message = parse_message(&text).context("parsing reading message")?;

    match pipeline.handle_message(&message).await {
        Ok(outcome) => {
            println!(
                "{}: record updated ({} warning(s))",
                outcome.city.name(),
                outcome.warnings.len()
            );
            Ok(())
        }
        Err(MonitorError::UnknownCity(url)) => {
            println!("No monitored city matches {}; message dropped", url);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn verify_sources(config: &ServiceConfig, json: bool) -> Result<()> {
    let live = LiveExtractor::new(config.page_load_timeout()).context("building HTTP client")?;
    let synthetic = SyntheticSource::new();
    let report = verify::run_verification(&live, &synthetic, config.page_load_timeout()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        verify::print_summary(&report);
    }
    Ok(())
}
