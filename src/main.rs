//! Glucose Timeline CLI
//!
//! Terminal dashboard for the glucose readings API:
//! - Watch the live timeline (bulk load + poll + stream)
//! - Fetch a window of readings once
//! - Render relative labels
//! - Generate a config file

use anyhow::Context;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use glucose_timeline::config::generate_default_config;
use glucose_timeline::timeline::{
    chart_series, normalize_timestamp, relative_label, status_line, summary, table_rows,
    TimelineSummary,
};
use glucose_timeline::{
    ClientConfig, Config, LiveSession, LoggingConfig, RawTimestamp, ReadingQuery, ReadingsClient,
    Reconciler, SessionConfig, TimelineEvent, ViewWindow,
};

#[derive(Parser)]
#[command(name = "glucose-timeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Live glucose readings timeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Readings API URL, overrides the config file
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format (table, json, csv)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow the live timeline
    Watch {
        /// History to load on start (e.g., 30m, 24h, 7d)
        #[arg(short, long)]
        last: Option<String>,
        /// Rows of the table to show
        #[arg(short, long, default_value = "10")]
        rows: usize,
    },

    /// Fetch a window of readings once
    Fetch {
        /// Window length ending now or at --to (e.g., 30m, 24h, 7d)
        #[arg(short, long, default_value = "24h")]
        last: String,
        /// End of the window: epoch seconds or ISO 8601
        #[arg(long)]
        to: Option<String>,
        /// Bucket size, overrides the config file
        #[arg(short, long)]
        granularity: Option<String>,
    },

    /// Print the relative label for an elapsed number of seconds
    Label {
        seconds: i64,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }

    init_logging(&config.logging);

    match cli.command {
        Commands::Watch { last, rows } => {
            let now = Utc::now().timestamp();
            let from = match last {
                Some(last) => now - parse_duration(&last)?.num_seconds(),
                None => config.window_start(now),
            };
            watch(&config, from, rows).await?;
        }

        Commands::Fetch {
            last,
            to,
            granularity,
        } => {
            let to = match to {
                Some(raw) => Some(parse_timestamp(&raw)?),
                None => None,
            };
            let end = to.unwrap_or_else(|| Utc::now().timestamp());
            let from = end - parse_duration(&last)?.num_seconds();
            let granularity = granularity.unwrap_or_else(|| config.sync.granularity.clone());

            let client = ReadingsClient::new(ClientConfig::from(&config))?;
            let raw = client
                .fetch_readings(&ReadingQuery::bulk(granularity, from, to))
                .await
                .context("Error fetching readings")?;

            let mut reconciler = Reconciler::new(config.sync.splice_policy);
            let timeline = reconciler.seed(&raw);

            match cli.format.as_str() {
                "json" => {
                    let body = serde_json::json!({
                        "readings": table_rows(timeline),
                        "series": chart_series(timeline),
                        "summary": summary(timeline),
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                "csv" => print_csv(timeline)?,
                _ => {
                    print_table(timeline, usize::MAX);
                    if let Some(stats) = summary(timeline) {
                        println!();
                        print_summary(&stats);
                    }
                }
            }
        }

        Commands::Label { seconds } => {
            println!("{}", relative_label(seconds));
        }

        Commands::Config { output } => {
            let content = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &content)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", content);
                }
            }
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("glucose_timeline={}", logging.level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn watch(config: &Config, from: i64, rows: usize) -> anyhow::Result<()> {
    let client = ReadingsClient::new(ClientConfig::from(config))?;
    let mut session = LiveSession::new(Arc::new(client), SessionConfig::from(config));
    let mut events = session.subscribe().await;

    session.start(ViewWindow::Live { from })?;
    tracing::info!(session = %session.id(), "Watching readings");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(TimelineEvent::Notice { message }) => {
                    println!();
                    eprintln!("! {}", message);
                }
                Ok(TimelineEvent::LiveUpdated { .. }) => {}
                Ok(_) => {
                    let timeline = session.timeline().await;
                    println!();
                    print_table(&timeline, rows);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Display fell behind timeline events");
                }
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let line = {
                    let reconciler = session.reconciler();
                    let guard = reconciler.read().await;
                    status_line(
                        Utc::now().timestamp(),
                        guard.timeline(),
                        guard.most_recent().as_ref(),
                    )
                };
                if let Some(line) = line {
                    print!("\r{:<110}", line);
                    std::io::stdout().flush()?;
                }
            }
        }
    }

    println!();
    session.stop().await;
    Ok(())
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(minutes) = s.strip_suffix('m') {
        Ok(Duration::minutes(minutes.parse()?))
    } else if let Some(hours) = s.strip_suffix('h') {
        Ok(Duration::hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(Duration::days(days.parse()?))
    } else if let Some(weeks) = s.strip_suffix('w') {
        Ok(Duration::weeks(weeks.parse()?))
    } else {
        anyhow::bail!("Invalid duration format: {}. Use: 30m, 24h, 7d, 2w", s)
    }
}

fn parse_timestamp(s: &str) -> anyhow::Result<i64> {
    let raw = match s.parse::<i64>() {
        Ok(ts) => RawTimestamp::Epoch(ts),
        Err(_) => RawTimestamp::Iso(s.to_string()),
    };
    Ok(normalize_timestamp(&raw)?)
}

fn print_table(timeline: &[glucose_timeline::Reading], limit: usize) {
    if timeline.is_empty() {
        println!("No readings for the selected window");
        return;
    }

    println!("{:<14} {}", "Value (mmol/L)", "Timestamp (UTC)");
    println!("{}", "-".repeat(38));

    for row in table_rows(timeline).into_iter().take(limit) {
        println!("{:<14} {}", row.value, row.time);
    }

    if timeline.len() > limit {
        println!("... {} more", timeline.len() - limit);
    }
}

fn print_summary(stats: &TimelineSummary) {
    println!(
        "{} readings, min={:.1}, max={:.1}, avg={:.1}",
        stats.count, stats.min, stats.max, stats.mean
    );
}

fn print_csv(timeline: &[glucose_timeline::Reading]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["timestamp", "value", "time"])?;

    for row in table_rows(timeline) {
        writer.write_record([row.timestamp.to_string(), row.value.to_string(), row.time])?;
    }

    writer.flush()?;
    Ok(())
}
