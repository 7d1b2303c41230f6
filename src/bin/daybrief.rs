//! daybrief CLI
//!
//! `daybrief run [YYYY-MM-DD]` runs the analysis pipeline for a date
//! (today by default). `daybrief calendar summary` and
//! `daybrief calendar upcoming [DAYS]` inspect the market calendars.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use daybrief::calendar::CalendarSet;
use daybrief::config::PipelineConfig;
use daybrief::pipeline::{DailyPipeline, RunStatus};
use daybrief::provider::{OpenAiReasoner, ScriptedReasoner};
use daybrief::Result;

fn usage() -> ! {
    eprintln!("usage: daybrief run [YYYY-MM-DD]");
    eprintln!("       daybrief calendar summary");
    eprintln!("       daybrief calendar upcoming [DAYS]");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("run") => {
            let date = match args.get(1) {
                Some(raw) => raw.parse::<NaiveDate>().unwrap_or_else(|_| {
                    eprintln!("invalid date: {raw} (expected YYYY-MM-DD)");
                    std::process::exit(2);
                }),
                None => Utc::now().date_naive(),
            };
            run_pipeline(date).await
        }
        Some("calendar") => calendar_command(&args[1..]),
        _ => usage(),
    }
}

async fn run_pipeline(date: NaiveDate) -> Result<()> {
    let config = PipelineConfig::load_or_default("config.yaml")?;

    // Without an API key the run is a dry run: every step gets the same
    // placeholder reply, which still exercises the guard and the archive.
    let reasoner = if std::env::var("OPENAI_API_KEY").is_ok() {
        OpenAiReasoner::new(
            Arc::new(async_openai::Client::new()),
            &config.api.model,
            config.api.temperature,
            config.api.max_tokens,
        )
        .into_svc()
    } else {
        warn!("OPENAI_API_KEY not set, using scripted placeholder responses");
        ScriptedReasoner::repeating(
            serde_json::json!({"note": "dry run, no model configured"}),
            0,
            config.steps.len(),
        )
        .into_svc()
    };

    let pipeline = DailyPipeline::new(config, reasoner);
    let summary = pipeline.run(date).await?;
    println!("{}", serde_yaml::to_string(&summary)?);

    match summary.status {
        RunStatus::Success | RunStatus::Partial => Ok(()),
        RunStatus::Failed => {
            std::process::exit(1);
        }
    }
}

fn calendar_command(args: &[String]) -> Result<()> {
    let config = PipelineConfig::load_or_default("config.yaml")?;
    let set = CalendarSet::load(config.paths.markets_dir())?;

    match args.first().map(String::as_str) {
        Some("summary") => {
            println!("{}", serde_yaml::to_string(&set.summaries())?);
        }
        Some("upcoming") => {
            let days: i64 = args
                .get(1)
                .map(|raw| {
                    raw.parse().unwrap_or_else(|_| {
                        eprintln!("invalid day count: {raw}");
                        std::process::exit(2);
                    })
                })
                .unwrap_or(7);
            for market in daybrief::calendar::Market::ALL {
                let upcoming = set.calendar(market).upcoming_events(days);
                let count: usize = upcoming.values().map(Vec::len).sum();
                info!(market = market.as_str(), events = count, "upcoming events");
                println!("# {}", market.as_str());
                println!("{}", serde_yaml::to_string(&upcoming)?);
            }
        }
        _ => usage(),
    }
    Ok(())
}
