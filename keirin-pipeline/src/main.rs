use std::path::PathBuf;
use std::sync::Arc;

use anyhow::ensure;
use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use keirin_api::{WinticketClient, WinticketConfig, YenjoyClient, YenjoyConfig};
use keirin_pipeline::config::Config;
use keirin_pipeline::db::{DbAccessor, queries};
use keirin_pipeline::savers::{
    StatusSaver, Step1Saver, Step2Saver, Step3Saver, Step4Saver, Step5Saver,
};
use keirin_pipeline::status::StepColumn;
use keirin_pipeline::updaters::{
    Step1Updater, Step2Updater, Step3Updater, Step4Updater, Step5Updater,
};

#[derive(Parser)]
#[command(name = "keirin-pipeline")]
#[command(about = "Five-stage keirin data ingestion pipeline")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stage 1: monthly listings (regions, venues, cups)
    Step1 {
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Stage 2: cup details (schedules, races)
    Step2 {
        /// Explicit cup ids; when omitted, cups overlapping the date
        /// range are taken from the database
        #[arg(long = "cup-id")]
        cup_ids: Vec<String>,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
    },
    /// Stage 3: race cards (players, entries, records, lines)
    Step3 {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        /// Refetch finished races too
        #[arg(long)]
        force: bool,
    },
    /// Stage 4: odds
    Step4 {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        /// Bypass all lifecycle gates
        #[arg(long)]
        force: bool,
    },
    /// Stage 5: results scraped from HTML
    Step5 {
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        /// Restrict to these venue ids
        #[arg(long = "venue")]
        venues: Vec<String>,
        /// Rescrape races already marked processed
        #[arg(long)]
        force: bool,
    },
}

fn winticket_client(config: &Config) -> anyhow::Result<Arc<WinticketClient>> {
    let mut client_config = WinticketConfig {
        request_interval: config.api.request_interval,
        retry_count: config.api.retry_count,
        jitter: config.api.jitter,
        ..WinticketConfig::default()
    };
    if let Some(base_url) = &config.api.winticket_base_url {
        client_config.base_url = base_url.clone();
    }
    Ok(Arc::new(WinticketClient::new(client_config)?))
}

fn yenjoy_client(config: &Config) -> anyhow::Result<Arc<YenjoyClient>> {
    let mut client_config = YenjoyConfig {
        request_interval: config.api.request_interval,
        retry_count: config.api.retry_count,
        jitter: config.api.jitter,
        ..YenjoyConfig::default()
    };
    if let Some(base_url) = &config.api.yenjoy_base_url {
        client_config.base_url = base_url.clone();
    }
    Ok(Arc::new(YenjoyClient::new(client_config)?))
}

/// Current month's first and last day, the stage-1 default scope.
fn current_month_range() -> (NaiveDate, NaiveDate) {
    let today = Utc::now().date_naive();
    let first = today.with_day(1).unwrap_or(today);
    let last = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
    .map(|next| next.pred_opt().unwrap_or(today))
    .unwrap_or(today);
    (first, last)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let accessor = Arc::new(DbAccessor::connect(&config.mysql, &config.lock_order).await?);

    match cli.command {
        Command::Step1 {
            start_date,
            end_date,
        } => {
            let (default_start, default_end) = current_month_range();
            let start = start_date.unwrap_or(default_start);
            let end = end_date.unwrap_or(default_end);

            let updater = Step1Updater::new(
                winticket_client(&config)?,
                Step1Saver::new(Arc::clone(&accessor)),
                config.step2.save_batch_size,
            );
            let summary = updater.update_period(start, end).await;
            info!(?summary, "step1 summary");
            ensure!(summary.success(), "stage 1 finished with failed months");
        }
        Command::Step2 {
            cup_ids,
            start_date,
            end_date,
        } => {
            let cup_ids = if cup_ids.is_empty() {
                let (default_start, default_end) = current_month_range();
                let start = start_date.unwrap_or(default_start);
                let end = end_date.unwrap_or(default_end);
                queries::cups::cup_ids_in_range(accessor.pool(), start, end).await?
            } else {
                cup_ids
            };

            let updater = Step2Updater::new(
                winticket_client(&config)?,
                Step2Saver::new(Arc::clone(&accessor)),
                config.step2.max_workers,
                config.step2.rate_limit_wait,
                config.step2.save_batch_size,
            );
            let summary = updater.update_cups(&cup_ids).await;
            info!(?summary, "step2 summary");
            ensure!(summary.success(), "stage 2 finished with failed cups");
        }
        Command::Step3 {
            start_date,
            end_date,
            force,
        } => {
            let races = queries::races::races_to_update(
                accessor.pool(),
                start_date,
                end_date,
                StepColumn::Step3,
                force,
            )
            .await?;

            let updater = Step3Updater::new(
                winticket_client(&config)?,
                Arc::clone(&accessor),
                Step3Saver::new(Arc::clone(&accessor)),
                StatusSaver::new(Arc::clone(&accessor)),
                config.step3.max_workers,
                config.step3.rate_limit_wait,
                config.step3.save_batch_size,
            );
            let summary = updater.update_races(&races, force).await;
            info!(?summary, "step3 summary");
            ensure!(summary.success(), "stage 3 finished without completed races");
        }
        Command::Step4 {
            start_date,
            end_date,
            force,
        } => {
            let races = queries::races::races_to_update(
                accessor.pool(),
                start_date,
                end_date,
                StepColumn::Step4,
                force,
            )
            .await?;

            let updater = Step4Updater::new(
                winticket_client(&config)?,
                Arc::clone(&accessor),
                Step4Saver::new(Arc::clone(&accessor)),
                StatusSaver::new(Arc::clone(&accessor)),
                config.step4.max_workers,
                config.step4.rate_limit_wait,
                config.step4.save_batch_size,
            );
            let summary = updater.update_odds(&races, force).await;
            info!(?summary, "step4 summary");
            ensure!(summary.success(), "stage 4 finished without completed races");
        }
        Command::Step5 {
            start_date,
            end_date,
            venues,
            force,
        } => {
            let venue_filter = if venues.is_empty() {
                None
            } else {
                Some(venues.as_slice())
            };
            let races = queries::races::races_to_scrape(
                accessor.pool(),
                start_date,
                end_date,
                venue_filter,
                force,
            )
            .await?;

            let updater = Step5Updater::new(
                yenjoy_client(&config)?,
                Arc::clone(&accessor),
                Step5Saver::new(Arc::clone(&accessor)),
                StatusSaver::new(Arc::clone(&accessor)),
                config.step5.max_workers,
                config.step5.rate_limit_wait,
                config.step5.save_batch_size,
            );
            let summary = updater.update_results(&races).await;
            info!(?summary, "step5 summary");
            ensure!(summary.success(), "stage 5 finished without completed races");
        }
    }

    Ok(())
}
