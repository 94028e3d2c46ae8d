#![allow(clippy::doc_markdown)]
#![doc = include_str!("../README.md")]

mod api;
mod cache;
mod cli;
mod clock;
mod prelude;
mod quantity;
mod statistics;
mod tables;

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use clap::{Parser, crate_version};
use tokio::time::{MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;

use crate::{
    api::Lumentree,
    cache::Store,
    cli::{Args, BackfillArgs, Command, DeviceArgs, RunArgs, SummaryPeriod},
    clock::{Clock, SystemClock},
    prelude::*,
    statistics::{Backfiller, DayFetcher, FetchDay, Pacing},
    tables::{build_device_info_table, build_month_series_table, build_totals_table},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .without_time()
        .compact()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let this_year = clock.today().year();
    let pacing = Pacing::from(args.pacing);

    match args.command {
        Command::Today => {
            let fetcher = connect(&args.device, &clock).await?;
            let today = clock.today();
            let record = fetcher.fetch_day(today).await?;
            println!("{}", build_totals_table([(today, record)]));
        }
        Command::DeviceInfo => {
            let api = authenticate(&args.device, &clock).await?;
            let device_info = api.get_device_info(&args.device.device_id).await?;
            info!(device_id = ?device_info.device_id(), "found");
            println!("{}", build_device_info_table(&device_info));
        }
        Command::Backfill(backfill_args) => {
            let fetcher = connect(&args.device, &clock).await?;
            let backfiller = new_backfiller(&args.device, pacing, &clock, fetcher);
            backfill(&backfiller, &backfill_args, clock.today()).await;
        }
        Command::BackfillAll(sweep_args) => {
            let fetcher = connect(&args.device, &clock).await?;
            let backfiller = new_backfiller(&args.device, pacing, &clock, fetcher);
            backfiller.backfill_all(sweep_args.max_years, sweep_args.empty_streak).await;
        }
        Command::BackfillGaps(gap_args) => {
            let fetcher = connect(&args.device, &clock).await?;
            let backfiller = new_backfiller(&args.device, pacing, &clock, fetcher);
            backfiller.backfill_gaps(gap_args.gap_years, gap_args.max_days_per_run).await;
        }
        Command::Run(run_args) => {
            let fetcher = connect(&args.device, &clock).await?;
            let backfiller = new_backfiller(&args.device, pacing, &clock, fetcher);
            run(&backfiller, &run_args, clock.as_ref()).await;
        }
        Command::Summary { period } => {
            let backfiller = new_backfiller(&args.device, pacing, &clock, ());
            match period {
                SummaryPeriod::Month { month, year } => {
                    let year = year.year.unwrap_or(this_year);
                    let series = backfiller.month_series(year, month).await;
                    let total = backfiller.summarize_month(year, month).await;
                    println!("{}", build_month_series_table(&series, &total));
                }
                SummaryPeriod::Year(year) => {
                    let year = year.year.unwrap_or(this_year);
                    let cache = backfiller.load(year).await;
                    let total = backfiller.summarize_year(year).await;
                    let rows = cache
                        .monthly_summaries()
                        .map(|(month, totals)| (month.name().to_string(), totals))
                        .chain([(year.to_string(), total)]);
                    println!("{}", build_totals_table(rows));
                }
                SummaryPeriod::Total { max_years } => {
                    let lifetime = backfiller.lifetime_totals(max_years).await;
                    let label = match lifetime.years {
                        Some(years) => format!(
                            "{}–{} ({} years)",
                            years.start(),
                            years.end(),
                            lifetime.n_years,
                        ),
                        None => "No data".to_string(),
                    };
                    println!("{}", build_totals_table([(label, lifetime.totals)]));
                }
            }
        }
        Command::Recompute(year) => {
            let backfiller = new_backfiller(&args.device, pacing, &clock, ());
            let year = year.year.unwrap_or(this_year);
            let total = backfiller.recompute(year).await;
            println!("{}", build_totals_table([(year, total)]));
        }
        Command::Purge(purge_args) => {
            let backfiller = new_backfiller(&args.device, pacing, &clock, ());
            let is_purged = if purge_args.all {
                backfiller.purge_all().await
            } else {
                backfiller.purge(purge_args.year.year.unwrap_or(this_year)).await
            };
            info!(is_purged, "purged");
        }
        Command::MarkEmpty(mark_args) => {
            let backfiller = new_backfiller(&args.device, pacing, &clock, ());
            let year = mark_args.year.year.unwrap_or(this_year);
            backfiller.mark_empty_dates(year, &mark_args.dates).await;
        }
        Command::MarkCoverage(mark_args) => {
            let backfiller = new_backfiller(&args.device, pacing, &clock, ());
            let year = mark_args.year.year.unwrap_or(this_year);
            backfiller.mark_coverage_range(year, mark_args.earliest, mark_args.latest).await;
        }
    }

    info!("done!");
    Ok(())
}

/// Use the provided token, or authenticate the device.
async fn authenticate(args: &DeviceArgs, clock: &Arc<dyn Clock>) -> Result<Lumentree> {
    let mut api = Lumentree::try_new(Arc::clone(clock))?;
    match &args.http_token {
        Some(token) => api.set_token(Some(token.clone())),
        None => {
            api.authenticate(&args.device_id).await?;
        }
    }
    Ok(api)
}

async fn connect(args: &DeviceArgs, clock: &Arc<dyn Clock>) -> Result<DayFetcher<Lumentree>> {
    Ok(DayFetcher::new(authenticate(args, clock).await?, args.device_id.clone()))
}

/// Cache operations work without a fetcher, pass `()` for those.
fn new_backfiller<F>(
    args: &DeviceArgs,
    pacing: Pacing,
    clock: &Arc<dyn Clock>,
    fetcher: F,
) -> Backfiller<F> {
    Backfiller::builder()
        .fetcher(fetcher)
        .store(Store::new(&args.cache_dir))
        .device_id(args.device_id.clone())
        .clock(Arc::clone(clock))
        .pacing(pacing)
        .build()
}

async fn backfill<F: FetchDay>(backfiller: &Backfiller<F>, args: &BackfillArgs, today: NaiveDate) {
    match (args.days, args.since) {
        (Some(n_days), _) => {
            backfiller.backfill_last_n_days(n_days).await;
        }
        (None, Some(since)) => {
            backfiller.backfill_days(since, args.until.unwrap_or(today)).await;
        }
        (None, None) => {
            warn!("nothing to backfill, specify either `--days` or `--since`");
        }
    }
}

/// Sweep the whole history once, then refresh the recent days and fill the gaps every interval.
///
/// Passes never overlap since they all run from this single loop.
#[instrument(skip_all)]
async fn run<F: FetchDay>(backfiller: &Backfiller<F>, args: &RunArgs, clock: &dyn Clock) {
    backfiller.backfill_all(args.sweep.max_years, args.sweep.empty_streak).await;

    let period = args.interval();
    let mut interval = interval(period);
    interval.reset_after(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let today = clock.today();
        let yesterday = today.pred_opt().unwrap_or(today);
        backfiller.backfill_days(yesterday, today).await;
        backfiller.backfill_gaps(args.gaps.gap_years, args.gaps.max_days_per_run).await;
    }
}
