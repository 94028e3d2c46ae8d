use std::{path::PathBuf, time::Duration};

use chrono::{Month, NaiveDate};
use clap::{Parser, Subcommand};

use crate::statistics::Pacing;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    #[clap(flatten)]
    pub device: DeviceArgs,

    #[clap(flatten)]
    pub pacing: PacingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub struct DeviceArgs {
    /// Inverter device ID, as shown in the mobile app.
    #[clap(long = "device-id", env = "LUMENTREE_DEVICE_ID")]
    pub device_id: String,

    /// Pre-issued API token, the device gets authenticated when omitted.
    #[clap(long = "http-token", env = "LUMENTREE_HTTP_TOKEN", hide_env_values = true)]
    pub http_token: Option<String>,

    #[clap(
        long = "cache-dir",
        env = "LUMENTREE_CACHE_DIR",
        default_value = ".storage/lumentree_stats"
    )]
    pub cache_dir: PathBuf,
}

#[derive(Copy, Clone, Parser)]
pub struct PacingArgs {
    /// Pause between consecutive day fetches.
    #[clap(long = "base-delay", env = "LUMENTREE_BASE_DELAY", default_value = "200ms")]
    pub base_delay: humantime::Duration,

    /// Longest pause after consecutive failures.
    #[clap(long = "max-delay", env = "LUMENTREE_MAX_DELAY", default_value = "5s")]
    pub max_delay: humantime::Duration,
}

impl From<PacingArgs> for Pacing {
    fn from(args: PacingArgs) -> Self {
        Self { base_delay: args.base_delay.into(), max_delay: args.max_delay.into() }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Fetch today's counters without touching the cache.
    #[clap(name = "today")]
    Today,

    /// Show the device description.
    #[clap(name = "device-info")]
    DeviceInfo,

    /// Fetch the missing days of a date range.
    #[clap(name = "backfill")]
    Backfill(BackfillArgs),

    /// Walk back from today until the installation date.
    #[clap(name = "backfill-all")]
    BackfillAll(SweepArgs),

    /// Fill the missing days of the recent years.
    #[clap(name = "backfill-gaps")]
    BackfillGaps(GapArgs),

    /// Print the cached statistics.
    #[clap(name = "summary")]
    Summary {
        #[command(subcommand)]
        period: SummaryPeriod,
    },

    /// Rebuild the monthly and yearly totals from the daily records.
    #[clap(name = "recompute")]
    Recompute(YearArgs),

    /// Delete the cached year, or everything of the device.
    #[clap(name = "purge")]
    Purge(PurgeArgs),

    /// Mark the dates as having no data.
    #[clap(name = "mark-empty")]
    MarkEmpty(MarkEmptyArgs),

    /// Override the coverage bounds of a year.
    #[clap(name = "mark-coverage")]
    MarkCoverage(MarkCoverageArgs),

    /// Sweep the full history once, then keep the recent days up to date.
    #[clap(name = "run")]
    Run(RunArgs),
}

#[derive(Parser)]
pub struct BackfillArgs {
    /// Number of days ending today.
    #[clap(long, conflicts_with_all = ["since", "until"], required_unless_present = "since")]
    pub days: Option<u64>,

    /// First day of the range.
    #[clap(long)]
    pub since: Option<NaiveDate>,

    /// Last day of the range, today by default.
    #[clap(long, requires = "since")]
    pub until: Option<NaiveDate>,
}

#[derive(Copy, Clone, Parser)]
pub struct SweepArgs {
    #[clap(long = "max-years", default_value = "10")]
    pub max_years: u32,

    /// Stop after this many consecutive days without data.
    #[clap(long = "empty-streak", default_value = "14")]
    pub empty_streak: usize,
}

#[derive(Copy, Clone, Parser)]
pub struct GapArgs {
    /// Number of recent years to look for gaps in.
    #[clap(long = "gap-years", default_value = "3")]
    pub gap_years: u32,

    /// Stop after this many days got filled.
    #[clap(long = "max-days-per-run", default_value = "30")]
    pub max_days_per_run: usize,
}

#[derive(Subcommand)]
pub enum SummaryPeriod {
    /// Daily records and totals of a month.
    Month {
        /// English month name, for example `march` or `mar`.
        month: Month,

        #[clap(flatten)]
        year: YearArgs,
    },

    /// Monthly and yearly totals.
    Year(YearArgs),

    /// Totals over all cached years.
    Total {
        #[clap(long = "max-years", default_value = "10")]
        max_years: u32,
    },
}

#[derive(Copy, Clone, Parser)]
pub struct YearArgs {
    /// Calendar year, the current one by default.
    #[clap(long)]
    pub year: Option<i32>,
}

#[derive(Copy, Clone, Parser)]
pub struct PurgeArgs {
    #[clap(flatten)]
    pub year: YearArgs,

    /// Delete every cached year of the device.
    #[clap(long, conflicts_with = "year")]
    pub all: bool,
}

#[derive(Parser)]
pub struct MarkEmptyArgs {
    #[clap(flatten)]
    pub year: YearArgs,

    #[clap(required = true, num_args = 1..)]
    pub dates: Vec<NaiveDate>,
}

#[derive(Copy, Clone, Parser)]
pub struct MarkCoverageArgs {
    #[clap(flatten)]
    pub year: YearArgs,

    #[clap(long, required_unless_present = "latest")]
    pub earliest: Option<NaiveDate>,

    #[clap(long)]
    pub latest: Option<NaiveDate>,
}

#[derive(Copy, Clone, Parser)]
pub struct RunArgs {
    /// Period between the maintenance passes.
    #[clap(long, env = "LUMENTREE_RUN_INTERVAL", default_value = "24h")]
    interval: humantime::Duration,

    #[clap(flatten)]
    pub sweep: SweepArgs,

    #[clap(flatten)]
    pub gaps: GapArgs,
}

impl RunArgs {
    pub fn interval(&self) -> Duration {
        self.interval.into()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_verify_args() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_backfill_range() {
        let args = Args::parse_from([
            "lumentree-stats",
            "--device-id",
            "P1",
            "backfill",
            "--since",
            "2024-03-01",
        ]);
        let Command::Backfill(backfill) = args.command else {
            panic!("unexpected command");
        };
        assert_eq!(backfill.since, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(backfill.days, None);
    }

    #[test]
    fn test_parse_pacing() {
        let args = Args::parse_from(["lumentree-stats", "--device-id", "P1", "today"]);
        let pacing = Pacing::from(args.pacing);
        assert_eq!(pacing, Pacing::default());
    }

    #[test]
    fn test_parse_summary_month() {
        let args = Args::parse_from([
            "lumentree-stats",
            "--device-id",
            "P1",
            "summary",
            "month",
            "march",
            "--year",
            "2024",
        ]);
        let Command::Summary { period: SummaryPeriod::Month { month, year } } = args.command else {
            panic!("unexpected command");
        };
        assert_eq!(month, Month::March);
        assert_eq!(year.year, Some(2024));
    }
}
