//! Sweeps that bring the year caches up to date with the cloud.
//!
//! Days are fetched strictly one after another with an adaptive pause in between,
//! and every year touched is loaded once and saved at most once per sweep.
//! Sweeps for the same device must not run concurrently.

use std::{mem, ops::RangeInclusive, sync::Arc};

use bon::Builder;
use chrono::{Datelike, Days, Month, NaiveDate};
use itertools::{Itertools, MinMaxResult};

use crate::{
    cache::{Store, YearCache},
    clock::Clock,
    prelude::*,
    statistics::{
        DayRecord,
        EnergyTotals,
        fetcher::FetchDay,
        pacing::{Backoff, Pacing},
    },
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Outcome {
    Populated,
    Empty,
    Failed,
}

/// What a sweep did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, derive_more::Display)]
#[display("{populated} populated, {empty} empty, {failed} failed, {skipped} skipped")]
pub struct Tally {
    pub populated: usize,
    pub empty: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    const fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Populated => self.populated += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Failed => self.failed += 1,
        }
    }
}

/// Sum of the yearly totals over the years that have at least one recorded day.
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct LifetimeTotals {
    pub totals: EnergyTotals,
    pub n_years: usize,
    pub years: Option<RangeInclusive<i32>>,
}

#[derive(Builder)]
pub struct Backfiller<F> {
    fetcher: F,

    store: Store,

    #[builder(into)]
    device_id: String,

    clock: Arc<dyn Clock>,

    #[builder(default)]
    pacing: Pacing,
}

impl<F> Backfiller<F> {
    pub async fn load(&self, year: i32) -> YearCache {
        let store = self.store.clone();
        let device_id = self.device_id.clone();
        tokio::task::spawn_blocking(move || store.load(&device_id, year)).await.unwrap_or_else(
            |error| {
                error!(year, %error, "loading task failed, starting from scratch");
                YearCache::default()
            },
        )
    }

    pub async fn save(&self, year: i32, cache: YearCache) {
        let store = self.store.clone();
        let device_id = self.device_id.clone();
        if let Err(error) =
            tokio::task::spawn_blocking(move || store.save(&device_id, year, &cache)).await
        {
            error!(year, %error, "saving task failed");
        }
    }

    pub async fn summarize_month(&self, year: i32, month: Month) -> EnergyTotals {
        self.load(year).await.summarize_month(month)
    }

    pub async fn summarize_year(&self, year: i32) -> EnergyTotals {
        self.load(year).await.summarize_year()
    }

    pub async fn month_series(
        &self,
        year: i32,
        month: Month,
    ) -> Vec<(NaiveDate, Option<DayRecord>)> {
        self.load(year).await.month_series(year, month)
    }

    /// Last `max_years` calendar years, the current one first.
    fn recent_years(&self, max_years: u32) -> impl Iterator<Item = i32> + use<F> {
        let current_year = self.clock.today().year();
        (0..max_years).map_while(move |offset| current_year.checked_sub_unsigned(offset))
    }

    #[instrument(skip_all, fields(max_years = max_years))]
    pub async fn lifetime_totals(&self, max_years: u32) -> LifetimeTotals {
        let mut totals = EnergyTotals::default();
        let mut years = Vec::new();
        for year in self.recent_years(max_years) {
            let cache = self.load(year).await;
            if cache.daily.is_empty() {
                continue;
            }
            debug!(year, total = ?cache.yearly_total, "contributing");
            totals = totals + cache.yearly_total;
            years.push(year);
        }
        let range = match years.iter().copied().minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(year) => Some(year..=year),
            MinMaxResult::MinMax(earliest, latest) => Some(earliest..=latest),
        };
        LifetimeTotals { totals: totals.round_to_watt_hours(), n_years: years.len(), years: range }
    }

    /// Rebuild the roll-ups of the year from its daily records.
    #[instrument(skip_all, fields(year = year))]
    pub async fn recompute(&self, year: i32) -> EnergyTotals {
        let mut cache = self.load(year).await;
        cache.recompute_aggregates();
        let total = cache.summarize_year();
        info!(n_days = cache.daily.len(), "recomputed");
        self.save(year, cache).await;
        total
    }

    #[instrument(skip_all, fields(year = year))]
    pub async fn purge(&self, year: i32) -> bool {
        let store = self.store.clone();
        let device_id = self.device_id.clone();
        tokio::task::spawn_blocking(move || store.purge_year(&device_id, year))
            .await
            .unwrap_or_else(|error| {
                error!(%error, "purging task failed");
                false
            })
    }

    #[instrument(skip_all)]
    pub async fn purge_all(&self) -> bool {
        let store = self.store.clone();
        let device_id = self.device_id.clone();
        tokio::task::spawn_blocking(move || store.purge_device(&device_id)).await.unwrap_or_else(
            |error| {
                error!(%error, "purging task failed");
                false
            },
        )
    }

    /// Mark the dates as having no data, returns how many were newly marked.
    #[instrument(skip_all, fields(year = year, n_dates = dates.len()))]
    pub async fn mark_empty_dates(&self, year: i32, dates: &[NaiveDate]) -> usize {
        let mut cache = self.load(year).await;
        let mut n_marked = 0;
        for &date in dates {
            if date.year() != year {
                warn!(%date, "ignoring a date from another year");
            } else if cache.mark_empty(date) {
                n_marked += 1;
            }
        }
        if n_marked != 0 {
            self.save(year, cache).await;
        }
        info!(n_marked, "marked");
        n_marked
    }

    #[instrument(skip_all, fields(year = year))]
    pub async fn mark_coverage_range(
        &self,
        year: i32,
        earliest: Option<NaiveDate>,
        latest: Option<NaiveDate>,
    ) {
        let mut cache = self.load(year).await;
        cache.set_coverage(earliest, latest);
        info!(coverage = ?cache.meta.coverage, "updated");
        self.save(year, cache).await;
    }
}

impl<F: FetchDay> Backfiller<F> {
    /// Fetch the day, apply it to the cache, and pause before the next fetch.
    async fn process(
        &self,
        cache: &mut YearCache,
        on: NaiveDate,
        backoff: &mut Backoff,
    ) -> Outcome {
        let outcome = match self.fetcher.fetch_day(on).await {
            Ok(record) if record.is_empty() => {
                backoff.on_success();
                cache.mark_empty(on);
                Outcome::Empty
            }
            Ok(record) => {
                backoff.on_success();
                cache.update_daily(on, record);
                Outcome::Populated
            }
            Err(error) => {
                backoff.on_failure();
                warn!(%on, delay = ?backoff.delay(), "skipping the day: {error:#}");
                Outcome::Failed
            }
        };
        if outcome != Outcome::Failed {
            cache.meta.last_backfill_date = Some(on);
        }
        backoff.pause().await;
        outcome
    }

    /// Fetch every unknown day in the inclusive range.
    #[instrument(skip_all, fields(since = %since, until = %until))]
    pub async fn backfill_days(&self, since: NaiveDate, until: NaiveDate) -> Tally {
        let mut tally = Tally::default();
        if since > until {
            warn!("the range is empty");
            return tally;
        }
        let mut backoff = self.pacing.backoff();
        for year in since.year()..=until.year() {
            let (Some(first_day), Some(last_day)) =
                (NaiveDate::from_yo_opt(year, 1), NaiveDate::from_ymd_opt(year, 12, 31))
            else {
                continue;
            };
            let (first_day, last_day) = (first_day.max(since), last_day.min(until));
            let mut cache = self.load(year).await;
            let mut is_dirty = false;
            for on in first_day.iter_days().take_while(|on| *on <= last_day) {
                if cache.is_known(on) {
                    tally.skipped += 1;
                    continue;
                }
                let outcome = self.process(&mut cache, on, &mut backoff).await;
                is_dirty |= outcome != Outcome::Failed;
                tally.count(outcome);
            }
            if is_dirty {
                self.save(year, cache).await;
            }
        }
        info!(%tally, "backfilled");
        tally
    }

    /// Backfill the `n_days` days ending today.
    pub async fn backfill_last_n_days(&self, n_days: u64) -> Tally {
        if n_days == 0 {
            return Tally::default();
        }
        let today = self.clock.today();
        let Some(since) = today.checked_sub_days(Days::new(n_days - 1)) else {
            warn!(n_days, "too many days");
            return Tally::default();
        };
        self.backfill_days(since, today).await
    }

    /// Walk back from today until `empty_streak` consecutive days turn out empty,
    /// or `max_years` years worth of days have been walked.
    ///
    /// Only fetched days count toward the streak. Known days, recorded or marked empty, reset it.
    /// A zero `empty_streak` disables the early stop.
    #[instrument(skip_all, fields(max_years = max_years, empty_streak = empty_streak))]
    pub async fn backfill_all(&self, max_years: u32, empty_streak: usize) -> Tally {
        let mut tally = Tally::default();
        let max_days = u64::from(max_years) * 366;
        if max_days == 0 {
            return tally;
        }
        let today = self.clock.today();
        let mut backoff = self.pacing.backoff();
        let mut streak = 0;
        let mut year = today.year();
        let mut cache = self.load(year).await;

        for on in (0..max_days).map_while(|n_days| today.checked_sub_days(Days::new(n_days))) {
            if on.year() != year {
                self.save(year, mem::take(&mut cache)).await;
                year = on.year();
                cache = self.load(year).await;
            }
            if cache.is_known(on) {
                tally.skipped += 1;
                streak = 0;
                continue;
            }
            let outcome = self.process(&mut cache, on, &mut backoff).await;
            match outcome {
                Outcome::Populated => streak = 0,
                Outcome::Empty => streak += 1,
                Outcome::Failed => {}
            }
            tally.count(outcome);
            if empty_streak != 0 && streak >= empty_streak {
                info!(%on, "reached the empty streak, assuming the installation date has passed");
                break;
            }
        }

        self.save(year, cache).await;
        info!(%tally, "swept");
        tally
    }

    /// Fill unknown days of the recent years, oldest first within a year,
    /// until `max_days_per_run` days got populated.
    ///
    /// Returns the number of populated days.
    #[instrument(skip_all, fields(max_years = max_years, max_days_per_run = max_days_per_run))]
    pub async fn backfill_gaps(&self, max_years: u32, max_days_per_run: usize) -> usize {
        let today = self.clock.today();
        let mut backoff = self.pacing.backoff();
        let mut n_filled = 0;

        for year in self.recent_years(max_years) {
            if n_filled >= max_days_per_run {
                break;
            }
            let (Some(first_day), Some(last_day)) =
                (NaiveDate::from_yo_opt(year, 1), NaiveDate::from_ymd_opt(year, 12, 31))
            else {
                continue;
            };
            let last_day = last_day.min(today);
            let mut cache = self.load(year).await;
            let mut is_dirty = false;
            for on in first_day.iter_days().take_while(|on| *on <= last_day) {
                if cache.is_known(on) {
                    continue;
                }
                let outcome = self.process(&mut cache, on, &mut backoff).await;
                is_dirty |= outcome != Outcome::Failed;
                if outcome == Outcome::Populated {
                    n_filled += 1;
                    if n_filled >= max_days_per_run {
                        info!(%on, "reached the limit");
                        break;
                    }
                }
            }
            if is_dirty {
                self.save(year, cache).await;
            }
        }

        info!(n_filled, "filled the gaps");
        n_filled
    }
}
