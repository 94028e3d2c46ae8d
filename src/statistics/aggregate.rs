//! Incremental and full roll-ups of a [`YearCache`].
//!
//! Monthly sums are always recomputed from the month's daily records, never patched with deltas,
//! so out-of-order and repeated updates converge to the same document.

use std::iter;

use chrono::{Datelike, Month, NaiveDate};

use crate::{
    cache::{MONTHS_PER_YEAR, YearCache},
    prelude::*,
    quantity::energy::KilowattHours,
    statistics::{DayRecord, EnergyTotals, Field, Fields},
};

impl YearCache {
    #[must_use]
    pub fn has_record(&self, date: NaiveDate) -> bool {
        self.daily.contains_key(&date)
    }

    #[must_use]
    pub fn is_marked_empty(&self, date: NaiveDate) -> bool {
        self.meta.empty_dates.contains(&date)
    }

    /// Whether the date was already fetched, with or without data.
    #[must_use]
    pub fn is_known(&self, date: NaiveDate) -> bool {
        self.has_record(date) || self.is_marked_empty(date)
    }

    /// Upsert the day and roll up its month and the year.
    pub fn update_daily(&mut self, date: NaiveDate, values: DayRecord) {
        self.daily.insert(date, values);
        self.meta.coverage.extend(date);
        if self.meta.empty_dates.remove(&date) {
            debug!(%date, "cleared the empty marker");
        }
        self.roll_up_month(date.month0() as usize);
        self.roll_up_year();
    }

    /// Mark the date as having no data.
    ///
    /// Returns `false` when the date is already marked or has a record.
    /// A recorded day always wins over the marker.
    pub fn mark_empty(&mut self, date: NaiveDate) -> bool {
        if self.has_record(date) {
            warn!(%date, "refusing to mark a recorded day as empty");
            return false;
        }
        self.meta.empty_dates.insert(date)
    }

    /// Rebuild the monthly and yearly roll-ups from the daily records alone.
    pub fn recompute_aggregates(&mut self) {
        self.monthly = Fields::default();
        for index in 0..MONTHS_PER_YEAR {
            self.roll_up_month(index);
        }
        self.roll_up_year();
    }

    /// Manually override the coverage bounds, absent bounds are left as they are.
    pub fn set_coverage(&mut self, earliest: Option<NaiveDate>, latest: Option<NaiveDate>) {
        if let Some(earliest) = earliest {
            self.meta.coverage.earliest = Some(earliest);
        }
        if let Some(latest) = latest {
            self.meta.coverage.latest = Some(latest);
        }
    }

    pub fn summarize_month(&self, month: Month) -> EnergyTotals {
        let index = month.number_from_month() as usize - 1;
        Fields::from_fn(|field| self.monthly[field][index])
    }

    pub fn summarize_year(&self) -> EnergyTotals {
        self.yearly_total
    }

    /// Totals of every month, January first.
    pub fn monthly_summaries(&self) -> impl Iterator<Item = (Month, EnergyTotals)> + '_ {
        iter::successors(Some(Month::January), |month| {
            (*month != Month::December).then(|| month.succ())
        })
        .map(|month| (month, self.summarize_month(month)))
    }

    /// Daily records of the month, [`None`] for the days without a record.
    #[must_use]
    pub fn month_series(&self, year: i32, month: Month) -> Vec<(NaiveDate, Option<DayRecord>)> {
        let Some(first_day) = NaiveDate::from_ymd_opt(year, month.number_from_month(), 1) else {
            return Vec::new();
        };
        first_day
            .iter_days()
            .take_while(|date| date.month() == first_day.month())
            .map(|date| (date, self.daily.get(&date).copied()))
            .collect()
    }

    /// Re-sum the month at the zero-based `index` from its daily records.
    fn roll_up_month(&mut self, index: usize) {
        let totals: EnergyTotals = self
            .daily
            .iter()
            .filter(|(date, _)| date.month0() as usize == index)
            .map(|(_, record)| *record)
            .sum();
        for field in Field::ALL {
            self.monthly[field][index] = totals[field].round_to_micros();
        }
    }

    fn roll_up_year(&mut self) {
        let monthly = &self.monthly;
        self.yearly_total = Fields::from_fn(|field| {
            monthly[field].iter().copied().sum::<KilowattHours>().round_to_micros()
        });
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn record(
        pv: f64,
        grid: f64,
        load: f64,
        essential: f64,
        charge: f64,
        discharge: f64,
    ) -> DayRecord {
        DayRecord {
            pv: KilowattHours(pv),
            grid: KilowattHours(grid),
            load: KilowattHours(load),
            essential: KilowattHours(essential),
            charge: KilowattHours(charge),
            discharge: KilowattHours(discharge),
        }
    }

    /// Every monthly entry and yearly total equals the rounded sum of what it covers.
    fn assert_roll_up_invariant(cache: &YearCache) {
        for field in Field::ALL {
            for month0 in 0..12_u32 {
                let expected = cache
                    .daily
                    .iter()
                    .filter(|(date, _)| date.month0() == month0)
                    .map(|(_, record)| record[field])
                    .sum::<KilowattHours>()
                    .round_to_micros();
                assert_eq!(cache.monthly[field][month0 as usize], expected, "{field} {month0}");
            }
            let expected =
                cache.monthly[field].iter().copied().sum::<KilowattHours>().round_to_micros();
            assert_eq!(cache.yearly_total[field], expected, "{field}");
        }
    }

    #[test]
    fn test_update_daily_first_day() {
        let mut cache = YearCache::default();
        cache.update_daily(date(3, 15), record(5.0, 1.0, 2.0, 0.5, 1.0, 0.0));
        assert_eq!(cache.monthly.pv[2], KilowattHours(5.0));
        assert_eq!(cache.monthly.essential[2], KilowattHours(0.5));
        assert_eq!(cache.yearly_total.pv, KilowattHours(5.0));
        assert_eq!(cache.yearly_total.grid, KilowattHours(1.0));
        assert_eq!(cache.meta.coverage.earliest, Some(date(3, 15)));
        assert_eq!(cache.meta.coverage.latest, Some(date(3, 15)));
    }

    #[test]
    fn test_update_daily_is_idempotent() {
        let mut once = YearCache::default();
        once.update_daily(date(6, 1), record(1.1, 2.2, 3.3, 0.0, 0.4, 0.5));
        let mut twice = once.clone();
        twice.update_daily(date(6, 1), record(1.1, 2.2, 3.3, 0.0, 0.4, 0.5));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_update_daily_replaces_rather_than_accumulates() {
        let mut cache = YearCache::default();
        cache.update_daily(date(6, 1), record(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.update_daily(date(6, 1), record(3.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(cache.monthly.pv[5], KilowattHours(3.0));
        assert_eq!(cache.yearly_total.pv, KilowattHours(3.0));
    }

    #[test]
    fn test_update_daily_rolls_up_only_own_month() {
        let mut cache = YearCache::default();
        cache.update_daily(date(1, 31), record(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.update_daily(date(2, 1), record(2.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.update_daily(date(2, 2), record(0.25, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(cache.monthly.pv[0], KilowattHours(1.0));
        assert_eq!(cache.monthly.pv[1], KilowattHours(2.25));
        assert_eq!(cache.yearly_total.pv, KilowattHours(3.25));
        assert_eq!(cache.meta.coverage.earliest, Some(date(1, 31)));
        assert_eq!(cache.meta.coverage.latest, Some(date(2, 2)));
        assert_roll_up_invariant(&cache);
    }

    #[test]
    fn test_roll_up_rounds_float_noise() {
        let mut cache = YearCache::default();
        cache.update_daily(date(7, 1), record(0.1, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.update_daily(date(7, 2), record(0.2, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(cache.monthly.pv[6], KilowattHours(0.3));
        assert_roll_up_invariant(&cache);
    }

    #[test]
    fn test_update_daily_clears_empty_marker() {
        let mut cache = YearCache::default();
        assert!(cache.mark_empty(date(1, 1)));
        cache.update_daily(date(1, 1), record(1.0, 1.0, 1.0, 0.0, 1.0, 1.0));
        assert!(!cache.is_marked_empty(date(1, 1)));
        assert!(cache.has_record(date(1, 1)));
    }

    #[test]
    fn test_mark_empty_refuses_recorded_day() {
        let mut cache = YearCache::default();
        cache.update_daily(date(1, 1), record(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        assert!(!cache.mark_empty(date(1, 1)));
        assert!(!cache.is_marked_empty(date(1, 1)));
        assert!(cache.has_record(date(1, 1)));
    }

    #[test]
    fn test_mark_empty_does_not_create_record() {
        let mut cache = YearCache::default();
        assert!(cache.mark_empty(date(4, 4)));
        assert!(!cache.mark_empty(date(4, 4)));
        assert!(cache.daily.is_empty());
        assert!(cache.is_known(date(4, 4)));
        assert_eq!(cache.yearly_total, EnergyTotals::default());
    }

    #[test]
    fn test_empty_and_daily_stay_disjoint() {
        let mut cache = YearCache::default();
        for day in 1..=10 {
            if day % 3 == 0 {
                cache.update_daily(date(5, day), record(f64::from(day), 0.0, 0.0, 0.0, 0.0, 0.0));
            }
            cache.mark_empty(date(5, day));
            if day % 2 == 0 {
                cache.update_daily(date(5, day), record(0.5, 0.0, 0.0, 0.0, 0.0, 0.0));
            }
        }
        for date in cache.daily.keys() {
            assert!(!cache.meta.empty_dates.contains(date), "{date}");
        }
    }

    #[test]
    fn test_recompute_aggregates_repairs_drift() {
        let mut cache = YearCache::default();
        cache.update_daily(date(3, 1), record(1.5, 0.5, 2.0, 0.0, 0.3, 0.2));
        cache.update_daily(date(3, 2), record(2.5, 0.5, 1.0, 0.0, 0.1, 0.7));
        cache.update_daily(date(11, 30), record(0.7, 0.1, 0.9, 0.0, 0.0, 0.0));
        let expected = cache.clone();

        cache.monthly.pv[2] = KilowattHours(100.0);
        cache.monthly.load[0] = KilowattHours(42.0);
        cache.yearly_total.charge = KilowattHours(-1.0);
        cache.recompute_aggregates();

        assert_eq!(cache, expected);
        assert_roll_up_invariant(&cache);
    }

    #[test]
    fn test_recompute_aggregates_is_idempotent() {
        let mut cache = YearCache::default();
        cache.daily.insert(date(8, 8), record(0.1, 0.2, 0.3, 0.0, 0.4, 0.5));
        cache.daily.insert(date(8, 9), record(0.7, 0.1, 0.3, 0.0, 0.2, 0.1));
        cache.daily.insert(date(12, 31), record(9.9, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.recompute_aggregates();
        let once = cache.clone();
        cache.recompute_aggregates();
        assert_eq!(cache, once);
        assert_abs_diff_eq!(cache.yearly_total.pv.0, 10.7, epsilon = 1e-9);
    }

    #[test]
    fn test_summaries() {
        let mut cache = YearCache::default();
        cache.update_daily(date(3, 15), record(5.0, 1.0, 2.0, 0.0, 1.0, 0.0));
        cache.update_daily(date(4, 1), record(1.0, 0.0, 0.0, 0.0, 0.0, 2.0));
        let march = cache.summarize_month(Month::March);
        assert_eq!(march.pv, KilowattHours(5.0));
        assert_eq!(march.discharge, KilowattHours::ZERO);
        assert_eq!(cache.summarize_month(Month::April).discharge, KilowattHours(2.0));
        assert_eq!(cache.summarize_month(Month::December), EnergyTotals::default());
        assert_eq!(cache.summarize_year().pv, KilowattHours(6.0));
    }

    #[test]
    fn test_monthly_summaries() {
        let mut cache = YearCache::default();
        cache.update_daily(date(12, 31), record(2.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        let summaries: Vec<_> = cache.monthly_summaries().collect();
        assert_eq!(summaries.len(), 12);
        assert_eq!(summaries[0].0, Month::January);
        assert_eq!(summaries[11], (Month::December, cache.yearly_total));
    }

    #[test]
    fn test_set_coverage() {
        let mut cache = YearCache::default();
        cache.update_daily(date(3, 15), record(5.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        cache.set_coverage(Some(date(1, 1)), None);
        assert_eq!(cache.meta.coverage.earliest, Some(date(1, 1)));
        assert_eq!(cache.meta.coverage.latest, Some(date(3, 15)));
    }

    #[test]
    fn test_month_series() {
        let mut cache = YearCache::default();
        cache.update_daily(date(2, 29), record(1.0, 0.0, 0.0, 0.0, 0.0, 0.0));
        let series = cache.month_series(2024, Month::February);
        assert_eq!(series.len(), 29);
        assert_eq!(series[0], (date(2, 1), None));
        assert_eq!(series[28].1.map(|record| record.pv), Some(KilowattHours(1.0)));
    }
}
