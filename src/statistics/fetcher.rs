use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    api::{DayStatsSource, LumentreeError},
    prelude::*,
    quantity::energy::KilowattHours,
    statistics::DayRecord,
};

/// Produces the six-field record of a single day.
#[async_trait]
pub trait FetchDay: Send + Sync {
    async fn fetch_day(&self, on: NaiveDate) -> Result<DayRecord>;
}

/// Fetches a day through three concurrent counter queries.
///
/// A failing query zeroes only the fields it owns. The fetch fails only when all three do,
/// so that an outage is never mistaken for a day without data.
pub struct DayFetcher<S> {
    source: S,
    device_id: String,
}

impl<S> DayFetcher<S> {
    pub fn new(source: S, device_id: impl Into<String>) -> Self {
        Self { source, device_id: device_id.into() }
    }
}

#[async_trait]
impl<S: DayStatsSource> FetchDay for DayFetcher<S> {
    #[instrument(skip_all, fields(on = %on))]
    async fn fetch_day(&self, on: NaiveDate) -> Result<DayRecord> {
        let (pv_day, battery_day, other_day) = tokio::join!(
            self.source.get_pv_day(&self.device_id, on),
            self.source.get_battery_day(&self.device_id, on),
            self.source.get_other_day(&self.device_id, on),
        );
        if let (Err(pv_error), Err(_), Err(_)) = (&pv_day, &battery_day, &other_day) {
            if pv_error.downcast_ref::<LumentreeError>().is_some_and(LumentreeError::is_auth) {
                bail!("all counter queries are rejected, the token may have expired: {pv_error:#}");
            }
            bail!("all counter queries failed, the first one with: {pv_error:#}");
        }
        let pv_day = pv_day.unwrap_or_else(|error| {
            warn!("failed to fetch the solar counters: {error:#}");
            Default::default()
        });
        let battery_day = battery_day.unwrap_or_else(|error| {
            warn!("failed to fetch the battery counters: {error:#}");
            Default::default()
        });
        let other_day = other_day.unwrap_or_else(|error| {
            warn!("failed to fetch the grid and load counters: {error:#}");
            Default::default()
        });
        let record = DayRecord {
            pv: pv_day.pv().unwrap_or_default(),
            grid: other_day.grid().unwrap_or_default(),
            load: other_day.load().unwrap_or_default(),
            essential: KilowattHours::ZERO,
            charge: battery_day.charge().unwrap_or_default(),
            discharge: battery_day.discharge().unwrap_or_default(),
        };
        debug!(?record, "fetched");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::api::{BatteryDay, OtherDay, PvDay};

    /// Serves canned counter responses, failing the queries it is told to.
    #[derive(Default)]
    struct FakeSource {
        fail_pv: bool,
        fail_battery: bool,
        fail_other: bool,
        n_calls: AtomicUsize,
    }

    #[async_trait]
    impl DayStatsSource for FakeSource {
        async fn get_pv_day(&self, device_id: &str, _on: NaiveDate) -> Result<PvDay> {
            self.n_calls.fetch_add(1, Ordering::Relaxed);
            assert_eq!(device_id, "P1");
            ensure!(!self.fail_pv, "PV is down");
            // language=JSON
            Ok(serde_json::from_str(r#"{"pv": {"tableValue": 123}}"#)?)
        }

        async fn get_battery_day(&self, _device_id: &str, _on: NaiveDate) -> Result<BatteryDay> {
            self.n_calls.fetch_add(1, Ordering::Relaxed);
            ensure!(!self.fail_battery, "battery is down");
            // language=JSON
            Ok(serde_json::from_str(r#"{"bats": [{"tableValue": 20}, {"tableValue": "15"}]}"#)?)
        }

        async fn get_other_day(&self, _device_id: &str, _on: NaiveDate) -> Result<OtherDay> {
            self.n_calls.fetch_add(1, Ordering::Relaxed);
            ensure!(!self.fail_other, "other is down");
            // language=JSON
            Ok(serde_json::from_str(r#"{"grid": {"tableValue": 10}, "homeload": {}}"#)?)
        }
    }

    fn on() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[tokio::test]
    async fn test_all_succeed() -> Result {
        let fetcher = DayFetcher::new(FakeSource::default(), "P1");
        let record = fetcher.fetch_day(on()).await?;
        assert_eq!(record.pv, KilowattHours(12.3));
        assert_eq!(record.grid, KilowattHours(1.0));
        assert_eq!(record.load, KilowattHours::ZERO);
        assert_eq!(record.essential, KilowattHours::ZERO);
        assert_eq!(record.charge, KilowattHours(2.0));
        assert_eq!(record.discharge, KilowattHours(1.5));
        assert_eq!(fetcher.source.n_calls.load(Ordering::Relaxed), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_zeroes_own_fields() -> Result {
        let fetcher =
            DayFetcher::new(FakeSource { fail_battery: true, ..Default::default() }, "P1");
        let record = fetcher.fetch_day(on()).await?;
        assert_eq!(record.pv, KilowattHours(12.3));
        assert_eq!(record.grid, KilowattHours(1.0));
        assert_eq!(record.charge, KilowattHours::ZERO);
        assert_eq!(record.discharge, KilowattHours::ZERO);
        Ok(())
    }

    #[tokio::test]
    async fn test_total_failure_is_error() {
        let source = FakeSource {
            fail_pv: true,
            fail_battery: true,
            fail_other: true,
            ..Default::default()
        };
        let fetcher = DayFetcher::new(source, "P1");
        assert!(fetcher.fetch_day(on()).await.is_err());
        assert_eq!(fetcher.source.n_calls.load(Ordering::Relaxed), 3);
    }
}
