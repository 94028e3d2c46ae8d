use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    quantity::energy::KilowattHours,
    statistics::{DayRecord, EnergyTotals, Fields},
};

/// Latest document layout this build understands.
pub const SCHEMA_VERSION: u32 = 1;

pub const MONTHS_PER_YEAR: usize = 12;

/// Per-field monthly sums, index 0 is January.
pub type Monthly = Fields<[KilowattHours; MONTHS_PER_YEAR]>;

/// Statistics of one device for one calendar year.
///
/// Absence of a date in [`YearCache::daily`] means «unknown», not zero.
/// Dates confirmed to have no data are kept in [`Meta::empty_dates`] instead.
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct YearCache {
    pub daily: BTreeMap<NaiveDate, DayRecord>,

    pub monthly: Monthly,

    pub yearly_total: EnergyTotals,

    pub meta: Meta,
}

#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default = "Meta::legacy_version")]
    pub version: u32,

    #[serde(default)]
    pub last_backfill_date: Option<NaiveDate>,

    #[serde(default)]
    pub coverage: Coverage,

    #[serde(default)]
    pub empty_dates: BTreeSet<NaiveDate>,
}

impl Meta {
    /// Documents written before the version tag existed.
    const fn legacy_version() -> u32 {
        1
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            last_backfill_date: None,
            coverage: Coverage::default(),
            empty_dates: BTreeSet::new(),
        }
    }
}

/// Earliest and latest dates with a recorded day.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    #[serde(default)]
    pub earliest: Option<NaiveDate>,

    #[serde(default)]
    pub latest: Option<NaiveDate>,
}

impl Coverage {
    pub fn extend(&mut self, date: NaiveDate) {
        if self.earliest.is_none_or(|earliest| date < earliest) {
            self.earliest = Some(date);
        }
        if self.latest.is_none_or(|latest| date > latest) {
            self.latest = Some(date);
        }
    }
}

impl YearCache {
    /// Parse and validate a persisted document.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut this: Self =
            serde_json::from_slice(bytes).context("the document does not match the schema")?;
        ensure!(
            this.meta.version <= SCHEMA_VERSION,
            "unsupported schema version {} (expected at most {SCHEMA_VERSION})",
            this.meta.version,
        );
        this.meta.version = SCHEMA_VERSION;
        this.normalize();
        Ok(this)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// A recorded day takes precedence over its empty marker.
    fn normalize(&mut self) {
        let daily = &self.daily;
        let n_before = self.meta.empty_dates.len();
        self.meta.empty_dates.retain(|date| !daily.contains_key(date));
        let n_dropped = n_before - self.meta.empty_dates.len();
        if n_dropped != 0 {
            warn!(n_dropped, "dropped empty markers of recorded days");
        }
    }
}
