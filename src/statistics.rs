mod aggregate;
mod backfill;
mod fetcher;
mod fields;
mod pacing;

pub use self::{
    backfill::Backfiller,
    fetcher::{DayFetcher, FetchDay},
    fields::{DayRecord, EnergyTotals, Field, Fields},
    pacing::Pacing,
};
