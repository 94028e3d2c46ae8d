use std::{
    fmt::{Display, Formatter},
    iter::Sum,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use crate::quantity::energy::KilowattHours;

/// One of the six energy flows tracked per day.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Field {
    Pv,
    Grid,
    Load,
    Essential,
    Charge,
    Discharge,
}

impl Field {
    pub const ALL: [Self; 6] =
        [Self::Pv, Self::Grid, Self::Load, Self::Essential, Self::Charge, Self::Discharge];

    pub const fn key(self) -> &'static str {
        match self {
            Self::Pv => "pv",
            Self::Grid => "grid",
            Self::Load => "load",
            Self::Essential => "essential",
            Self::Charge => "charge",
            Self::Discharge => "discharge",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A value for each [`Field`], serialized under the field keys.
///
/// The `essential` slot is kept for interoperability, but the cloud API never reports it.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize, derive_more::Add)]
pub struct Fields<T> {
    #[serde(default)]
    pub pv: T,

    #[serde(default)]
    pub grid: T,

    #[serde(default)]
    pub load: T,

    #[serde(default)]
    pub essential: T,

    #[serde(default)]
    pub charge: T,

    #[serde(default)]
    pub discharge: T,
}

impl<T> Fields<T> {
    pub fn from_fn(mut f: impl FnMut(Field) -> T) -> Self {
        Self {
            pv: f(Field::Pv),
            grid: f(Field::Grid),
            load: f(Field::Load),
            essential: f(Field::Essential),
            charge: f(Field::Charge),
            discharge: f(Field::Discharge),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Fields<U> {
        Fields {
            pv: f(self.pv),
            grid: f(self.grid),
            load: f(self.load),
            essential: f(self.essential),
            charge: f(self.charge),
            discharge: f(self.discharge),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &T)> {
        Field::ALL.into_iter().map(move |field| (field, &self[field]))
    }
}

impl<T> Index<Field> for Fields<T> {
    type Output = T;

    fn index(&self, field: Field) -> &Self::Output {
        match field {
            Field::Pv => &self.pv,
            Field::Grid => &self.grid,
            Field::Load => &self.load,
            Field::Essential => &self.essential,
            Field::Charge => &self.charge,
            Field::Discharge => &self.discharge,
        }
    }
}

impl<T> IndexMut<Field> for Fields<T> {
    fn index_mut(&mut self, field: Field) -> &mut Self::Output {
        match field {
            Field::Pv => &mut self.pv,
            Field::Grid => &mut self.grid,
            Field::Load => &mut self.load,
            Field::Essential => &mut self.essential,
            Field::Charge => &mut self.charge,
            Field::Discharge => &mut self.discharge,
        }
    }
}

/// Six energy totals: a day record, a month summary, or a year summary.
pub type EnergyTotals = Fields<KilowattHours>;

/// Per-day energy snapshot as stored in the cache.
pub type DayRecord = EnergyTotals;

impl EnergyTotals {
    /// A day is empty when every field is below the noise threshold.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, value)| value.is_negligible())
    }

    pub fn round_to_watt_hours(self) -> Self {
        self.map(KilowattHours::round_to_watt_hours)
    }
}

impl Sum for EnergyTotals {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |total, item| total + item)
    }
}
