use std::fmt::{Debug, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Energy in kilowatt-hours.
///
/// Serialized as a bare number so that the cache documents stay plain JSON floats.
#[must_use]
#[derive(
    Copy,
    Clone,
    Default,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    derive_more::Add,
    derive_more::AddAssign,
    derive_more::From,
    derive_more::Neg,
    derive_more::Sub,
    derive_more::Sum,
)]
#[serde(transparent)]
pub struct KilowattHours(pub f64);

impl KilowattHours {
    pub const ZERO: Self = Self(0.0);

    /// Magnitude below which a reported value is considered noise.
    pub const EPSILON: f64 = 1e-6;

    /// Convert from the tenths of kilowatt-hour the cloud API reports.
    pub fn from_tenths(tenths: f64) -> Self {
        Self(tenths / 10.0)
    }

    /// Round to 6 decimal places to keep repeated sums from drifting.
    pub fn round_to_micros(self) -> Self {
        Self((self.0 * 1_000_000.0).round() / 1_000_000.0)
    }

    /// Round to watt-hours.
    pub fn round_to_watt_hours(self) -> Self {
        Self((self.0 * 1000.0).round() / 1000.0)
    }

    #[must_use]
    pub fn is_negligible(self) -> bool {
        self.0.abs() < Self::EPSILON
    }
}

impl Display for KilowattHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} kWh", self.0)
    }
}

impl Debug for KilowattHours {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}kWh", self.0)
    }
}
