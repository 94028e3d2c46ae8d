mod client;
mod lumentree;

pub use self::lumentree::{Api as Lumentree, DayStatsSource, DeviceInfo, Error as LumentreeError};
#[cfg(test)]
pub use self::lumentree::{BatteryDay, OtherDay, PvDay};
