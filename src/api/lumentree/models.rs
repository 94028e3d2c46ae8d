use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::quantity::energy::KilowattHours;

/// Daily counter as reported by the cloud: tenths of kWh, either a number or a numeric string.
#[serde_as]
#[derive(Copy, Clone, Debug, Default, Deserialize)]
pub struct TableValue {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(rename = "tableValue")]
    pub tenths: Option<f64>,
}

impl TableValue {
    pub fn energy(self) -> Option<KilowattHours> {
        self.tenths.map(KilowattHours::from_tenths)
    }
}

#[must_use]
#[derive(Debug, Default, Deserialize)]
pub struct PvDay {
    #[serde(default)]
    pv: Option<TableValue>,
}

impl PvDay {
    pub fn pv(&self) -> Option<KilowattHours> {
        self.pv.and_then(TableValue::energy)
    }
}

/// Battery counters: the first entry is the charge, the second one is the discharge.
#[must_use]
#[derive(Debug, Default, Deserialize)]
pub struct BatteryDay {
    #[serde(default)]
    bats: Vec<TableValue>,
}

impl BatteryDay {
    pub fn charge(&self) -> Option<KilowattHours> {
        self.bats.first().copied().and_then(TableValue::energy)
    }

    pub fn discharge(&self) -> Option<KilowattHours> {
        self.bats.get(1).copied().and_then(TableValue::energy)
    }
}

#[must_use]
#[derive(Debug, Default, Deserialize)]
pub struct OtherDay {
    #[serde(default)]
    grid: Option<TableValue>,

    #[serde(rename = "homeload", default)]
    load: Option<TableValue>,
}

impl OtherDay {
    pub fn grid(&self) -> Option<KilowattHours> {
        self.grid.and_then(TableValue::energy)
    }

    pub fn load(&self) -> Option<KilowattHours> {
        self.load.and_then(TableValue::energy)
    }
}

#[serde_as]
#[derive(Deserialize)]
pub struct ServerTime {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "serverTime")]
    pub timestamp: i64,
}

#[derive(Deserialize)]
pub struct Token {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Deserialize)]
pub struct DeviceList {
    #[serde(default)]
    pub devices: Vec<serde_json::Value>,
}

/// Raw device description, the layout differs between firmware versions.
#[must_use]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo(pub serde_json::Map<String, serde_json::Value>);

impl DeviceInfo {
    /// Stringified attribute, [`None`] when absent or null.
    pub fn get(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(value) => Some(value.clone()),
            value => Some(value.to_string()),
        }
    }

    pub fn device_id(&self) -> Option<String> {
        self.get("deviceId")
    }

    pub fn device_type(&self) -> Option<String> {
        self.get("deviceType")
    }

    pub fn controller_version(&self) -> Option<String> {
        self.get("controllerVersion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_pv_day_number() -> Result {
        // language=JSON
        let day: PvDay = serde_json::from_str(r#"{"pv": {"tableValue": 123}}"#)?;
        assert_eq!(day.pv(), Some(KilowattHours(12.3)));
        Ok(())
    }

    #[test]
    fn test_pv_day_string() -> Result {
        // language=JSON
        let day: PvDay = serde_json::from_str(r#"{"pv": {"tableValue": "57"}}"#)?;
        assert_eq!(day.pv(), Some(KilowattHours(5.7)));
        Ok(())
    }

    #[test]
    fn test_pv_day_missing() -> Result {
        assert_eq!(serde_json::from_str::<PvDay>("{}")?.pv(), None);
        assert_eq!(serde_json::from_str::<PvDay>(r#"{"pv": {}}"#)?.pv(), None);
        assert_eq!(serde_json::from_str::<PvDay>(r#"{"pv": {"tableValue": null}}"#)?.pv(), None);
        Ok(())
    }

    #[test]
    fn test_battery_day() -> Result {
        // language=JSON
        let day: BatteryDay =
            serde_json::from_str(r#"{"bats": [{"tableValue": 20}, {"tableValue": "15"}]}"#)?;
        assert_eq!(day.charge(), Some(KilowattHours(2.0)));
        assert_eq!(day.discharge(), Some(KilowattHours(1.5)));
        Ok(())
    }

    #[test]
    fn test_battery_day_partial() -> Result {
        // language=JSON
        let day: BatteryDay = serde_json::from_str(r#"{"bats": [{"tableValue": 20}]}"#)?;
        assert_eq!(day.charge(), Some(KilowattHours(2.0)));
        assert_eq!(day.discharge(), None);
        Ok(())
    }

    #[test]
    fn test_other_day() -> Result {
        // language=JSON
        let day: OtherDay = serde_json::from_str(
            r#"{"grid": {"tableValue": 10}, "homeload": {"tableValue": 40}, "essentialLoad": {}}"#,
        )?;
        assert_eq!(day.grid(), Some(KilowattHours(1.0)));
        assert_eq!(day.load(), Some(KilowattHours(4.0)));
        Ok(())
    }

    #[test]
    fn test_server_time() -> Result {
        assert_eq!(serde_json::from_str::<ServerTime>(r#"{"serverTime": 42}"#)?.timestamp, 42);
        assert_eq!(serde_json::from_str::<ServerTime>(r#"{"serverTime": "42"}"#)?.timestamp, 42);
        Ok(())
    }

    #[test]
    fn test_device_info() -> Result {
        // language=JSON
        let info: DeviceInfo = serde_json::from_str(
            r#"{"deviceId": "P1234", "deviceType": 6, "controllerVersion": null}"#,
        )?;
        assert_eq!(info.device_id().as_deref(), Some("P1234"));
        assert_eq!(info.device_type().as_deref(), Some("6"));
        assert_eq!(info.controller_version(), None);
        Ok(())
    }
}
