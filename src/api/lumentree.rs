mod error;
mod expiring;
mod models;
mod response;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta};
use reqwest::{
    Client,
    Method,
    RequestBuilder,
    StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};

pub use self::{
    error::Error,
    models::{BatteryDay, DeviceInfo, OtherDay, PvDay},
};
use self::{
    expiring::ExpiringCache,
    models::{DeviceList, ServerTime, Token},
    response::Response,
};
use crate::{api::client, clock::Clock, prelude::*};

const BASE_URL: &str = "http://lesvr.suntcn.com";

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; SM-G970F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36";

const AUTH_MAX_ATTEMPTS: u32 = 3;

const AUTH_RETRY_DELAY: Duration = Duration::from_millis(500);

const DEVICE_INFO_TIME_TO_LIVE: TimeDelta = TimeDelta::hours(1);

/// Daily counters of a device, one call per counter group.
#[async_trait]
pub trait DayStatsSource: Send + Sync {
    async fn get_pv_day(&self, device_id: &str, on: NaiveDate) -> Result<PvDay>;

    async fn get_battery_day(&self, device_id: &str, on: NaiveDate) -> Result<BatteryDay>;

    async fn get_other_day(&self, device_id: &str, on: NaiveDate) -> Result<OtherDay>;
}

/// Lumentree cloud, as seen by the mobile app.
pub struct Api {
    client: Client,
    token: Option<String>,
    device_info: ExpiringCache<DeviceInfo>,
}

impl Api {
    pub fn try_new(clock: Arc<dyn Clock>) -> Result<Self> {
        let headers = HeaderMap::from_iter([
            (HeaderName::from_static("versioncode"), HeaderValue::from_static("1.6.3")),
            (HeaderName::from_static("platform"), HeaderValue::from_static("2")),
            (HeaderName::from_static("wifistatus"), HeaderValue::from_static("1")),
            (
                reqwest::header::ACCEPT,
                HeaderValue::from_static("application/json, text/plain, */*"),
            ),
            (reqwest::header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9")),
        ]);
        Ok(Self {
            client: client::try_new(USER_AGENT, headers)?,
            token: None,
            device_info: ExpiringCache::new(clock, DEVICE_INFO_TIME_TO_LIVE),
        })
    }

    pub fn set_token(&mut self, token: Option<String>) {
        debug!(is_set = token.is_some(), "token updated");
        self.token = token;
    }

    /// Obtain a device token and use it for the subsequent calls.
    #[instrument(skip_all, fields(device_id = device_id))]
    pub async fn authenticate(&mut self, device_id: &str) -> Result<String> {
        info!("authenticating…");
        let mut last_error = None;
        for attempt in 1..=AUTH_MAX_ATTEMPTS {
            match self.request_token(device_id).await {
                Ok(token) => {
                    info!("authenticated");
                    self.set_token(Some(token.clone()));
                    return Ok(token);
                }
                Err(error) => {
                    warn!(attempt, "authentication attempt failed: {error:#}");
                    last_error = Some(error);
                }
            }
            if attempt < AUTH_MAX_ATTEMPTS {
                tokio::time::sleep(AUTH_RETRY_DELAY).await;
            }
        }
        let error = last_error.unwrap_or_else(|| anyhow!("no attempts were made"));
        Err(error.context(format!("failed to authenticate after {AUTH_MAX_ATTEMPTS} attempts")))
    }

    async fn request_token(&self, device_id: &str) -> Result<String> {
        let server_time = self.get_server_time().await?;
        self.get_token(device_id, server_time).await
    }

    #[instrument(skip_all, level = Level::DEBUG)]
    pub async fn get_server_time(&self) -> Result<i64> {
        const PATH: &str = "lesvr/getServerTime";

        // This endpoint may respond with data even when the return value is not a success.
        let (status, response) = self.fetch(PATH, self.request(Method::GET, PATH, false)?).await?;
        let data =
            if response.data.is_null() { response.into_data(status)? } else { response.data };
        let server_time: ServerTime =
            serde_json::from_value(data).context("failed to deserialize the server time")?;
        Ok(server_time.timestamp)
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(device_id = device_id))]
    pub async fn get_token(&self, device_id: &str, server_time: i64) -> Result<String> {
        const PATH: &str = "lesvr/shareDevices";

        #[derive(Serialize)]
        struct ShareDevicesRequest<'a> {
            #[serde(rename = "deviceIds")]
            device_id: &'a str,

            #[serde(rename = "serverTime")]
            server_time: String,
        }

        let request = self
            .request(Method::POST, PATH, false)?
            .header("source", "2")
            .form(&ShareDevicesRequest { device_id, server_time: server_time.to_string() });
        let token: Token = self.call(PATH, request).await?;
        Ok(token.token.filter(|token| !token.is_empty()).ok_or(Error::MissingData("token"))?)
    }

    /// Fetch the device description, cached for an hour.
    #[instrument(skip_all, fields(device_id = device_id))]
    pub async fn get_device_info(&self, device_id: &str) -> Result<DeviceInfo> {
        const PATH: &str = "lesvr/deviceManage";

        #[derive(Serialize)]
        struct DeviceManageQuery<'a> {
            page: &'static str,

            #[serde(rename = "snName")]
            device_id: &'a str,
        }

        ensure!(!device_id.is_empty(), "device ID is missing");
        if let Some(device_info) = self.device_info.get(device_id) {
            debug!("using the cached device info");
            return Ok(device_info);
        }

        info!("fetching…");
        let request = self
            .request(Method::POST, PATH, true)?
            .query(&DeviceManageQuery { page: "1", device_id });
        let device_list: DeviceList = self.call(PATH, request).await?;
        let Some(serde_json::Value::Object(attributes)) = device_list.devices.into_iter().next()
        else {
            bail!(Error::DeviceNotFound(device_id.to_string()));
        };
        let device_info = DeviceInfo(attributes);
        info!(
            device_type = ?device_info.device_type(),
            controller_version = ?device_info.controller_version(),
            "fetched",
        );
        self.device_info.insert(device_id, device_info.clone());
        Ok(device_info)
    }

    async fn get_day<R: DeserializeOwned + Default>(
        &self,
        path: &'static str,
        device_id: &str,
        on: NaiveDate,
    ) -> Result<R> {
        #[derive(Serialize)]
        struct DayQuery<'a> {
            #[serde(rename = "deviceId")]
            device_id: &'a str,

            #[serde(rename = "queryDate")]
            on: NaiveDate,
        }

        let request = self.request(Method::GET, path, true)?.query(&DayQuery { device_id, on });
        let data: Option<R> = self.call(path, request).await?;
        Ok(data.unwrap_or_default())
    }

    fn request(
        &self,
        method: Method,
        path: &'static str,
        is_authenticated: bool,
    ) -> Result<RequestBuilder, Error> {
        let request = self.client.request(method, format!("{BASE_URL}/{path}"));
        if !is_authenticated {
            return Ok(request);
        }
        match &self.token {
            Some(token) => Ok(request.header(reqwest::header::AUTHORIZATION, token)),
            None => {
                error!(path, "token is required");
                Err(Error::TokenRequired(path))
            }
        }
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(path = path))]
    async fn call<R: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<R> {
        let (status, response) = self.fetch(path, request).await?;
        let data = response.into_data(status).with_context(|| format!("`{path}` failed"))?;
        debug!(?data, "call succeeded");
        serde_json::from_value(data)
            .with_context(|| format!("failed to deserialize `{path}` response structure"))
    }

    async fn fetch(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<(StatusCode, Response), Error> {
        let response = request.send().await?;
        let status = response.status();
        debug!(path, %status, "responded");
        let text = response.text().await?;
        match serde_json::from_str::<Response>(&text) {
            Ok(response) => Ok((status, response)),
            Err(_) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
                Err(Error::Auth { code: None, status, message: excerpt(&text) })
            }
            Err(_) if !status.is_success() => Err(Error::Status(status)),
            Err(source) => Err(Error::InvalidJson { excerpt: excerpt(&text), source }),
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(300).collect()
}

#[async_trait]
impl DayStatsSource for Api {
    #[instrument(skip_all, level = Level::DEBUG, fields(device_id = device_id, on = %on))]
    async fn get_pv_day(&self, device_id: &str, on: NaiveDate) -> Result<PvDay> {
        self.get_day("lesvr/getPVDayData", device_id, on).await
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(device_id = device_id, on = %on))]
    async fn get_battery_day(&self, device_id: &str, on: NaiveDate) -> Result<BatteryDay> {
        self.get_day("lesvr/getBatDayData", device_id, on).await
    }

    #[instrument(skip_all, level = Level::DEBUG, fields(device_id = device_id, on = %on))]
    async fn get_other_day(&self, device_id: &str, on: NaiveDate) -> Result<OtherDay> {
        self.get_day("lesvr/getOtherDayData", device_id, on).await
    }
}
