use reqwest::StatusCode;
use serde::Deserialize;

use super::Error;

const SUCCESS: i64 = 1;

/// Code returned when the token is invalid or expired.
const AUTH_FAILED: i64 = 203;

/// Generic API envelope.
///
/// The data is kept as [`serde_json::Value`] so that it can be logged before it gets parsed.
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(rename = "returnValue", default)]
    pub return_value: Option<i64>,

    #[serde(rename = "msg", default)]
    pub message: Option<String>,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl Response {
    pub fn into_data(self, status: StatusCode) -> Result<serde_json::Value, Error> {
        if self.return_value == Some(SUCCESS) {
            return Ok(self.data);
        }
        let code = self.return_value;
        let message = self.message.unwrap_or_else(|| "unknown".to_string());
        if code == Some(AUTH_FAILED)
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            Err(Error::Auth { code, status, message })
        } else {
            Err(Error::Api { code, message })
        }
    }
}
