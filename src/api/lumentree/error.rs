use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token is required for `{0}`")]
    TokenRequired(&'static str),

    #[error("authentication failed (code {code:?}, HTTP {status}): {message}")]
    Auth { code: Option<i64>, status: StatusCode, message: String },

    #[error("Lumentree error {code:?} (\"{message}\")")]
    Api { code: Option<i64>, message: String },

    #[error("HTTP {0}")]
    Status(StatusCode),

    #[error("invalid JSON: `{excerpt}`")]
    InvalidJson {
        excerpt: String,

        #[source]
        source: serde_json::Error,
    },

    #[error("request failed")]
    Http(#[from] reqwest::Error),

    #[error("`{0}` is missing from the response")]
    MissingData(&'static str),

    #[error("device `{0}` is not found")]
    DeviceNotFound(String),
}

impl Error {
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::TokenRequired(_))
    }
}
