use std::time::Duration;

use reqwest::{Client, header::HeaderMap};

use crate::prelude::*;

/// Build a client with the common timeout.
pub fn try_new(user_agent: &str, default_headers: HeaderMap) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .default_headers(default_headers)
        .timeout(Duration::from_secs(30))
        .build()?)
}
