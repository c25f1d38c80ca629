use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

/// Builds a client with the given request timeout. Each service client owns one.
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("outfit_suggestor/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
