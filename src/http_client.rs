use std::time::Duration;

use anyhow::{Context, Result};

/// Build the reqwest client used for catalog imports.
///
/// System proxy discovery is opt-in via HOTSWAP_ENABLE_SYSTEM_PROXY; the
/// default client skips it so a broken proxy environment cannot stall fetches.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    let allow_system_proxy = std::env::var("HOTSWAP_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let mut builder = reqwest::Client::builder().timeout(timeout);
    if !allow_system_proxy {
        builder = builder.no_proxy();
    }
    builder.build().context("Failed to initialize HTTP client")
}
