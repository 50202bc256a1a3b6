//! Reachability probe for the application under test
//!
//! The harness never spawns the target application; it only verifies the
//! base URL answers HTTP before any scenario runs.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `base_url` until it answers, or until `timeout` elapses.
///
/// Any HTTP response counts as reachable, including error statuses: a 500
/// from the target still means something is listening and scenarios can
/// produce useful evidence about it.
pub async fn wait_until_ready(base_url: &str, timeout: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    let deadline = Instant::now() + timeout;

    loop {
        match client.get(base_url).send().await {
            Ok(response) => {
                info!(
                    "Target {} is reachable (status {})",
                    base_url,
                    response.status()
                );
                return Ok(());
            }
            Err(e) => {
                debug!("Target not ready yet: {}", e);
            }
        }

        if Instant::now() >= deadline {
            return Err(Error::TargetUnreachable(format!(
                "{} did not answer within {:?}",
                base_url, timeout
            )));
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
