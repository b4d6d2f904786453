//! Completion notification with bounded retry.

use tracing::{error, info, warn};

use crate::config::NotifyPolicy;

/// Body the notify endpoint returns once it has accepted the delivery.
const SUCCESS_BODY: &str = "success";

/// How a notify sequence ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The endpoint answered `success`.
    Delivered { attempts: u32 },
    /// Every attempt got some other body.
    GaveUp { attempts: u32 },
    /// The request itself failed; no further attempts are made.
    Failed { attempts: u32, reason: String },
}

impl NotifyOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            NotifyOutcome::Delivered { attempts }
            | NotifyOutcome::GaveUp { attempts }
            | NotifyOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Delivered { .. })
    }
}

/// GET `url` until it answers `success` (case-insensitive) or
/// `policy.max_attempts` is reached, sleeping `policy.retry_delay` between
/// attempts.
pub async fn notify_with_retry(client: &reqwest::Client, url: &str, policy: NotifyPolicy) -> NotifyOutcome {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        info!(url = %url, attempt = attempts, "Notifying remote");

        let body = match fetch_body(client, url).await {
            Ok(body) => body,
            Err(e) => {
                error!(url = %url, attempt = attempts, error = %e, "Notify request failed");
                return NotifyOutcome::Failed {
                    attempts,
                    reason: e.to_string(),
                };
            }
        };

        if body.eq_ignore_ascii_case(SUCCESS_BODY) {
            info!(url = %url, attempts, "Remote acknowledged delivery");
            return NotifyOutcome::Delivered { attempts };
        }
        if attempts >= max_attempts {
            warn!(url = %url, attempts, "Remote never acknowledged delivery, giving up");
            return NotifyOutcome::GaveUp { attempts };
        }

        warn!(
            url = %url,
            attempt = attempts,
            retry_in = ?policy.retry_delay,
            "Unexpected notify response"
        );
        tokio::time::sleep(policy.retry_delay).await;
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    client.get(url).send().await?.text().await
}
