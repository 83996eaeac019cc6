use crate::config::KeepAliveConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodic self-ping that keeps free-tier hosts from idling the process
/// out. Does nothing unless a target URL is configured.
pub struct KeepAlive {
    config: KeepAliveConfig,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl KeepAlive {
    pub fn new(config: KeepAliveConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            shutdown,
        }
    }

    pub async fn run(self) {
        let Some(url) = self.config.url.filter(|_| self.config.enabled) else {
            tracing::info!("Keep-alive disabled");
            return;
        };

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        tracing::info!(url = %url, interval_secs = interval.as_secs(), "Keep-alive started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Keep-alive shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            match self.client.get(&url).send().await {
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "Keep-alive ping sent");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Keep-alive ping failed");
                }
            }
        }
    }
}
