use crate::handlers::{self, BotContext};
use crate::services::TelegramApi;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_TIMEOUT_SECS: u64 = 50;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polling update loop. Updates are handled sequentially; the offset
/// advances past every fetched update regardless of handler outcome, so a
/// failing update is never replayed.
pub struct UpdatePoller {
    api: TelegramApi,
    ctx: BotContext,
    shutdown: CancellationToken,
}

impl UpdatePoller {
    pub fn new(api: TelegramApi, ctx: BotContext, shutdown: CancellationToken) -> Self {
        Self { api, ctx, shutdown }
    }

    pub async fn run(self) {
        tracing::info!("Update poller started");
        let mut offset: i64 = 0;

        loop {
            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Update poller shutting down");
                    break;
                }
                result = self.api.get_updates(offset, POLL_TIMEOUT_SECS) => result,
            };

            match batch {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        handlers::dispatch_update(&self.ctx, update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch updates, backing off");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
    }
}
