//! Usage Logger
//!
//! Records one usage row per authenticated public-API request. A storage
//! failure is logged server-side and never turns into a client-visible
//! error, since losing a usage row is preferable to failing a request that
//! already did its work. Only the last-used touch runs off the request path.

use shared::Result;
use std::sync::Arc;
use tracing::{debug, error};

use crate::repositories::{ApiKeyStore, NewUsageLog, UsageLogStore};

/// Records usage rows and last-used timestamps off the request path
#[derive(Clone)]
pub struct UsageLogger {
    usage: Arc<dyn UsageLogStore>,
    api_keys: Arc<dyn ApiKeyStore>,
}

impl UsageLogger {
    pub fn new(usage: Arc<dyn UsageLogStore>, api_keys: Arc<dyn ApiKeyStore>) -> Self {
        Self { usage, api_keys }
    }

    /// Record a usage row
    ///
    /// Awaited by the middleware after the handler has produced its status;
    /// the caller logs failures instead of propagating them, so a slow or
    /// broken log store never turns into a client-visible error.
    pub async fn record(&self, log: NewUsageLog) -> Result<()> {
        self.usage.insert(log).await?;
        Ok(())
    }

    /// Update the key's last_used_at timestamp without blocking the caller
    pub fn touch_last_used(&self, key_id: i64) {
        let api_keys = self.api_keys.clone();
        tokio::spawn(async move {
            if let Err(e) = api_keys.touch_last_used(key_id, chrono::Utc::now()).await {
                error!(api_key_id = key_id, error = %e, "Failed to update last_used_at");
            } else {
                debug!(api_key_id = key_id, "Updated last_used_at");
            }
        });
    }
}
