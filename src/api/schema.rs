use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;
use tracing::debug;

use crate::transport::{ApiError, ApiRequest};
use crate::Client;

const SCHEMA_PATH: &str = "/schema";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Client {
    /// Machine-readable API description. Served from the in-memory copy
    /// first, then from the durable session store, then from the network;
    /// both caches honor the schema freshness window. `force` bypasses both.
    pub async fn api_schema(&self, force: bool) -> Result<String, ApiError> {
        let ttl = self.config.schema_ttl;

        if !force {
            if let Some((schema, fetched_at)) = self.schema_memory.read().await.as_ref() {
                if fetched_at.elapsed() < ttl {
                    debug!("serving schema from memory");
                    return Ok(schema.clone());
                }
            }

            if let Some((schema, ts)) = self.store.schema() {
                if now_ms().saturating_sub(ts) < ttl.as_millis() as u64 {
                    debug!("serving schema from durable store");
                    *self.schema_memory.write().await = Some((schema.clone(), Instant::now()));
                    return Ok(schema);
                }
            }
        }

        let schema = match self.transport.execute_text(ApiRequest::get(SCHEMA_PATH)).await {
            Ok(schema) => schema,
            Err(e) => {
                // status failures were already surfaced by the transport
                if e.status().is_none() {
                    self.bus.error(e.friendly_message());
                }
                return Err(e);
            }
        };

        *self.schema_memory.write().await = Some((schema.clone(), Instant::now()));
        self.store.set_schema(&schema, now_ms());
        Ok(schema)
    }
}
