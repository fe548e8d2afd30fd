use serde_json::Value;

use crate::transport::{ApiError, ApiRequest};
use crate::types::{TokenPair, UserProfile};
use crate::Client;

const PROFILE_ME: &str = "/profile/me";

impl Client {
    /// Create an account. Tokens from the response are persisted so the new
    /// session is usable immediately.
    pub async fn register(&self, payload: Value) -> Result<Value, ApiError> {
        let data = self
            .run_mutation(ApiRequest::post("/auth/register", payload))
            .await?;
        self.persist_tokens(&data);
        Ok(data)
    }

    pub async fn login(&self, payload: Value) -> Result<Value, ApiError> {
        let data = self
            .run_mutation(ApiRequest::post("/auth/login", payload))
            .await?;
        self.persist_tokens(&data);
        Ok(data)
    }

    /// Unconditionally clears credentials and drops all cached state. Wins
    /// over any refresh still in flight.
    pub fn logout(&self) {
        self.store.clear_tokens();
        self.cache.clear();
    }

    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let value = self.cached_get(PROFILE_ME, Vec::new()).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn update_me(&self, patch: Value) -> Result<UserProfile, ApiError> {
        let value = self
            .run_mutation(ApiRequest::patch(PROFILE_ME, patch))
            .await?;
        self.cache.invalidate_exact(PROFILE_ME);
        Ok(serde_json::from_value(value)?)
    }

    fn persist_tokens(&self, data: &Value) {
        let Some(tokens) = data.get("tokens") else {
            return;
        };
        match serde_json::from_value::<TokenPair>(tokens.clone()) {
            Ok(pair) => self.store.set_tokens(&pair),
            Err(e) => tracing::warn!(error = %e, "auth response carried malformed tokens"),
        }
    }
}
