//! Typed operations per REST resource. Reads flow through the query cache
//! (key = resource path + canonical parameters); mutations execute without
//! retry and invalidate the affected read keys explicitly.

mod auth;
mod chat;
mod listings;
mod reviews;
mod schema;

use serde_json::Value;

use crate::cache::{fetcher, QueryKey};
use crate::transport::{ApiError, ApiRequest};
use crate::Client;

impl Client {
    /// Cached GET: serve from the query cache, coalescing and retrying per
    /// its policy.
    pub(crate) async fn cached_get(
        &self,
        path: &str,
        params: Vec<(String, String)>,
    ) -> Result<Value, ApiError> {
        let key = QueryKey::new(path, &params);
        let transport = self.transport.clone();
        let path = path.to_string();
        let fetch = fetcher(move || {
            let transport = transport.clone();
            let req = ApiRequest::get(path.clone()).with_query(params.clone());
            async move { transport.execute(req).await }
        });
        self.cache.query(key, self.config.cache_ttl, fetch).await
    }

    /// Write operation: never retried, surfaced through the pipeline.
    pub(crate) async fn run_mutation(&self, req: ApiRequest) -> Result<Value, ApiError> {
        let transport = self.transport.clone();
        self.cache
            .mutate(async move { transport.execute(req).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::transport::{ApiError, ApiRequest, HttpBackend, RawResponse};
    use crate::{Client, Config};

    struct UnreachableBackend;

    #[async_trait]
    impl HttpBackend for UnreachableBackend {
        async fn send(
            &self,
            _req: &ApiRequest,
            _bearer: Option<&str>,
        ) -> Result<RawResponse, ApiError> {
            Err(ApiError::Timeout)
        }
    }

    fn client() -> Client {
        Client::with_backend(Config::new("http://unreachable"), Arc::new(UnreachableBackend))
    }

    #[tokio::test]
    async fn login_network_failure_surfaces_one_notification() {
        let client = client();
        let mut sub = client.notifications().subscribe();

        let err = client
            .login(json!({ "username": "u", "password": "p" }))
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let event = sub.try_recv().unwrap();
        assert_eq!(event.message, "Request failed. Please try again.");
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn schema_network_failure_surfaces_one_notification() {
        let client = client();
        let mut sub = client.notifications().subscribe();

        let err = client.api_schema(false).await.unwrap_err();
        assert!(err.is_transient());

        let event = sub.try_recv().unwrap();
        assert_eq!(event.message, "Request failed. Please try again.");
        assert!(sub.try_recv().is_none());
    }
}
