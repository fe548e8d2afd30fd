use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::notify::NotificationBus;
use crate::session::SessionStore;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("server returned status {status}")]
    Status {
        status: u16,
        detail: Option<String>,
        message: Option<String>,
    },
    #[error("deserialization error: {0}")]
    Decode(#[from] serde_json::Error),
    /// The single failure of a coalesced fetch, handed to every waiter that
    /// joined the same in-flight request.
    #[error(transparent)]
    Coalesced(std::sync::Arc<ApiError>),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Coalesced(inner) => inner.status(),
            _ => None,
        }
    }

    /// Network-level failures that are safe to retry for idempotent reads.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout => true,
            ApiError::Http(e) => e.is_timeout() || e.is_connect(),
            ApiError::Coalesced(inner) => inner.is_transient(),
            _ => false,
        }
    }

    /// Human-readable message, in priority order: server `detail` field,
    /// server `message` field, status-specific default, generic fallback.
    pub fn friendly_message(&self) -> String {
        if let ApiError::Coalesced(inner) = self {
            return inner.friendly_message();
        }
        if let ApiError::Status {
            status,
            detail,
            message,
        } = self
        {
            if let Some(d) = detail.as_deref().filter(|d| !d.is_empty()) {
                return d.to_string();
            }
            if let Some(m) = message.as_deref().filter(|m| !m.is_empty()) {
                return m.to_string();
            }
            match status {
                401 => return "Authorization required.".to_string(),
                403 => return "Access denied.".to_string(),
                404 => return "Resource not found.".to_string(),
                _ => {}
            }
        }
        "Request failed. Please try again.".to_string()
    }
}

#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    /// Multipart image upload: `image` file part plus an optional `order`
    /// text field.
    Image {
        bytes: Vec<u8>,
        filename: String,
        order: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Body::Json(body),
        }
    }

    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PATCH,
            path: path.into(),
            query: Vec::new(),
            body: Body::Json(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    fn is_auth(&self) -> bool {
        self.path.starts_with("/auth/")
    }
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    fn json(&self) -> Result<Value, ApiError> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    fn json_lenient(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// Executes a single HTTP exchange. The trait seam keeps the interceptor
/// pipeline testable without a live server.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse, ApiError>;
}

pub struct ReqwestBackend {
    client: Client,
    base_url: String,
}

impl ReqwestBackend {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse, ApiError> {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = self.client.request(req.method.clone(), &url);

        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &req.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Image {
                bytes,
                filename,
                order,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(filename.clone());
                let mut form = reqwest::multipart::Form::new().part("image", part);
                if let Some(order) = order {
                    form = form.text("order", order.to_string());
                }
                builder.multipart(form)
            }
        };

        let resp = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await?.to_vec();
        Ok(RawResponse { status, body })
    }
}

/// Wraps the backend with the credential pipeline: bearer injection on
/// outgoing requests, a single refresh-and-retry cycle on 401, and exactly
/// one notification per surfaced failure status.
pub struct Transport {
    backend: Arc<dyn HttpBackend>,
    store: Arc<SessionStore>,
    bus: NotificationBus,
    refresh_lock: Mutex<()>,
}

impl Transport {
    pub fn new(backend: Arc<dyn HttpBackend>, store: Arc<SessionStore>, bus: NotificationBus) -> Self {
        Self {
            backend,
            store,
            bus,
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn execute(&self, req: ApiRequest) -> Result<Value, ApiError> {
        self.perform(req).await?.json()
    }

    pub async fn execute_text(&self, req: ApiRequest) -> Result<String, ApiError> {
        let raw = self.perform(req).await?;
        Ok(String::from_utf8_lossy(&raw.body).into_owned())
    }

    async fn perform(&self, req: ApiRequest) -> Result<RawResponse, ApiError> {
        let sent_bearer = if req.is_auth() {
            None
        } else {
            self.store.access_token()
        };

        match self.dispatch(&req, sent_bearer.as_deref()).await {
            Ok(raw) => Ok(raw),
            Err(err) => {
                if err.status() == Some(401) && !req.is_auth() {
                    return self.refresh_and_retry(&req, sent_bearer, err).await;
                }
                if err.status().is_some() {
                    self.bus.error(err.friendly_message());
                }
                Err(err)
            }
        }
    }

    /// Exactly one refresh cycle per original request. On refresh failure the
    /// stored credentials are cleared and the original 401 is surfaced.
    async fn refresh_and_retry(
        &self,
        req: &ApiRequest,
        sent_bearer: Option<String>,
        original: ApiError,
    ) -> Result<RawResponse, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        // Another request holding the lock may already have refreshed.
        let current = self.store.access_token();
        let refreshed = if current.is_some() && current != sent_bearer {
            true
        } else {
            self.refresh_access().await
        };

        if !refreshed {
            self.store.clear_tokens();
            self.bus.error(original.friendly_message());
            return Err(original);
        }

        let bearer = self.store.access_token();
        match self.dispatch(req, bearer.as_deref()).await {
            Ok(raw) => Ok(raw),
            Err(err) => {
                if err.status() == Some(401) {
                    self.store.clear_tokens();
                }
                if err.status().is_some() {
                    self.bus.error(err.friendly_message());
                }
                Err(err)
            }
        }
    }

    async fn refresh_access(&self) -> bool {
        let Some(refresh) = self.store.refresh_token() else {
            return false;
        };
        let observed_epoch = self.store.epoch();

        // Upstream contract quirk: the refresh token travels in the
        // request's "access" field.
        let req = ApiRequest::post("/auth/refresh", json!({ "access": refresh }));
        match self.dispatch(&req, None).await.and_then(|raw| raw.json()) {
            Ok(body) => match body.get("access").and_then(|v| v.as_str()) {
                Some(access) if !access.is_empty() => {
                    debug!("access token refreshed");
                    self.store.set_access_if_epoch(access, observed_epoch)
                }
                _ => {
                    warn!("refresh response carried no access token");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                false
            }
        }
    }

    async fn dispatch(&self, req: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse, ApiError> {
        let raw = self.backend.send(req, bearer).await?;

        if (200..300).contains(&raw.status) {
            return Ok(raw);
        }

        let body = raw.json_lenient();
        let field = |name: &str| {
            body.get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Err(ApiError::Status {
            status: raw.status,
            detail: field("detail"),
            message: field("message"),
        })
    }
}
