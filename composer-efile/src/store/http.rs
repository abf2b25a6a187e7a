//! Object store over plain HTTP(S), e.g. a public S3 bucket endpoint

use super::{ObjectStore, StoreError};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const USER_AGENT: &str = concat!("composer/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Objects are fetched from `{base_url}/{key}`
pub struct HttpObjectStore {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpObjectStore {
    /// `workers` sizes the idle connection pool
    pub fn new(base_url: &str, workers: usize) -> composer_common::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(workers.max(1))
            .build()
            .map_err(|e| composer_common::Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

fn transport(key: &str, reason: impl ToString) -> StoreError {
    StoreError::Transport {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.url(key);
        tracing::trace!(key = %key, url = %url, "Fetching object");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport(key, e))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(key.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::AccessDenied {
                key: key.to_string(),
                reason: status.to_string(),
            }),
            s if s.is_success() => {
                let body = response.bytes().await.map_err(|e| transport(key, e))?;
                Ok(body.to_vec())
            }
            s => Err(transport(key, format!("HTTP {}", s))),
        }
    }

    /// Anonymous bucket reads answer 403 for absent keys, so 403 counts as absent here
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self
            .http_client
            .head(self.url(key))
            .send()
            .await
            .map_err(|e| transport(key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(false),
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Err(StoreError::AccessDenied {
                key: key.to_string(),
                reason: StatusCode::UNAUTHORIZED.to_string(),
            }),
            s => Err(transport(key, format!("HTTP {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let store = HttpObjectStore::new("https://s3.amazonaws.com/irs-form-990/", 4).unwrap();
        assert_eq!(
            store.url("201103169349300325_public.xml"),
            "https://s3.amazonaws.com/irs-form-990/201103169349300325_public.xml"
        );
        assert_eq!(store.url("/index_2011.json"), "https://s3.amazonaws.com/irs-form-990/index_2011.json");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Port 9 on localhost: nothing listens, connection is refused
        let store = HttpObjectStore::new("http://127.0.0.1:9", 1).unwrap();
        assert!(matches!(
            store.get("x_public.xml").await,
            Err(StoreError::Transport { .. })
        ));
    }
}
