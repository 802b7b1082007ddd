//! HTTP client for the master's API.
//!
//! Reads are retried with backoff, since repeating a read is harmless. Writes
//! are sent once: a write that timed out may still have committed.

use anyhow::{Result, anyhow};
use reqwest::{StatusCode, Url};
use std::time::Duration;

use crate::api::protocol::{
    CacheSnapshotResponse, ENDPOINT_CACHE, ENDPOINT_DELETE, ENDPOINT_GET, ENDPOINT_IGNORE_NEXT,
    ENDPOINT_PUT, ENDPOINT_REPLICAS, GetResponse, PutRequest, ReplicaListResponse, WriteResponse,
};
use crate::storage::cache::CacheSetSnapshot;
use crate::tpc::ring::ReplicaInfo;

const GET_ATTEMPTS: usize = 3;

pub struct KvClient {
    base_url: Url,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl KvClient {
    /// `master` is either a full base URL or a bare `host:port`.
    pub fn new(master: &str, timeout: Duration) -> Result<Self> {
        let cleaned = master.trim_end_matches('/');
        let base = if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
            cleaned.to_string()
        } else {
            format!("http://{}", cleaned)
        };

        Ok(Self {
            base_url: Url::parse(&base)?,
            http_client: reqwest::Client::new(),
            timeout,
        })
    }

    fn url(&self, endpoint: &str, segment: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("{} cannot be a base URL", self.base_url))?;
            segments.pop_if_empty();
            segments.push(endpoint.trim_start_matches('/'));
            if let Some(segment) = segment {
                segments.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..GET_ATTEMPTS {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == GET_ATTEMPTS {
                        return Err(anyhow!(e));
                    }
                    tracing::debug!("GET {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<WriteResponse> {
        let response = self
            .http_client
            .post(self.url(ENDPOINT_PUT, None)?)
            .json(&PutRequest {
                key: key.to_string(),
                value: value.to_string(),
            })
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(response.json().await?)
    }

    /// `Ok(None)` when the key does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let response = self.get_with_retry(self.url(ENDPOINT_GET, Some(key))?).await?;
        let status = response.status();
        let body: GetResponse = response.json().await?;

        match status {
            StatusCode::OK => Ok(body.value),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(anyhow!(
                "GET {} failed with {}: {}",
                key,
                other,
                body.message.unwrap_or_default()
            )),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<WriteResponse> {
        let response = self
            .http_client
            .delete(self.url(ENDPOINT_DELETE, Some(key))?)
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(response.json().await?)
    }

    pub async fn replicas(&self) -> Result<Vec<ReplicaInfo>> {
        let response = self.get_with_retry(self.url(ENDPOINT_REPLICAS, None)?).await?;
        let body: ReplicaListResponse = response.error_for_status()?.json().await?;
        Ok(body.replicas)
    }

    pub async fn cache_snapshot(&self) -> Result<Vec<CacheSetSnapshot>> {
        let response = self.get_with_retry(self.url(ENDPOINT_CACHE, None)?).await?;
        let body: CacheSnapshotResponse = response.error_for_status()?.json().await?;
        Ok(body.sets)
    }

    pub async fn ignore_next(&self, replica_id: u64) -> Result<WriteResponse> {
        let response = self
            .http_client
            .post(self.url(ENDPOINT_IGNORE_NEXT, Some(&replica_id.to_string()))?)
            .timeout(self.timeout)
            .send()
            .await?;

        Ok(response.json().await?)
    }
}
