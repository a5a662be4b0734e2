//! HTTP client for the provider's native bucket API

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header::AUTHORIZATION};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{BucketInfo, BucketUsage, ProviderClient, ProviderError, Result};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub api_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Upper bound on object-listing pages read per bucket
    pub max_listing_pages: u32,
    pub page_size: u32,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.backblazeb2.com".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("bucketwatch/{}", env!("CARGO_PKG_VERSION")),
            max_listing_pages: 20,
            page_size: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBucketsResponse {
    #[serde(default)]
    buckets: Option<Vec<RawBucket>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBucket {
    bucket_name: Option<String>,
    bucket_id: Option<String>,
    #[serde(default)]
    created_at: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFileNamesResponse {
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    next_file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFile {
    #[serde(default)]
    content_length: Option<u64>,
    #[serde(default)]
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Provider client speaking the native JSON API
pub struct HttpProviderClient {
    client: Client,
    config: HttpProviderConfig,
}

impl HttpProviderClient {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn call<T: DeserializeOwned>(&self, operation: &str, credential: &str, body: Value) -> Result<T> {
        let url = format!(
            "{}/b2api/v2/{}",
            self.config.api_url.trim_end_matches('/'),
            operation
        );
        debug!(%url, "Calling provider");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn find_bucket(&self, account_id: &str, credential: &str, bucket_name: &str) -> Result<BucketInfo> {
        let response: ListBucketsResponse = self
            .call(
                "b2_list_buckets",
                credential,
                json!({ "accountId": account_id, "bucketName": bucket_name }),
            )
            .await?;

        parse_buckets(response)?
            .into_iter()
            .find(|bucket| bucket.name == bucket_name)
            .ok_or_else(|| ProviderError::BucketNotFound(bucket_name.to_string()))
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn list_buckets(&self, account_id: &str, credential: &str) -> Result<Vec<BucketInfo>> {
        let response: ListBucketsResponse = self
            .call("b2_list_buckets", credential, json!({ "accountId": account_id }))
            .await?;

        let buckets = parse_buckets(response)?;
        debug!(account_id, count = buckets.len(), "Listed buckets");
        Ok(buckets)
    }

    /// Walks the bucket's object listing and sums the sizes
    async fn bucket_stats(
        &self,
        account_id: &str,
        credential: &str,
        bucket_name: &str,
    ) -> Result<BucketUsage> {
        let bucket = self.find_bucket(account_id, credential, bucket_name).await?;
        let bucket_id = bucket.id.ok_or_else(|| {
            ProviderError::InvalidResponse(format!("bucket {bucket_name} has no bucketId"))
        })?;

        let mut usage = BucketUsage::default();
        let mut start_file_name: Option<String> = None;
        let mut pages = 0;

        loop {
            let mut body = json!({ "bucketId": bucket_id, "maxFileCount": self.config.page_size });
            if let Some(start) = &start_file_name {
                body["startFileName"] = Value::String(start.clone());
            }

            let page: ListFileNamesResponse = self.call("b2_list_file_names", credential, body).await?;
            pages += 1;

            let files = page.files.ok_or_else(|| {
                ProviderError::InvalidResponse("file listing without files field".to_string())
            })?;

            for file in files.iter().filter(|f| f.action.as_deref() != Some("folder")) {
                usage.object_count = usage.object_count.saturating_add(1);
                usage.total_size_bytes = usage
                    .total_size_bytes
                    .saturating_add(file.content_length.unwrap_or(0));
            }

            match page.next_file_name {
                Some(next) if pages < self.config.max_listing_pages => start_file_name = Some(next),
                Some(_) => {
                    warn!(
                        account_id,
                        bucket = bucket_name,
                        pages,
                        "Object listing truncated at page limit"
                    );
                    break;
                }
                None => break,
            }
        }

        debug!(
            account_id,
            bucket = bucket_name,
            objects = usage.object_count,
            bytes = usage.total_size_bytes,
            pages,
            "Computed bucket stats"
        );
        Ok(usage)
    }
}

fn parse_buckets(response: ListBucketsResponse) -> Result<Vec<BucketInfo>> {
    let raw = response
        .buckets
        .ok_or_else(|| ProviderError::InvalidResponse("bucket listing without buckets field".to_string()))?;

    let mut buckets = Vec::with_capacity(raw.len());
    for bucket in raw {
        let Some(name) = bucket.bucket_name.filter(|n| !n.is_empty()) else {
            warn!("Skipping bucket entry without a name");
            continue;
        };
        buckets.push(BucketInfo {
            name,
            id: bucket.bucket_id,
            created_at: bucket.created_at.as_ref().and_then(parse_timestamp),
        });
    }
    Ok(buckets)
}

/// Accepts either epoch milliseconds or an RFC 3339 string
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.code.unwrap_or_else(|| "unknown".to_string());
    let message = parsed
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized(format!("{code}: {message}"))
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        _ => ProviderError::Api {
            status: status.as_u16(),
            code,
            message,
        },
    }
}
