//! US3 file API over HTTP
//!
//! Requests are addressed to `{scheme}://{bucket}.{file_host}/{key}` and
//! signed with the storage's HMAC key pair.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Response;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::client::auth::Signer;
use crate::client::{ByteStream, ListObjectsOutput, UFileClient};
use crate::error::{BackendError, ServerError, ACCESS_DENIED, NO_SUCH_KEY};

/// Content type sent with uploads
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Header carrying the request id assigned by US3
const SESSION_ID_HEADER: &str = "X-SessionId";

/// Error body returned by the file API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    ret_code: Option<i64>,
    err_msg: Option<String>,
}

/// US3 client backed by `reqwest`
pub struct HttpClient {
    http: reqwest::Client,
    signer: Signer,
    bucket: String,
    base_url: String,
}

impl HttpClient {
    /// Create a client for `bucket` on `file_host` (e.g. `https://cn-bj.ufileos.com`)
    pub fn new(http: reqwest::Client, signer: Signer, file_host: &str, bucket: &str) -> Self {
        Self {
            http,
            signer,
            bucket: bucket.to_string(),
            base_url: bucket_url(file_host, bucket),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, encode_key(key))
    }
}

/// Prefix the bucket onto the host part of the file host URL
fn bucket_url(file_host: &str, bucket: &str) -> String {
    let file_host = file_host.trim_end_matches('/');
    match file_host.split_once("://") {
        Some((scheme, host)) => format!("{}://{}.{}", scheme, bucket, host),
        None => format!("http://{}.{}", bucket, file_host),
    }
}

/// Percent-encode a key while keeping `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Ret code implied by a status when the response has no error body
fn code_from_status(status: u16) -> Option<i64> {
    match status {
        404 => Some(NO_SUCH_KEY),
        403 => Some(ACCESS_DENIED),
        _ => None,
    }
}

fn decode_error(status: u16, body: &[u8]) -> ServerError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            ret_code: Some(code),
            err_msg,
        }) => ServerError::new(status, Some(code), err_msg.unwrap_or_default()),
        _ => ServerError::new(
            status,
            code_from_status(status),
            String::from_utf8_lossy(body),
        ),
    }
}

/// Turn non-2xx responses into a [`ServerError`]
async fn check_response(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let session_id = response
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = response.bytes().await.unwrap_or_default();

    let mut error = decode_error(status.as_u16(), &body);
    error.session_id = session_id;
    debug!(
        "us3 request failed: status={} ret_code={:?} session={:?}",
        error.status, error.ret_code, error.session_id
    );
    Err(error.into())
}

#[async_trait]
impl UFileClient for HttpClient {
    async fn list_objects(
        &self,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: u32,
    ) -> Result<ListObjectsOutput, BackendError> {
        let url = format!(
            "{}/?listobjects&prefix={}&marker={}&max-keys={}&delimiter={}",
            self.base_url,
            urlencoding::encode(prefix),
            urlencoding::encode(marker),
            max_keys,
            urlencoding::encode(delimiter),
        );
        trace!("list_objects: prefix={} marker={} delimiter={:?}", prefix, marker, delimiter);

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.signer.authorization("GET", "", &self.bucket, ""))
            .send()
            .await?;
        let response = check_response(response).await?;
        let body = response.bytes().await?;

        Ok(serde_json::from_slice(&body)?)
    }

    async fn head_file(&self, key: &str) -> Result<HeaderMap, BackendError> {
        trace!("head_file: key={}", key);

        let response = self
            .http
            .head(self.object_url(key))
            .header(AUTHORIZATION, self.signer.authorization("HEAD", "", &self.bucket, key))
            .send()
            .await?;
        let response = check_response(response).await?;

        Ok(response.headers().clone())
    }

    async fn delete_file(&self, key: &str) -> Result<(), BackendError> {
        trace!("delete_file: key={}", key);

        let response = self
            .http
            .delete(self.object_url(key))
            .header(
                AUTHORIZATION,
                self.signer.authorization("DELETE", "", &self.bucket, key),
            )
            .send()
            .await?;
        check_response(response).await?;

        Ok(())
    }

    async fn put_file(&self, key: &str, body: ByteStream, size: u64) -> Result<(), BackendError> {
        trace!("put_file: key={} size={}", key, size);

        let response = self
            .http
            .put(self.object_url(key))
            .header(
                AUTHORIZATION,
                self.signer
                    .authorization("PUT", DEFAULT_CONTENT_TYPE, &self.bucket, key),
            )
            .header(CONTENT_TYPE, DEFAULT_CONTENT_TYPE)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await?;
        check_response(response).await?;

        Ok(())
    }

    fn private_url(&self, key: &str, expires: Duration) -> String {
        let expires_at = Utc::now().timestamp() + expires.as_secs() as i64;
        format!(
            "{}?{}",
            self.object_url(key),
            self.signer.private_url_query(&self.bucket, key, expires_at)
        )
    }

    async fn download(&self, url: &str) -> Result<ByteStream, BackendError> {
        let response = self.http.get(url).send().await?;
        let response = check_response(response).await?;

        Ok(Box::pin(response.bytes_stream().map_err(BackendError::from)))
    }
}
