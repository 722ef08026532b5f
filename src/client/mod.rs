pub mod auth;
pub mod http;
pub mod mock;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer};

use crate::error::BackendError;

pub use http::HttpClient;
pub use mock::MockClient;

/// Stream of body chunks flowing to or from the backend
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// One page of a `listobjects` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListObjectsOutput {
    #[serde(default)]
    pub is_truncated: bool,

    /// Marker to resume from; empty on the last page
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_marker: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub contents: Vec<ObjectInfo>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub common_prefixes: Vec<CommonPrefix>,
}

/// A file entry in a listing page
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectInfo {
    pub key: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub mime_type: String,

    /// Milliseconds since the Unix epoch
    #[serde(default)]
    pub last_modified: i64,

    #[serde(default, deserialize_with = "null_as_default")]
    pub etag: String,

    /// Decimal content length
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub storage_class: String,
}

/// A virtual directory in a delimited listing
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonPrefix {
    pub prefix: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Calls the adapter needs from the US3 file API.
///
/// Every method is a single request; retries and transport policy belong
/// to the implementation.
#[async_trait]
pub trait UFileClient: Send + Sync {
    /// List keys under `prefix`, resuming after `marker`.
    ///
    /// An empty `delimiter` lists recursively; `/` groups keys into
    /// common prefixes.
    async fn list_objects(
        &self,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: u32,
    ) -> Result<ListObjectsOutput, BackendError>;

    /// Fetch the response headers of a HEAD request on `key`
    async fn head_file(&self, key: &str) -> Result<HeaderMap, BackendError>;

    /// Delete `key`. Fails with `NoSuchKey` when the key is already gone.
    async fn delete_file(&self, key: &str) -> Result<(), BackendError>;

    /// Upload exactly `size` bytes from `body` to `key`
    async fn put_file(&self, key: &str, body: ByteStream, size: u64) -> Result<(), BackendError>;

    /// Build a signed download URL for `key` valid for `expires`
    fn private_url(&self, key: &str, expires: Duration) -> String;

    /// Stream the body behind a URL built by [`UFileClient::private_url`]
    async fn download(&self, url: &str) -> Result<ByteStream, BackendError>;
}
