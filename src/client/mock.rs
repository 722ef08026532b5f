//! In-memory US3 client
//!
//! Behaves like the file API for the calls the adapter makes, including the
//! non-idempotent delete, and lets tests script listing pages and inject
//! failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};

use crate::client::{ByteStream, CommonPrefix, ListObjectsOutput, ObjectInfo, UFileClient};
use crate::error::{BackendError, ServerError, NO_SUCH_KEY};

const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Client call, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Head,
    Delete,
    Put,
    Download,
}

/// Arguments of one `list_objects` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub prefix: String,
    pub marker: String,
    pub delimiter: String,
    pub max_keys: u32,
}

struct MockObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    headers: Option<HeaderMap>,
}

struct MockState {
    objects: BTreeMap<String, MockObject>,
    pages: VecDeque<ListObjectsOutput>,
    failures: HashMap<Operation, VecDeque<ServerError>>,
    calls: HashMap<Operation, usize>,
    list_calls: Vec<ListCall>,
    chunk_size: usize,
}

/// US3 client keeping objects in memory
pub struct MockClient {
    state: Mutex<MockState>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                objects: BTreeMap::new(),
                pages: VecDeque::new(),
                failures: HashMap::new(),
                calls: HashMap::new(),
                list_calls: Vec::new(),
                chunk_size: 4,
            }),
        }
    }

    /// Store an object under an absolute key
    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        let last_modified = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap_or_default();
        self.state.lock().objects.insert(
            key.to_string(),
            MockObject {
                data: data.into(),
                last_modified,
                headers: None,
            },
        );
    }

    /// Store an object whose HEAD response returns exactly `headers`
    pub fn insert_with_headers(&self, key: &str, data: impl Into<Bytes>, headers: HeaderMap) {
        self.insert(key, data);
        if let Some(object) = self.state.lock().objects.get_mut(key) {
            object.headers = Some(headers);
        }
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    /// Queue a listing page; queued pages are served before stored objects
    pub fn push_page(&self, page: ListObjectsOutput) {
        self.state.lock().pages.push_back(page);
    }

    /// Make the next call of `op` fail with `error`
    pub fn fail_next(&self, op: Operation, error: ServerError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Size of the chunks produced by downloads
    pub fn set_chunk_size(&self, chunk_size: usize) {
        self.state.lock().chunk_size = chunk_size.max(1);
    }

    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn list_calls(&self) -> Vec<ListCall> {
        self.state.lock().list_calls.clone()
    }

    /// Count the call and return an injected failure, if any
    fn begin(&self, op: Operation) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

fn not_found(key: &str) -> ServerError {
    ServerError::new(404, Some(NO_SUCH_KEY), format!("file {} not exist", key))
}

fn default_headers(object: &MockObject) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(object.data.len()));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    let last_modified = object
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&etag(object)) {
        headers.insert(ETAG, value);
    }
    headers.insert(
        "x-ufile-storage-class",
        HeaderValue::from_static(DEFAULT_STORAGE_CLASS),
    );
    headers
}

fn etag(object: &MockObject) -> String {
    let sum = object
        .data
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
    format!("\"{:08x}\"", sum)
}

/// Page through stored objects the way the file API does
fn list_stored(
    objects: &BTreeMap<String, MockObject>,
    prefix: &str,
    marker: &str,
    delimiter: &str,
    max_keys: u32,
) -> ListObjectsOutput {
    let mut output = ListObjectsOutput::default();
    let mut count = 0u32;
    let mut last_key = String::new();
    let mut last_prefix: Option<String> = None;

    for (key, object) in objects
        .iter()
        .filter(|(k, _)| k.starts_with(prefix) && k.as_str() > marker)
    {
        let common = if delimiter.is_empty() {
            None
        } else {
            key[prefix.len()..]
                .find(delimiter)
                .map(|pos| key[..prefix.len() + pos + delimiter.len()].to_string())
        };

        // Keys under an already emitted prefix are folded into it
        if common.is_some() && common == last_prefix {
            last_key = key.clone();
            continue;
        }

        if count == max_keys {
            output.is_truncated = true;
            break;
        }
        count += 1;
        last_key = key.clone();

        match common {
            Some(p) => {
                output.common_prefixes.push(CommonPrefix { prefix: p.clone() });
                last_prefix = Some(p);
            }
            None => output.contents.push(ObjectInfo {
                key: key.clone(),
                mime_type: "application/octet-stream".to_string(),
                last_modified: object.last_modified.timestamp_millis(),
                etag: etag(object),
                size: object.data.len().to_string(),
                storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            }),
        }
    }

    if output.is_truncated {
        output.next_marker = last_key;
    }
    output
}

#[async_trait]
impl UFileClient for MockClient {
    async fn list_objects(
        &self,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: u32,
    ) -> Result<ListObjectsOutput, BackendError> {
        self.begin(Operation::List)?;

        let mut state = self.state.lock();
        state.list_calls.push(ListCall {
            prefix: prefix.to_string(),
            marker: marker.to_string(),
            delimiter: delimiter.to_string(),
            max_keys,
        });

        if let Some(page) = state.pages.pop_front() {
            return Ok(page);
        }
        Ok(list_stored(&state.objects, prefix, marker, delimiter, max_keys))
    }

    async fn head_file(&self, key: &str) -> Result<HeaderMap, BackendError> {
        self.begin(Operation::Head)?;

        let state = self.state.lock();
        let object = state.objects.get(key).ok_or_else(|| not_found(key))?;
        Ok(object
            .headers
            .clone()
            .unwrap_or_else(|| default_headers(object)))
    }

    async fn delete_file(&self, key: &str) -> Result<(), BackendError> {
        self.begin(Operation::Delete)?;

        match self.state.lock().objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(not_found(key).into()),
        }
    }

    async fn put_file(&self, key: &str, mut body: ByteStream, size: u64) -> Result<(), BackendError> {
        self.begin(Operation::Put)?;

        let mut data = Vec::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk?);
        }
        if data.len() as u64 != size {
            return Err(ServerError::new(
                400,
                None,
                format!("content length {} does not match body of {} bytes", size, data.len()),
            )
            .into());
        }

        self.insert(key, data);
        Ok(())
    }

    fn private_url(&self, key: &str, expires: Duration) -> String {
        format!("mock://{}?expires={}", key, expires.as_secs())
    }

    async fn download(&self, url: &str) -> Result<ByteStream, BackendError> {
        self.begin(Operation::Download)?;

        let key = url
            .strip_prefix("mock://")
            .and_then(|rest| rest.split('?').next())
            .unwrap_or(url);

        let state = self.state.lock();
        let object = state.objects.get(key).ok_or_else(|| not_found(key))?;
        let chunks: Vec<Result<Bytes, BackendError>> = object
            .data
            .chunks(state.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
