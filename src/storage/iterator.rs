//! Paginated listing
//!
//! Each advance of an [`ObjectIterator`] issues at most one `listobjects`
//! call. The cursor lives in [`ObjectPageStatus`], owned by the iterator.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::try_stream;
use futures::Stream;
use tracing::{debug, trace};

use crate::client::UFileClient;
use crate::error::{Error, Result};
use crate::storage::format::{format_dir_object, format_file_object};
use crate::storage::path::PathResolver;
use crate::types::Object;

/// Page size requested from the backend
pub const MAX_KEYS: u32 = 200;

/// Stream type for listings
pub type ObjectStream = Pin<Box<dyn Stream<Item = Result<Object>> + Send>>;

/// Which entries a listing surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Listing {
    /// Every key under the prefix, no common prefixes
    Prefix,
    /// One level under the prefix; common prefixes become directories
    Dir,
}

impl Listing {
    fn delimiter(self) -> &'static str {
        match self {
            Listing::Prefix => "",
            Listing::Dir => "/",
        }
    }
}

/// Cursor of one listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPageStatus {
    prefix: String,
    max_keys: u32,
    delimiter: String,
    marker: String,
}

impl ObjectPageStatus {
    fn new(prefix: String, delimiter: &str) -> Self {
        Self {
            prefix,
            max_keys: MAX_KEYS,
            delimiter: delimiter.to_string(),
            marker: String::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_keys(&self) -> u32 {
        self.max_keys
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Marker returned by the most recent page; empty before the first fetch
    pub fn continuation_token(&self) -> &str {
        &self.marker
    }
}

/// Objects produced by one backend call
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPage {
    pub data: Vec<Object>,
    /// No further page exists
    pub done: bool,
}

/// Fetch the page at `status` and advance the cursor.
///
/// Directory entries come first, then files, both in backend order. The
/// page is the last one when the backend returns no marker or reports the
/// listing as not truncated.
pub(crate) async fn next_object_page(
    client: &dyn UFileClient,
    resolver: &PathResolver,
    listing: Listing,
    status: &mut ObjectPageStatus,
) -> Result<ObjectPage> {
    let output = client
        .list_objects(&status.prefix, &status.marker, &status.delimiter, status.max_keys)
        .await?;

    let mut data = Vec::with_capacity(output.common_prefixes.len() + output.contents.len());

    if listing == Listing::Dir {
        for v in &output.common_prefixes {
            data.push(format_dir_object(resolver, &v.prefix));
        }
    }

    for v in &output.contents {
        data.push(format_file_object(resolver, v)?);
    }

    let done = output.next_marker.is_empty() || !output.is_truncated;
    if !done {
        status.marker = output.next_marker;
    }

    trace!(
        "list page: prefix={} entries={} done={} marker={}",
        status.prefix,
        data.len(),
        done,
        status.marker
    );

    Ok(ObjectPage { data, done })
}

/// Lazy listing over a prefix
pub struct ObjectIterator {
    client: Arc<dyn UFileClient>,
    resolver: PathResolver,
    listing: Listing,
    status: ObjectPageStatus,
    buffered: VecDeque<Object>,
    done: bool,
    storager: String,
    path: String,
}

impl ObjectIterator {
    pub(crate) fn new(
        client: Arc<dyn UFileClient>,
        resolver: PathResolver,
        listing: Listing,
        storager: String,
        path: &str,
    ) -> Self {
        let status = ObjectPageStatus::new(resolver.to_absolute(path), listing.delimiter());
        Self {
            client,
            resolver,
            listing,
            status,
            buffered: VecDeque::new(),
            done: false,
            storager,
            path: path.to_string(),
        }
    }

    pub fn status(&self) -> &ObjectPageStatus {
        &self.status
    }

    pub fn continuation_token(&self) -> &str {
        self.status.continuation_token()
    }

    /// True once the last page has been fetched or a fetch failed
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetch the next page; `None` once the listing is exhausted.
    ///
    /// A page may be empty while further pages remain.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Object>>> {
        if self.done {
            return Ok(None);
        }

        match next_object_page(
            self.client.as_ref(),
            &self.resolver,
            self.listing,
            &mut self.status,
        )
        .await
        {
            Ok(page) => {
                self.done = page.done;
                Ok(Some(page.data))
            }
            Err(err) => {
                self.done = true;
                debug!("list failed: path={} error={}", self.path, err);
                Err(Error::Storage {
                    op: "list",
                    storager: self.storager.clone(),
                    path: vec![self.path.clone()],
                    source: Box::new(err),
                })
            }
        }
    }

    /// Next object, fetching pages as needed
    pub async fn next(&mut self) -> Result<Option<Object>> {
        loop {
            if let Some(o) = self.buffered.pop_front() {
                return Ok(Some(o));
            }
            match self.next_page().await? {
                Some(page) => self.buffered.extend(page),
                None => return Ok(None),
            }
        }
    }

    /// Drain the listing into a vector
    pub async fn collect_all(mut self) -> Result<Vec<Object>> {
        let mut objects = Vec::new();
        while let Some(o) = self.next().await? {
            objects.push(o);
        }
        Ok(objects)
    }

    pub fn into_stream(mut self) -> ObjectStream {
        Box::pin(try_stream! {
            while let Some(object) = self.next().await? {
                yield object;
            }
        })
    }
}
