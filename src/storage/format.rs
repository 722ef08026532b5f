//! Conversion of US3 records into portable objects

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};

use crate::client::ObjectInfo;
use crate::error::BackendError;
use crate::storage::path::PathResolver;
use crate::types::{Object, ObjectMode, ObjectSystemMetadata};

/// Layout of `Last-Modified` in HEAD responses, e.g. `Mon, 02 Jan 2006 15:04:05 GMT`
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Header carrying the storage class of an object
pub const STORAGE_CLASS_HEADER: &str = "X-Ufile-Storage-Class";

/// Synthetic directory entry for a common prefix
pub fn format_dir_object(resolver: &PathResolver, prefix: &str) -> Object {
    let mut o = Object::new(true);
    o.id = prefix.to_string();
    o.path = resolver.to_relative(prefix);
    o.mode |= ObjectMode::DIR;
    o
}

/// File entry from a listing page
pub fn format_file_object(
    resolver: &PathResolver,
    v: &ObjectInfo,
) -> Result<Object, BackendError> {
    let mut o = Object::new(false);
    o.id = v.key.clone();
    o.path = resolver.to_relative(&v.key);
    o.mode |= ObjectMode::READ;

    o.content_length = Some(parse_length(&v.size)?);
    // Listings report milliseconds since the epoch
    o.last_modified = Some(parse_millis(v.last_modified)?);

    if !v.etag.is_empty() {
        o.etag = Some(v.etag.clone());
    }

    let mut sm = ObjectSystemMetadata::default();
    if !v.storage_class.is_empty() {
        sm.storage_class = Some(v.storage_class.clone());
    }
    o.system_metadata = Some(sm);

    Ok(o)
}

/// Fill optional attributes from HEAD response headers; absent headers
/// leave the attribute unset
pub fn apply_stat_headers(o: &mut Object, headers: &HeaderMap) -> Result<(), BackendError> {
    if let Some(value) = header(headers, CONTENT_LENGTH.as_str()) {
        o.content_length = Some(parse_length(value)?);
    }
    if let Some(value) = header(headers, LAST_MODIFIED.as_str()) {
        o.last_modified = Some(parse_http_date(value)?);
    }
    if let Some(value) = header(headers, CONTENT_TYPE.as_str()) {
        o.content_type = Some(value.to_string());
    }
    if let Some(value) = header(headers, ETAG.as_str()) {
        o.etag = Some(value.to_string());
    }

    let mut sm = ObjectSystemMetadata::default();
    if let Some(value) = header(headers, STORAGE_CLASS_HEADER) {
        sm.storage_class = Some(value.to_string());
    }
    o.system_metadata = Some(sm);

    Ok(())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn parse_length(value: &str) -> Result<u64, BackendError> {
    value
        .parse::<u64>()
        .map_err(|source| BackendError::ParseInt {
            value: value.to_string(),
            source,
        })
}

fn parse_millis(millis: i64) -> Result<DateTime<Utc>, BackendError> {
    DateTime::from_timestamp(millis / 1000, 0).ok_or(BackendError::TimestampOutOfRange(millis))
}

fn parse_http_date(value: &str) -> Result<DateTime<Utc>, BackendError> {
    NaiveDateTime::parse_from_str(value, HTTP_DATE_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|source| BackendError::ParseTime {
            value: value.to_string(),
            source,
        })
}
