//! Storage operations driven through the in-memory client

use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, LAST_MODIFIED};

use us3_adapter::client::mock::Operation;
use us3_adapter::client::{CommonPrefix, ListObjectsOutput, MockClient, ObjectInfo};
use us3_adapter::config::{ServiceConfig, StorageConfig, StorageEntry};
use us3_adapter::error::{ServerError, ACCESS_DENIED, NO_SUCH_KEY};
use us3_adapter::types::{
    DefaultStorageOptions, DeleteOptions, IoCallback, ListMode, ListOptions, Object, ObjectMode,
    ReadOptions, StatOptions, StorageFeatures, WriteOptions,
};
use us3_adapter::{Error, ErrorKind, Storage};

fn setup(work_dir: &str, virtual_dir: bool) -> (Arc<MockClient>, Storage) {
    let client = Arc::new(MockClient::new());
    let config = StorageConfig {
        work_dir: Some(work_dir.to_string()),
        features: StorageFeatures { virtual_dir },
        ..StorageConfig::new("bucket")
    };
    let storage = Storage::new(client.clone(), config);
    (client, storage)
}

fn dir_listing() -> ListOptions {
    ListOptions {
        list_mode: Some(ListMode::Dir),
    }
}

fn info(key: &str, size: &str) -> ObjectInfo {
    ObjectInfo {
        key: key.to_string(),
        mime_type: "text/plain".to_string(),
        last_modified: 1_000_000_000_000,
        etag: String::new(),
        size: size.to_string(),
        storage_class: "STANDARD".to_string(),
    }
}

fn page(keys: &[&str], next_marker: &str, truncated: bool) -> ListObjectsOutput {
    ListObjectsOutput {
        is_truncated: truncated,
        next_marker: next_marker.to_string(),
        contents: keys.iter().map(|k| info(k, "1")).collect(),
        common_prefixes: vec![],
    }
}

/// Callback that records every chunk it sees
fn recorder() -> (IoCallback, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback = IoCallback::new(move |bytes: &[u8]| sink.lock().extend_from_slice(bytes));
    (callback, seen)
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_listing_stops_after_first_untruncated_page() {
    let (client, storage) = setup("/", false);
    client.push_page(page(&["a", "b"], "b", true));
    client.push_page(page(&["c"], "c", true));
    client.push_page(page(&["d", "e"], "e", true));
    client.push_page(page(&["f"], "f", false));

    let objects = storage
        .list("", &ListOptions::default())
        .unwrap()
        .collect_all()
        .await
        .unwrap();

    let ids: Vec<_> = objects.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);
    assert_eq!(client.calls(Operation::List), 4);

    let markers: Vec<_> = client.list_calls().into_iter().map(|c| c.marker).collect();
    assert_eq!(markers, vec!["", "b", "c", "e"]);
}

#[tokio::test]
async fn test_listing_is_lazy() {
    let (client, storage) = setup("/", false);
    let mut it = storage.list("", &ListOptions::default()).unwrap();
    assert_eq!(client.calls(Operation::List), 0);

    it.next().await.unwrap();
    assert_eq!(client.calls(Operation::List), 1);
}

#[tokio::test]
async fn test_dir_listing_yields_directories_then_files() {
    let (client, storage) = setup("/work/", false);
    client.push_page(ListObjectsOutput {
        is_truncated: false,
        next_marker: String::new(),
        contents: vec![info("work/a.txt", "3"), info("work/b.txt", "42")],
        common_prefixes: vec![
            CommonPrefix {
                prefix: "work/x/".to_string(),
            },
            CommonPrefix {
                prefix: "work/y/".to_string(),
            },
            CommonPrefix {
                prefix: "work/z/".to_string(),
            },
        ],
    });

    let mut it = storage.list("", &dir_listing()).unwrap();
    let data = it.next_page().await.unwrap().unwrap();
    assert_eq!(data.len(), 5);

    for (o, id) in data[..3].iter().zip(["work/x/", "work/y/", "work/z/"]) {
        assert_eq!(o.id, id);
        assert_eq!(format!("work/{}", o.path), o.id);
        assert_eq!(o.mode, ObjectMode::DIR);
        assert!(o.done);
    }
    assert_eq!(data[3].path, "a.txt");
    assert_eq!(data[4].content_length, Some(42));
    assert_eq!(data[4].mode, ObjectMode::READ);
    assert_eq!(data[4].last_modified.unwrap().timestamp(), 1_000_000_000);

    let call = &client.list_calls()[0];
    assert_eq!(call.prefix, "work/");
    assert_eq!(call.delimiter, "/");
    assert_eq!(call.max_keys, 200);
}

#[tokio::test]
async fn test_dir_listing_over_stored_objects() {
    let (client, storage) = setup("/", false);
    for key in ["docs/a.md", "docs/img/1.png", "docs/img/2.png", "docs/z.md", "top.txt"] {
        client.insert(key, "data");
    }

    let objects = storage
        .list("docs/", &dir_listing())
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    let paths: Vec<_> = objects.iter().map(|o| o.path.as_str()).collect();
    assert_eq!(paths, vec!["docs/img/", "docs/a.md", "docs/z.md"]);

    let objects = storage
        .list("docs/", &ListOptions::default())
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(objects.len(), 4);
    assert!(objects.iter().all(|o| o.mode.is_read()));
}

#[tokio::test]
async fn test_listing_pages_through_many_stored_objects() {
    let (client, storage) = setup("/", false);
    for i in 0..450 {
        client.insert(&format!("k/{:04}", i), "x");
    }

    let objects: Vec<Object> = storage
        .list("k/", &ListOptions::default())
        .unwrap()
        .into_stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(objects.len(), 450);
    assert_eq!(objects[449].id, "k/0449");
    assert_eq!(client.calls(Operation::List), 3);
}

#[tokio::test]
async fn test_empty_truncated_page_is_not_terminal() {
    let (client, storage) = setup("/", false);
    client.push_page(page(&[], "m1", true));
    client.push_page(page(&[], "m2", true));
    client.push_page(page(&["last"], "", false));

    let objects = storage
        .list("", &ListOptions::default())
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(client.calls(Operation::List), 3);
}

#[tokio::test]
async fn test_invalid_list_mode_fails_before_any_call() {
    let (client, storage) = setup("/", false);
    let opts = ListOptions {
        list_mode: Some(ListMode::Block),
    };

    let err = storage.list("a/", &opts).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::ListModeInvalid);
    assert!(matches!(err, Error::Storage { op: "list", .. }));
    assert_eq!(client.calls(Operation::List), 0);
}

#[tokio::test]
async fn test_listing_error_is_normalized() {
    let (client, storage) = setup("/", false);
    client.fail_next(
        Operation::List,
        ServerError::new(403, Some(ACCESS_DENIED), "denied"),
    );

    let err = storage
        .list("", &ListOptions::default())
        .unwrap()
        .collect_all()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_default_list_mode_from_storage_defaults() {
    let client = Arc::new(MockClient::new());
    let config = StorageConfig {
        defaults: DefaultStorageOptions {
            list_mode: Some(ListMode::Dir),
            io_callback: None,
        },
        ..StorageConfig::new("bucket")
    };
    let storage = Storage::new(client.clone(), config);

    storage
        .list("", &ListOptions::default())
        .unwrap()
        .collect_all()
        .await
        .unwrap();
    assert_eq!(client.list_calls()[0].delimiter, "/");
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_twice_succeeds() {
    let (client, storage) = setup("/work/", false);
    client.insert("work/a.txt", "data");

    storage.delete("a.txt", &DeleteOptions::default()).await.unwrap();
    storage.delete("a.txt", &DeleteOptions::default()).await.unwrap();

    assert!(client.object("work/a.txt").is_none());
    assert_eq!(client.calls(Operation::Delete), 2);
}

#[tokio::test]
async fn test_delete_other_failures_propagate() {
    let (client, storage) = setup("/", false);
    client.insert("a", "data");
    client.fail_next(Operation::Delete, ServerError::new(500, Some(-1), "boom"));

    let err = storage
        .delete("a", &DeleteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
    assert!(client.object("a").is_some());

    client.fail_next(
        Operation::Delete,
        ServerError::new(403, Some(ACCESS_DENIED), "denied"),
    );
    let err = storage
        .delete("a", &DeleteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[tokio::test]
async fn test_delete_virtual_dir() {
    let (client, storage) = setup("/", true);
    client.insert("photos/", "");

    let opts = DeleteOptions {
        object_mode: Some(ObjectMode::DIR),
    };
    storage.delete("photos", &opts).await.unwrap();
    assert!(client.keys().is_empty());
}

#[tokio::test]
async fn test_dir_mode_without_virtual_dir_is_unsupported() {
    let (client, storage) = setup("/", false);

    let err = storage
        .delete(
            "photos",
            &DeleteOptions {
                object_mode: Some(ObjectMode::DIR),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PairUnsupported);

    let err = storage
        .stat(
            "photos",
            &StatOptions {
                object_mode: Some(ObjectMode::DIR),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PairUnsupported);

    assert_eq!(client.calls(Operation::Delete), 0);
    assert_eq!(client.calls(Operation::Head), 0);
}

// =============================================================================
// Stat
// =============================================================================

#[tokio::test]
async fn test_stat_parses_headers() {
    let (client, storage) = setup("/work/", false);
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from_static("42"));
    headers.insert(
        LAST_MODIFIED,
        HeaderValue::from_static("Mon, 02 Jan 2006 15:04:05 GMT"),
    );
    client.insert_with_headers("work/a.txt", "ignored", headers);

    let o = storage.stat("a.txt", &StatOptions::default()).await.unwrap();
    assert_eq!(o.id, "work/a.txt");
    assert_eq!(o.path, "a.txt");
    assert!(o.mode.is_read());
    assert!(o.done);
    assert_eq!(o.content_length, Some(42));
    assert_eq!(
        o.last_modified,
        Some(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap())
    );
    assert_eq!(o.content_type, None);
    assert_eq!(o.etag, None);
    assert_eq!(o.storage_class(), None);
}

#[tokio::test]
async fn test_stat_default_headers() {
    let (client, storage) = setup("/", false);
    client.insert("a.txt", "hello");

    let o = storage.stat("a.txt", &StatOptions::default()).await.unwrap();
    assert_eq!(o.content_length, Some(5));
    assert!(o.last_modified.is_some());
    assert!(o.etag.is_some());
    assert_eq!(o.content_type.as_deref(), Some("application/octet-stream"));
    assert_eq!(o.storage_class(), Some("STANDARD"));
}

#[tokio::test]
async fn test_stat_virtual_dir() {
    let (client, storage) = setup("/", true);
    client.insert("photos/", "");

    let o = storage
        .stat(
            "photos",
            &StatOptions {
                object_mode: Some(ObjectMode::DIR),
            },
        )
        .await
        .unwrap();
    assert_eq!(o.id, "photos/");
    assert_eq!(o.path, "photos");
    assert!(o.mode.is_dir());
}

#[tokio::test]
async fn test_stat_missing_object() {
    let (_client, storage) = setup("/", false);

    let err = storage
        .stat("missing", &StatOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectNotExist);
    assert!(err.is_not_found());
    assert!(err.to_string().contains("stat"));
    assert!(err.backend().and_then(|e| e.code()) == Some(NO_SUCH_KEY));
}

#[tokio::test]
async fn test_stat_bad_last_modified_is_fatal() {
    let (client, storage) = setup("/", false);
    let mut headers = HeaderMap::new();
    headers.insert(LAST_MODIFIED, HeaderValue::from_static("yesterday"));
    client.insert_with_headers("a", "", headers);

    let err = storage.stat("a", &StatOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

// =============================================================================
// Write
// =============================================================================

#[tokio::test]
async fn test_write_truncates_to_size() {
    let (client, storage) = setup("/work/", false);

    let n = storage
        .write(
            "a.txt",
            Cursor::new(b"hello world".to_vec()),
            5,
            &WriteOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(n, 5);
    assert_eq!(client.object("work/a.txt").unwrap(), "hello");
}

#[tokio::test]
async fn test_write_callback_sees_uploaded_bytes() {
    let (client, storage) = setup("/", false);
    let (callback, seen) = recorder();

    let reader = tokio_test::io::Builder::new()
        .read(b"abc")
        .read(b"def")
        .read(b"g")
        .build();
    let opts = WriteOptions {
        io_callback: Some(callback),
    };

    let n = storage.write("f", reader, 7, &opts).await.unwrap();
    assert_eq!(n, 7);
    assert_eq!(seen.lock().as_slice(), b"abcdefg");
    assert_eq!(client.object("f").unwrap(), "abcdefg");
}

#[tokio::test]
async fn test_write_failure_is_normalized() {
    let (client, storage) = setup("/", false);
    client.fail_next(
        Operation::Put,
        ServerError::new(403, Some(ACCESS_DENIED), "denied"),
    );

    let err = storage
        .write("f", Cursor::new(vec![1u8; 4]), 4, &WriteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

// =============================================================================
// Read
// =============================================================================

#[tokio::test]
async fn test_read_callback_sees_sink_bytes() {
    let (client, storage) = setup("/work/", false);
    client.set_chunk_size(3);
    client.insert("work/a.txt", "the quick brown fox");
    let (callback, seen) = recorder();

    let mut sink = Vec::new();
    let opts = ReadOptions {
        io_callback: Some(callback),
    };
    let n = storage.read("a.txt", &mut sink, &opts).await.unwrap();

    assert_eq!(n, 19);
    assert_eq!(sink, b"the quick brown fox");
    assert_eq!(seen.lock().as_slice(), sink.as_slice());
}

#[tokio::test]
async fn test_read_uses_default_callback() {
    let (callback, seen) = recorder();
    let client = Arc::new(MockClient::new());
    let config = StorageConfig {
        defaults: DefaultStorageOptions {
            list_mode: None,
            io_callback: Some(callback),
        },
        ..StorageConfig::new("bucket")
    };
    let storage = Storage::new(client.clone(), config);
    client.insert("a", "payload");

    let mut sink = Vec::new();
    storage
        .read("a", &mut sink, &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(seen.lock().as_slice(), b"payload");
}

#[tokio::test]
async fn test_read_missing_object() {
    let (_client, storage) = setup("/", false);

    let mut sink = Vec::new();
    let err = storage
        .read("missing", &mut sink, &ReadOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ObjectNotExist);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_write_then_read_back() {
    let (_client, storage) = setup("/data/", false);
    let body = vec![7u8; 1024];

    storage
        .write("blob", Cursor::new(body.clone()), 1024, &WriteOptions::default())
        .await
        .unwrap();

    let mut sink = Vec::new();
    let n = storage
        .read("blob", &mut sink, &ReadOptions::default())
        .await
        .unwrap();
    assert_eq!(n, 1024);
    assert_eq!(sink, body);
}

// =============================================================================
// Construction
// =============================================================================

fn entry(credential: &str, endpoint: &str) -> StorageEntry {
    StorageEntry {
        service: ServiceConfig {
            credential: credential.to_string(),
            endpoint: endpoint.to_string(),
            timeout: None,
        },
        storage: StorageConfig::new("photos"),
    }
}

#[test]
fn test_construction_rejects_non_hmac_credentials() {
    for credential in ["apikey:abc", "basic:u:p", "file:/tmp/key", "env", "base64:Zm9v"] {
        let err = us3_adapter::new_storager(&entry(credential, "https:cn-bj.ufileos.com"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::PairUnsupported, "{}", credential);
        assert!(!err.to_string().contains("/tmp/key"));
    }
}

#[test]
fn test_construction_rejects_non_http_endpoints() {
    for endpoint in ["tcp:127.0.0.1:9000", "file:/var/data"] {
        let err = us3_adapter::new(&entry("hmac:ak:sk", endpoint)).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::PairUnsupported, "{}", endpoint);
        assert!(matches!(err, Error::Init { ty: "us3", .. }));
    }
}

#[test]
fn test_construction_succeeds_without_network() {
    let (service, storage) = us3_adapter::new(&entry("hmac:ak:sk", "http:127.0.0.1:1")).unwrap();
    assert_eq!(service.to_string(), "Servicer us3");
    assert_eq!(storage.to_string(), "Storager us3 {Name: photos, WorkDir: /}");
}
