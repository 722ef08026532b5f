//! Backend-neutral object model and per-operation options

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Object mode bit flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectMode(u8);

impl ObjectMode {
    /// A readable file
    pub const READ: ObjectMode = ObjectMode(1 << 0);
    /// A (virtual) directory marker
    pub const DIR: ObjectMode = ObjectMode(1 << 1);

    pub const fn empty() -> Self {
        ObjectMode(0)
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: ObjectMode) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn is_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn is_dir(&self) -> bool {
        self.contains(Self::DIR)
    }
}

impl BitOr for ObjectMode {
    type Output = ObjectMode;

    fn bitor(self, rhs: Self) -> Self::Output {
        ObjectMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for ObjectMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ObjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_dir() {
            names.push("dir");
        }
        if self.is_read() {
            names.push("read");
        }
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Debug for ObjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectMode({})", self)
    }
}

/// Listing strategy requested by the caller.
///
/// `Part` and `Block` belong to the generic storage vocabulary (multipart
/// uploads and block blobs); this backend only lists by prefix or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    Prefix,
    Dir,
    Part,
    Block,
}

impl ListMode {
    pub fn is_prefix(&self) -> bool {
        matches!(self, ListMode::Prefix)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, ListMode::Dir)
    }
}

impl fmt::Display for ListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListMode::Prefix => "prefix",
            ListMode::Dir => "dir",
            ListMode::Part => "part",
            ListMode::Block => "block",
        };
        f.write_str(name)
    }
}

/// Backend specific metadata attached to every formatted object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSystemMetadata {
    /// US3 storage class (`STANDARD`, `IA`, `ARCHIVE`)
    pub storage_class: Option<String>,
}

/// One storage entry as seen by callers.
///
/// `id` is the absolute backend key, `path` the key relative to the
/// storage's working directory. Optional attributes stay `None` unless the
/// backend supplied them.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub id: String,
    pub path: String,
    pub mode: ObjectMode,
    /// All metadata is known and no further stat is needed
    pub done: bool,
    pub content_length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub system_metadata: Option<ObjectSystemMetadata>,
}

impl Object {
    pub fn new(done: bool) -> Self {
        Self {
            id: String::new(),
            path: String::new(),
            mode: ObjectMode::empty(),
            done,
            content_length: None,
            last_modified: None,
            content_type: None,
            etag: None,
            system_metadata: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode.is_dir()
    }

    pub fn storage_class(&self) -> Option<&str> {
        self.system_metadata
            .as_ref()
            .and_then(|sm| sm.storage_class.as_deref())
    }
}

/// Storage level metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageMeta {
    pub name: String,
    pub work_dir: String,
}

/// Optional capabilities enabled per storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct StorageFeatures {
    /// Emulate directories with `/`-suffixed keys
    #[serde(default)]
    pub virtual_dir: bool,
}

/// Callback invoked with every chunk of data flowing through read or write
#[derive(Clone)]
pub struct IoCallback(Arc<dyn Fn(&[u8]) + Send + Sync>);

impl IoCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, bytes: &[u8]) {
        (self.0)(bytes)
    }
}

impl fmt::Debug for IoCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IoCallback")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub object_mode: Option<ObjectMode>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub object_mode: Option<ObjectMode>,
}

#[derive(Debug, Clone, Default)]
pub struct StatOptions {
    pub object_mode: Option<ObjectMode>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub list_mode: Option<ListMode>,
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub io_callback: Option<IoCallback>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub io_callback: Option<IoCallback>,
}

/// Values applied when a call leaves the matching option unset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultStorageOptions {
    #[serde(default)]
    pub list_mode: Option<ListMode>,

    #[serde(skip)]
    pub io_callback: Option<IoCallback>,
}

/// A construction or call option, kept for error diagnostics
#[derive(Clone, PartialEq)]
pub enum Pair {
    Credential(String),
    Endpoint(String),
    Name(String),
    WorkDir(String),
    ObjectMode(ObjectMode),
    ListMode(ListMode),
    StorageFeatures(StorageFeatures),
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Only the protocol is shown, secrets never leave the process in errors
            Pair::Credential(value) => {
                let protocol = value.split(':').next().unwrap_or_default();
                write!(f, "credential: {}:***", protocol)
            }
            Pair::Endpoint(value) => write!(f, "endpoint: {}", value),
            Pair::Name(value) => write!(f, "name: {}", value),
            Pair::WorkDir(value) => write!(f, "work_dir: {}", value),
            Pair::ObjectMode(mode) => write!(f, "object_mode: {}", mode),
            Pair::ListMode(mode) => write!(f, "list_mode: {}", mode),
            Pair::StorageFeatures(features) => {
                write!(f, "storage_features: {{virtual_dir: {}}}", features.virtual_dir)
            }
        }
    }
}

impl fmt::Debug for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
