//! us3-adapter: backend-neutral object storage operations over UCloud US3
//!
//! This library maps generic storage operations (create, read, write, stat,
//! delete, list) onto the US3 file API and maps its results and errors back
//! into a portable vocabulary.
//!
//! # Architecture
//!
//! - **Client**: the `UFileClient` trait covering the file API calls, with a
//!   signed `reqwest` implementation and an in-memory one for tests.
//! - **Storage**: one bucket rooted at a working directory. Paths are
//!   resolved to keys by plain prefixing.
//! - **Listing**: a lazy, marker-driven iterator that issues one list call per
//!   page, in prefix (recursive) or directory (one level) mode.
//! - **Errors**: US3 ret codes are normalized into permission-denied,
//!   object-not-exist or unexpected, keeping the backend error as the source.
//!
//! # Example
//!
//! ```no_run
//! use us3_adapter::config::Config;
//! use us3_adapter::types::ListOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"us3.yaml".into())?;
//! let entry = config.storage("photos").ok_or("unknown storage")?;
//!
//! let (_service, storage) = us3_adapter::storage::new(entry)?;
//! let mut it = storage.list("2024/", &ListOptions::default())?;
//! while let Some(object) = it.next().await? {
//!     println!("{}", object.path);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod env;
pub mod error;
pub mod storage;
pub mod types;

pub use error::{format_error, Error, ErrorKind, Result};
pub use storage::{new, new_servicer, new_storager, ObjectIterator, Service, Storage};
