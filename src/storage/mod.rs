//! US3 service and storage
//!
//! A [`Service`] holds the signed HTTP transport for one credential and
//! endpoint. Each bucket is exposed as a [`Storage`] whose operations map
//! onto single file API calls, except `list` which pages lazily through an
//! [`ObjectIterator`].

pub mod format;
pub mod iterator;
pub mod path;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

use crate::client::auth::Signer;
use crate::client::{ByteStream, HttpClient, UFileClient};
use crate::config::{ServiceConfig, StorageConfig, StorageEntry};
use crate::credential::Credential;
use crate::endpoint::Endpoint;
use crate::error::{BackendError, Error, Result, NO_SUCH_KEY};
use crate::types::{
    CreateOptions, DefaultStorageOptions, DeleteOptions, IoCallback, ListMode, ListOptions,
    Object, ObjectMode, Pair, ReadOptions, StatOptions, StorageFeatures, StorageMeta,
    WriteOptions,
};

use self::format::apply_stat_headers;
use self::iterator::Listing;
use self::path::PathResolver;

pub use self::iterator::{ObjectIterator, ObjectPageStatus, ObjectStream, MAX_KEYS};

/// Service type name
pub const TYPE: &str = "us3";

/// Lifetime of the signed URL used by `read`
pub const READ_URL_EXPIRY: Duration = Duration::from_secs(3600);

/// Entry point for one credential and endpoint
pub struct Service {
    http: reqwest::Client,
    signer: Signer,
    file_host: String,
}

impl Service {
    /// Build a service without network I/O. Only HMAC credentials and
    /// HTTP(S) endpoints are accepted.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let credential = Credential::parse(&config.credential)?;
        let (access_key, secret_key) = credential
            .hmac()
            .ok_or_else(|| Error::PairUnsupported(Pair::Credential(config.credential.clone())))?;

        let endpoint = Endpoint::parse(&config.endpoint)?;
        let file_host = endpoint
            .url()
            .ok_or_else(|| Error::PairUnsupported(Pair::Endpoint(config.endpoint.clone())))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(BackendError::from)?;

        debug!("us3 service created: file_host={}", file_host);

        Ok(Self {
            http,
            signer: Signer::new(access_key, secret_key),
            file_host,
        })
    }

    /// Storage for the bucket named in `config`, sharing this service's transport
    pub fn storage(&self, config: &StorageConfig) -> Storage {
        let client = HttpClient::new(
            self.http.clone(),
            self.signer.clone(),
            &self.file_host,
            &config.name,
        );
        Storage::new(Arc::new(client), config.clone())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Servicer {}", TYPE)
    }
}

/// Build a service and the storage described by `entry`
pub fn new(entry: &StorageEntry) -> Result<(Service, Storage)> {
    let service = new_servicer(&entry.service)?;
    let storage = service.storage(&entry.storage);
    Ok((service, storage))
}

pub fn new_servicer(config: &ServiceConfig) -> Result<Service> {
    Service::new(config).map_err(|err| init_error("new_servicer", config.pairs(), err))
}

pub fn new_storager(entry: &StorageEntry) -> Result<Storage> {
    Service::new(&entry.service)
        .map(|service| service.storage(&entry.storage))
        .map_err(|err| init_error("new_storager", entry.pairs(), err))
}

fn init_error(op: &'static str, pairs: Vec<Pair>, err: Error) -> Error {
    Error::Init {
        op,
        ty: TYPE,
        pairs,
        source: Box::new(err),
    }
}

/// One bucket, rooted at a working directory
pub struct Storage {
    client: Arc<dyn UFileClient>,
    bucket: String,
    work_dir: String,
    resolver: PathResolver,
    features: StorageFeatures,
    defaults: DefaultStorageOptions,
}

impl Storage {
    /// Storage over an arbitrary client
    pub fn new(client: Arc<dyn UFileClient>, config: StorageConfig) -> Self {
        let work_dir = config.work_dir.unwrap_or_else(|| "/".to_string());
        Self {
            client,
            bucket: config.name,
            resolver: PathResolver::new(&work_dir),
            work_dir,
            features: config.features,
            defaults: config.defaults,
        }
    }

    pub fn features(&self) -> StorageFeatures {
        self.features
    }

    pub fn metadata(&self) -> StorageMeta {
        StorageMeta {
            name: self.bucket.clone(),
            work_dir: self.work_dir.clone(),
        }
    }

    /// Describe an object at `path` without touching the backend.
    ///
    /// Returns `None` for a directory when virtual directories are disabled.
    pub fn create(&self, path: &str, opts: &CreateOptions) -> Option<Object> {
        let mut rp = self.resolver.to_absolute(path);

        let mut o = if is_dir(opts.object_mode) {
            if !self.features.virtual_dir {
                return None;
            }
            rp.push('/');
            let mut o = Object::new(true);
            o.mode |= ObjectMode::DIR;
            o
        } else {
            let mut o = Object::new(false);
            o.mode |= ObjectMode::READ;
            o
        };

        o.id = rp;
        o.path = path.to_string();
        Some(o)
    }

    /// Delete the object at `path`; deleting a missing object succeeds
    pub async fn delete(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        self.delete_object(path, opts)
            .await
            .map_err(|err| self.storage_error("delete", err, path))
    }

    async fn delete_object(&self, path: &str, opts: &DeleteOptions) -> Result<()> {
        let rp = self.dir_aware_key(path, opts.object_mode)?;

        match self.client.delete_file(&rp).await {
            Ok(()) => Ok(()),
            // The file API answers a repeated delete with NoSuchKey
            Err(err) if err.code() == Some(NO_SUCH_KEY) => {
                debug!("delete: key {} already absent", rp);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// List objects under `path`; nothing is fetched until the iterator advances
    pub fn list(&self, path: &str, opts: &ListOptions) -> Result<ObjectIterator> {
        let mode = opts
            .list_mode
            .or(self.defaults.list_mode)
            .unwrap_or(ListMode::Prefix);

        let listing = match mode {
            ListMode::Dir => Listing::Dir,
            ListMode::Prefix => Listing::Prefix,
            other => {
                return Err(self.storage_error("list", Error::ListModeInvalid(other), path))
            }
        };

        Ok(ObjectIterator::new(
            self.client.clone(),
            self.resolver.clone(),
            listing,
            self.to_string(),
            path,
        ))
    }

    /// Copy the object at `path` into `w`, returning the bytes copied
    pub async fn read<W>(&self, path: &str, w: &mut W, opts: &ReadOptions) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let callback = opts
            .io_callback
            .clone()
            .or_else(|| self.defaults.io_callback.clone());

        self.read_object(path, w, callback)
            .await
            .map_err(|err| self.storage_error("read", err, path))
    }

    async fn read_object<W>(&self, path: &str, w: &mut W, callback: Option<IoCallback>) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let rp = self.resolver.to_absolute(path);
        let url = self.client.private_url(&rp, READ_URL_EXPIRY);
        trace!("read: key={}", rp);

        let mut body = self.client.download(&url).await?;
        let mut copied = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if let Some(callback) = &callback {
                callback.call(&chunk);
            }
            w.write_all(&chunk).await?;
            copied += chunk.len() as u64;
        }
        w.flush().await?;

        debug!("read: key={} bytes={}", rp, copied);
        Ok(copied)
    }

    /// Fetch the attributes of the object at `path`
    pub async fn stat(&self, path: &str, opts: &StatOptions) -> Result<Object> {
        self.stat_object(path, opts)
            .await
            .map_err(|err| self.storage_error("stat", err, path))
    }

    async fn stat_object(&self, path: &str, opts: &StatOptions) -> Result<Object> {
        let rp = self.dir_aware_key(path, opts.object_mode)?;
        let headers = self.client.head_file(&rp).await?;

        let mut o = Object::new(true);
        o.id = rp;
        o.path = path.to_string();
        o.mode |= if is_dir(opts.object_mode) {
            ObjectMode::DIR
        } else {
            ObjectMode::READ
        };

        apply_stat_headers(&mut o, &headers)?;
        Ok(o)
    }

    /// Upload the first `size` bytes of `r` to `path`, returning `size`
    pub async fn write<R>(&self, path: &str, r: R, size: u64, opts: &WriteOptions) -> Result<u64>
    where
        R: AsyncRead + Send + 'static,
    {
        let callback = opts
            .io_callback
            .clone()
            .or_else(|| self.defaults.io_callback.clone());

        self.write_object(path, r, size, callback)
            .await
            .map_err(|err| self.storage_error("write", err, path))
    }

    async fn write_object<R>(
        &self,
        path: &str,
        r: R,
        size: u64,
        callback: Option<IoCallback>,
    ) -> Result<u64>
    where
        R: AsyncRead + Send + 'static,
    {
        let rp = self.resolver.to_absolute(path);

        let body: ByteStream = Box::pin(ReaderStream::new(r.take(size)).map(
            move |chunk| -> std::result::Result<Bytes, BackendError> {
                let chunk = chunk?;
                if let Some(callback) = &callback {
                    callback.call(&chunk);
                }
                Ok(chunk)
            },
        ));

        self.client.put_file(&rp, body, size).await?;

        debug!("write: key={} size={}", rp, size);
        Ok(size)
    }

    /// Absolute key for `path`, with a trailing `/` for directories
    fn dir_aware_key(&self, path: &str, mode: Option<ObjectMode>) -> Result<String> {
        let mut rp = self.resolver.to_absolute(path);
        if let Some(mode) = mode.filter(|m| m.is_dir()) {
            if !self.features.virtual_dir {
                return Err(Error::PairUnsupported(Pair::ObjectMode(mode)));
            }
            rp.push('/');
        }
        Ok(rp)
    }

    fn storage_error(&self, op: &'static str, err: Error, path: &str) -> Error {
        Error::Storage {
            op,
            storager: self.to_string(),
            path: vec![path.to_string()],
            source: Box::new(err),
        }
    }
}

fn is_dir(mode: Option<ObjectMode>) -> bool {
    mode.map_or(false, |m| m.is_dir())
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Storager {} {{Name: {}, WorkDir: {}}}",
            TYPE, self.bucket, self.work_dir
        )
    }
}
