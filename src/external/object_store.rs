// ABOUTME: Blob storage seam for uploaded event images and other assets
// ABOUTME: Filesystem store with content-type sidecars and an in-memory store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{AppError, AppResult};

/// Sidecar suffix holding an object's content type
const CONTENT_TYPE_SUFFIX: &str = ".content-type";
/// Content type used when none was recorded
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An object and its content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object bytes
    pub bytes: Vec<u8>,
    /// MIME type given at upload
    pub content_type: String,
}

/// Bucket/key blob storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `bucket/key` and return its locator
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String>;

    /// Fetch an object; a missing key is `ResourceNotFound`
    async fn get_object(&self, bucket: &str, key: &str) -> AppResult<StoredObject>;

    /// Delete an object; deleting a missing key succeeds
    async fn delete_object(&self, bucket: &str, key: &str) -> AppResult<()>;
}

fn locator(bucket: &str, key: &str) -> String {
    format!("object://{bucket}/{key}")
}

/// Reject keys that could escape the bucket directory
fn validate_key(bucket: &str, key: &str) -> AppResult<()> {
    let bucket_ok = !bucket.is_empty() && !bucket.contains(['/', '\\']) && bucket != "..";
    let key_ok = !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && !key.ends_with(CONTENT_TYPE_SUFFIX)
        && key.split('/').all(|part| !part.is_empty() && part != "." && part != "..");
    if bucket_ok && key_ok {
        Ok(())
    } else {
        Err(AppError::invalid_input(format!(
            "Invalid object location {bucket}/{key}"
        )))
    }
}

/// Objects stored as files under `<root>/<bucket>/<key>`
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> AppResult<PathBuf> {
        validate_key(bucket, key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(sidecar)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(format!("Cannot create {}: {e}", parent.display())))?;
        }
        let size = bytes.len();
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::storage(format!("Cannot write {bucket}/{key}: {e}")))?;
        tokio::fs::write(Self::sidecar_path(&path), content_type)
            .await
            .map_err(|e| AppError::storage(format!("Cannot write {bucket}/{key}: {e}")))?;
        debug!(bucket, key, size, "Object stored");
        Ok(locator(bucket, key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> AppResult<StoredObject> {
        let path = self.object_path(bucket, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::not_found(format!("Object {bucket}/{key}")));
            }
            Err(e) => {
                return Err(AppError::storage(format!("Cannot read {bucket}/{key}: {e}")));
            }
        };
        let content_type = tokio::fs::read_to_string(Self::sidecar_path(&path))
            .await
            .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_owned());
        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> AppResult<()> {
        let path = self.object_path(bucket, key)?;
        for target in [Self::sidecar_path(&path), path] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(AppError::storage(format!(
                        "Cannot delete {bucket}/{key}: {e}"
                    )));
                }
            }
        }
        debug!(bucket, key, "Object deleted");
        Ok(())
    }
}

/// Process-local store for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Whether `bucket/key` exists
    pub async fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .await
            .contains_key(&(bucket.to_owned(), key.to_owned()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<String> {
        validate_key(bucket, key)?;
        self.objects.write().await.insert(
            (bucket.to_owned(), key.to_owned()),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
            },
        );
        Ok(locator(bucket, key))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> AppResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Object {bucket}/{key}")))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> AppResult<()> {
        self.objects
            .write()
            .await
            .remove(&(bucket.to_owned(), key.to_owned()));
        Ok(())
    }
}
