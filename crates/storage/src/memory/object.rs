//! In-memory object store
//!
//! Follows the multipart contract of the real service closely enough to
//! catch mistakes: completion must list every uploaded part, numbered
//! contiguously from 1, each with the tag its upload returned.

use crate::memory::faults::FaultScript;
use crate::traits::{CompletedPart, ObjectHead, ObjectMetadata, ObjectStore};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use qsbackup_core::RemoteError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    etag: String,
    metadata: ObjectMetadata,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    metadata: ObjectMetadata,
    parts: BTreeMap<u32, (Bytes, String)>,
}

fn etag_of(body: &[u8]) -> String {
    format!("\"{:016x}\"", xxh3_64(body))
}

/// Object store backed by process memory
///
/// Fault keys are object keys, except `access_faults` which is keyed by
/// bucket name.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: DashSet<String>,
    objects: DashMap<(String, String), StoredObject>,
    uploads: DashMap<String, PendingUpload>,
    next_upload: AtomicU64,
    aborted: Mutex<Vec<String>>,
    tampered: Mutex<Vec<(String, u32)>>,
    put_calls: AtomicUsize,
    part_calls: AtomicUsize,
    completed: AtomicUsize,
    /// Faults for `put_object`
    pub put_faults: FaultScript,
    /// Faults for `upload_part`
    pub part_faults: FaultScript,
    /// Faults for `complete_multipart`
    pub complete_faults: FaultScript,
    /// Faults for `head_object`
    pub head_faults: FaultScript,
    /// Faults for `check_access`
    pub access_faults: FaultScript,
}

impl MemoryObjectStore {
    /// Create a store with no buckets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with one bucket
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.create_bucket(bucket);
        store
    }

    /// Create a bucket
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.insert(bucket.to_string());
    }

    /// Report a wrong size for the next `times` heads of keys starting with `prefix`
    pub fn tamper_heads(&self, prefix: &str, times: u32) {
        self.tampered.lock().push((prefix.to_string(), times));
    }

    /// Stored body of an object
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    /// Stored metadata of an object
    pub fn metadata(&self, bucket: &str, key: &str) -> Option<ObjectMetadata> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.metadata.clone())
    }

    /// Sorted keys in a bucket
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|e| e.key().0 == bucket)
            .map(|e| e.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Keys of aborted multipart uploads, in abort order
    pub fn aborted_uploads(&self) -> Vec<String> {
        self.aborted.lock().clone()
    }

    /// Multipart uploads neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.uploads.len()
    }

    /// Number of `put_object` calls
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of `upload_part` calls
    pub fn part_calls(&self) -> usize {
        self.part_calls.load(Ordering::SeqCst)
    }

    /// Number of completed multipart uploads
    pub fn completed_multiparts(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn require_bucket(&self, bucket: &str) -> Result<(), RemoteError> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(RemoteError::new("NoSuchBucket", format!("bucket {} does not exist", bucket)))
        }
    }

    fn take_tamper(&self, key: &str) -> bool {
        let mut tampered = self.tampered.lock();
        for (prefix, remaining) in tampered.iter_mut() {
            if *remaining > 0 && key.starts_with(prefix.as_str()) {
                *remaining -= 1;
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<String, RemoteError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.require_bucket(bucket)?;
        self.put_faults.check(key)?;
        let etag = etag_of(&body);
        self.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                etag: etag.clone(),
                metadata: metadata.clone(),
            },
        );
        Ok(etag)
    }

    async fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String, RemoteError> {
        self.require_bucket(bucket)?;
        let upload_id = format!("upload-{}", self.next_upload.fetch_add(1, Ordering::SeqCst) + 1);
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> Result<String, RemoteError> {
        self.part_calls.fetch_add(1, Ordering::SeqCst);
        self.part_faults.check(key)?;
        let mut upload = self
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| RemoteError::new("NoSuchUpload", format!("no upload {}", upload_id)))?;
        if part_number == 0 || u64::from(part_number) > qsbackup_core::config::MAX_UPLOAD_PARTS {
            return Err(RemoteError::new("InvalidArgument", format!("part number {} out of range", part_number)));
        }
        let etag = etag_of(&body);
        upload.parts.insert(part_number, (body, etag.clone()));
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        _bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, RemoteError> {
        self.complete_faults.check(key)?;
        let (_, upload) = self
            .uploads
            .remove(upload_id)
            .ok_or_else(|| RemoteError::new("NoSuchUpload", format!("no upload {}", upload_id)))?;

        let listed_ok = parts.len() == upload.parts.len()
            && parts.iter().enumerate().all(|(i, p)| {
                p.part_number as usize == i + 1
                    && upload
                        .parts
                        .get(&p.part_number)
                        .map_or(false, |(_, etag)| *etag == p.etag)
            });
        if parts.is_empty() || !listed_ok {
            // Keep the upload open so the caller can still abort it.
            self.uploads.insert(upload_id.to_string(), upload);
            return Err(RemoteError::new(
                "InvalidPart",
                "completion must list every uploaded part in order",
            ));
        }

        let mut body = BytesMut::new();
        for (chunk, _) in upload.parts.values() {
            body.extend_from_slice(chunk);
        }
        let body = body.freeze();
        let etag = format!("\"{:016x}-{}\"", xxh3_64(&body), upload.parts.len());
        self.objects.insert(
            (upload.bucket.clone(), upload.key.clone()),
            StoredObject {
                body,
                etag: etag.clone(),
                metadata: upload.metadata,
            },
        );
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(etag)
    }

    async fn abort_multipart(&self, _bucket: &str, key: &str, upload_id: &str) -> Result<(), RemoteError> {
        self.uploads
            .remove(upload_id)
            .ok_or_else(|| RemoteError::new("NoSuchUpload", format!("no upload {}", upload_id)))?;
        self.aborted.lock().push(key.to_string());
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, RemoteError> {
        self.head_faults.check(key)?;
        let object = self
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.clone())
            .ok_or_else(|| RemoteError::new("NoSuchKey", format!("no object {}", key)))?;
        let mut size = object.body.len() as u64;
        if self.take_tamper(key) {
            size += 1;
        }
        Ok(ObjectHead {
            size,
            etag: object.etag,
            metadata: object.metadata,
        })
    }

    async fn check_access(&self, bucket: &str) -> Result<(), RemoteError> {
        self.access_faults.check(bucket)?;
        self.require_bucket(bucket)
    }
}
