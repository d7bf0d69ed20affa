//! Archive publisher
//!
//! Uploads one bundle archive to object storage and proves it landed:
//!
//! 1. Archives up to the multipart threshold go up in a single put; larger
//!    ones are split into parts uploaded concurrently, and completion lists
//!    every part `1..=N`. A failed multipart attempt aborts its upload id.
//! 2. The stored object's size and checksum metadata are read back and
//!    compared with the local archive. A mismatch is a verification failure,
//!    never a silent success.
//!
//! Transient upload failures and verification failures are retried within
//! the attempt budget; anything else fails the bundle at once.

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use qsbackup_concurrency::{check, sleep_or_cancel, with_timeout, CancellationToken, RetryPolicy};
use qsbackup_core::config::{UploadConfig, MAX_UPLOAD_PARTS};
use qsbackup_core::{ErrorKind, RemoteError};
use qsbackup_storage::{CompletedPart, ObjectMetadata, ObjectStore};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Metadata key holding the archive checksum
pub const CHECKSUM_METADATA_KEY: &str = "xxh3";

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveUploadResult {
    /// Object key
    pub s3_key: String,
    /// Archive size in bytes
    pub byte_size: u64,
    /// Hex xxh3 of the archive
    pub etag_or_checksum: String,
    /// Whether the stored object matched the local archive
    pub verified: bool,
    /// Whether the multipart path was used
    pub multipart: bool,
    /// Parts uploaded (1 for a single put)
    pub part_count: u32,
}

/// Why a publish produced no verified object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Every attempt failed
    Failed {
        /// `UPLOAD_FAILED` or `VERIFICATION_FAILED`
        kind: ErrorKind,
        /// Cause from the last attempt
        message: String,
        /// Attempts made
        attempts: u32,
    },
    /// Cancelled between attempts
    Cancelled,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Failed {
                kind,
                message,
                attempts,
            } => write!(f, "{} after {} attempt(s): {}", kind, attempts, message),
            PublishError::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Hex xxh3 checksum of an archive
pub fn checksum(body: &[u8]) -> String {
    format!("{:016x}", xxh3_64(body))
}

struct AttemptFailure {
    kind: ErrorKind,
    retryable: bool,
    message: String,
}

impl AttemptFailure {
    fn upload(error: RemoteError) -> Self {
        AttemptFailure {
            kind: ErrorKind::UploadFailed,
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }

    fn verification(message: String) -> Self {
        AttemptFailure {
            kind: ErrorKind::VerificationFailed,
            retryable: true,
            message,
        }
    }
}

/// Publishes archives into one bucket
pub struct ArchivePublisher<'a> {
    store: &'a dyn ObjectStore,
    bucket: &'a str,
    upload: &'a UploadConfig,
    policy: &'a RetryPolicy,
    call_timeout: Duration,
    token: &'a CancellationToken,
}

impl<'a> ArchivePublisher<'a> {
    /// Create a publisher
    pub fn new(
        store: &'a dyn ObjectStore,
        bucket: &'a str,
        upload: &'a UploadConfig,
        policy: &'a RetryPolicy,
        call_timeout: Duration,
        token: &'a CancellationToken,
    ) -> Self {
        ArchivePublisher {
            store,
            bucket,
            upload,
            policy,
            call_timeout,
            token,
        }
    }

    /// Upload `body` to `key` and verify it
    ///
    /// The archive checksum is added to `metadata` under
    /// [`CHECKSUM_METADATA_KEY`].
    pub async fn publish(
        &self,
        key: &str,
        body: Bytes,
        mut metadata: ObjectMetadata,
    ) -> Result<ArchiveUploadResult, PublishError> {
        let sum = checksum(&body);
        let size = body.len() as u64;
        metadata.insert(CHECKSUM_METADATA_KEY.to_string(), sum.clone());
        let multipart = size > self.upload.multipart_threshold;
        let part_size = self.effective_part_size(size);

        let mut attempt = 1;
        loop {
            // In-flight attempts run to completion or abort; cancellation
            // only stops new ones from starting.
            if check(self.token).is_err() {
                return Err(PublishError::Cancelled);
            }

            let uploaded = if multipart {
                self.put_multipart(key, &body, part_size, &metadata).await
            } else {
                self.put_single(key, &body, &metadata).await
            };

            let failure = match uploaded {
                Ok(part_count) => match self.verify(key, size, &sum).await {
                    Ok(()) => {
                        info!(key, bytes = size, multipart, part_count, attempt, "archive published");
                        return Ok(ArchiveUploadResult {
                            s3_key: key.to_string(),
                            byte_size: size,
                            etag_or_checksum: sum,
                            verified: true,
                            multipart,
                            part_count,
                        });
                    }
                    Err(f) => f,
                },
                Err(f) => f,
            };

            if !failure.retryable || !self.policy.allows_another(attempt) {
                warn!(key, attempt, kind = %failure.kind, error = %failure.message, "archive publish failed");
                return Err(PublishError::Failed {
                    kind: failure.kind,
                    message: failure.message,
                    attempts: attempt,
                });
            }

            let delay = self.policy.delay(attempt);
            warn!(
                key,
                attempt,
                kind = %failure.kind,
                delay_ms = delay.as_millis() as u64,
                "publish attempt failed, retrying"
            );
            if sleep_or_cancel(delay, self.token).await.is_err() {
                return Err(PublishError::Cancelled);
            }
            attempt += 1;
        }
    }

    /// Part size grown if needed to stay within the part limit
    fn effective_part_size(&self, size: u64) -> u64 {
        let min_for_limit = (size + MAX_UPLOAD_PARTS - 1) / MAX_UPLOAD_PARTS;
        self.upload.part_size.max(min_for_limit).max(1)
    }

    async fn put_single(
        &self,
        key: &str,
        body: &Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<u32, AttemptFailure> {
        with_timeout(
            self.call_timeout,
            "put_object",
            self.store.put_object(self.bucket, key, body.clone(), metadata),
        )
        .await
        .map(|_| 1)
        .map_err(AttemptFailure::upload)
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: &Bytes,
        part_size: u64,
        metadata: &ObjectMetadata,
    ) -> Result<u32, AttemptFailure> {
        let upload_id = with_timeout(
            self.call_timeout,
            "create_multipart",
            self.store.create_multipart(self.bucket, key, metadata),
        )
        .await
        .map_err(AttemptFailure::upload)?;

        match self.upload_parts(key, &upload_id, body, part_size).await {
            Ok(count) => Ok(count),
            Err(error) => {
                if let Err(abort_err) = with_timeout(
                    self.call_timeout,
                    "abort_multipart",
                    self.store.abort_multipart(self.bucket, key, &upload_id),
                )
                .await
                {
                    warn!(key, upload_id = %upload_id, error = %abort_err, "could not abort multipart upload");
                }
                Err(AttemptFailure::upload(error))
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: &Bytes,
        part_size: u64,
    ) -> Result<u32, RemoteError> {
        let len = body.len() as u64;
        let ranges: Vec<(u32, Bytes)> = (0..)
            .map(|i: u64| i * part_size)
            .take_while(|start| *start < len)
            .enumerate()
            .map(|(i, start)| {
                let end = (start + part_size).min(len);
                ((i + 1) as u32, body.slice(start as usize..end as usize))
            })
            .collect();
        let expected = ranges.len() as u32;

        // The first failed part ends the attempt; parts still queued are not sent
        let mut parts: Vec<CompletedPart> = stream::iter(ranges)
            .map(|(part_number, chunk)| async move {
                let etag = with_timeout(
                    self.call_timeout,
                    "upload_part",
                    self.store
                        .upload_part(self.bucket, key, upload_id, part_number, chunk),
                )
                .await?;
                debug!(key, part_number, "part uploaded");
                Ok::<_, RemoteError>(CompletedPart { part_number, etag })
            })
            .buffer_unordered(self.upload.part_concurrency.max(1))
            .try_collect()
            .await?;
        parts.sort_by_key(|p| p.part_number);
        let complete = parts
            .iter()
            .enumerate()
            .all(|(i, p)| p.part_number == i as u32 + 1)
            && parts.len() as u32 == expected;
        if !complete {
            return Err(RemoteError::new(
                "InvalidPart",
                format!("{} of {} parts uploaded", parts.len(), expected),
            ));
        }

        with_timeout(
            self.call_timeout,
            "complete_multipart",
            self.store.complete_multipart(self.bucket, key, upload_id, &parts),
        )
        .await?;
        Ok(expected)
    }

    async fn verify(&self, key: &str, size: u64, sum: &str) -> Result<(), AttemptFailure> {
        let head = with_timeout(
            self.call_timeout,
            "head_object",
            self.store.head_object(self.bucket, key),
        )
        .await
        .map_err(|e| AttemptFailure::verification(format!("could not read back {}: {}", key, e)))?;

        if head.size != size {
            return Err(AttemptFailure::verification(format!(
                "stored size {} does not match archive size {}",
                head.size, size
            )));
        }
        match head.metadata.get(CHECKSUM_METADATA_KEY) {
            Some(stored) if stored == sum => Ok(()),
            Some(stored) => Err(AttemptFailure::verification(format!(
                "stored checksum {} does not match archive checksum {}",
                stored, sum
            ))),
            None => Err(AttemptFailure::verification(format!(
                "stored object has no {} metadata",
                CHECKSUM_METADATA_KEY
            ))),
        }
    }
}
