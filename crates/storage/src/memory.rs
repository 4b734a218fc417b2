use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{expiry, BlobError, BlobGateway, BlobKind, SignedUrl};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

/// In-process [`BlobGateway`] for tests.
///
/// [`set_unavailable`](Self::set_unavailable) makes every call fail with
/// [`BlobError::Unavailable`], to exercise retry paths.
#[derive(Default)]
pub struct MemoryBlobGateway {
    objects: Mutex<HashMap<(BlobKind, String), StoredObject>>,
    unavailable: AtomicBool,
}

impl MemoryBlobGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, kind: BlobKind, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(&(kind, key.to_string())).cloned()
    }

    pub fn remove(&self, kind: BlobKind, key: &str) -> Option<StoredObject> {
        self.objects.lock().remove(&(kind, key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), BlobError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BlobError::Unavailable("memory gateway offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobGateway for MemoryBlobGateway {
    async fn put(
        &self,
        kind: BlobKind,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError> {
        self.check_available()?;
        self.objects.lock().insert(
            (kind, key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, kind: BlobKind, key: &str) -> Result<Bytes, BlobError> {
        self.check_available()?;
        self.object(kind, key)
            .map(|o| o.bytes)
            .ok_or_else(|| BlobError::NotFound {
                kind,
                key: key.to_string(),
            })
    }

    async fn sign(
        &self,
        kind: BlobKind,
        key: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, BlobError> {
        self.check_available()?;
        let expires_at = expiry(ttl);
        let bucket = match kind {
            BlobKind::Upload => "uploads",
            BlobKind::Converted => "converted",
        };
        Ok(SignedUrl {
            url: format!(
                "memory://{bucket}/{key}?expires={}",
                expires_at.timestamp()
            ),
            expires_at,
        })
    }

    async fn ensure_buckets(&self) -> Result<(), BlobError> {
        self.check_available()
    }
}
