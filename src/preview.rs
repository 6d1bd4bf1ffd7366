use crate::document::UploadedFile;
use crate::error::PreviewError;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// What a live preview URL resolves to
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub name: String,
    pub mime: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Default)]
struct StoreInner {
    entries: Mutex<HashMap<String, PreviewEntry>>,
    next_id: AtomicU64,
}

/// In-process registry of display handles for uploaded PDFs.
///
/// A handle's URL stays resolvable exactly as long as its `PreviewHandle` is alive.
#[derive(Clone)]
pub struct PreviewStore {
    inner: Arc<StoreInner>,
    max_bytes: Option<usize>,
}

impl PreviewStore {
    pub fn new(max_bytes: Option<usize>) -> Self {
        PreviewStore {
            inner: Arc::new(StoreInner::default()),
            max_bytes,
        }
    }

    pub fn create(&self, file: &UploadedFile) -> Result<PreviewHandle, PreviewError> {
        if let Some(limit) = self.max_bytes {
            if file.len() > limit {
                return Err(PreviewError::TooLarge { size: file.len(), limit });
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let url = format!("blob:lexprime/{}", id);
        self.inner.entries.lock().insert(
            url.clone(),
            PreviewEntry {
                name: file.name().to_string(),
                mime: file.mime().to_string(),
                bytes: file.shared_bytes(),
            },
        );
        debug!("Created preview handle {} for {}", url, file.name());

        Ok(PreviewHandle {
            url,
            store: Arc::downgrade(&self.inner),
        })
    }

    pub fn resolve(&self, url: &str) -> Option<PreviewEntry> {
        self.inner.entries.lock().get(url).cloned()
    }

    /// Number of handles currently alive
    pub fn live_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

impl Default for PreviewStore {
    fn default() -> Self {
        Self::new(None)
    }
}

/// A live display handle; revoked when dropped
pub struct PreviewHandle {
    url: String,
    store: Weak<StoreInner>,
}

impl PreviewHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewHandle").field("url", &self.url).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        match self.store.upgrade() {
            Some(inner) => {
                if inner.entries.lock().remove(&self.url).is_some() {
                    debug!("Revoked preview handle {}", self.url);
                } else {
                    warn!("Preview handle {} was already revoked", self.url);
                }
            }
            None => debug!("Preview store gone before handle {} was released", self.url),
        }
    }
}
