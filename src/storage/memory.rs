use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::RemoteStore;
use crate::common::Document;
use crate::error::StoreError;

/// In-process document store for tests and offline runs. Supports scripted
/// failures so retry and race paths can be driven without a network.
#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Option<Document>>,
    faults: Mutex<VecDeque<StoreError>>,
    discard_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_document(document: Document) -> Arc<Self> {
        Arc::new(Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        })
    }

    /// The next calls (read or write) fail with these errors, in order.
    pub async fn inject_failures(&self, errors: impl IntoIterator<Item = StoreError>) {
        self.faults.lock().await.extend(errors);
    }

    /// While set, writes report success but never land, as if a concurrent
    /// writer always overwrote them.
    pub fn discard_writes(&self, discard: bool) {
        self.discard_writes.store(discard, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Option<Document> {
        self.document.lock().await.clone()
    }

    /// Replaces the stored document directly, bypassing counters and faults.
    pub async fn put(&self, document: Document) {
        *self.document.lock().await = Some(document);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn next_fault(&self) -> Option<StoreError> {
        self.faults.lock().await.pop_front()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn read(&self) -> Result<Option<Document>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_fault().await {
            return Err(err);
        }
        Ok(self.document.lock().await.clone())
    }

    async fn write(&self, document: &Document) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_fault().await {
            return Err(err);
        }
        if !self.discard_writes.load(Ordering::SeqCst) {
            *self.document.lock().await = Some(document.clone());
        }
        Ok(())
    }
}
