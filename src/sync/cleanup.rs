//! Bounded history: keep only the latest messages across all writers.
//!
//! The sweep reads, trims and overwrites without any merge, so a message
//! written by anyone between its read and its write is dropped. Nothing in
//! the backend allows closing that window.
//!
//! Entries that the lenient parse skipped (non-array writers, malformed
//! messages) are not carried into the rewrite either; any sweep or send
//! that overwrites the document removes them for good.

use crate::common::Document;
use crate::error::SyncError;

use super::engine::SyncEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// At or under the ceiling; nothing written.
    Untouched { count: usize },
    Trimmed { before: usize, after: usize },
}

impl SweepOutcome {
    pub fn removed(&self) -> usize {
        match self {
            SweepOutcome::Untouched { .. } => 0,
            SweepOutcome::Trimmed { before, after } => before - after,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CleanupSweeper {
    retain: usize,
}

impl CleanupSweeper {
    pub fn new(retain: usize) -> Self {
        Self { retain }
    }

    pub fn retain(&self) -> usize {
        self.retain
    }

    /// The trimmed document, or `None` when no trim is needed.
    pub fn plan(&self, document: &Document) -> Option<Document> {
        let all = document.flatten();
        if all.len() <= self.retain {
            return None;
        }
        let keep = &all[all.len() - self.retain..];
        Some(Document::from_messages(keep))
    }

    pub async fn sweep(&self, engine: &SyncEngine) -> Result<SweepOutcome, SyncError> {
        let document = engine.read_document("cleanup.read").await?;
        let before = document.len();

        let Some(trimmed) = self.plan(&document) else {
            log::debug!("Cleanup skipped: {before} messages within limit {}", self.retain);
            return Ok(SweepOutcome::Untouched { count: before });
        };

        let after = trimmed.len();
        engine.write_document("cleanup.write", trimmed).await?;
        log::info!("Cleanup trimmed shared log from {before} to {after} messages");
        Ok(SweepOutcome::Trimmed { before, after })
    }
}
