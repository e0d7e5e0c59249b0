//! Decision logic of the append protocol, kept free of I/O.
//!
//! One attempt is: read the document, append unless the id is already there,
//! write the whole document back, re-read and look for the id. A missing id
//! means a concurrent overwrite won; the next attempt starts from a fresh
//! read.

use crate::common::{Document, StoredMessage};

/// What to do with a freshly read snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterRead {
    /// Overwrite the backend with this document.
    Write(Document),
    /// An earlier attempt already landed; skip straight to verification.
    AlreadyStored,
}

/// What to do after the read-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterVerify {
    Committed { attempts: u32 },
    /// The write was clobbered; run attempt number `attempt`.
    Retry { attempt: u32 },
    GaveUp { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct AppendProtocol {
    writer: String,
    message: StoredMessage,
    attempt: u32,
    max_attempts: u32,
}

impl AppendProtocol {
    pub fn new(writer: &str, message: StoredMessage, max_attempts: u32) -> Self {
        Self {
            writer: writer.to_string(),
            message,
            attempt: 1,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn message(&self) -> &StoredMessage {
        &self.message
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn after_read(&self, snapshot: &Document) -> AfterRead {
        if snapshot.contains(&self.writer, &self.message.id) {
            AfterRead::AlreadyStored
        } else {
            AfterRead::Write(snapshot.with_appended(&self.writer, self.message.clone()))
        }
    }

    pub fn after_verify(&mut self, snapshot: &Document) -> AfterVerify {
        if snapshot.contains(&self.writer, &self.message.id) {
            AfterVerify::Committed {
                attempts: self.attempt,
            }
        } else if self.attempt >= self.max_attempts {
            AfterVerify::GaveUp {
                attempts: self.attempt,
            }
        } else {
            self.attempt += 1;
            AfterVerify::Retry {
                attempt: self.attempt,
            }
        }
    }
}
