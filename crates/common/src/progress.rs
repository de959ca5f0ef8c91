//! Progress event stream
//!
//! Pipelines report progress by sending events to an optional channel
//! instead of updating shared stage counters. A status endpoint or CLI
//! owns the receiving side. Sending never blocks and a dropped receiver
//! is ignored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Indexing pipeline events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { documents: usize },
    DocumentChunked { key: String, chunks: usize },
    DocumentSkipped { key: String, reason: String },
    Chunked { documents: usize, chunks: usize },
    Indexing { vectors: usize },
    Saved { base_name: String },
    Finished { chunks: usize },
    /// Nothing to index; no index artifact written
    Empty,
}

/// Retrieval flow events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SearchProgress {
    Decomposed { sub_queries: Vec<String> },
    SubQueryDone { index: usize, hits: usize },
    Merged { unique: usize },
    Cited { sources: usize },
    Answered,
}

/// Cloneable, optional sender
#[derive(Debug, Clone)]
pub struct ProgressSink<E> {
    sender: Option<UnboundedSender<E>>,
}

impl<E> ProgressSink<E> {
    /// A sink that discards everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Create a connected sink and its receiver
    pub fn channel() -> (Self, UnboundedReceiver<E>) {
        let (tx, rx) = unbounded_channel();
        (Self { sender: Some(tx) }, rx)
    }

    pub fn emit(&self, event: E) {
        if let Some(sender) = &self.sender {
            // Receiver gone means nobody is listening any more
            let _ = sender.send(event);
        }
    }
}

impl<E> Default for ProgressSink<E> {
    fn default() -> Self {
        Self::disabled()
    }
}

impl<E> From<UnboundedSender<E>> for ProgressSink<E> {
    fn from(sender: UnboundedSender<E>) -> Self {
        Self {
            sender: Some(sender),
        }
    }
}
