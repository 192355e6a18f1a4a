//! Error types for voxmap

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// The backing chunk store file does not exist. Fatal at pipeline
    /// construction; the worker is never started.
    #[error("chunk store not found: {0}")]
    StoreNotFound(PathBuf),

    #[error("chunk store corrupt: {0}")]
    StoreCorrupt(String),

    /// A chunk blob failed to decode. Callers treat this as "chunk absent"
    /// after logging it, so a single bad blob cannot abort a bulk request.
    #[error("chunk decode error: {0}")]
    Decode(String),

    #[error("chunk encode error: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
