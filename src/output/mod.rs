//! Destination writers
//!
//! The download scheduler never touches the filesystem directly. Every
//! sub-part goes through a [`DestinationWriter`], which decides where the
//! bytes live and whether they are already there.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{SubPart, WorkItem};

pub mod fs;
pub mod path;

pub use fs::FsDestination;
pub use path::{default_sanitizer, PathTemplate, Sanitizer};

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Path template could not be parsed
    #[error("invalid path template: {0}")]
    InvalidTemplate(String),

    /// A rendered path is unusable (empty or escaping the root)
    #[error("invalid destination path: {0}")]
    InvalidPath(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Storage for downloaded sub-parts
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Whether the destination already holds this sub-part
    async fn exists(&self, item: &WorkItem, part: &SubPart) -> bool;

    /// Store the bytes of a sub-part
    async fn write(&self, item: &WorkItem, part: &SubPart, bytes: Bytes) -> OutputResult<()>;

    /// Human-readable location of a sub-part, used in outcomes
    fn describe(&self, item: &WorkItem, part: &SubPart) -> String;
}
