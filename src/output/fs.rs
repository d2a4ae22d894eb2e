//! Filesystem destination

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::{DestinationWriter, OutputError, OutputResult, PathTemplate};
use crate::{SubPart, WorkItem};

/// Writes sub-parts under a root directory following a [`PathTemplate`]
///
/// Files are written to a `.part` sibling first and renamed into place, so
/// an interrupted write never looks like a finished download.
#[derive(Debug, Clone)]
pub struct FsDestination {
    root: PathBuf,
    template: PathTemplate,
}

impl FsDestination {
    /// Destination under `root` using the default template
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            template: PathTemplate::default(),
        }
    }

    /// Use `template` for the layout under the root
    pub fn with_template(mut self, template: PathTemplate) -> Self {
        self.template = template;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a sub-part
    ///
    /// # Errors
    /// Returns [`OutputError::InvalidPath`] if the template renders an
    /// unusable path for this sub-part
    pub fn path_for(&self, item: &WorkItem, part: &SubPart) -> OutputResult<PathBuf> {
        Ok(self.root.join(self.template.render(item, part)?))
    }
}

#[async_trait]
impl DestinationWriter for FsDestination {
    async fn exists(&self, item: &WorkItem, part: &SubPart) -> bool {
        match self.path_for(item, part) {
            Ok(path) => fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn write(&self, item: &WorkItem, part: &SubPart, bytes: Bytes) -> OutputResult<()> {
        let path = self.path_for(item, part)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                OutputError::IoError(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(".part");
        let temp = PathBuf::from(temp);

        fs::write(&temp, &bytes).await.map_err(|e| {
            OutputError::IoError(format!("failed to write {}: {}", temp.display(), e))
        })?;

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(OutputError::IoError(format!(
                "failed to move {} into place: {}",
                path.display(),
                e
            )));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Sub-part written");
        Ok(())
    }

    fn describe(&self, item: &WorkItem, part: &SubPart) -> String {
        match self.path_for(item, part) {
            Ok(path) => path.display().to_string(),
            Err(_) => part.url.clone(),
        }
    }
}
