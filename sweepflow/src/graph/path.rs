//! Lazy references to other stages' output files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::StageId;
use crate::errors::UnresolvedReferenceError;

/// A reference to `file` inside the directory of `stage`.
///
/// The directory does not exist until the graph is frozen and directories
/// are assigned, so a `StagePath` stays symbolic until then.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StagePath {
    stage: StageId,
    file: String,
}

impl StagePath {
    /// Creates a new stage path.
    #[must_use]
    pub fn new(stage: StageId, file: impl Into<String>) -> Self {
        Self {
            stage,
            file: file.into(),
        }
    }

    /// Returns the referenced stage.
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Returns the relative file name.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Resolves to the absolute path.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage has no directory yet.
    pub fn resolve<R>(&self, resolver: &R) -> Result<PathBuf, UnresolvedReferenceError>
    where
        R: PathResolver + ?Sized,
    {
        resolver.resolve(self)
    }
}

impl fmt::Display for StagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<stage{}>/{}", self.stage, self.file)
    }
}

/// Anything that knows the directories of stages.
pub trait PathResolver {
    /// Resolves a stage path to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced stage has no directory.
    fn resolve(&self, path: &StagePath) -> Result<PathBuf, UnresolvedReferenceError>;
}
