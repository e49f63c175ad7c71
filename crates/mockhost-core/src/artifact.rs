use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Role of an artifact in the mock service's repository model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Main,
    Secondary,
}

impl ArtifactRole {
    pub fn is_main(self) -> bool {
        matches!(self, Self::Main)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactLocation {
    File(PathBuf),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    pub role: ArtifactRole,
    pub location: ArtifactLocation,
}

impl ArtifactReference {
    /// Declares a local artifact. The file must exist now; relative paths are
    /// resolved against `app_root`.
    pub fn file(role: ArtifactRole, path: impl AsRef<Path>, app_root: &Path) -> Result<Self> {
        let resolved = resolve_existing_file(path.as_ref(), app_root, "artifact")?;
        Ok(Self {
            role,
            location: ArtifactLocation::File(resolved),
        })
    }

    /// Declares a remote artifact. Reachability is the remote service's
    /// concern and is only checked on import.
    pub fn url(role: ArtifactRole, url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(CoreError::configuration("remote artifact URL must not be empty"));
        }
        Ok(Self {
            role,
            location: ArtifactLocation::Url(url),
        })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.location, ArtifactLocation::Url(_))
    }

    pub fn display_target(&self) -> String {
        match &self.location {
            ArtifactLocation::File(path) => path.display().to_string(),
            ArtifactLocation::Url(url) => url.clone(),
        }
    }
}

/// Exported repository state imported wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotReference {
    pub path: PathBuf,
}

impl SnapshotReference {
    pub fn file(path: impl AsRef<Path>, app_root: &Path) -> Result<Self> {
        Ok(Self {
            path: resolve_existing_file(path.as_ref(), app_root, "snapshot")?,
        })
    }
}

/// Absolute paths are returned as-is, relative ones are joined to `app_root`.
pub fn resolve_path(path: &Path, app_root: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        app_root.join(path)
    }
}

fn resolve_existing_file(path: &Path, app_root: &Path, what: &str) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(CoreError::configuration(format!("{what} path must not be empty")));
    }

    let resolved = resolve_path(path, app_root);
    if !resolved.is_file() {
        return Err(CoreError::configuration(format!(
            "{what} file '{}' does not exist",
            resolved.display()
        )));
    }
    Ok(resolved)
}
