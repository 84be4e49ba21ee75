use std::fmt;
use std::path::PathBuf;

/// Address of a single artifact: a package name plus one of its files.
///
/// Both parts are opaque. Scoped package names (`@scope/name`) keep their
/// slash and therefore map to a nested directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub package: String,
    pub file: String,
}

impl ArtifactKey {
    pub fn new(package: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            file: file.into(),
        }
    }

    /// Path of the artifact relative to the storage base directory
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.package).join(&self.file)
    }

    /// Registry URL path for the artifact: `/{package}/-/{file}`
    pub fn registry_path(&self) -> String {
        format!("/{}/-/{}", self.package, self.file)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.file)
    }
}
