//! Filesystem-backed artifact storage

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::{ArtifactStream, Lookup, Result, StorageError};

/// Construction options for [`FileSystemStorage`]
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Root under which every artifact lives. Need not exist yet.
    pub base_directory: PathBuf,
    /// Span every storage operation is recorded under. Defaults to a
    /// `storage` span tagged `context = "file-system"`.
    pub span: Option<Span>,
}

impl StorageOptions {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Artifact store rooted at a fixed base directory.
///
/// Reads distinguish absence from failure: a missing file is
/// `Ok(Lookup::NotFound)`, anything else that goes wrong is
/// `Err(StorageError::Io)`.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    base_directory: PathBuf,
    span: Span,
}

impl FileSystemStorage {
    pub fn new(options: StorageOptions) -> Result<Self> {
        if options.base_directory.as_os_str().is_empty() {
            return Err(StorageError::InvalidOptions(
                "base directory must not be empty".to_string(),
            ));
        }

        let span = options
            .span
            .unwrap_or_else(|| info_span!("storage", context = "file-system"));

        Ok(Self {
            base_directory: options.base_directory,
            span,
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Join a relative path onto the base directory.
    ///
    /// Only plain segments are accepted; `.` is skipped and anything that
    /// could climb out of the base directory is rejected.
    pub fn resolve(&self, relative_path: impl AsRef<Path>) -> Result<PathBuf> {
        let relative_path = relative_path.as_ref();
        let mut full_path = self.base_directory.clone();
        let mut segments = 0usize;

        for component in relative_path.components() {
            match component {
                Component::Normal(segment) => {
                    full_path.push(segment);
                    segments += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::PathEscape(relative_path.to_path_buf()));
                }
            }
        }

        if segments == 0 {
            return Err(StorageError::PathEscape(relative_path.to_path_buf()));
        }

        Ok(full_path)
    }

    /// Read a whole file into memory
    pub async fn read_file(&self, relative_path: impl AsRef<Path>) -> Result<Lookup<Vec<u8>>> {
        let relative_path = relative_path.as_ref();
        async {
            let full_path = self.resolve_logged(relative_path)?;
            info!(path = %full_path.display(), "read file");
            classify(&full_path, fs::read(&full_path).await)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Open a file for lazy, chunked reading.
    ///
    /// Resolves only once the open has succeeded or failed; open failures are
    /// classified the same way as [`Self::read_file`].
    pub async fn read_stream(
        &self,
        relative_path: impl AsRef<Path>,
    ) -> Result<Lookup<ArtifactStream>> {
        let relative_path = relative_path.as_ref();
        async {
            let full_path = self.resolve_logged(relative_path)?;
            info!(path = %full_path.display(), "read stream");
            classify(&full_path, open_regular_file(&full_path).await)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Write `data` to a file, creating missing parent directories first.
    ///
    /// Overwrites in place: a concurrent reader may see partial content.
    pub async fn write_file(&self, relative_path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let relative_path = relative_path.as_ref();
        async {
            let full_path = self.resolve_logged(relative_path)?;
            info!(path = %full_path.display(), bytes = data.len(), "write file");

            if let Some(parent) = full_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| io_failure(parent, source))?;
            }

            fs::write(&full_path, data)
                .await
                .map_err(|source| io_failure(&full_path, source))
        }
        .instrument(self.span.clone())
        .await
    }

    fn resolve_logged(&self, relative_path: &Path) -> Result<PathBuf> {
        self.resolve(relative_path).inspect_err(|e| {
            error!(path = %relative_path.display(), error = %e, "rejected path");
        })
    }
}

async fn open_regular_file(path: &Path) -> io::Result<ArtifactStream> {
    let file = fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::IsADirectory,
            "artifact path is a directory",
        ));
    }
    Ok(ArtifactStream::new(file, metadata.len()))
}

/// Absence becomes `NotFound`; every other failure is an error.
fn classify<T>(path: &Path, outcome: io::Result<T>) -> Result<Lookup<T>> {
    match outcome {
        Ok(value) => Ok(Lookup::Found(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "not found");
            Ok(Lookup::NotFound)
        }
        Err(source) => Err(io_failure(path, source)),
    }
}

fn io_failure(path: &Path, source: io::Error) -> StorageError {
    error!(path = %path.display(), error = %source, "storage error");
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
