use async_trait::async_trait;

use crate::{ArtifactKey, ArtifactStream, FileSystemStorage, Lookup, Result};

/// Artifact lookups as seen by request handlers
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn read_artifact(&self, key: &ArtifactKey) -> Result<Lookup<Vec<u8>>>;

    async fn stream_artifact(&self, key: &ArtifactKey) -> Result<Lookup<ArtifactStream>>;

    async fn write_artifact(&self, key: &ArtifactKey, data: &[u8]) -> Result<()>;
}

#[async_trait]
impl ArtifactStore for FileSystemStorage {
    async fn read_artifact(&self, key: &ArtifactKey) -> Result<Lookup<Vec<u8>>> {
        self.read_file(key.relative_path()).await
    }

    async fn stream_artifact(&self, key: &ArtifactKey) -> Result<Lookup<ArtifactStream>> {
        self.read_stream(key.relative_path()).await
    }

    async fn write_artifact(&self, key: &ArtifactKey, data: &[u8]) -> Result<()> {
        self.write_file(key.relative_path(), data).await
    }
}
