//! Storage layer for regcache
//!
//! This crate provides:
//! - Filesystem-backed artifact storage rooted at a fixed base directory
//! - Three-way read outcomes (found, not found, I/O failure)
//! - Lazily streamed reads for large artifacts
//! - The `ArtifactStore` seam request handlers read through

pub mod error;
pub mod fs;
pub mod key;
pub mod lookup;
pub mod store;
pub mod stream;

pub use error::{Result, StorageError};
pub use fs::{FileSystemStorage, StorageOptions};
pub use key::ArtifactKey;
pub use lookup::Lookup;
pub use store::ArtifactStore;
pub use stream::ArtifactStream;
