//! Lazily consumed artifact content

use std::io;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use futures_util::stream;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Size of each chunk pulled from disk
pub const CHUNK_SIZE: usize = 64 * 1024;

/// An opened artifact whose bytes have not been read yet.
///
/// Single pass: consuming it moves the file handle, so it cannot be
/// restarted.
#[derive(Debug)]
pub struct ArtifactStream {
    file: File,
    len: u64,
}

impl ArtifactStream {
    pub(crate) fn new(file: File, len: u64) -> Self {
        Self { file, len }
    }

    /// Size of the file at open time
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Chunked byte stream. Each chunk is read only when polled, so the
    /// consumer's pace drives disk reads.
    pub fn into_bytes_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        stream::unfold(Some(self.file), |state| async move {
            let mut file = state?;
            let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
            match file.read_buf(&mut buf).await {
                Ok(0) => None,
                Ok(_) => Some((Ok(buf.freeze()), Some(file))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    /// Drain the remaining content into memory
    pub async fn read_to_end(mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len as usize);
        self.file.read_to_end(&mut data).await?;
        Ok(data)
    }
}
