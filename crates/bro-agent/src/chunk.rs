// ABOUTME: Chunked file reading for backup uploads.
// ABOUTME: ChunkSource opens a file as a sequence of bounded-size byte chunks.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Opens files for chunked reading.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn open(&self, path: &Path) -> io::Result<Box<dyn ChunkReader>>;
}

/// Yields the bytes of one file in order.
#[async_trait]
pub trait ChunkReader: Send {
    /// Next chunk, or `None` once the file is exhausted. Chunks are never empty.
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Reads files from the local filesystem in `chunk_size` pieces.
#[derive(Debug, Clone)]
pub struct FileChunkSource {
    chunk_size: usize,
}

impl FileChunkSource {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

#[async_trait]
impl ChunkSource for FileChunkSource {
    async fn open(&self, path: &Path) -> io::Result<Box<dyn ChunkReader>> {
        let file = File::open(path).await?;
        Ok(Box::new(FileChunkReader {
            file,
            chunk_size: self.chunk_size,
        }))
    }
}

struct FileChunkReader {
    file: File,
    chunk_size: usize,
}

#[async_trait]
impl ChunkReader for FileChunkReader {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        // A single read may return less than asked for; fill the chunk unless EOF.
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}
