// ABOUTME: File writing for restore downloads.
// ABOUTME: FileSink creates, appends to, closes, and removes restored files.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Destination for restored files. At most one file is open at a time.
#[async_trait]
pub trait FileSink: Send {
    /// Create or truncate `path`, closing any file still open.
    async fn open(&mut self, path: &Path) -> io::Result<()>;

    /// Append bytes to the open file.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and close the open file, if any.
    async fn close(&mut self) -> io::Result<()>;

    /// Delete a file that has been closed.
    async fn remove(&mut self, path: &Path) -> io::Result<()>;
}

/// Writes restored files to the local filesystem.
#[derive(Debug, Default)]
pub struct FsFileSink {
    file: Option<File>,
}

impl FsFileSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileSink for FsFileSink {
    async fn open(&mut self, path: &Path) -> io::Result<()> {
        self.close().await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        self.file = Some(File::create(path).await?);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(bytes).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no restore file is open",
            )),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    async fn remove(&mut self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }
}
