// ABOUTME: Inbound restore transfer: rebuilds files from chunk frames and verifies checksums.
// ABOUTME: A checksum mismatch deletes that file only; names escaping the target are skipped.

use std::path::{Component, Path, PathBuf};

use bro_proto::RestoreData;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::checksum::{Checksum, Md5Checksum};
use crate::error::AgentError;
use crate::frame::{restore_chunk, ChunkField, FileKind};
use crate::sink::{FileSink, FsFileSink};
use crate::stream::InboundStream;

/// What a finished download produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOutcome {
    /// Files written and verified against their checksum.
    pub verified_files: usize,
    /// Names of files deleted because their checksum did not match.
    pub mismatched_files: Vec<String>,
    /// Names that would resolve outside the target directory. Nothing is written for them.
    pub rejected_files: Vec<String>,
}

impl RestoreOutcome {
    /// True when no file was discarded.
    pub fn is_clean(&self) -> bool {
        self.mismatched_files.is_empty() && self.rejected_files.is_empty()
    }
}

/// Resolve a restored file name under `target_dir`.
///
/// A leading `/` is dropped. Names that are empty or contain `..` or a drive
/// prefix resolve to `None`.
fn restore_path(target_dir: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name.trim_start_matches('/'));
    let mut components = relative.components().peekable();
    components.peek()?;
    components
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| target_dir.join(relative))
}

struct OpenFile {
    name: String,
    path: PathBuf,
    kind: FileKind,
}

/// Writes one fragment's files into a target directory.
pub struct RestoreTransferEngine {
    sink: Box<dyn FileSink>,
    checksum: Box<dyn Checksum>,
}

impl Default for RestoreTransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RestoreTransferEngine {
    pub fn new() -> Self {
        Self::with_parts(Box::new(FsFileSink::new()), Box::new(Md5Checksum::new()))
    }

    pub fn with_parts(sink: Box<dyn FileSink>, checksum: Box<dyn Checksum>) -> Self {
        Self { sink, checksum }
    }

    /// Read `inbound` until the orchestrator ends it, writing files under `target_dir`.
    ///
    /// A file that was still open when the stream failed is left as written.
    pub async fn download(
        &mut self,
        mut inbound: InboundStream<RestoreData>,
        target_dir: &Path,
    ) -> Result<RestoreOutcome, AgentError> {
        let mut outcome = RestoreOutcome::default();
        let mut current: Option<OpenFile> = None;

        while let Some(frame) = inbound.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    let _ = self.sink.close().await;
                    return Err(AgentError::DownloadFailed(e.to_string()));
                }
            };
            let Some((kind, field)) = restore_chunk(frame) else {
                debug!("ignoring restore frame without payload");
                continue;
            };

            match field {
                ChunkField::FileName(name) => {
                    let Some(path) = restore_path(target_dir, &name) else {
                        warn!(file = %name, ?kind, "file name escapes the target directory, skipping");
                        outcome.rejected_files.push(name);
                        current = None;
                        continue;
                    };
                    self.sink.open(&path).await.map_err(|e| {
                        AgentError::DownloadFailed(format!("{}: {}", path.display(), e))
                    })?;
                    self.checksum.reset();
                    debug!(file = %path.display(), ?kind, "receiving file");
                    current = Some(OpenFile { name, path, kind });
                }
                ChunkField::Content(bytes) => {
                    let Some(file) = current.as_ref() else {
                        warn!(?kind, "content received before a file name, ignoring");
                        continue;
                    };
                    self.sink.write(&bytes).await.map_err(|e| {
                        AgentError::DownloadFailed(format!("{}: {}", file.path.display(), e))
                    })?;
                    self.checksum.update(&bytes);
                }
                ChunkField::Checksum(expected) => {
                    let actual = self.checksum.checksum();
                    let Some(file) = current.take() else {
                        warn!(?kind, "checksum received before a file name, ignoring");
                        continue;
                    };
                    self.sink.close().await.map_err(|e| {
                        AgentError::DownloadFailed(format!("{}: {}", file.path.display(), e))
                    })?;
                    if actual == expected {
                        debug!(file = %file.path.display(), kind = ?file.kind, "file verified");
                        outcome.verified_files += 1;
                    } else {
                        warn!(
                            file = %file.path.display(),
                            %expected,
                            %actual,
                            "checksum mismatch, deleting restored file"
                        );
                        if let Err(e) = self.sink.remove(&file.path).await {
                            warn!(file = %file.path.display(), error = %e, "failed to delete file");
                        }
                        outcome.mismatched_files.push(file.name);
                    }
                }
            }
        }

        self.sink
            .close()
            .await
            .map_err(|e| AgentError::DownloadFailed(e.to_string()))?;
        info!(
            target_dir = %target_dir.display(),
            verified = outcome.verified_files,
            mismatched = outcome.mismatched_files.len(),
            rejected = outcome.rejected_files.len(),
            "download finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bro_proto::CustomMetadataFileChunk;
    use tempfile::TempDir;

    use crate::testing::{checksum, content, custom_metadata, file_name};

    fn inbound(frames: Vec<Result<RestoreData, AgentError>>) -> InboundStream<RestoreData> {
        Box::pin(futures::stream::iter(frames))
    }

    #[tokio::test]
    async fn test_restores_verified_file() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            file_name("restored_file"),
            content(b"abc"),
            checksum(&Md5Checksum::of(b"abc")),
        ];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.verified_files, 1);
        assert!(outcome.is_clean());
        assert_eq!(
            std::fs::read(dir.path().join("restored_file")).unwrap(),
            b"abc"
        );
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_file_and_continues() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            file_name("bad"),
            content(b"abc"),
            checksum("00000000000000000000000000000000"),
            file_name("good"),
            content(b"def"),
            checksum(&Md5Checksum::of(b"def")),
        ];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap();

        assert!(!dir.path().join("bad").exists());
        assert_eq!(std::fs::read(dir.path().join("good")).unwrap(), b"def");
        assert_eq!(outcome.verified_files, 1);
        assert_eq!(outcome.mismatched_files, vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_checksum_comparison_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            file_name("restored_file"),
            content(b"abc"),
            checksum(&Md5Checksum::of(b"abc").to_lowercase()),
        ];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap();

        assert!(!outcome.is_clean());
        assert!(!dir.path().join("restored_file").exists());
    }

    #[tokio::test]
    async fn test_multi_chunk_file_and_custom_metadata() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            file_name("data"),
            content(b"Lorem "),
            content(b"ipsum"),
            checksum(&Md5Checksum::of(b"Lorem ipsum")),
            custom_metadata(CustomMetadataFileChunk {
                file_name: "meta".into(),
                ..Default::default()
            }),
            custom_metadata(CustomMetadataFileChunk {
                content: b"m".to_vec(),
                ..Default::default()
            }),
            custom_metadata(CustomMetadataFileChunk {
                checksum: Md5Checksum::of(b"m"),
                ..Default::default()
            }),
        ];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.verified_files, 2);
        assert_eq!(std::fs::read(dir.path().join("data")).unwrap(), b"Lorem ipsum");
        assert_eq!(std::fs::read(dir.path().join("meta")).unwrap(), b"m");
    }

    #[tokio::test]
    async fn test_stream_error_is_download_failure() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            file_name("first"),
            content(b"abc"),
            checksum(&Md5Checksum::of(b"abc")),
            file_name("partial"),
            content(b"de"),
            Err(AgentError::StreamError("connection reset".into())),
            file_name("never"),
        ];

        let err = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::DownloadFailed(ref msg) if msg.contains("connection reset")));
        assert_eq!(std::fs::read(dir.path().join("first")).unwrap(), b"abc");
        assert_eq!(std::fs::read(dir.path().join("partial")).unwrap(), b"de");
        assert!(!dir.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_content_without_file_name_is_ignored() {
        let dir = TempDir::new().unwrap();
        let frames = vec![content(b"stray"), checksum("ABC")];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome, RestoreOutcome::default());
    }

    #[tokio::test]
    async fn test_file_names_escaping_target_dir_are_rejected() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("restore");
        std::fs::create_dir(&dir).unwrap();
        let frames = vec![
            file_name("../../escaped"),
            content(b"evil"),
            checksum(&Md5Checksum::of(b"evil")),
            file_name("nested/../../escaped"),
            content(b"evil"),
            checksum(&Md5Checksum::of(b"evil")),
            file_name("/"),
            content(b"evil"),
            file_name("/abs/kept"),
            content(b"ok"),
            checksum(&Md5Checksum::of(b"ok")),
        ];

        let outcome = RestoreTransferEngine::new()
            .download(inbound(frames), &dir)
            .await
            .unwrap();

        assert!(!root.path().join("escaped").exists());
        assert!(!root.path().parent().unwrap().join("escaped").exists());
        assert_eq!(std::fs::read(dir.join("abs/kept")).unwrap(), b"ok");
        assert_eq!(outcome.verified_files, 1);
        assert_eq!(
            outcome.rejected_files,
            vec![
                "../../escaped".to_string(),
                "nested/../../escaped".to_string(),
                "/".to_string()
            ]
        );
        assert!(!outcome.is_clean());
    }

    #[test]
    fn test_restore_path() {
        let dir = Path::new("/restore");
        assert_eq!(restore_path(dir, "a/b"), Some(PathBuf::from("/restore/a/b")));
        assert_eq!(restore_path(dir, "//a"), Some(PathBuf::from("/restore/a")));
        assert_eq!(restore_path(dir, "./a"), Some(PathBuf::from("/restore/./a")));
        assert_eq!(restore_path(dir, ".."), None);
        assert_eq!(restore_path(dir, "a/../b"), None);
        assert_eq!(restore_path(dir, ""), None);
    }
}
