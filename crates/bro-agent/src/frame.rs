// ABOUTME: Data-channel frame shapes shared by backup and restore transfers.
// ABOUTME: Builds outbound chunk frames and classifies inbound ones by file kind and populated field.

use bro_proto::{
    backup_data, restore_data, BackupData, BackupFileChunk, CustomMetadataFileChunk,
    DataMessageType, RestoreData,
};

/// Which file of a fragment a chunk frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    BackupFile,
    CustomMetadataFile,
}

/// The single populated field of a chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkField {
    FileName(String),
    Content(Vec<u8>),
    Checksum(String),
}

impl ChunkField {
    /// Classify a chunk by its first non-empty field; `None` when all are empty.
    fn from_parts(file_name: String, content: Vec<u8>, checksum: String) -> Option<Self> {
        if !file_name.is_empty() {
            Some(ChunkField::FileName(file_name))
        } else if !content.is_empty() {
            Some(ChunkField::Content(content))
        } else if !checksum.is_empty() {
            Some(ChunkField::Checksum(checksum))
        } else {
            None
        }
    }

    fn into_parts(self) -> (String, Vec<u8>, String) {
        match self {
            ChunkField::FileName(name) => (name, Vec::new(), String::new()),
            ChunkField::Content(bytes) => (String::new(), bytes, String::new()),
            ChunkField::Checksum(sum) => (String::new(), Vec::new(), sum),
        }
    }
}

/// Build an outbound backup frame carrying one chunk field.
pub fn backup_chunk(kind: FileKind, field: ChunkField) -> BackupData {
    let (file_name, content, checksum) = field.into_parts();
    match kind {
        FileKind::BackupFile => BackupData {
            data_message_type: DataMessageType::BackupFile as i32,
            data: Some(backup_data::Data::BackupFileChunk(BackupFileChunk {
                file_name,
                content,
                checksum,
            })),
        },
        FileKind::CustomMetadataFile => BackupData {
            data_message_type: DataMessageType::CustomMetadataFile as i32,
            data: Some(backup_data::Data::CustomMetadataFileChunk(
                CustomMetadataFileChunk {
                    file_name,
                    content,
                    checksum,
                },
            )),
        },
    }
}

/// Classify an inbound restore frame. Frames without a recognised payload yield `None`.
pub fn restore_chunk(frame: RestoreData) -> Option<(FileKind, ChunkField)> {
    match frame.data? {
        restore_data::Data::BackupFileChunk(chunk) => {
            ChunkField::from_parts(chunk.file_name, chunk.content, chunk.checksum)
                .map(|field| (FileKind::BackupFile, field))
        }
        restore_data::Data::CustomMetadataFileChunk(chunk) => {
            ChunkField::from_parts(chunk.file_name, chunk.content, chunk.checksum)
                .map(|field| (FileKind::CustomMetadataFile, field))
        }
    }
}
