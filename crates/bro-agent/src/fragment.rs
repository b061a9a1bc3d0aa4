// ABOUTME: Fragment records exchanged with the orchestrator.
// ABOUTME: FragmentInfo travels on the wire; BackupFragmentInfo adds local file paths for sending.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bro_proto::Fragment;

/// A named, versioned, sized unit of backup data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentInfo {
    pub fragment_id: String,
    pub version: String,
    /// Decimal size, transmitted as text.
    pub size_in_bytes: String,
    pub custom_information: BTreeMap<String, String>,
}

impl FragmentInfo {
    pub fn new(
        fragment_id: impl Into<String>,
        version: impl Into<String>,
        size_in_bytes: impl Into<String>,
    ) -> Self {
        Self {
            fragment_id: fragment_id.into(),
            version: version.into(),
            size_in_bytes: size_in_bytes.into(),
            custom_information: BTreeMap::new(),
        }
    }

    /// Attach a custom information entry.
    pub fn with_custom_information(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.custom_information.insert(key.into(), value.into());
        self
    }
}

impl From<&FragmentInfo> for Fragment {
    fn from(info: &FragmentInfo) -> Self {
        Fragment {
            fragment_id: info.fragment_id.clone(),
            version: info.version.clone(),
            size_in_bytes: info.size_in_bytes.clone(),
            custom_information: info
                .custom_information
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl From<Fragment> for FragmentInfo {
    fn from(fragment: Fragment) -> Self {
        FragmentInfo {
            fragment_id: fragment.fragment_id,
            version: fragment.version,
            size_in_bytes: fragment.size_in_bytes,
            custom_information: fragment.custom_information.into_iter().collect(),
        }
    }
}

/// A fragment to send, with the files that back it. Never transmitted as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFragmentInfo {
    pub info: FragmentInfo,
    pub backup_file_path: PathBuf,
    pub custom_metadata_file_path: Option<PathBuf>,
}

impl BackupFragmentInfo {
    pub fn new(info: FragmentInfo, backup_file_path: impl Into<PathBuf>) -> Self {
        Self {
            info,
            backup_file_path: backup_file_path.into(),
            custom_metadata_file_path: None,
        }
    }

    /// Attach a custom metadata file. An empty path means none.
    pub fn with_custom_metadata(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.custom_metadata_file_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    pub fn custom_metadata_file_path(&self) -> Option<&Path> {
        self.custom_metadata_file_path.as_deref()
    }
}
