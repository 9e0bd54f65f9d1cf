use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize, Clone)]
pub(crate) struct FileRecord {
    pub(crate) share_name: String,
    pub(crate) base_path: String,
    pub(crate) archive_id: String,
    pub(crate) file_size: u64,
}

impl FileRecord {
    pub(crate) fn file_name(&self) -> &str {
        self.base_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.base_path)
    }
}

#[derive(Debug, PartialEq, Deserialize, Serialize, Clone, Default)]
pub(crate) struct BackupInfo {
    pub(crate) entries: BTreeMap<String, String>,
}

impl BackupInfo {
    pub(crate) const TASK_NAME: &'static str = "task_name";
    pub(crate) const SOURCE_FOLDER: &'static str = "source_folder";
    pub(crate) const SOURCE_HOST: &'static str = "source_host";
    pub(crate) const LAST_RUN: &'static str = "last_run_time";

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub(crate) fn task_name(&self) -> Option<&str> {
        self.get(Self::TASK_NAME)
    }

    pub(crate) fn source_folder(&self) -> Option<&str> {
        self.get(Self::SOURCE_FOLDER)
    }

    pub(crate) fn source_host(&self) -> Option<&str> {
        self.get(Self::SOURCE_HOST)
    }

    /// Last run as local time. The mapping stores it as unix seconds.
    pub(crate) fn last_run(&self) -> Option<DateTime<Local>> {
        let seconds = self.get(Self::LAST_RUN)?.trim().parse::<i64>().ok()?;
        DateTime::from_timestamp(seconds, 0).map(|utc| utc.with_timezone(&Local))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MappingDatabase {
    pub(crate) info: BackupInfo,
    pub(crate) files: Vec<FileRecord>,
}

impl MappingDatabase {
    pub(crate) fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.file_size).sum()
    }
}

#[derive(Debug, PartialEq, Deserialize, Serialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ArchiveDescriptor {
    pub(crate) archive_id: String,
    pub(crate) size: u64,
    #[serde(default)]
    pub(crate) archive_description: Option<String>,
    #[serde(default)]
    pub(crate) creation_date: Option<String>,
    #[serde(default, rename = "SHA256TreeHash")]
    pub(crate) sha256_tree_hash: Option<String>,
}

#[derive(Debug, PartialEq, Deserialize, Serialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct InventoryResult {
    #[serde(default, rename = "VaultARN")]
    pub(crate) vault_arn: Option<String>,
    #[serde(default)]
    pub(crate) inventory_date: Option<String>,
    pub(crate) archive_list: Vec<ArchiveDescriptor>,
}
