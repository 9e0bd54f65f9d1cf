use crate::core::mapping::MappingStore;
use crate::core::metadata::{BackupInfo, FileRecord};
use crate::error::{RestoreError, Result};
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;

/// Reads the SQLite database a DiskStation stores in the mapping vault.
pub(crate) struct SqliteMappingStore;

fn open(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(|e| mapping_error(path, e))
}

fn mapping_error(path: &Path, e: rusqlite::Error) -> RestoreError {
    RestoreError::Mapping {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl MappingStore for SqliteMappingStore {
    fn read_backup_info(&self, path: &Path) -> Result<BackupInfo> {
        let conn = open(path)?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM backup_info_tb")
            .map_err(|e| mapping_error(path, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(|e| mapping_error(path, e))?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let (key, value) = row.map_err(|e| mapping_error(path, e))?;
            entries.insert(key, value.unwrap_or_default());
        }

        Ok(BackupInfo { entries })
    }

    fn read_file_records(&self, path: &Path) -> Result<Vec<FileRecord>> {
        let conn = open(path)?;
        let mut stmt = conn
            .prepare("SELECT share_name, base_path, archive_id, file_size FROM file_info_tb")
            .map_err(|e| mapping_error(path, e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    share_name: row.get(0)?,
                    base_path: row.get(1)?,
                    archive_id: row.get(2)?,
                    file_size: row.get::<_, i64>(3)?.max(0) as u64,
                })
            })
            .map_err(|e| mapping_error(path, e))?;

        let records = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| mapping_error(path, e))?;

        Ok(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Writes a mapping database with the given info pairs and file rows.
    pub(crate) fn write_mapping(path: &Path, info: &[(&str, &str)], files: &[FileRecord]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE backup_info_tb (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE file_info_tb (
                 share_name TEXT, base_path TEXT, archive_id TEXT, file_size INTEGER,
                 mtime INTEGER
             );",
        )
        .unwrap();

        for (key, value) in info {
            conn.execute(
                "INSERT INTO backup_info_tb (key, value) VALUES (?1, ?2)",
                rusqlite::params![key, value],
            )
            .unwrap();
        }

        for file in files {
            conn.execute(
                "INSERT INTO file_info_tb (share_name, base_path, archive_id, file_size, mtime)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                rusqlite::params![
                    file.share_name,
                    file.base_path,
                    file.archive_id,
                    file.file_size as i64
                ],
            )
            .unwrap();
        }
    }

    #[test]
    fn reads_info_and_records_in_table_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.sqlite");
        let files = vec![
            FileRecord {
                share_name: "shareA".to_string(),
                base_path: "/ShareA/z.txt".to_string(),
                archive_id: "id-z".to_string(),
                file_size: 10,
            },
            FileRecord {
                share_name: "shareA".to_string(),
                base_path: "/ShareA/a.txt".to_string(),
                archive_id: "id-a".to_string(),
                file_size: 20,
            },
        ];
        write_mapping(
            &path,
            &[("task_name", "Nightly"), ("source_host", "diskstation")],
            &files,
        );

        let info = SqliteMappingStore.read_backup_info(&path).unwrap();
        let records = SqliteMappingStore.read_file_records(&path).unwrap();

        assert_eq!(info.task_name(), Some("Nightly"));
        assert_eq!(info.source_host(), Some("diskstation"));
        assert_eq!(records, files);
    }

    #[test]
    fn garbage_file_is_a_mapping_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.sqlite");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padded out to look big enough")
            .unwrap();

        let result = SqliteMappingStore.read_file_records(&path);

        assert!(matches!(result, Err(RestoreError::Mapping { .. })));
    }
}
