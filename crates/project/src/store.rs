use std::fmt;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{default_tree, ProjectTree};
use crate::util::write_atomic;

/// A stored project: metadata plus the whole tree, round-tripped wholesale.
/// 儲存的專案：中繼資料加上整棵專案樹，整體寫入與讀出。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub url: String,
    #[serde(default)]
    pub tree: Option<ProjectTree>,
}

/// A single problem found while validating a record before writing.
/// 寫入前驗證紀錄時發現的單一問題。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyName,
    EmptyUrl,
    MissingTree,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationIssue::EmptyName => "project name is empty",
            ValidationIssue::EmptyUrl => "project url is empty",
            ValidationIssue::MissingTree => "project tree is missing",
        };
        f.write_str(text)
    }
}

/// Save-time validation failure. Nothing was written.
/// 儲存時的驗證失敗；不會寫入任何資料。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed: ")?;
        for (index, issue) in self.issues.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationFailure {}

/// Errors raised by project persistence.
/// 專案持久化相關錯誤。
#[derive(Debug, Error)]
pub enum ProjectStoreError {
    #[error("project store IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid project payload: {0}")]
    Invalid(String),
    #[error("project {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
}

/// Whole-entity project persistence: one JSON file per project, written
/// atomically, keyed by the numeric project id.
/// 專案整體持久化：每個專案一份 JSON 檔，以數字識別碼為鍵、原子寫入。
#[derive(Debug)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: i64) -> PathBuf {
        self.root.join(format!("project_{id}.json"))
    }

    /// Checks the fields the update contract requires, reporting every
    /// violation at once.
    /// 檢查更新前必須成立的欄位條件，一次回報所有違規。
    pub fn validate(record: &ProjectRecord) -> Result<(), ValidationFailure> {
        let mut issues = Vec::new();
        if record.name.trim().is_empty() {
            issues.push(ValidationIssue::EmptyName);
        }
        if record.url.trim().is_empty() {
            issues.push(ValidationIssue::EmptyUrl);
        }
        if record.tree.is_none() {
            issues.push(ValidationIssue::MissingTree);
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure { issues })
        }
    }

    /// Creates a project seeded with the default starter tree.
    /// 建立新專案並填入預設起始樹。
    pub fn create(&self, name: &str, url: &str) -> Result<ProjectRecord, ProjectStoreError> {
        fs::create_dir_all(&self.root)?;
        let timestamp = current_timestamp();
        let mut id = timestamp;
        while self.record_path(id).exists() {
            id += 1;
        }
        let record = ProjectRecord {
            id,
            name: name.to_string(),
            created_at: timestamp,
            updated_at: timestamp,
            url: url.to_string(),
            tree: Some(default_tree()),
        };
        self.write(&record)?;
        Ok(record)
    }

    /// Loads a record; `Ok(None)` when the id has no file.
    /// 載入紀錄；識別碼不存在時回傳 `Ok(None)`。
    pub fn get(&self, id: i64) -> Result<Option<ProjectRecord>, ProjectStoreError> {
        match fs::read_to_string(self.record_path(id)) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|err| ProjectStoreError::Invalid(err.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ProjectStoreError::Io(err)),
        }
    }

    /// Lists every stored record, ordered by id.
    pub fn list(&self) -> Result<Vec<ProjectRecord>, ProjectStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ProjectStoreError::Io(err)),
        };
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with("project_") || !name.ends_with(".json") {
                continue;
            }
            let contents = fs::read_to_string(entry.path())?;
            let record = serde_json::from_str(&contents)
                .map_err(|err| ProjectStoreError::Invalid(err.to_string()))?;
            records.push(record);
        }
        records.sort_by_key(|record: &ProjectRecord| record.id);
        Ok(records)
    }

    /// Validates, then replaces the stored record wholesale. A violation
    /// yields the structured failure and writes nothing.
    /// 先驗證，再整體覆寫紀錄；驗證失敗時回傳結構化錯誤且不寫入。
    pub fn update(&self, record: &ProjectRecord) -> Result<ProjectRecord, ProjectStoreError> {
        Self::validate(record)?;
        if !self.record_path(record.id).exists() {
            return Err(ProjectStoreError::NotFound(record.id));
        }
        let mut copy = record.clone();
        copy.updated_at = current_timestamp();
        self.write(&copy)?;
        Ok(copy)
    }

    /// Removes a record; absent ids are a no-op.
    pub fn delete(&self, id: i64) -> Result<(), ProjectStoreError> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProjectStoreError::Io(err)),
        }
    }

    fn write(&self, record: &ProjectRecord) -> Result<(), ProjectStoreError> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|err| ProjectStoreError::Invalid(err.to_string()))?;
        write_atomic(&self.record_path(record.id), &json).map_err(ProjectStoreError::Io)
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_and_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());

        let record = store.create("demo", "https://example.test").unwrap();
        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded, record);
        let tree = loaded.tree.expect("seeded tree");
        assert_eq!(tree.root.name, "src");
        assert_eq!(tree.flatten().len(), 3);
    }

    #[test]
    fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn update_validates_and_writes_nothing_on_failure() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let record = store.create("demo", "https://example.test").unwrap();

        let mut broken = record.clone();
        broken.name = "".into();
        broken.url = "  ".into();
        broken.tree = None;
        let err = store.update(&broken).unwrap_err();
        match err {
            ProjectStoreError::Validation(failure) => {
                assert_eq!(
                    failure.issues,
                    vec![
                        ValidationIssue::EmptyName,
                        ValidationIssue::EmptyUrl,
                        ValidationIssue::MissingTree
                    ]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        // The stored record is untouched.
        assert_eq!(store.get(record.id).unwrap().unwrap(), record);
    }

    #[test]
    fn update_stamps_updated_at() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let mut record = store.create("demo", "https://example.test").unwrap();
        record.name = "renamed".into();
        let updated = store.update(&record).unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.updated_at >= record.created_at);
        assert_eq!(store.get(record.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let record = ProjectRecord {
            id: 7,
            name: "ghost".into(),
            created_at: 0,
            updated_at: 0,
            url: "https://example.test".into(),
            tree: Some(default_tree()),
        };
        assert!(matches!(
            store.update(&record),
            Err(ProjectStoreError::NotFound(7))
        ));
    }

    #[test]
    fn list_and_delete() {
        let dir = tempdir().unwrap();
        let store = ProjectStore::new(dir.path());
        let first = store.create("one", "https://one.test").unwrap();
        let second = store.create("two", "https://two.test").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].id < listed[1].id);

        store.delete(first.id).unwrap();
        store.delete(first.id).unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }
}
