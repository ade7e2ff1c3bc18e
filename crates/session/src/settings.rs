use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pagesmith_compiler::TargetVersion;

/// Panel-wide preferences kept as a single settings row.
/// 面板層級偏好設定，僅存單一一筆。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSettings {
    #[serde(default)]
    pub enable_bundle: bool,
    #[serde(default)]
    pub target_version: TargetVersion,
}

/// Errors raised by settings persistence.
/// 設定持久化相關錯誤。
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid settings payload: {0}")]
    Invalid(String),
}

/// Stores the settings row as one JSON file; a missing file is seeded with
/// defaults on first load.
/// 以單一 JSON 檔儲存設定；檔案不存在時，首次讀取會寫入預設值。
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the settings, seeding and returning defaults when the file is
    /// absent.
    /// 載入設定；檔案不存在時寫入並回傳預設值。
    pub fn load(&self) -> Result<PanelSettings, SettingsError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|err| SettingsError::Invalid(err.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let defaults = PanelSettings::default();
                self.save(&defaults)?;
                Ok(defaults)
            }
            Err(err) => Err(SettingsError::Io(err)),
        }
    }

    /// Persists the settings row atomically.
    pub fn save(&self, settings: &PanelSettings) -> Result<(), SettingsError> {
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|err| SettingsError::Invalid(err.to_string()))?;
        write_atomic(&self.path, &json).map_err(SettingsError::Io)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    let tmp_path = path.with_file_name(name);
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
