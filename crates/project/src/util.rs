use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes data atomically: the payload lands in a `.tmp` sibling first and
/// is renamed over the destination, so readers never observe a torn file.
/// 以 `.tmp` 同層檔案搭配 rename 實現原子寫入，讀取端不會看到寫到一半的檔案。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sibling_tmp(path);
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
