use std::collections::BTreeMap;

use pagesmith_project::NodeKind;

/// Strips the leading/trailing `/` root marker from a buffer key, so
/// `/src/main.ts` and `src/main.ts` address the same buffer.
/// 去除緩衝區鍵值前後的 `/` 根記號，使兩種寫法都指向同一緩衝區。
pub fn normalize_path(path: &str) -> &str {
    path.trim_matches('/')
}

/// A live in-editor buffer for one file node, keyed by canonical path.
/// 單一檔案節點的即時編輯緩衝區，以標準路徑為鍵。
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    path: String,
    kind: NodeKind,
    value: String,
}

impl Buffer {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Full URI of the backing document.
    pub fn uri(&self) -> String {
        format!("file:///{}", self.path)
    }
}

/// Contract of the opaque buffer store the reconciler keeps aligned with
/// the tree. Lookups normalise their key first.
/// 協調器負責對齊的不透明緩衝區存放介面；查詢前先標準化鍵值。
pub trait BufferStore {
    /// Opens a buffer at `path` with its initial content and language kind.
    fn create(&mut self, path: &str, content: &str, kind: NodeKind);
    /// Looks up the buffer at `path`.
    fn get(&self, path: &str) -> Option<&Buffer>;
    /// Replaces a buffer's text; `false` when no buffer lives at `path`.
    fn set_value(&mut self, path: &str, value: &str) -> bool;
    /// Keys of every open buffer, normalised.
    fn list(&self) -> Vec<String>;
    /// Disposes the buffer at `path`; `false` when absent.
    fn dispose(&mut self, path: &str) -> bool;
    /// Disposes every open buffer.
    fn clear(&mut self);
}

/// In-memory buffer store used by the headless session and by tests.
/// 無頭工作階段與測試使用的記憶體緩衝區存放。
#[derive(Debug, Default)]
pub struct InMemoryBufferStore {
    buffers: BTreeMap<String, Buffer>,
}

impl InMemoryBufferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl BufferStore for InMemoryBufferStore {
    fn create(&mut self, path: &str, content: &str, kind: NodeKind) {
        let path = normalize_path(path).to_string();
        self.buffers.insert(
            path.clone(),
            Buffer {
                path,
                kind,
                value: content.to_string(),
            },
        );
    }

    fn get(&self, path: &str) -> Option<&Buffer> {
        self.buffers.get(normalize_path(path))
    }

    fn set_value(&mut self, path: &str, value: &str) -> bool {
        match self.buffers.get_mut(normalize_path(path)) {
            Some(buffer) => {
                buffer.value = value.to_string();
                true
            }
            None => false,
        }
    }

    fn list(&self) -> Vec<String> {
        self.buffers.keys().cloned().collect()
    }

    fn dispose(&mut self, path: &str) -> bool {
        self.buffers.remove(normalize_path(path)).is_some()
    }

    fn clear(&mut self) {
        self.buffers.clear();
    }
}
