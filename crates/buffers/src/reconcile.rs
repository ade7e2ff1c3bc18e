use std::collections::BTreeSet;

use pagesmith_project::ProjectTree;

use crate::store::{normalize_path, BufferStore};

/// Aligns the buffer store's key set with the tree's reachable file paths.
/// Two passes: newly reachable paths are opened first, then a sweep over
/// the symmetric difference disposes keys left behind by renames and moves
/// (a stale buffer survives under its old key, which plain set-difference
/// would miss) and reopens any path that still lacks a buffer.
/// 將緩衝區鍵值集合對齊至專案樹的可達路徑。兩段處理：先開啟新路徑，再掃
/// 對稱差集清除改名/搬移遺留的舊鍵，並補開仍缺少緩衝區的路徑。
pub fn reconcile(tree: &ProjectTree, buffers: &mut dyn BufferStore) {
    let files = tree.flatten();
    let current: BTreeSet<String> = files
        .iter()
        .map(|file| normalize_path(&file.path).to_string())
        .collect();

    let open: BTreeSet<String> = buffers.list().into_iter().collect();
    for path in current.difference(&open) {
        let Some(file) = files.iter().find(|f| normalize_path(&f.path) == path) else {
            continue;
        };
        log::info!("opening buffer for {path}");
        buffers.create(path, &file.content, file.kind);
    }

    // Listed again on purpose: this pass must see the buffers the first
    // pass just opened, leaving only keys with no matching node.
    let open: BTreeSet<String> = buffers.list().into_iter().collect();
    for path in current.symmetric_difference(&open) {
        if buffers.get(path).is_some() {
            log::info!("disposing stale buffer {path}");
            buffers.dispose(path);
        } else if let Some(file) = files.iter().find(|f| normalize_path(&f.path) == path) {
            log::info!("reopening buffer for {path}");
            buffers.create(path, &file.content, file.kind);
        } else {
            log::warn!("no node resolves to buffer path {path}");
        }
    }
}
