use pagesmith_buffers::{normalize_path, BufferStore};
use pagesmith_project::{Node, NodeId, NodeKind, ProjectTree};
use thiserror::Error;

use crate::target::{Compile, TargetVersion};

/// Errors surfaced by shadow compilation.
/// 影子編譯回報的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShadowError {
    #[error("source node {0} not found")]
    SourceMissing(NodeId),
    #[error("node {0} is not a compiled-source file")]
    NotASource(NodeId),
    #[error("companion node {0} not found")]
    CompanionMissing(NodeId),
    #[error("no live buffer for compiled path {0}")]
    CompiledBufferMissing(String),
}

/// Keeps one hidden compiled companion in sync with every source file:
/// created next to the source, recompiled on every edit and on target
/// changes, addressed by the source id plus a fixed suffix.
/// 為每個來源檔維護一份同步的隱藏編譯副本：建立於來源旁，於每次編輯與目標
/// 版本變更時重新編譯，並以來源識別碼加固定字尾定址。
#[derive(Debug)]
pub struct ShadowCompiler<C: Compile> {
    compiler: C,
}

impl<C: Compile> ShadowCompiler<C> {
    pub fn new(compiler: C) -> Self {
        Self { compiler }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Builds the hidden companion for a source node.
    /// 為來源節點建立隱藏副本。
    pub fn create_companion(&self, source: &Node, version: TargetVersion) -> Node {
        debug_assert!(source.kind.is_source(), "companions shadow source files");
        let mut companion = Node::file(
            source.id.shadow(),
            companion_name(&source.name),
            source.parent_id.clone(),
            NodeKind::JavaScript,
            self.compiler.compile(&source.content, version),
        );
        companion.hidden = true;
        companion
    }

    /// Inserts a companion directly after every source node that lacks
    /// one. Idempotent; used when opening a stored project.
    /// 為每個缺少副本的來源節點補插一份（插在其後）。可重複執行。
    pub fn ensure_companions(&self, tree: &ProjectTree, version: TargetVersion) -> ProjectTree {
        ProjectTree::new(self.ensure_in(&tree.root, version))
    }

    fn ensure_in(&self, node: &Node, version: TargetVersion) -> Node {
        if !node.is_folder() {
            return node.clone();
        }
        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            let rebuilt = self.ensure_in(child, version);
            let missing = rebuilt.kind.is_source()
                && !node
                    .children
                    .iter()
                    .any(|existing| existing.id == rebuilt.id.shadow());
            let companion = missing.then(|| self.create_companion(&rebuilt, version));
            children.push(rebuilt);
            if let Some(companion) = companion {
                children.push(companion);
            }
        }
        let mut updated = node.clone();
        updated.children = children;
        updated
    }

    /// Applies a source edit: the source content and the recompiled
    /// companion content land in one rewrite, so the pair stays consistent
    /// regardless of buffer state. The tree is untouched on any error.
    /// 套用來源編輯：來源內容與重新編譯後的副本內容於同一次重寫更新，
    /// 無論緩衝區狀態如何兩者都維持一致；發生錯誤時樹不會變動。
    pub fn on_source_edit(
        &self,
        tree: &ProjectTree,
        id: &NodeId,
        text: &str,
        version: TargetVersion,
    ) -> Result<ProjectTree, ShadowError> {
        let source = tree
            .find(id)
            .ok_or_else(|| ShadowError::SourceMissing(id.clone()))?;
        if !source.kind.is_source() {
            return Err(ShadowError::NotASource(id.clone()));
        }
        let compiled = self.compiler.compile(text, version);
        let shadow_id = id.shadow();
        let next = tree
            .set_content(id, text)
            .map_err(|_| ShadowError::SourceMissing(id.clone()))?;
        let next = next
            .set_content(&shadow_id, &compiled)
            .map_err(|_| ShadowError::CompanionMissing(shadow_id.clone()))?;
        Ok(next)
    }

    /// Pushes a companion's content into its live buffer. The missing
    /// buffer is the only caller-visible failure of an otherwise
    /// successful compile.
    /// 將副本內容推入其即時緩衝區；緩衝區不存在是唯一會回報的失敗。
    pub fn push_companion(
        &self,
        tree: &ProjectTree,
        source_id: &NodeId,
        buffers: &mut dyn BufferStore,
    ) -> Result<(), ShadowError> {
        let shadow_id = source_id.shadow();
        let companion = tree
            .find(&shadow_id)
            .ok_or_else(|| ShadowError::CompanionMissing(shadow_id.clone()))?;
        let path = tree
            .resolve_path(&shadow_id)
            .ok_or_else(|| ShadowError::CompanionMissing(shadow_id.clone()))?;
        let path = normalize_path(&path).to_string();
        if !buffers.set_value(&path, &companion.content) {
            log::error!("compiled buffer not found at {path}");
            return Err(ShadowError::CompiledBufferMissing(path));
        }
        Ok(())
    }

    /// Recompiles every companion from its source's current content.
    /// Sources and ids are untouched; applying the same version twice
    /// yields identical companion contents.
    /// 以來源目前內容重新編譯所有副本；來源與識別碼不變，同版本重複執行
    /// 結果相同。
    pub fn on_version_change(&self, tree: &ProjectTree, version: TargetVersion) -> ProjectTree {
        let mut next = tree.clone();
        for file in tree.flatten() {
            if !file.kind.is_source() {
                continue;
            }
            let shadow_id = file.id.shadow();
            let compiled = self.compiler.compile(&file.content, version);
            match next.set_content(&shadow_id, &compiled) {
                Ok(updated) => next = updated,
                Err(_) => log::error!("companion {shadow_id} not found; skipping recompile"),
            }
        }
        next
    }

    /// Re-pushes every open companion buffer, returning how many were
    /// refreshed. Paths without a buffer are logged and skipped.
    /// 重新推送所有已開啟的副本緩衝區並回傳數量；沒有緩衝區的路徑記錄後略過。
    pub fn push_all_companions(
        &self,
        tree: &ProjectTree,
        buffers: &mut dyn BufferStore,
    ) -> usize {
        let mut pushed = 0;
        for file in tree.flatten() {
            if !file.id.is_shadow() || !file.kind.is_compiled() {
                continue;
            }
            if buffers.set_value(normalize_path(&file.path), &file.content) {
                pushed += 1;
            } else {
                log::warn!("no live buffer for compiled path {}", file.path);
            }
        }
        pushed
    }
}

/// Derives the companion's display name from the source name
/// (`main.ts` → `main.js`). Names without the source suffix get the
/// compiled extension appended so the pair never collides.
fn companion_name(name: &str) -> String {
    match name.strip_suffix(".ts") {
        Some(stem) => format!("{stem}.js"),
        None => format!("{name}.js"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagesmith_buffers::{reconcile, BufferStore, InMemoryBufferStore};
    use pagesmith_project::NodeId;

    /// Deterministic stand-in for the external transpiler: records the
    /// target in a banner so version changes are observable.
    struct BannerCompiler;

    impl Compile for BannerCompiler {
        fn compile(&self, source: &str, target: TargetVersion) -> String {
            format!("/* {target} */ {source}")
        }
    }

    fn source_tree() -> ProjectTree {
        let root_id = NodeId::from_string("root");
        let mut root = Node::folder(root_id.clone(), "src", None);
        root.children = vec![
            Node::file(
                NodeId::from_string("a"),
                "a.ts",
                Some(root_id.clone()),
                NodeKind::TypeScript,
                "let a = 1;",
            ),
            Node::file(
                NodeId::from_string("s"),
                "s.css",
                Some(root_id),
                NodeKind::Css,
                "p{}",
            ),
        ];
        ProjectTree::new(root)
    }

    #[test]
    fn companion_names_swap_the_extension() {
        assert_eq!(companion_name("main.ts"), "main.js");
        assert_eq!(companion_name("1714.ts"), "1714.js");
        assert_eq!(companion_name("notes"), "notes.js");
    }

    #[test]
    fn ensure_companions_inserts_after_the_source_and_is_idempotent() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);

        let names: Vec<&str> = tree.root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.ts", "a.js", "s.css"]);
        let companion = tree.find(&NodeId::from_string("a-js")).unwrap();
        assert!(companion.hidden);
        assert_eq!(companion.content, "/* esnext */ let a = 1;");

        let again = shadow.ensure_companions(&tree, TargetVersion::EsNext);
        assert_eq!(again, tree);
    }

    #[test]
    fn source_edit_updates_both_sides_of_the_pair() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);
        let id = NodeId::from_string("a");

        let next = shadow
            .on_source_edit(&tree, &id, "let a = 2;", TargetVersion::EsNext)
            .unwrap();
        assert_eq!(next.find(&id).unwrap().content, "let a = 2;");
        assert_eq!(
            next.find(&id.shadow()).unwrap().content,
            "/* esnext */ let a = 2;"
        );
    }

    #[test]
    fn source_edit_rejects_non_source_nodes() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);
        let err = shadow
            .on_source_edit(
                &tree,
                &NodeId::from_string("s"),
                "p{color:red}",
                TargetVersion::EsNext,
            )
            .unwrap_err();
        assert_eq!(err, ShadowError::NotASource(NodeId::from_string("s")));
    }

    #[test]
    fn push_companion_reports_a_missing_buffer() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);
        let mut buffers = InMemoryBufferStore::new();

        let err = shadow
            .push_companion(&tree, &NodeId::from_string("a"), &mut buffers)
            .unwrap_err();
        assert_eq!(
            err,
            ShadowError::CompiledBufferMissing("src/a.js".to_string())
        );

        reconcile(&tree, &mut buffers);
        shadow
            .push_companion(&tree, &NodeId::from_string("a"), &mut buffers)
            .unwrap();
        assert_eq!(
            buffers.get("src/a.js").unwrap().value(),
            "/* esnext */ let a = 1;"
        );
    }

    #[test]
    fn version_change_recompiles_companions_only_and_is_idempotent() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);

        let lowered = shadow.on_version_change(&tree, TargetVersion::Es5);
        assert_eq!(
            lowered.find(&NodeId::from_string("a-js")).unwrap().content,
            "/* es5 */ let a = 1;"
        );
        // Sources untouched.
        assert_eq!(
            lowered.find(&NodeId::from_string("a")).unwrap().content,
            "let a = 1;"
        );
        let twice = shadow.on_version_change(&lowered, TargetVersion::Es5);
        assert_eq!(twice, lowered);
    }

    #[test]
    fn push_all_companions_counts_refreshed_buffers() {
        let shadow = ShadowCompiler::new(BannerCompiler);
        let tree = shadow.ensure_companions(&source_tree(), TargetVersion::EsNext);
        let mut buffers = InMemoryBufferStore::new();
        reconcile(&tree, &mut buffers);

        let lowered = shadow.on_version_change(&tree, TargetVersion::Es2015);
        assert_eq!(shadow.push_all_companions(&lowered, &mut buffers), 1);
        assert_eq!(
            buffers.get("src/a.js").unwrap().value(),
            "/* es2015 */ let a = 1;"
        );
    }
}
