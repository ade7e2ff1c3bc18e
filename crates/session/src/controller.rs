use pagesmith_buffers::{normalize_path, reconcile, Buffer, BufferStore};
use pagesmith_compiler::{
    pre_bundle, BundleError, BundleService, Compile, ShadowCompiler, ShadowError, TargetVersion,
    BUNDLE_NODE_ID,
};
use pagesmith_project::{
    default_tree, Node, NodeId, NodeKind, ProjectRecord, ProjectStore, ProjectStoreError,
    ProjectTree, TreeError,
};
use pagesmith_relay::{PanelConnection, RelayError};
use thiserror::Error;

use crate::settings::{PanelSettings, SettingsError, SettingsStore};

/// Which side of a source file the active buffer shows.
/// 作用中緩衝區顯示來源檔的哪一側。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewSide {
    #[default]
    Source,
    Compiled,
}

/// Observable session state, derived from selection, view side and node
/// kind.
/// 由選取、檢視側與節點類型推導出的工作階段狀態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Selected(NodeId),
    EditingSource(NodeId),
    EditingCompiled(NodeId),
    EditingStyle(NodeId),
    ViewingBundle(NodeId),
}

/// One field edit addressed to a node.
#[derive(Debug, Clone)]
pub enum NodeEdit {
    Content(String),
    Name(String),
}

/// Result of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    NoChange,
}

/// Errors surfaced by session operations. Lookup misses abort the
/// operation and leave the session unchanged.
/// 工作階段操作的錯誤；查詢落空時中止操作且狀態不變。
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Shadow(#[from] ShadowError),
    #[error(transparent)]
    Store(#[from] ProjectStoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error("no node is selected")]
    NoSelection,
    #[error("no live buffer at {0}")]
    BufferMissing(String),
    #[error("node {0} has no source/compiled view pair")]
    NotASourceView(NodeId),
    #[error("buffer {0} holds no injectable content")]
    NotInjectable(String),
    #[error("bundling is disabled in settings")]
    BundleDisabled,
}

/// Orchestrates one edited project: the authoritative tree, the live
/// buffers, selection, settings and the dirty flag. All operations run to
/// completion before the next one starts; `save` and `bundle` are the only
/// blocking calls.
/// 協調單一編輯中的專案：權威樹、即時緩衝區、選取狀態、設定與已修改旗標。
/// 所有操作都執行完畢後才輪到下一個；僅 `save` 與 `bundle` 會阻塞。
pub struct Session<C: Compile> {
    project_id: i64,
    created_at: i64,
    updated_at: i64,
    name: String,
    url: String,
    tree: ProjectTree,
    shadow: ShadowCompiler<C>,
    buffers: Box<dyn BufferStore>,
    settings: PanelSettings,
    selected: Option<NodeId>,
    view: ViewSide,
    active_buffer: Option<String>,
    dirty: bool,
}

impl<C: Compile> Session<C> {
    /// Opens a stored project: backfills hidden companions, opens one
    /// buffer per file and selects the first of them.
    /// 開啟儲存的專案：補齊隱藏副本、為每個檔案開啟緩衝區並選取第一個檔案。
    pub fn open(
        record: ProjectRecord,
        settings: PanelSettings,
        shadow: ShadowCompiler<C>,
        buffers: Box<dyn BufferStore>,
    ) -> Self {
        let tree = record.tree.unwrap_or_else(|| {
            log::warn!("project {} has no tree; seeding the default", record.id);
            default_tree()
        });
        let tree = shadow.ensure_companions(&tree, settings.target_version);
        let mut session = Self {
            project_id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            name: record.name,
            url: record.url,
            tree,
            shadow,
            buffers,
            settings,
            selected: None,
            view: ViewSide::Source,
            active_buffer: None,
            dirty: false,
        };
        reconcile(&session.tree, session.buffers.as_mut());
        if let Some(first) = session.tree.flatten().into_iter().next() {
            if let Err(err) = session.select_node(&first.id) {
                log::warn!("could not select the initial file: {err}");
            }
        }
        session
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn tree(&self) -> &ProjectTree {
        &self.tree
    }

    pub fn settings(&self) -> &PanelSettings {
        &self.settings
    }

    pub fn selected(&self) -> Option<&NodeId> {
        self.selected.as_ref()
    }

    pub fn view(&self) -> ViewSide {
        self.view
    }

    /// Path of the buffer bound to the active view, if any.
    pub fn active_buffer(&self) -> Option<&str> {
        self.active_buffer.as_deref()
    }

    pub fn buffers(&self) -> &dyn BufferStore {
        self.buffers.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Derived state-machine position.
    pub fn state(&self) -> SessionState {
        let Some(id) = &self.selected else {
            return SessionState::Idle;
        };
        let Some(node) = self.tree.find(id) else {
            return SessionState::Idle;
        };
        match node.kind {
            NodeKind::TypeScript => match self.view {
                ViewSide::Source => SessionState::EditingSource(id.clone()),
                ViewSide::Compiled => SessionState::EditingCompiled(id.clone()),
            },
            NodeKind::Css => SessionState::EditingStyle(id.clone()),
            NodeKind::JavaScript if id.as_str() == BUNDLE_NODE_ID => {
                SessionState::ViewingBundle(id.clone())
            }
            _ => SessionState::Selected(id.clone()),
        }
    }

    /// Selects a node, re-binding the active buffer to its path. Selecting
    /// never recompiles; the view resets to the source side.
    /// 選取節點並將作用中緩衝區綁定到其路徑；選取不會重新編譯，檢視側重設為來源。
    pub fn select_node(&mut self, id: &NodeId) -> Result<(), SessionError> {
        let node = self
            .tree
            .find(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
        if node.is_folder() {
            self.selected = Some(id.clone());
            self.view = ViewSide::Source;
            self.active_buffer = None;
            return Ok(());
        }
        let path = self
            .tree
            .resolve_path(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
        let path = normalize_path(&path).to_string();
        if self.buffers.get(&path).is_none() {
            return Err(SessionError::BufferMissing(path));
        }
        self.selected = Some(id.clone());
        self.view = ViewSide::Source;
        self.active_buffer = Some(path);
        Ok(())
    }

    /// Routes one field edit: source content goes through the shadow
    /// compiler, everything else is a direct tree update. Every successful
    /// edit marks the session dirty.
    /// 套用單一欄位編輯：來源內容交由影子編譯器，其餘直接更新樹；成功的編輯
    /// 都會將工作階段標記為已修改。
    pub fn edit(&mut self, id: &NodeId, edit: NodeEdit) -> Result<(), SessionError> {
        match edit {
            NodeEdit::Content(value) => self.edit_content(id, &value),
            NodeEdit::Name(value) => self.edit_name(id, &value),
        }
    }

    fn edit_content(&mut self, id: &NodeId, value: &str) -> Result<(), SessionError> {
        let node = self
            .tree
            .find(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
        if node.kind.is_source() {
            self.tree =
                self.shadow
                    .on_source_edit(&self.tree, id, value, self.settings.target_version)?;
            self.dirty = true;
            self.sync_buffer(id, value);
            // The push into the compiled buffer is an optimisation for the
            // visible view; its failure is reported while the tree stays
            // consistent.
            self.shadow
                .push_companion(&self.tree, id, self.buffers.as_mut())?;
            Ok(())
        } else {
            self.tree = self.tree.set_content(id, value)?;
            self.dirty = true;
            self.sync_buffer(id, value);
            Ok(())
        }
    }

    fn sync_buffer(&mut self, id: &NodeId, value: &str) {
        if let Some(path) = self.tree.resolve_path(id) {
            self.buffers.set_value(normalize_path(&path), value);
        }
    }

    fn edit_name(&mut self, id: &NodeId, value: &str) -> Result<(), SessionError> {
        self.tree = self.tree.rename(id, value)?;
        self.dirty = true;
        // A rename changes paths: buffer identity is re-established by the
        // diff, and the active binding follows the selected node.
        reconcile(&self.tree, self.buffers.as_mut());
        self.rebind_active();
        Ok(())
    }

    fn rebind_active(&mut self) {
        let Some(id) = self.selected.clone() else {
            self.active_buffer = None;
            return;
        };
        let Some(node) = self.tree.find(&id) else {
            self.selected = None;
            self.view = ViewSide::Source;
            self.active_buffer = None;
            return;
        };
        if node.is_folder() {
            self.active_buffer = None;
            return;
        }
        let target = match self.view {
            ViewSide::Compiled if node.kind.is_source() => id.shadow(),
            _ => id,
        };
        self.active_buffer = self
            .tree
            .resolve_path(&target)
            .map(|path| normalize_path(&path).to_string());
    }

    /// Project-metadata edits.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.dirty = true;
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
        self.dirty = true;
    }

    /// Re-binds the active buffer between the source and compiled sides of
    /// a source file, without touching any content.
    /// 在來源與編譯側之間重新綁定作用中緩衝區，不改動任何內容。
    pub fn toggle_view(&mut self, side: ViewSide) -> Result<(), SessionError> {
        let id = self.selected.clone().ok_or(SessionError::NoSelection)?;
        let node = self
            .tree
            .find(&id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
        if !node.kind.is_source() {
            return Err(SessionError::NotASourceView(id));
        }
        let target = match side {
            ViewSide::Source => id.clone(),
            ViewSide::Compiled => id.shadow(),
        };
        let path = self
            .tree
            .resolve_path(&target)
            .ok_or_else(|| TreeError::NodeNotFound(target.clone()))?;
        let path = normalize_path(&path).to_string();
        if self.buffers.get(&path).is_none() {
            return Err(SessionError::BufferMissing(path));
        }
        self.view = side;
        self.active_buffer = Some(path);
        Ok(())
    }

    /// Snapshot of the session as a persistence record.
    pub fn to_record(&self) -> ProjectRecord {
        ProjectRecord {
            id: self.project_id,
            name: self.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            url: self.url.clone(),
            tree: Some(self.tree.clone()),
        }
    }

    /// Persists the project wholesale. A validation violation yields the
    /// structured failure and performs zero writes; an unchanged session
    /// skips the write entirely.
    /// 整體儲存專案；驗證失敗時回傳結構化錯誤且不寫入，未修改時直接略過。
    pub fn save(&mut self, store: &ProjectStore) -> Result<SaveOutcome, SessionError> {
        if !self.dirty {
            log::info!("no change since last save");
            return Ok(SaveOutcome::NoChange);
        }
        let record = self.to_record();
        ProjectStore::validate(&record).map_err(ProjectStoreError::from)?;
        let stored = store.update(&record)?;
        self.updated_at = stored.updated_at;
        self.dirty = false;
        Ok(SaveOutcome::Saved)
    }

    /// Recompiles every companion for the new target, refreshes every open
    /// compiled buffer and persists the choice. The dirty flag is left
    /// alone.
    /// 依新目標版本重新編譯所有副本、刷新已開啟的編譯緩衝區並保存設定；
    /// 不更動已修改旗標。
    pub fn change_target_version(
        &mut self,
        version: TargetVersion,
        settings_store: &SettingsStore,
    ) -> Result<(), SessionError> {
        self.settings.target_version = version;
        self.tree = self.shadow.on_version_change(&self.tree, version);
        let pushed = self
            .shadow
            .push_all_companions(&self.tree, self.buffers.as_mut());
        log::debug!("refreshed {pushed} compiled buffers for target {version}");
        settings_store.save(&self.settings)?;
        Ok(())
    }

    /// Toggles the bundling feature and persists the choice.
    pub fn set_bundle_enabled(
        &mut self,
        enabled: bool,
        settings_store: &SettingsStore,
    ) -> Result<(), SessionError> {
        self.settings.enable_bundle = enabled;
        settings_store.save(&self.settings)?;
        Ok(())
    }

    /// Creates a node under a folder: leaves are named `<id>.<ext>`,
    /// folders after their id; source files get a hidden companion.
    /// 在資料夾下建立節點：檔案名為 `<id>.<ext>`，資料夾以識別碼命名；
    /// 來源檔另建隱藏副本。
    pub fn create_node(
        &mut self,
        parent_id: &NodeId,
        kind: NodeKind,
    ) -> Result<NodeId, SessionError> {
        let id = NodeId::allocate();
        let node = match kind.extension() {
            Some(ext) => Node::file(
                id.clone(),
                format!("{id}.{ext}"),
                Some(parent_id.clone()),
                kind,
                "",
            ),
            None => Node::folder(id.clone(), id.to_string(), Some(parent_id.clone())),
        };
        let mut next = self.tree.add_child(parent_id, node)?;
        if kind.is_source() {
            let source = next
                .find(&id)
                .cloned()
                .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
            let companion = self
                .shadow
                .create_companion(&source, self.settings.target_version);
            next = next.add_child(parent_id, companion)?;
        }
        self.tree = next;
        self.dirty = true;
        reconcile(&self.tree, self.buffers.as_mut());
        Ok(id)
    }

    /// Deletes a node, its subtree and its shadow companion; the
    /// reconciler tears the corresponding buffers down. Confirmation is a
    /// caller concern.
    /// 刪除節點、其子樹與影子副本；對應緩衝區由協調器收回。確認由呼叫端負責。
    pub fn delete_node(&mut self, id: &NodeId, parent_id: &NodeId) -> Result<(), SessionError> {
        let (mut next, removed) = self.tree.remove_child(parent_id, id)?;
        if removed.kind.is_source() {
            match next.remove_child(parent_id, &id.shadow()) {
                Ok((tree, _)) => next = tree,
                Err(TreeError::NodeNotFound(_)) => {
                    log::warn!("source {id} had no companion to delete");
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.tree = next;
        self.dirty = true;
        if self
            .selected
            .as_ref()
            .is_some_and(|selected| self.tree.find(selected).is_none())
        {
            self.selected = None;
            self.view = ViewSide::Source;
            self.active_buffer = None;
        }
        reconcile(&self.tree, self.buffers.as_mut());
        Ok(())
    }

    /// Bundles the compiled files through the external service and upserts
    /// the visible artifact node as the first root child. Empty or failed
    /// responses surface an error and write no artifact.
    /// 透過外部服務打包編譯後檔案，並把可見的成品節點放到根節點首位；
    /// 回應為空或失敗時回報錯誤且不寫入成品。
    pub fn bundle(&mut self, service: &dyn BundleService) -> Result<NodeId, SessionError> {
        if !self.settings.enable_bundle {
            return Err(SessionError::BundleDisabled);
        }
        let virtual_files = pre_bundle(&self.tree.flatten());
        let code = service.bundle(&virtual_files)?;
        let bundle_id = NodeId::from_string(BUNDLE_NODE_ID);
        let next = if self.tree.find(&bundle_id).is_some() {
            self.tree.set_content(&bundle_id, &code)?
        } else {
            let root_id = self.tree.root_id();
            let artifact = Node::file(
                bundle_id.clone(),
                format!("{BUNDLE_NODE_ID}.js"),
                Some(root_id.clone()),
                NodeKind::JavaScript,
                code.clone(),
            );
            self.tree
                .update_node(&root_id, |node| node.children.insert(0, artifact))?
        };
        self.tree = next;
        reconcile(&self.tree, self.buffers.as_mut());
        if let Some(path) = self.tree.resolve_path(&bundle_id) {
            self.buffers.set_value(normalize_path(&path), &code);
        }
        Ok(bundle_id)
    }

    /// Injects the active buffer's script into the inspected page,
    /// compiling source text first.
    /// 將作用中緩衝區的腳本注入頁面；來源文字會先編譯。
    pub fn inject_script(&self, connection: &PanelConnection) -> Result<(), SessionError> {
        let buffer = self.active_leaf()?;
        match buffer.kind() {
            NodeKind::TypeScript => {
                let compiled = self
                    .shadow
                    .compiler()
                    .compile(buffer.value(), self.settings.target_version);
                connection.execute_script(&compiled)?;
            }
            NodeKind::JavaScript => connection.execute_script(buffer.value())?,
            _ => {
                log::error!("buffer {} is not a script", buffer.path());
                return Err(SessionError::NotInjectable(buffer.path().to_string()));
            }
        }
        Ok(())
    }

    /// Injects the active stylesheet buffer into the inspected page.
    pub fn insert_css(&self, connection: &PanelConnection) -> Result<(), SessionError> {
        let buffer = self.active_leaf()?;
        if buffer.kind() != NodeKind::Css {
            return Err(SessionError::NotInjectable(buffer.path().to_string()));
        }
        connection.insert_css(buffer.value())?;
        Ok(())
    }

    /// Clears the injected stylesheet.
    pub fn clear_css(&self, connection: &PanelConnection) -> Result<(), SessionError> {
        connection.clear_css()?;
        Ok(())
    }

    fn active_leaf(&self) -> Result<&Buffer, SessionError> {
        let path = self.active_buffer.as_ref().ok_or(SessionError::NoSelection)?;
        self.buffers
            .get(path)
            .ok_or_else(|| SessionError::BufferMissing(path.clone()))
    }
}
