use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Suffix appended to a source id to address its hidden compiled companion.
pub const SHADOW_ID_SUFFIX: &str = "-js";

static LAST_NODE_ID: AtomicI64 = AtomicI64::new(0);

/// Unique identifier assigned to each node in the project tree. Stable
/// across renames and moves.
/// 專案樹中每個節點的唯一識別碼，改名或搬移後仍保持不變。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Allocates a fresh timestamp-derived id, monotonic within the process
    /// so two allocations in the same millisecond stay distinct.
    /// 配置以時間戳產生的新識別碼；同一毫秒內連續配置仍彼此不同。
    pub fn allocate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        loop {
            let last = LAST_NODE_ID.load(Ordering::Relaxed);
            let candidate = if now > last { now } else { last + 1 };
            if LAST_NODE_ID
                .compare_exchange(last, candidate, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Self(candidate.to_string());
            }
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the id addressing this node's hidden compiled companion.
    /// 取得此節點隱藏編譯副本的識別碼。
    pub fn shadow(&self) -> NodeId {
        Self(format!("{}{}", self.0, SHADOW_ID_SUFFIX))
    }

    /// True when the id names a hidden compiled companion.
    pub fn is_shadow(&self) -> bool {
        self.0.ends_with(SHADOW_ID_SUFFIX)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of project node.
/// 專案節點的類型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    TypeScript,
    JavaScript,
    Css,
    Html,
}

impl NodeKind {
    pub fn is_folder(self) -> bool {
        matches!(self, NodeKind::Folder)
    }

    /// True for the kind whose edits are shadow-compiled.
    pub fn is_source(self) -> bool {
        matches!(self, NodeKind::TypeScript)
    }

    /// True for the compiled-target kind.
    pub fn is_compiled(self) -> bool {
        matches!(self, NodeKind::JavaScript)
    }

    /// File extension used when deriving names; `None` for folders.
    /// 產生檔名時使用的副檔名；資料夾為 `None`。
    pub fn extension(self) -> Option<&'static str> {
        match self {
            NodeKind::Folder => None,
            NodeKind::TypeScript => Some("ts"),
            NodeKind::JavaScript => Some("js"),
            NodeKind::Css => Some("css"),
            NodeKind::Html => Some("html"),
        }
    }
}

/// A single entry in the project tree, folder or file. Children are
/// meaningful for folders only, content for files only.
/// 專案樹中的單一節點（資料夾或檔案）。children 僅資料夾使用，content 僅檔案使用。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Node {
    /// Builds an empty folder node.
    /// 建立空的資料夾節點。
    pub fn folder(id: NodeId, name: impl Into<String>, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            kind: NodeKind::Folder,
            children: Vec::new(),
            content: String::new(),
            hidden: false,
        }
    }

    /// Builds a file node of the given kind.
    /// 建立指定類型的檔案節點。
    pub fn file(
        id: NodeId,
        name: impl Into<String>,
        parent_id: Option<NodeId>,
        kind: NodeKind,
        content: impl Into<String>,
    ) -> Self {
        debug_assert!(!kind.is_folder(), "file nodes cannot be folders");
        Self {
            id,
            name: name.into(),
            parent_id,
            kind,
            children: Vec::new(),
            content: content.into(),
            hidden: false,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

/// A reachable file flattened to its canonical path.
/// 展平後的可達檔案及其標準路徑。
#[derive(Debug, Clone, PartialEq)]
pub struct FlatFile {
    pub id: NodeId,
    pub path: String,
    pub content: String,
    pub kind: NodeKind,
}

/// Tree-manipulation errors.
/// 專案樹操作錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("node {0} cannot accept children")]
    InvalidParent(NodeId),
    #[error("a sibling named '{0}' already exists")]
    DuplicateName(String),
}

/// Immutable project tree. Every mutation returns a new tree, rewriting
/// only the spine between the root and the touched node.
/// 不可變專案樹；每次變動都回傳新樹，僅重寫根到目標節點的路徑。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ProjectTree {
    pub root: Node,
}

impl ProjectTree {
    /// Builds a tree around the provided root folder.
    pub fn new(root: Node) -> Self {
        debug_assert!(root.is_folder(), "tree roots must be folders");
        Self { root }
    }

    /// Returns the identifier of the root node.
    pub fn root_id(&self) -> NodeId {
        self.root.id.clone()
    }

    /// Finds a node by identifier.
    /// 依識別碼尋找節點。
    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        find_recursive(&self.root, id)
    }

    /// Finds the folder listing the given node among its children.
    pub fn find_parent(&self, id: &NodeId) -> Option<&Node> {
        find_parent_recursive(&self.root, id)
    }

    /// Applies `update` to the unique node with the given id.
    /// 將 `update` 套用在符合識別碼的唯一節點上。
    pub fn update_node<F>(&self, id: &NodeId, update: F) -> Result<ProjectTree, TreeError>
    where
        F: FnOnce(&mut Node),
    {
        let mut update = Some(update);
        match update_recursive(&self.root, id, &mut update) {
            Some(root) => Ok(ProjectTree { root }),
            None => Err(TreeError::NodeNotFound(id.clone())),
        }
    }

    /// Replaces a node's content.
    pub fn set_content(&self, id: &NodeId, text: &str) -> Result<ProjectTree, TreeError> {
        self.update_node(id, |node| node.content = text.to_string())
    }

    /// Renames a node, keeping sibling names unique.
    /// 重新命名節點；兄弟節點名稱必須保持唯一。
    pub fn rename(&self, id: &NodeId, name: &str) -> Result<ProjectTree, TreeError> {
        if let Some(parent) = self.find_parent(id) {
            if parent
                .children
                .iter()
                .any(|child| child.id != *id && child.name == name)
            {
                return Err(TreeError::DuplicateName(name.to_string()));
            }
        }
        self.update_node(id, |node| node.name = name.to_string())
    }

    /// Appends a child under the given folder.
    /// 在指定資料夾下方附加子節點。
    pub fn add_child(&self, parent_id: &NodeId, child: Node) -> Result<ProjectTree, TreeError> {
        let parent = self
            .find(parent_id)
            .ok_or_else(|| TreeError::NodeNotFound(parent_id.clone()))?;
        if !parent.is_folder() {
            return Err(TreeError::InvalidParent(parent_id.clone()));
        }
        if parent.children.iter().any(|existing| existing.name == child.name) {
            return Err(TreeError::DuplicateName(child.name.clone()));
        }
        debug_assert!(
            self.find(&child.id).is_none(),
            "node id {} already exists in the tree",
            child.id
        );
        self.update_node(parent_id, |node| node.children.push(child))
    }

    /// Detaches a child subtree, returning the new tree and the removed node.
    /// 自父節點移除子樹，回傳新樹與被移除的節點。
    pub fn remove_child(
        &self,
        parent_id: &NodeId,
        id: &NodeId,
    ) -> Result<(ProjectTree, Node), TreeError> {
        let mut removed = None;
        let next = self.update_node(parent_id, |node| {
            if let Some(index) = node.children.iter().position(|child| child.id == *id) {
                removed = Some(node.children.remove(index));
            }
        })?;
        match removed {
            Some(node) => Ok((next, node)),
            None => Err(TreeError::NodeNotFound(id.clone())),
        }
    }

    /// Computes the canonical path of a node, names joined from the root
    /// (`src/main.ts`). `None` when the id is unreachable.
    /// 計算節點的標準路徑（自根節點串接名稱）；無法抵達時為 `None`。
    pub fn resolve_path(&self, id: &NodeId) -> Option<String> {
        fn walk(node: &Node, id: &NodeId, prefix: &str) -> Option<String> {
            let path = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{prefix}/{}", node.name)
            };
            if node.id == *id {
                return Some(path);
            }
            node.children.iter().find_map(|child| walk(child, id, &path))
        }
        walk(&self.root, id, "")
    }

    /// Flattens every reachable file depth-first in child order, hidden
    /// companions included.
    /// 以深度優先展平所有可達檔案，包含隱藏副本。
    pub fn flatten(&self) -> Vec<FlatFile> {
        fn walk(node: &Node, prefix: &str, out: &mut Vec<FlatFile>) {
            let path = if prefix.is_empty() {
                node.name.clone()
            } else {
                format!("{prefix}/{}", node.name)
            };
            if node.is_folder() {
                for child in &node.children {
                    walk(child, &path, out);
                }
            } else {
                out.push(FlatFile {
                    id: node.id.clone(),
                    path,
                    content: node.content.clone(),
                    kind: node.kind,
                });
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

fn find_recursive<'a>(node: &'a Node, id: &NodeId) -> Option<&'a Node> {
    if node.id == *id {
        return Some(node);
    }
    for child in &node.children {
        if let Some(found) = find_recursive(child, id) {
            return Some(found);
        }
    }
    None
}

fn find_parent_recursive<'a>(node: &'a Node, id: &NodeId) -> Option<&'a Node> {
    if node.children.iter().any(|child| child.id == *id) {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| find_parent_recursive(child, id))
}

fn update_recursive<F>(node: &Node, id: &NodeId, update: &mut Option<F>) -> Option<Node>
where
    F: FnOnce(&mut Node),
{
    if node.id == *id {
        let mut updated = node.clone();
        if let Some(apply) = update.take() {
            apply(&mut updated);
        }
        return Some(updated);
    }
    for (index, child) in node.children.iter().enumerate() {
        if let Some(new_child) = update_recursive(child, id, update) {
            let mut updated = node.clone();
            updated.children[index] = new_child;
            return Some(updated);
        }
    }
    None
}

/// Starter tree seeded into freshly created projects.
/// 新建專案預設的起始樹。
pub fn default_tree() -> ProjectTree {
    let root_id = NodeId::from_string("1");
    let mut root = Node::folder(root_id.clone(), "src", None);
    root.children = vec![
        Node::file(
            NodeId::from_string("2"),
            "main.ts",
            Some(root_id.clone()),
            NodeKind::TypeScript,
            "import exp from \"./exp\"; exp();",
        ),
        Node::file(
            NodeId::from_string("3"),
            "exp.ts",
            Some(root_id.clone()),
            NodeKind::TypeScript,
            "const exp = ()=>{console.log('foo')}; export default exp;",
        ),
        Node::file(
            NodeId::from_string("4"),
            "styles.css",
            Some(root_id),
            NodeKind::Css,
            "p {color: red;}",
        ),
    ];
    ProjectTree::new(root)
}
