//! Project-tree and persistence primitives for the Pagesmith panel.
//! Pagesmith 面板的專案樹與持久化基礎元件。

mod util;

pub mod store;
pub mod tree;

pub use store::{
    ProjectRecord, ProjectStore, ProjectStoreError, ValidationFailure, ValidationIssue,
};
pub use tree::{
    default_tree, FlatFile, Node, NodeId, NodeKind, ProjectTree, TreeError, SHADOW_ID_SUFFIX,
};
