//! Live-buffer bookkeeping for the Pagesmith panel: the opaque buffer-store
//! contract and the reconciler that keeps it aligned with the project tree.
//! Pagesmith 面板的即時緩衝區管理：不透明緩衝區介面與維持其與專案樹一致的協調器。

pub mod reconcile;
pub mod store;

pub use reconcile::reconcile;
pub use store::{normalize_path, Buffer, BufferStore, InMemoryBufferStore};
