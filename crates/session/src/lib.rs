//! Session orchestration for the Pagesmith panel: selection, edit routing,
//! view toggling, save, target changes, bundling and injection.
//! Pagesmith 面板的工作階段協調：選取、編輯路由、檢視切換、儲存、目標版本
//! 變更、打包與注入。

pub mod controller;
pub mod settings;

pub use controller::{
    NodeEdit, SaveOutcome, Session, SessionError, SessionState, ViewSide,
};
pub use settings::{PanelSettings, SettingsError, SettingsStore};
