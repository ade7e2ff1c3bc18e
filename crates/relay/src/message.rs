use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a browser tab.
/// 瀏覽器分頁的識別碼。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(i64);

impl TabId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// JSON records exchanged between panel ports, the broker and page agents.
/// Every record carries the sender's inspected-tab id.
/// 面板連接埠、中介者與頁面代理之間交換的 JSON 紀錄；每筆皆帶分頁識別碼。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    #[serde(rename = "INIT")]
    Init {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    #[serde(rename = "EXECUTE_SCRIPT")]
    ExecuteScript {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        script: String,
    },
    #[serde(rename = "INSERT_CSS")]
    InsertCss {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        css: String,
    },
    /// Reserved for a future page-reload command.
    #[serde(rename = "QUICK_RELOAD")]
    QuickReload {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
}

impl RelayMessage {
    pub fn tab_id(&self) -> TabId {
        match self {
            RelayMessage::Init { tab_id }
            | RelayMessage::ExecuteScript { tab_id, .. }
            | RelayMessage::InsertCss { tab_id, .. }
            | RelayMessage::QuickReload { tab_id } => *tab_id,
        }
    }
}

/// The tab-less record actually delivered into a page context.
/// 實際送入頁面的紀錄（不帶分頁識別碼）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PageCommand {
    #[serde(rename = "EXECUTE_SCRIPT")]
    ExecuteScript { script: String },
    #[serde(rename = "INSERT_CSS")]
    InsertCss { css: String },
}

impl PageCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PageCommand::ExecuteScript { .. } => "EXECUTE_SCRIPT",
            PageCommand::InsertCss { .. } => "INSERT_CSS",
        }
    }
}
