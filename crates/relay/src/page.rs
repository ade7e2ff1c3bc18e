use std::collections::HashMap;

use crate::broker::{DeliveryError, TabGateway};
use crate::message::{PageCommand, TabId};

/// DOM id of the single injected style element.
pub const STYLE_ELEMENT_ID: &str = "inserted-style";

/// In-memory counterpart of the content script living in a page: executes
/// delivered scripts (recorded, not evaluated) and maintains the single
/// replaceable style element.
/// 頁面內容腳本的記憶體對應物：記錄收到的腳本並維護單一可替換的樣式元素。
#[derive(Debug, Default)]
pub struct PageAgent {
    executed: Vec<String>,
    injected_css: Option<String>,
}

impl PageAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one delivered command, returning the acknowledgement text.
    /// 套用一筆指令並回傳回覆文字。
    pub fn apply(&mut self, command: &PageCommand) -> &'static str {
        match command {
            PageCommand::ExecuteScript { script } => {
                self.executed.push(script.clone());
                "script is executed."
            }
            PageCommand::InsertCss { css } => {
                // The previous element is dropped before the replacement is
                // attached; an empty record leaves no effective styles.
                if css.is_empty() {
                    self.injected_css = None;
                } else {
                    self.injected_css = Some(css.clone());
                }
                "css is inserted."
            }
        }
    }

    /// Scripts executed so far, in delivery order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Contents of the injected style element, if present.
    pub fn injected_css(&self) -> Option<&str> {
        self.injected_css.as_deref()
    }
}

/// Gateway over in-process page agents, for tests and headless use.
/// 測試與無頭情境使用的行程內分頁閘道。
#[derive(Debug, Default)]
pub struct InProcessTabs {
    tabs: HashMap<TabId, PageAgent>,
    active: Option<TabId>,
}

impl InProcessTabs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a tab with a fresh page agent.
    pub fn open(&mut self, tab: TabId) {
        self.tabs.entry(tab).or_default();
    }

    /// Marks a tab as the active one.
    pub fn activate(&mut self, tab: TabId) {
        self.active = Some(tab);
    }

    /// Closes a tab, clearing the active mark when it pointed there.
    pub fn close(&mut self, tab: TabId) {
        self.tabs.remove(&tab);
        if self.active == Some(tab) {
            self.active = None;
        }
    }

    pub fn agent(&self, tab: TabId) -> Option<&PageAgent> {
        self.tabs.get(&tab)
    }
}

impl TabGateway for InProcessTabs {
    fn active_tab(&self) -> Option<TabId> {
        self.active
    }

    fn send(&mut self, tab: TabId, command: &PageCommand) -> Result<(), DeliveryError> {
        match self.tabs.get_mut(&tab) {
            Some(agent) => {
                let ack = agent.apply(command);
                log::debug!("tab {tab} acknowledged: {ack}");
                Ok(())
            }
            None => Err(DeliveryError {
                tab,
                reason: "no page agent".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_records_scripts_and_replaces_css() {
        let mut agent = PageAgent::new();
        assert_eq!(
            agent.apply(&PageCommand::ExecuteScript { script: "a()".into() }),
            "script is executed."
        );
        agent.apply(&PageCommand::InsertCss { css: "p{}".into() });
        agent.apply(&PageCommand::InsertCss { css: "h1{}".into() });
        assert_eq!(agent.executed(), ["a()"]);
        // Only the latest stylesheet survives.
        assert_eq!(agent.injected_css(), Some("h1{}"));
        agent.apply(&PageCommand::InsertCss { css: String::new() });
        assert_eq!(agent.injected_css(), None);
    }

    #[test]
    fn gateway_reports_unreachable_tabs() {
        let mut tabs = InProcessTabs::new();
        tabs.open(TabId::new(1));
        tabs.activate(TabId::new(1));
        assert_eq!(tabs.active_tab(), Some(TabId::new(1)));

        let err = tabs
            .send(TabId::new(2), &PageCommand::ExecuteScript { script: "x".into() })
            .unwrap_err();
        assert_eq!(err.tab, TabId::new(2));

        tabs.close(TabId::new(1));
        assert_eq!(tabs.active_tab(), None);
    }
}
