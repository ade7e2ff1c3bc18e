//! Per-tab message relay between the Pagesmith panel and inspected pages.
//! Pagesmith 面板與受檢頁面之間的分頁訊息中繼。

pub mod broker;
pub mod message;
pub mod page;

pub use broker::{
    DeliveryError, DeliveryTarget, PanelConnection, PortId, RelayBroker, RelayError, TabGateway,
};
pub use message::{PageCommand, RelayMessage, TabId};
pub use page::{InProcessTabs, PageAgent, STYLE_ELEMENT_ID};
