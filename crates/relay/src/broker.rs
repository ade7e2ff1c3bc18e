use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use thiserror::Error;

use crate::message::{PageCommand, RelayMessage, TabId};

/// Identity of one long-lived panel port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(u64);

/// Errors raised on the panel side of the relay.
/// 面板端中繼操作的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("refusing to insert empty css")]
    EmptyCss,
    #[error("relay broker is gone")]
    Disconnected,
}

/// Failure to reach a tab's page context.
#[derive(Debug, Error)]
#[error("tab {tab} is unreachable: {reason}")]
pub struct DeliveryError {
    pub tab: TabId,
    pub reason: String,
}

/// Which tab script/css records are delivered into.
/// 指令實際送達哪個分頁。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryTarget {
    /// Whichever tab the gateway reports active at send time — the panel's
    /// historical contract, which can differ from the sender's registered
    /// tab after a tab switch.
    #[default]
    ActiveTab,
    /// The tab id carried by the record itself.
    RegisteredTab,
}

/// Seam to the browser's tab surface: the currently active tab, and
/// one-shot command delivery into a tab's page context.
/// 瀏覽器分頁介面：查詢目前作用中的分頁，並將指令一次性送入頁面。
pub trait TabGateway {
    fn active_tab(&self) -> Option<TabId>;
    fn send(&mut self, tab: TabId, command: &PageCommand) -> Result<(), DeliveryError>;
}

enum PortEvent {
    Message { port: PortId, message: RelayMessage },
    Disconnect { port: PortId },
    FromPage { tab: TabId, message: RelayMessage },
}

/// Process-wide broker multiplexing panel ports against page tabs. Events
/// flow through one FIFO queue and are handled to completion inside
/// [`RelayBroker::pump`], so per-tab records keep their send order.
/// 行程層級的中介者，透過單一 FIFO 佇列多工面板連接埠與分頁；事件於
/// `pump` 內逐一處理完畢，因此同一分頁的紀錄保持送出順序。
pub struct RelayBroker<G: TabGateway> {
    gateway: G,
    delivery: DeliveryTarget,
    events: Receiver<PortEvent>,
    queue: Sender<PortEvent>,
    next_port: u64,
    ports: HashMap<PortId, Sender<RelayMessage>>,
    connections: HashMap<TabId, PortId>,
}

impl<G: TabGateway> RelayBroker<G> {
    pub fn new(gateway: G) -> Self {
        let (queue, events) = channel();
        Self {
            gateway,
            delivery: DeliveryTarget::default(),
            events,
            queue,
            next_port: 1,
            ports: HashMap::new(),
            connections: HashMap::new(),
        }
    }

    /// Overrides how delivery targets are resolved.
    pub fn with_delivery(mut self, delivery: DeliveryTarget) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    /// Number of tabs with a registered port.
    pub fn registered_tabs(&self) -> usize {
        self.connections.len()
    }

    /// Opens a long-lived port for a panel inspecting `tab`. The port is
    /// only associated with the tab once its INIT record arrives.
    /// 為檢視 `tab` 的面板開啟長連線埠；收到 INIT 紀錄後才建立對應。
    pub fn connect(&mut self, tab: TabId) -> PanelConnection {
        let port = PortId(self.next_port);
        self.next_port += 1;
        let (tx, rx) = channel();
        self.ports.insert(port, tx);
        PanelConnection {
            port,
            tab,
            queue: self.queue.clone(),
            incoming: rx,
        }
    }

    /// Hands an unsolicited page-agent record to the broker.
    pub fn page_message(&self, tab: TabId, message: RelayMessage) {
        let _ = self.queue.send(PortEvent::FromPage { tab, message });
    }

    /// Drains queued events, handling each to completion. Returns how many
    /// events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, event: PortEvent) {
        match event {
            PortEvent::Message { port, message } => self.handle_port_message(port, message),
            PortEvent::Disconnect { port } => self.disconnect(port),
            PortEvent::FromPage { tab, message } => self.forward_page_message(tab, message),
        }
    }

    fn handle_port_message(&mut self, port: PortId, message: RelayMessage) {
        match message {
            RelayMessage::Init { tab_id } => {
                log::debug!("port registered for tab {tab_id}");
                self.connections.insert(tab_id, port);
            }
            RelayMessage::ExecuteScript { tab_id, script } => {
                self.deliver(tab_id, PageCommand::ExecuteScript { script });
            }
            RelayMessage::InsertCss { tab_id, css } => {
                self.deliver(tab_id, PageCommand::InsertCss { css });
            }
            RelayMessage::QuickReload { tab_id } => {
                log::debug!("quick reload for tab {tab_id} is reserved; ignoring");
            }
        }
    }

    /// One-shot delivery; unreachable targets are logged and dropped,
    /// never queued or retried.
    fn deliver(&mut self, registered: TabId, command: PageCommand) {
        let target = match self.delivery {
            DeliveryTarget::ActiveTab => self.gateway.active_tab(),
            DeliveryTarget::RegisteredTab => Some(registered),
        };
        let Some(target) = target else {
            log::warn!("no active tab; dropping {}", command.name());
            return;
        };
        if let Err(err) = self.gateway.send(target, &command) {
            log::warn!("dropping undeliverable {}: {err}", command.name());
        }
    }

    fn disconnect(&mut self, port: PortId) {
        self.ports.remove(&port);
        // The registered key may not match the tab that was active when the
        // port last sent, so the mapping is swept by value.
        self.connections.retain(|_, registered| *registered != port);
    }

    fn forward_page_message(&mut self, tab: TabId, message: RelayMessage) {
        let Some(port) = self.connections.get(&tab) else {
            log::info!("tab {tab} not found in connection list; dropping page message");
            return;
        };
        let Some(sender) = self.ports.get(port) else {
            log::warn!("tab {tab} maps to a closed port; dropping page message");
            return;
        };
        if sender.send(message).is_err() {
            log::warn!("panel port for tab {tab} is gone; dropping page message");
        }
    }
}

/// Panel-side handle to the broker: one long-lived port bound to the
/// inspected tab, plus the inbox of records forwarded from the page.
/// 面板端的中介者握把：綁定受檢分頁的長連線埠，外加頁面轉送紀錄的收件匣。
pub struct PanelConnection {
    port: PortId,
    tab: TabId,
    queue: Sender<PortEvent>,
    incoming: Receiver<RelayMessage>,
}

impl PanelConnection {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    /// Registers this port for the inspected tab.
    pub fn init(&self) -> Result<(), RelayError> {
        self.post(RelayMessage::Init { tab_id: self.tab })
    }

    /// Sends JavaScript for one-shot execution in the page.
    pub fn execute_script(&self, script: &str) -> Result<(), RelayError> {
        self.post(RelayMessage::ExecuteScript {
            tab_id: self.tab,
            script: script.to_string(),
        })
    }

    /// Replaces the page's injected stylesheet. Empty css is refused;
    /// clearing goes through [`PanelConnection::clear_css`].
    pub fn insert_css(&self, css: &str) -> Result<(), RelayError> {
        if css.is_empty() {
            log::error!("refusing to insert empty css");
            return Err(RelayError::EmptyCss);
        }
        self.post(RelayMessage::InsertCss {
            tab_id: self.tab,
            css: css.to_string(),
        })
    }

    /// Clears the injected stylesheet with an explicit empty record.
    pub fn clear_css(&self) -> Result<(), RelayError> {
        self.post(RelayMessage::InsertCss {
            tab_id: self.tab,
            css: String::new(),
        })
    }

    /// Next record forwarded from the page, if any.
    pub fn try_recv(&self) -> Option<RelayMessage> {
        self.incoming.try_recv().ok()
    }

    fn post(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.queue
            .send(PortEvent::Message {
                port: self.port,
                message,
            })
            .map_err(|_| RelayError::Disconnected)
    }
}

impl Drop for PanelConnection {
    fn drop(&mut self) {
        let _ = self.queue.send(PortEvent::Disconnect { port: self.port });
    }
}
