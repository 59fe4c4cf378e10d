use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::address::DeviceAddress;
use super::transport::{
    Transport, TransportEvent, TransportSink, UART_SERVICE, UART_TX_CHARACTERISTIC,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// The probe needs a moment after connecting before discovery succeeds reliably.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Services discovered and notifications armed; the only usable state.
    ServicesReady,
}

/// What the single measurement observer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
    Data(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub settle_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

type ObserverSlot = Arc<Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>>;

enum LinkCommand {
    Connect(String),
    Disconnect,
}

/// Handle to the one wireless session of this process.
///
/// All clones drive the same actor task, which owns the transport, so there is never more than
/// one physical connection. Observer lifetime and link lifetime are independent: detaching the
/// observer leaves the connection up.
#[derive(Clone)]
pub struct DeviceLink {
    commands: mpsc::UnboundedSender<LinkCommand>,
    observer: ObserverSlot,
    state: watch::Receiver<ConnectionState>,
    shutdown: CancellationToken,
}

impl DeviceLink {
    pub fn spawn<T: Transport>(transport: T, config: LinkConfig) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let observer: ObserverSlot = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        let actor = LinkActor {
            transport,
            settle_delay: config.settle_delay,
            generation: 0,
            session: None,
            discovery_at: None,
            discovering: false,
            observer: observer.clone(),
            state_tx,
            event_tx,
        };
        let handle = tokio::spawn(actor.run(command_rx, event_rx, shutdown.clone()));

        (
            Self {
                commands: command_tx,
                observer,
                state: state_rx,
                shutdown,
            },
            handle,
        )
    }

    /// Asynchronous; the result reaches the observer. Malformed addresses surface as
    /// `LinkEvent::Error`.
    pub fn connect(&self, address: &str) {
        self.send(LinkCommand::Connect(address.to_string()));
    }

    /// Always ends Disconnected and always notifies the observer, even with no active session.
    pub fn disconnect(&self) {
        self.send(LinkCommand::Disconnect);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// True once the link is usable (services discovered, notifications armed).
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::ServicesReady
    }

    /// Passive status feed; any number of subscribers, none of them receive payloads.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Replaces the measurement observer. The previous one is not notified; its channel just
    /// stops receiving. `None` detaches without touching the connection.
    pub fn set_observer(&self, observer: Option<mpsc::UnboundedSender<LinkEvent>>) {
        let mut slot = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = observer;
    }

    /// Registers a fresh observer channel and returns its receiving end.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.set_observer(Some(tx));
        rx
    }

    /// Stops the actor; the transport is closed on the way out.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn send(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            log_warn!("device link task is gone; command dropped");
        }
    }
}

struct ActiveSession {
    address: DeviceAddress,
    generation: u64,
}

struct LinkActor<T: Transport> {
    transport: T,
    settle_delay: Duration,
    generation: u64,
    session: Option<ActiveSession>,
    discovery_at: Option<Instant>,
    discovering: bool,
    observer: ObserverSlot,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<T: Transport> LinkActor<T> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LinkCommand>,
        mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log_info!("device link shutting down");
                    self.release();
                    break;
                }
                command = commands.recv() => match command {
                    Some(LinkCommand::Connect(raw)) => self.connect(&raw),
                    Some(LinkCommand::Disconnect) => self.teardown(),
                    None => {
                        self.release();
                        break;
                    }
                },
                Some((generation, event)) = events.recv() => {
                    self.handle_transport_event(generation, event);
                }
                _ = wait_until(self.discovery_at) => {
                    self.discovery_at = None;
                    self.start_discovery();
                }
            }
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: LinkEvent) {
        let slot = self.observer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(observer) = slot.as_ref() {
            if observer.send(event).is_err() {
                log_debug!("link observer dropped its receiver");
            }
        }
    }

    fn connect(&mut self, raw: &str) {
        let address: DeviceAddress = match raw.parse() {
            Ok(address) => address,
            Err(err) => {
                log_warn!("refusing to connect: {err}");
                self.emit(LinkEvent::Error(err.to_string()));
                return;
            }
        };

        if let Some(session) = &self.session {
            if session.address == address {
                if self.state() == ConnectionState::ServicesReady {
                    log_debug!("already connected to {address}; keeping the link");
                    self.emit(LinkEvent::Connected);
                } else if self.state() == ConnectionState::Connected
                    && self.discovery_at.is_none()
                    && !self.discovering
                {
                    log_info!("link to {address} is up without services; rediscovering");
                    self.start_discovery();
                } else {
                    log_debug!("connection to {address} already in progress");
                }
                return;
            }
            log_info!("switching probe from {} to {address}", session.address);
            self.teardown();
        }

        self.generation += 1;
        let sink = TransportSink::new(self.generation, self.event_tx.clone());
        self.set_state(ConnectionState::Connecting);
        log_info!("opening link to {address}");

        match self.transport.open(&address, sink) {
            Ok(()) => {
                self.session = Some(ActiveSession {
                    address,
                    generation: self.generation,
                });
            }
            Err(err) => {
                log_warn!("failed to open link to {address}: {err}");
                self.transport.close();
                self.set_state(ConnectionState::Disconnected);
                self.emit(LinkEvent::Error(err.to_string()));
            }
        }
    }

    /// Releases the radio and clears the session without notifying anyone.
    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            log_info!("closing link to {}", session.address);
            self.transport.close();
        }
        self.discovery_at = None;
        self.discovering = false;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Shared by programmatic and hardware-initiated disconnects.
    fn teardown(&mut self) {
        self.release();
        self.emit(LinkEvent::Disconnected);
    }

    fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) {
        let current = self.session.as_ref().map(|session| session.generation);
        if current != Some(generation) {
            log_debug!("dropping {event:?} from stale link generation {generation}");
            return;
        }

        match event {
            TransportEvent::Connected => {
                log_info!("link up; discovering services after settle delay");
                self.set_state(ConnectionState::Connected);
                self.discovery_at = Some(Instant::now() + self.settle_delay);
            }
            TransportEvent::ServicesDiscovered(Ok(())) => {
                self.discovering = false;
                self.arm_notifications();
            }
            TransportEvent::ServicesDiscovered(Err(reason)) => {
                // Link stays up; connecting again to the same address retries discovery.
                self.discovering = false;
                log_warn!("service discovery failed: {reason}");
                self.emit(LinkEvent::Error(format!("service discovery failed: {reason}")));
            }
            TransportEvent::Notification(payload) => {
                let text = String::from_utf8_lossy(&payload).into_owned();
                self.emit(LinkEvent::Data(text));
            }
            TransportEvent::Disconnected => {
                log_info!("link dropped by device");
                self.teardown();
            }
        }
    }

    fn start_discovery(&mut self) {
        if self.session.is_none() || self.state() != ConnectionState::Connected {
            return;
        }
        match self.transport.discover_services() {
            Ok(()) => self.discovering = true,
            Err(err) => {
                log_warn!("could not start service discovery: {err}");
                self.emit(LinkEvent::Error(err.to_string()));
            }
        }
    }

    fn arm_notifications(&mut self) {
        match self
            .transport
            .enable_notifications(UART_SERVICE, UART_TX_CHARACTERISTIC)
        {
            Ok(()) => {
                log_info!("notifications armed; probe ready");
                self.set_state(ConnectionState::ServicesReady);
                self.emit(LinkEvent::Connected);
            }
            Err(err) => {
                log_warn!("could not arm notifications: {err}");
                self.emit(LinkEvent::Error(err.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::{ProbeHandle, SimulatedProbe};

    const PROBE: &str = "24:0A:C4:12:AB:FF";
    const OTHER_PROBE: &str = "24:0A:C4:12:AB:00";

    fn spawn_link(probe: SimulatedProbe) -> (DeviceLink, ProbeHandle) {
        let handle = probe.handle();
        let config = LinkConfig {
            settle_delay: Duration::from_millis(5),
        };
        let (link, _task) = DeviceLink::spawn(probe, config);
        (link, handle)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
        time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("observer channel closed")
    }

    async fn settle() {
        time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn reports_connected_only_after_notifications_are_armed() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);
        assert!(link.is_connected());
        assert!(probe.is_notifying());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_always_notifies() {
        let (link, _probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.disconnect();
        link.disconnect();
        assert_eq!(next(&mut events).await, LinkEvent::Disconnected);
        assert_eq!(next(&mut events).await, LinkEvent::Disconnected);
        settle().await;
        assert!(events.try_recv().is_err());
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn same_address_reconnect_keeps_transport_session() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);
        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);

        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 0);
    }

    #[tokio::test]
    async fn switching_address_tears_down_first() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);
        link.connect(OTHER_PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Disconnected);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);

        assert_eq!(probe.opens(), 2);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn malformed_address_reports_error_without_opening() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.connect("not-an-address");
        assert!(matches!(next(&mut events).await, LinkEvent::Error(_)));
        assert_eq!(probe.opens(), 0);
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn hardware_disconnect_releases_radio_and_notifies_once() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();

        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);
        probe.drop_link();
        assert_eq!(next(&mut events).await, LinkEvent::Disconnected);
        settle().await;

        assert!(events.try_recv().is_err());
        assert_eq!(probe.closes(), 1);
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn discovery_failure_is_reported_but_link_stays_up() {
        let (link, probe) = spawn_link(SimulatedProbe::new().failing_discovery());
        let mut events = link.observe();

        link.connect(PROBE);
        assert!(matches!(next(&mut events).await, LinkEvent::Error(_)));
        assert_eq!(link.state(), ConnectionState::Connected);
        assert!(!link.is_connected());
        assert_eq!(probe.closes(), 0);
    }

    #[tokio::test]
    async fn reconnecting_after_failed_discovery_retries_it() {
        let (link, probe) = spawn_link(SimulatedProbe::new().failing_discovery());
        let mut events = link.observe();

        link.connect(PROBE);
        assert!(matches!(next(&mut events).await, LinkEvent::Error(_)));

        link.connect(PROBE);
        match next(&mut events).await {
            LinkEvent::Error(reason) => assert!(reason.contains("service discovery failed")),
            other => panic!("expected a second discovery error, got {other:?}"),
        }
        assert_eq!(link.state(), ConnectionState::Connected);
        assert_eq!(probe.opens(), 1);
        assert_eq!(probe.closes(), 0);
    }

    #[tokio::test]
    async fn detaching_observer_keeps_the_connection() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut events = link.observe();
        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);

        link.set_observer(None);
        probe.send_text("3");
        settle().await;

        assert!(link.is_connected());
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn new_observer_replaces_old_one() {
        let (link, probe) = spawn_link(SimulatedProbe::new());
        let mut first = link.observe();
        link.connect(PROBE);
        assert_eq!(next(&mut first).await, LinkEvent::Connected);

        let mut second = link.observe();
        probe.send_text("4");
        assert_eq!(next(&mut second).await, LinkEvent::Data("4".into()));
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn status_watchers_see_transitions() {
        let (link, _probe) = spawn_link(SimulatedProbe::new());
        let mut status = link.subscribe_status();
        let mut events = link.observe();

        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow_and_update(), ConnectionState::ServicesReady);
    }

    #[tokio::test]
    async fn shutdown_closes_the_transport() {
        let probe = SimulatedProbe::new();
        let handle = probe.handle();
        let (link, task) = DeviceLink::spawn(
            probe,
            LinkConfig {
                settle_delay: Duration::from_millis(5),
            },
        );
        let mut events = link.observe();
        link.connect(PROBE);
        assert_eq!(next(&mut events).await, LinkEvent::Connected);

        link.shutdown();
        task.await.unwrap();
        assert_eq!(handle.closes(), 1);
    }
}
