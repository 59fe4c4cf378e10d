//! Boundary to the platform radio stack.
//!
//! A transport only has to open one link at a time, discover services, arm notifications on
//! the probe's TX characteristic and report what happens through a `TransportSink`.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::address::DeviceAddress;

/// Nordic UART service exposed by the probe firmware.
pub const UART_SERVICE: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);
/// Notify characteristic carrying the probe's text payloads.
pub const UART_TX_CHARACTERISTIC: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid device address '{0}'")]
    InvalidAddress(String),

    #[error("radio unavailable: {0}")]
    Unavailable(String),

    #[error("service {0} not found on device")]
    MissingService(Uuid),

    #[error("characteristic {0} not found on device")]
    MissingCharacteristic(Uuid),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Link-layer connection established; services are not known yet.
    Connected,
    /// Link lost, either requested or hardware-initiated.
    Disconnected,
    ServicesDiscovered(Result<(), String>),
    Notification(Vec<u8>),
}

/// Delivers events for one connection attempt. Each attempt gets its own generation so late
/// events from a torn-down link can be told apart.
#[derive(Debug, Clone)]
pub struct TransportSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the link owner is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

pub trait Transport: Send + 'static {
    /// Starts connecting; the outcome arrives on `sink`.
    fn open(&mut self, address: &DeviceAddress, sink: TransportSink) -> Result<(), TransportError>;

    /// Starts service discovery; answered with `TransportEvent::ServicesDiscovered`.
    fn discover_services(&mut self) -> Result<(), TransportError>;

    fn enable_notifications(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    /// Disconnects and releases the radio resource. Must be safe to call on a dead link.
    fn close(&mut self);
}
