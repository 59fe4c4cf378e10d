mod address;
mod link;
pub mod simulated;
mod transport;

pub use address::DeviceAddress;
pub use link::{ConnectionState, DeviceLink, LinkConfig, LinkEvent, DEFAULT_SETTLE_DELAY};
pub use simulated::{ProbeHandle, SimulatedProbe};
pub use transport::{
    Transport, TransportError, TransportEvent, TransportSink, UART_SERVICE,
    UART_TX_CHARACTERISTIC,
};
