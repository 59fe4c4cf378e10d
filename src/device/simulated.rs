//! In-process stand-in for the monofilament probe.
//!
//! Behaves like the firmware as seen over the air: connects immediately, exposes the UART
//! service and streams ASCII readings followed by the confirm token.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use super::address::DeviceAddress;
use super::transport::{
    Transport, TransportError, TransportEvent, TransportSink, UART_SERVICE, UART_TX_CHARACTERISTIC,
};
use crate::measurement::CONFIRM_TOKEN;
use crate::models::PointLevel;

#[derive(Default)]
struct ProbeShared {
    sink: Option<TransportSink>,
    address: Option<DeviceAddress>,
    notifying: bool,
    opens: usize,
    closes: usize,
}

fn lock(shared: &Mutex<ProbeShared>) -> MutexGuard<'_, ProbeShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SimulatedProbe {
    shared: Arc<Mutex<ProbeShared>>,
    failing_discovery: bool,
    sample_interval: Duration,
}

impl SimulatedProbe {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(ProbeShared::default())),
            failing_discovery: false,
            sample_interval: Duration::from_millis(5),
        }
    }

    /// Every discovery attempt reports a GATT failure.
    pub fn failing_discovery(mut self) -> Self {
        self.failing_discovery = true;
        self
    }

    /// Gap between two readings pushed by `ProbeHandle::apply_filament`.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Test-side controls. Usable after the probe was moved into a `DeviceLink`.
    pub fn handle(&self) -> ProbeHandle {
        ProbeHandle {
            shared: self.shared.clone(),
            sample_interval: self.sample_interval,
        }
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedProbe {
    fn open(&mut self, address: &DeviceAddress, sink: TransportSink) -> Result<(), TransportError> {
        let mut shared = lock(&self.shared);
        shared.opens += 1;
        shared.address = Some(*address);
        shared.notifying = false;
        sink.send(TransportEvent::Connected);
        shared.sink = Some(sink);
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        let shared = lock(&self.shared);
        let sink = shared
            .sink
            .as_ref()
            .ok_or_else(|| TransportError::Other("no open link".into()))?;
        let outcome = if self.failing_discovery {
            Err("GATT error 133".to_string())
        } else {
            Ok(())
        };
        sink.send(TransportEvent::ServicesDiscovered(outcome));
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        if service != UART_SERVICE {
            return Err(TransportError::MissingService(service));
        }
        if characteristic != UART_TX_CHARACTERISTIC {
            return Err(TransportError::MissingCharacteristic(characteristic));
        }
        lock(&self.shared).notifying = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.closes += 1;
        shared.sink = None;
        shared.address = None;
        shared.notifying = false;
    }
}

#[derive(Clone)]
pub struct ProbeHandle {
    shared: Arc<Mutex<ProbeShared>>,
    sample_interval: Duration,
}

impl ProbeHandle {
    /// Pushes one notification. Returns false when notifications are not armed.
    pub fn send_text(&self, text: &str) -> bool {
        let shared = lock(&self.shared);
        match (&shared.sink, shared.notifying) {
            (Some(sink), true) => sink.send(TransportEvent::Notification(text.as_bytes().to_vec())),
            _ => false,
        }
    }

    /// Presses a filament of `level` against the skin, lifts it and confirms.
    ///
    /// The stream ramps up through lower readings, holds `level`, drops back to `0` and ends with
    /// the confirm token, like the real probe does.
    pub async fn apply_filament(&self, level: PointLevel) {
        let readings = ramp_readings(level);
        for reading in readings {
            self.send_text(&reading);
            tokio::time::sleep(self.sample_interval).await;
        }
    }

    /// Simulates the probe walking out of range.
    pub fn drop_link(&self) {
        let shared = lock(&self.shared);
        if let Some(sink) = &shared.sink {
            sink.send(TransportEvent::Disconnected);
        }
    }

    pub fn is_notifying(&self) -> bool {
        lock(&self.shared).notifying
    }

    pub fn connected_address(&self) -> Option<DeviceAddress> {
        lock(&self.shared).address
    }

    pub fn opens(&self) -> usize {
        lock(&self.shared).opens
    }

    pub fn closes(&self) -> usize {
        lock(&self.shared).closes
    }
}

fn ramp_readings(level: PointLevel) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let target = level.value();
    let mut readings = vec!["0".to_string()];

    let mut current = 0;
    while current < target {
        current = rng.gen_range(current + 1..=target);
        readings.push(current.to_string());
    }
    let hold = rng.gen_range(1..=3);
    readings.extend(std::iter::repeat(target.to_string()).take(hold));

    readings.push("0".to_string());
    readings.push(CONFIRM_TOKEN.to_string());
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_peaks_at_target_and_ends_with_confirmation() {
        let level = PointLevel::confirmed(4).unwrap();
        for _ in 0..20 {
            let readings = ramp_readings(level);
            let numbers: Vec<u8> = readings
                .iter()
                .filter_map(|reading| reading.parse().ok())
                .collect();
            assert_eq!(numbers.iter().max(), Some(&4));
            assert!(numbers.windows(2).take(numbers.len() - 2).all(|w| w[0] <= w[1]));
            assert_eq!(readings.last().map(String::as_str), Some(CONFIRM_TOKEN));
            assert_eq!(readings[readings.len() - 2], "0");
        }
    }

    #[test]
    fn notifications_need_the_uart_characteristic() {
        let mut probe = SimulatedProbe::new();
        assert_eq!(
            probe.enable_notifications(UART_SERVICE, Uuid::nil()),
            Err(TransportError::MissingCharacteristic(Uuid::nil()))
        );
        assert!(!probe.handle().is_notifying());
    }
}
