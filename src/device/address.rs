use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::transport::TransportError;

/// 48-bit hardware address, written `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = TransportError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(raw.to_string());
        let mut octets = [0u8; 6];
        let mut parts = raw.trim().split(':');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(address: DeviceAddress) -> Self {
        address.to_string()
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_normalises_case() {
        let address: DeviceAddress = "24:0a:c4:12:ab:ff".parse().unwrap();
        assert_eq!(address.to_string(), "24:0A:C4:12:AB:FF");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in [
            "",
            "24:0A:C4:12:AB",
            "24:0A:C4:12:AB:FF:00",
            "240AC412ABFF",
            "zz:0A:C4:12:AB:FF",
            "2:0A:C4:12:AB:FF",
            "+A:BB:CC:DD:EE:FF",
            "24:0A:C4:12:AB:-F",
        ] {
            assert!(raw.parse::<DeviceAddress>().is_err(), "{raw} accepted");
        }
    }
}
