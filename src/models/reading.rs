use std::fmt;

use serde::{Deserialize, Serialize};

/// One monofilament level on the closed ordinal scale 0..=6.
///
/// 0 means nothing measured yet; 1..=6 are increasing filament forces, higher is worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PointLevel(u8);

impl PointLevel {
    pub const UNSET: PointLevel = PointLevel(0);
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    /// A level that represents an actual detection (> 0).
    pub fn confirmed(value: u8) -> Option<Self> {
        (1..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_confirmed(self) -> bool {
        self.0 > 0
    }
}

impl TryFrom<u8> for PointLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PointLevel::new(value).ok_or_else(|| format!("level {value} outside 0..={}", PointLevel::MAX))
    }
}

impl From<PointLevel> for u8 {
    fn from(level: PointLevel) -> Self {
        level.0
    }
}

impl fmt::Display for PointLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
