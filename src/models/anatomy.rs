//! Anatomical parts under test and their static point layout.
//!
//! Point count, ordering and diagram placement are fixed configuration. Nothing here is
//! computed from images.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Normalised position of a test point on the part's diagram (0.0..=1.0 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PointPosition {
    pub x: f32,
    pub y: f32,
}

const fn at(x: f32, y: f32) -> PointPosition {
    PointPosition { x, y }
}

const RIGHT_HAND_POINTS: [PointPosition; 6] = [
    at(0.08, 0.35),
    at(0.58, 0.26),
    at(0.57, 0.42),
    at(0.16, 0.47),
    at(0.86, 0.51),
    at(0.22, 0.61),
];

const LEFT_HAND_POINTS: [PointPosition; 6] = [
    at(0.92, 0.35),
    at(0.42, 0.26),
    at(0.43, 0.42),
    at(0.84, 0.47),
    at(0.14, 0.51),
    at(0.78, 0.61),
];

const RIGHT_FOOT_POINTS: [PointPosition; 9] = [
    at(0.37, 0.26),
    at(0.26, 0.48),
    at(0.69, 0.21),
    at(0.13, 0.34),
    at(0.45, 0.35),
    at(0.77, 0.37),
    at(0.39, 0.66),
    at(0.74, 0.61),
    at(0.69, 0.80),
];

const LEFT_FOOT_POINTS: [PointPosition; 9] = [
    at(0.63, 0.26),
    at(0.74, 0.48),
    at(0.31, 0.21),
    at(0.87, 0.34),
    at(0.55, 0.35),
    at(0.23, 0.37),
    at(0.61, 0.66),
    at(0.26, 0.61),
    at(0.31, 0.80),
];

/// Upper bound on points for any part; sizes the fixed per-limb storage.
pub const MAX_POINTS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnatomicalPart {
    RightHand,
    LeftHand,
    RightFoot,
    LeftFoot,
}

impl AnatomicalPart {
    pub const ALL: [AnatomicalPart; 4] = [
        AnatomicalPart::RightHand,
        AnatomicalPart::LeftHand,
        AnatomicalPart::RightFoot,
        AnatomicalPart::LeftFoot,
    ];

    /// Identifier used by persisted test rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnatomicalPart::RightHand => "mao_direita",
            AnatomicalPart::LeftHand => "mao_esquerda",
            AnatomicalPart::RightFoot => "pe_direito",
            AnatomicalPart::LeftFoot => "pe_esquerdo",
        }
    }

    pub fn is_hand(&self) -> bool {
        matches!(self, AnatomicalPart::RightHand | AnatomicalPart::LeftHand)
    }

    pub fn layout(&self) -> &'static [PointPosition] {
        match self {
            AnatomicalPart::RightHand => &RIGHT_HAND_POINTS,
            AnatomicalPart::LeftHand => &LEFT_HAND_POINTS,
            AnatomicalPart::RightFoot => &RIGHT_FOOT_POINTS,
            AnatomicalPart::LeftFoot => &LEFT_FOOT_POINTS,
        }
    }

    /// Hands carry 6 points, feet 9.
    pub fn point_count(&self) -> usize {
        self.layout().len()
    }

    pub fn contains_point(&self, index: usize) -> bool {
        index < self.point_count()
    }
}

impl fmt::Display for AnatomicalPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnatomicalPart {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "mao_direita" => Ok(AnatomicalPart::RightHand),
            "mao_esquerda" => Ok(AnatomicalPart::LeftHand),
            "pe_direito" => Ok(AnatomicalPart::RightFoot),
            "pe_esquerdo" => Ok(AnatomicalPart::LeftFoot),
            other => Err(anyhow::anyhow!("unknown body part '{other}'")),
        }
    }
}

/// Serde adapter writing a part as its row identifier (`mao_direita`, ...).
pub mod part_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::AnatomicalPart;

    pub fn serialize<S: Serializer>(part: &AnatomicalPart, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(part.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<AnatomicalPart, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}
