use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::PointLevel;

/// WHO physical-disability grade (GIF) for a limb or a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DisabilityGrade {
    #[default]
    Zero,
    One,
    Two,
}

impl DisabilityGrade {
    pub fn as_u8(self) -> u8 {
        match self {
            DisabilityGrade::Zero => 0,
            DisabilityGrade::One => 1,
            DisabilityGrade::Two => 2,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            DisabilityGrade::Zero => "Grau 0: Sensibilidade Preservada",
            DisabilityGrade::One => "Grau 1: Perda de Sensibilidade Protetora",
            DisabilityGrade::Two => "Grau 2: Risco Elevado",
        }
    }

    pub fn is_at_risk(self) -> bool {
        self > DisabilityGrade::Zero
    }
}

impl TryFrom<u8> for DisabilityGrade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisabilityGrade::Zero),
            1 => Ok(DisabilityGrade::One),
            2 => Ok(DisabilityGrade::Two),
            other => Err(format!("disability grade {other} outside 0..=2")),
        }
    }
}

impl From<DisabilityGrade> for u8 {
    fn from(grade: DisabilityGrade) -> Self {
        grade.as_u8()
    }
}

impl fmt::Display for DisabilityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// How per-point levels collapse into one limb figure before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimbAggregation {
    /// Worst point decides.
    #[default]
    Max,
    /// Mean sensitivity level across measured points.
    Average,
}

/// Grade-1 boundary and limb aggregation.
///
/// Deployed builds have disagreed on both knobs (threshold 4 vs 5, max vs average). The default
/// is max-based with the boundary at level 5 (Laranja, 10g).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingPolicy {
    pub protective_loss_level: u8,
    pub aggregation: LimbAggregation,
}

pub const PROTECTIVE_LOSS_LEVEL: u8 = 5;

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            protective_loss_level: PROTECTIVE_LOSS_LEVEL,
            aggregation: LimbAggregation::Max,
        }
    }
}

impl GradingPolicy {
    pub fn limb_grade<I>(&self, levels: I, deformity_present: bool) -> DisabilityGrade
    where
        I: IntoIterator<Item = PointLevel>,
    {
        if deformity_present {
            return DisabilityGrade::Two;
        }

        let threshold = f64::from(self.protective_loss_level);
        let confirmed = levels.into_iter().filter(|level| level.is_confirmed());
        let figure = match self.aggregation {
            LimbAggregation::Max => confirmed.map(|level| f64::from(level.value())).fold(0.0, f64::max),
            LimbAggregation::Average => {
                let (sum, count) = confirmed.fold((0u32, 0u32), |(sum, count), level| {
                    (sum + u32::from(level.value()), count + 1)
                });
                if count == 0 {
                    0.0
                } else {
                    f64::from(sum) / f64::from(count)
                }
            }
        };

        if figure >= threshold {
            DisabilityGrade::One
        } else {
            DisabilityGrade::Zero
        }
    }
}

/// Limb grade under the default policy.
///
/// An empty set grades as 0; the finalize guard keeps empty limbs out of the normal flow.
pub fn compute_limb_grade<I>(levels: I, deformity_present: bool) -> DisabilityGrade
where
    I: IntoIterator<Item = PointLevel>,
{
    GradingPolicy::default().limb_grade(levels, deformity_present)
}

/// Worst limb wins. An empty session grades as 0.
pub fn compute_session_grade<I>(limb_grades: I) -> DisabilityGrade
where
    I: IntoIterator<Item = DisabilityGrade>,
{
    limb_grades.into_iter().max().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(values: &[u8]) -> Vec<PointLevel> {
        values
            .iter()
            .map(|v| PointLevel::new(*v).unwrap())
            .collect()
    }

    #[test]
    fn deformity_overrides_any_sensory_finding() {
        assert_eq!(compute_limb_grade(levels(&[1, 2, 3]), true), DisabilityGrade::Two);
        assert_eq!(compute_limb_grade(levels(&[]), true), DisabilityGrade::Two);
    }

    #[test]
    fn grade_one_starts_at_level_five() {
        assert_eq!(compute_limb_grade(levels(&[4]), false), DisabilityGrade::Zero);
        assert_eq!(compute_limb_grade(levels(&[5]), false), DisabilityGrade::One);
        assert_eq!(compute_limb_grade(levels(&[1, 6, 2]), false), DisabilityGrade::One);
    }

    #[test]
    fn empty_limb_grades_as_baseline() {
        assert_eq!(compute_limb_grade(levels(&[]), false), DisabilityGrade::Zero);
    }

    #[test]
    fn session_grade_is_the_worst_limb() {
        let grades = [0u8, 0, 2, 1]
            .iter()
            .map(|g| DisabilityGrade::try_from(*g).unwrap());
        assert_eq!(compute_session_grade(grades), DisabilityGrade::Two);
        assert_eq!(compute_session_grade(Vec::new()), DisabilityGrade::Zero);
    }

    #[test]
    fn alternative_policies_are_explicit() {
        let lower = GradingPolicy {
            protective_loss_level: 4,
            aggregation: LimbAggregation::Max,
        };
        assert_eq!(lower.limb_grade(levels(&[4]), false), DisabilityGrade::One);

        let average = GradingPolicy {
            protective_loss_level: 5,
            aggregation: LimbAggregation::Average,
        };
        assert_eq!(average.limb_grade(levels(&[6, 1, 1]), false), DisabilityGrade::Zero);
        assert_eq!(average.limb_grade(levels(&[6, 5, 4]), false), DisabilityGrade::One);
    }

    #[test]
    fn grades_serialise_as_integers() {
        assert_eq!(serde_json::to_string(&DisabilityGrade::Two).unwrap(), "2");
        assert!(serde_json::from_str::<DisabilityGrade>("3").is_err());
    }
}
