//! Clinical risk classification. Pure functions, no I/O.

pub mod grade;
pub mod scale;

pub use grade::{
    compute_limb_grade, compute_session_grade, DisabilityGrade, GradingPolicy, LimbAggregation,
};
pub use scale::{describe_level, ScaleEntry};
