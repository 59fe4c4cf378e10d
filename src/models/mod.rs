pub mod anatomy;
pub mod reading;
pub mod session;

pub use anatomy::{AnatomicalPart, PointPosition, MAX_POINTS};
pub use reading::PointLevel;
pub use session::{
    LimbEntry, LimbResult, PatientHistory, PatientRef, RecentPatient, SessionHistory,
    SessionRecord, TestRow,
};
