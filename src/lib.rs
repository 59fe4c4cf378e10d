//! Core of a monofilament neuropathy screening app: the probe link, the per-point
//! measurement handshake, per-limb result caching, WHO disability grading and the
//! session history built from persisted exams.

pub mod aggregate;
pub mod cache;
pub mod db;
pub mod device;
pub mod encounter;
pub mod error;
pub mod measurement;
pub mod models;
pub mod risk;
pub mod settings;
pub mod store;
pub mod utils;

pub use aggregate::{build_session_record, group_history, recent_patients, EncounterInfo};
pub use db::Database;
pub use device::{ConnectionState, DeviceLink, LinkConfig, LinkEvent, SimulatedProbe};
pub use encounter::{EncounterController, EncounterSnapshot};
pub use error::{SessionError, SessionResult};
pub use models::{AnatomicalPart, PatientRef, PointLevel};
pub use risk::{compute_limb_grade, compute_session_grade, describe_level, DisabilityGrade};
pub use settings::SettingsStore;
pub use store::SessionStore;
pub use utils::init_logging;
