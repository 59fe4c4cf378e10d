mod controller;
mod state;

pub use controller::EncounterController;
pub use state::{new_session_id, EncounterSnapshot, EncounterState};
