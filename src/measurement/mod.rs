pub mod state;

pub use state::{MeasurementState, ReadingOutcome, CONFIRM_TOKEN};
