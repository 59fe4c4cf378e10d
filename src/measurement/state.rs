use serde::Serialize;

use crate::error::{SessionError, SessionResult};
use crate::models::PointLevel;

/// Literal the probe sends when the clinician presses its confirm button.
pub const CONFIRM_TOKEN: &str = "Enviado";

/// What a single raw payload did to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingOutcome {
    /// Not a number and not the confirm token.
    Ignored,
    /// Live value updated; `0` means the probe currently reads nothing.
    Live(PointLevel),
    /// Confirmation froze a value for the armed point.
    Committed { point: usize, level: PointLevel },
    /// Confirmation arrived with no armed point or no non-zero reading.
    ConfirmationDropped,
}

/// Per-point handshake between a point selection, the noisy reading stream and the
/// probe's explicit confirmation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementState {
    armed_point: Option<usize>,
    last_non_zero: PointLevel,
    live_value: PointLevel,
    /// A finalize/save is in flight; point selection is refused meanwhile.
    #[serde(skip)]
    busy: bool,
}

impl MeasurementState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed_point(&self) -> Option<usize> {
        self.armed_point
    }

    pub fn live_value(&self) -> PointLevel {
        self.live_value
    }

    pub fn last_non_zero(&self) -> PointLevel {
        self.last_non_zero
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    /// Arms `index`, retargeting any previously armed point.
    pub fn select_point(&mut self, index: usize) -> SessionResult<()> {
        if self.busy {
            return Err(SessionError::SaveInFlight);
        }
        self.armed_point = Some(index);
        self.last_non_zero = PointLevel::UNSET;
        self.live_value = PointLevel::UNSET;
        Ok(())
    }

    pub fn on_raw_reading(&mut self, text: &str) -> ReadingOutcome {
        let clean = text.trim();

        if clean.eq_ignore_ascii_case(CONFIRM_TOKEN) {
            let level = self.last_non_zero;
            return match self.armed_point {
                Some(point) if level.is_confirmed() => {
                    self.armed_point = None;
                    ReadingOutcome::Committed { point, level }
                }
                _ => ReadingOutcome::ConfirmationDropped,
            };
        }

        let Some(level) = clean.parse::<u8>().ok().and_then(PointLevel::new) else {
            return ReadingOutcome::Ignored;
        };

        if level.is_confirmed() {
            self.last_non_zero = level;
        }
        self.live_value = level;
        ReadingOutcome::Live(level)
    }

    /// Disarms without committing.
    pub fn cancel(&mut self) {
        self.armed_point = None;
    }

    /// Back to a fresh, unarmed state; used when a screen is torn down.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut MeasurementState, readings: &[&str]) -> Vec<ReadingOutcome> {
        readings.iter().map(|r| state.on_raw_reading(r)).collect()
    }

    fn level(value: u8) -> PointLevel {
        PointLevel::new(value).unwrap()
    }

    #[test]
    fn confirmation_without_armed_point_is_dropped() {
        let mut state = MeasurementState::new();
        let outcomes = feed(&mut state, &["3", "4", "Enviado"]);
        assert_eq!(outcomes.last(), Some(&ReadingOutcome::ConfirmationDropped));
        assert_eq!(state.armed_point(), None);
    }

    #[test]
    fn last_non_zero_reading_wins() {
        let mut state = MeasurementState::new();
        state.select_point(2).unwrap();
        let outcomes = feed(&mut state, &["1", "0", "5", "3", "0", "0", " enviado \n"]);
        assert_eq!(
            outcomes.last(),
            Some(&ReadingOutcome::Committed {
                point: 2,
                level: level(3)
            })
        );
        assert_eq!(state.armed_point(), None);
    }

    #[test]
    fn confirmation_with_only_zero_readings_keeps_point_armed() {
        let mut state = MeasurementState::new();
        state.select_point(1).unwrap();
        let outcomes = feed(&mut state, &["0", "ENVIADO"]);
        assert_eq!(outcomes[1], ReadingOutcome::ConfirmationDropped);
        assert_eq!(state.armed_point(), Some(1));
    }

    #[test]
    fn live_value_tracks_zero_but_scratch_does_not() {
        let mut state = MeasurementState::new();
        state.select_point(0).unwrap();
        feed(&mut state, &["4", "0"]);
        assert_eq!(state.live_value(), PointLevel::UNSET);
        assert_eq!(state.last_non_zero(), level(4));
    }

    #[test]
    fn garbage_and_out_of_scale_numbers_are_ignored() {
        let mut state = MeasurementState::new();
        state.select_point(0).unwrap();
        assert_eq!(state.on_raw_reading("abc"), ReadingOutcome::Ignored);
        assert_eq!(state.on_raw_reading("-1"), ReadingOutcome::Ignored);
        assert_eq!(state.on_raw_reading("42"), ReadingOutcome::Ignored);
        assert_eq!(state.on_raw_reading(""), ReadingOutcome::Ignored);
        assert_eq!(state.last_non_zero(), PointLevel::UNSET);
    }

    #[test]
    fn reselecting_retargets_and_clears_scratch() {
        let mut state = MeasurementState::new();
        state.select_point(0).unwrap();
        feed(&mut state, &["6"]);
        state.select_point(3).unwrap();
        assert_eq!(state.armed_point(), Some(3));
        assert_eq!(
            state.on_raw_reading("Enviado"),
            ReadingOutcome::ConfirmationDropped
        );
    }

    #[test]
    fn cancel_disarms_without_commit() {
        let mut state = MeasurementState::new();
        state.select_point(4).unwrap();
        feed(&mut state, &["5"]);
        state.cancel();
        assert_eq!(
            state.on_raw_reading("Enviado"),
            ReadingOutcome::ConfirmationDropped
        );
    }

    #[test]
    fn selection_is_refused_while_saving() {
        let mut state = MeasurementState::new();
        state.set_busy(true);
        assert_eq!(state.select_point(0), Err(SessionError::SaveInFlight));
        state.set_busy(false);
        assert!(state.select_point(0).is_ok());
    }
}
