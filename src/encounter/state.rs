use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::aggregate::{build_session_record, EncounterInfo};
use crate::cache::LimbResultCache;
use crate::device::ConnectionState;
use crate::error::{SessionError, SessionResult};
use crate::measurement::{MeasurementState, ReadingOutcome};
use crate::models::{AnatomicalPart, LimbResult, PatientRef, PointLevel, SessionRecord};
use crate::risk::{describe_level, GradingPolicy, ScaleEntry};

/// `ddMMyy_HHmm` in local time, e.g. `050325_1430`.
pub fn new_session_id(now: DateTime<Local>) -> String {
    now.format("%d%m%y_%H%M").to_string()
}

/// What a screen needs to render the encounter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterSnapshot {
    pub session_id: Option<String>,
    pub active_part: Option<AnatomicalPart>,
    pub armed_point: Option<usize>,
    pub live_value: PointLevel,
    pub live_scale: ScaleEntry,
    pub points: BTreeMap<usize, PointLevel>,
    pub completed_parts: Vec<AnatomicalPart>,
    pub deformity: bool,
    pub saving: bool,
    pub connection: ConnectionState,
}

/// One clinical encounter: the handshake for the armed point, the per-limb cache and the
/// session-wide deformity flag.
#[derive(Debug, Default)]
pub struct EncounterState {
    info: Option<EncounterInfo>,
    measurement: MeasurementState,
    cache: LimbResultCache,
    deformity: bool,
}

impl EncounterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every limb; the only place the cache is wiped.
    pub fn start(&mut self, info: EncounterInfo) {
        self.cache.clear();
        self.measurement.reset();
        self.deformity = false;
        self.info = Some(info);
    }

    pub fn info(&self) -> Option<&EncounterInfo> {
        self.info.as_ref()
    }

    pub fn cache(&self) -> &LimbResultCache {
        &self.cache
    }

    pub fn measurement(&self) -> &MeasurementState {
        &self.measurement
    }

    pub fn begin_limb(&mut self, part: AnatomicalPart) {
        self.cache.begin(part);
        self.reset_measurement();
    }

    pub fn select_point(&mut self, index: usize) -> SessionResult<()> {
        let part = self.cache.active_part().ok_or(SessionError::NoActiveLimb)?;
        if !part.contains_point(index) {
            return Err(SessionError::PointOutOfRange { part, index });
        }
        self.measurement.select_point(index)
    }

    pub fn cancel_measurement(&mut self) {
        self.measurement.cancel();
    }

    /// Feeds one payload through the handshake; a commit lands in the limb under test.
    pub fn apply_reading(&mut self, text: &str) -> SessionResult<ReadingOutcome> {
        let outcome = self.measurement.on_raw_reading(text);
        if let ReadingOutcome::Committed { point, level } = outcome {
            self.cache.record(point, level)?;
        }
        Ok(outcome)
    }

    pub fn finalize_limb(&mut self) -> SessionResult<LimbResult> {
        if self.measurement.is_busy() {
            return Err(SessionError::SaveInFlight);
        }
        let part = self.cache.active_part().ok_or(SessionError::NoActiveLimb)?;
        let result = self.cache.finalize_limb(part)?;
        self.reset_measurement();
        Ok(result)
    }

    /// Forgets a finished limb so it is measured again from scratch.
    pub fn redo_limb(&mut self, part: AnatomicalPart) -> Option<LimbResult> {
        let removed = self.cache.remove_part(part);
        if self.cache.active_part() == Some(part) {
            self.cache.begin(part);
            self.reset_measurement();
        }
        removed
    }

    /// Screen teardown: nothing stays armed and unfinalized points are dropped.
    pub fn leave_limb(&mut self) {
        self.cache.abandon_active();
        self.reset_measurement();
    }

    pub fn set_deformity(&mut self, present: bool) {
        self.deformity = present;
    }

    pub fn deformity(&self) -> bool {
        self.deformity
    }

    pub fn is_part_complete(&self, part: AnatomicalPart) -> bool {
        self.cache.is_part_complete(part)
    }

    pub fn is_saving(&self) -> bool {
        self.measurement.is_busy()
    }

    pub fn set_saving(&mut self, saving: bool) {
        self.measurement.set_busy(saving);
    }

    pub fn build_record(
        &self,
        policy: &GradingPolicy,
        recorded_at: DateTime<Utc>,
    ) -> SessionResult<SessionRecord> {
        let info = self.info.as_ref().ok_or(SessionError::IncompleteSession)?;
        build_session_record(self.cache.session(), self.deformity, info, policy, recorded_at)
    }

    pub fn snapshot(&self, connection: ConnectionState) -> EncounterSnapshot {
        let live_value = self.measurement.live_value();
        EncounterSnapshot {
            session_id: self.info.as_ref().map(|info| info.session_id.clone()),
            active_part: self.cache.active_part(),
            armed_point: self.measurement.armed_point(),
            live_value,
            live_scale: *describe_level(live_value),
            points: self.cache.in_progress(),
            completed_parts: self.cache.session().completed_parts(),
            deformity: self.deformity,
            saving: self.is_saving(),
            connection,
        }
    }

    fn reset_measurement(&mut self) {
        let saving = self.measurement.is_busy();
        self.measurement.reset();
        self.measurement.set_busy(saving);
    }
}

pub(crate) fn encounter_info(
    session_id: String,
    patient: PatientRef,
    clinician_id: &str,
) -> EncounterInfo {
    EncounterInfo {
        session_id,
        patient,
        clinician_id: clinician_id.to_string(),
    }
}
