use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{group_history, recent_patients};
use crate::device::{DeviceLink, LinkEvent};
use crate::error::{SessionError, SessionResult};
use crate::measurement::ReadingOutcome;
use crate::models::{
    AnatomicalPart, LimbResult, PatientHistory, PatientRef, RecentPatient, SessionRecord, TestRow,
};
use crate::risk::GradingPolicy;
use crate::store::SessionStore;

use super::state::{encounter_info, new_session_id, EncounterSnapshot, EncounterState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

struct PumpTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives one clinical encounter at a time.
///
/// Probe events are pumped into the encounter state by a task that only lives while a limb
/// screen is open. Every transition goes through the same mutex, so readings, point
/// selection and saves never interleave.
pub struct EncounterController<S> {
    state: Arc<Mutex<EncounterState>>,
    link: DeviceLink,
    store: Arc<S>,
    policy: GradingPolicy,
    keep_alive_on_leave: bool,
    pump: Arc<Mutex<Option<PumpTask>>>,
    snapshots: Arc<watch::Sender<EncounterSnapshot>>,
}

impl<S> Clone for EncounterController<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            link: self.link.clone(),
            store: self.store.clone(),
            policy: self.policy,
            keep_alive_on_leave: self.keep_alive_on_leave,
            pump: self.pump.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

impl<S: SessionStore> EncounterController<S> {
    pub fn new(link: DeviceLink, store: Arc<S>, policy: GradingPolicy) -> Self {
        let state = EncounterState::new();
        let (snapshots, _) = watch::channel(state.snapshot(link.state()));

        Self {
            state: Arc::new(Mutex::new(state)),
            link,
            store,
            policy,
            keep_alive_on_leave: false,
            pump: Arc::new(Mutex::new(None)),
            snapshots: Arc::new(snapshots),
        }
    }

    /// Whether [`leave_limb_default`](Self::leave_limb_default) keeps the probe link up.
    pub fn with_keep_alive_on_leave(mut self, keep_alive: bool) -> Self {
        self.keep_alive_on_leave = keep_alive;
        self
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<EncounterSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn snapshot(&self) -> EncounterSnapshot {
        self.state.lock().await.snapshot(self.link.state())
    }

    /// Opens a new encounter with a `ddMMyy_HHmm` session id and returns that id.
    pub async fn start_encounter(&self, patient: PatientRef, clinician_id: &str) -> String {
        let session_id = new_session_id(Local::now());
        self.start_encounter_with_id(session_id.clone(), patient, clinician_id)
            .await;
        session_id
    }

    pub async fn start_encounter_with_id(
        &self,
        session_id: String,
        patient: PatientRef,
        clinician_id: &str,
    ) {
        log_info!("starting encounter {session_id} for patient {}", patient.id);
        self.state
            .lock()
            .await
            .start(encounter_info(session_id, patient, clinician_id));
        self.publish().await;
    }

    /// Opens the screen of `part`: takes over the link observer slot and starts pumping probe
    /// events into the handshake.
    pub async fn begin_limb(&self, part: AnatomicalPart) {
        self.stop_pump().await;
        self.state.lock().await.begin_limb(part);

        let events = self.link.observe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pump_link_events(
            self.state.clone(),
            self.link.clone(),
            self.snapshots.clone(),
            events,
            cancel.clone(),
        ));
        *self.pump.lock().await = Some(PumpTask { cancel, handle });

        log_info!("testing {part}");
        self.publish().await;
    }

    pub fn connect_probe(&self, address: &str) {
        self.link.connect(address);
    }

    pub async fn select_point(&self, index: usize) -> SessionResult<()> {
        self.state.lock().await.select_point(index)?;
        self.publish().await;
        Ok(())
    }

    pub async fn cancel_measurement(&self) {
        self.state.lock().await.cancel_measurement();
        self.publish().await;
    }

    pub async fn finalize_limb(&self) -> SessionResult<LimbResult> {
        let result = self.state.lock().await.finalize_limb()?;
        log_info!("{} finalized with {} points", result.part(), result.len());
        self.publish().await;
        Ok(result)
    }

    pub async fn redo_limb(&self, part: AnatomicalPart) -> Option<LimbResult> {
        let removed = self.state.lock().await.redo_limb(part);
        self.publish().await;
        removed
    }

    pub async fn set_deformity(&self, present: bool) {
        self.state.lock().await.set_deformity(present);
        self.publish().await;
    }

    pub async fn is_part_complete(&self, part: AnatomicalPart) -> bool {
        self.state.lock().await.is_part_complete(part)
    }

    /// Closes the limb screen. The probe link is torn down unless `keep_alive` is set.
    pub async fn leave_limb(&self, keep_alive: bool) {
        self.link.set_observer(None);
        self.stop_pump().await;
        self.state.lock().await.leave_limb();
        if !keep_alive {
            self.link.disconnect();
        }
        self.publish().await;
    }

    /// Closes the limb screen using the configured keep-alive preference.
    pub async fn leave_limb_default(&self) {
        self.leave_limb(self.keep_alive_on_leave).await;
    }

    /// Saves whatever limbs are finalized, as work in progress.
    pub async fn save_progress(&self) -> SessionResult<SessionRecord> {
        self.persist(false).await
    }

    /// Saves the encounter as clinically final; all four limbs are required.
    pub async fn finish_encounter(&self) -> SessionResult<SessionRecord> {
        self.persist(true).await
    }

    pub async fn history(&self, clinician_id: &str) -> SessionResult<Vec<PatientHistory>> {
        let rows = self
            .store
            .fetch_history_rows(clinician_id)
            .await
            .map_err(SessionError::persistence)?;
        Ok(group_history(&rows))
    }

    /// Past sessions of one patient, whoever screened them. `None` if nothing was saved.
    pub async fn patient_history(
        &self,
        patient_id: &str,
    ) -> SessionResult<Option<PatientHistory>> {
        let rows = self
            .store
            .fetch_patient_rows(patient_id)
            .await
            .map_err(SessionError::persistence)?;
        Ok(group_history(&rows).into_iter().next())
    }

    pub async fn recent_patients(
        &self,
        clinician_id: &str,
        limit: usize,
    ) -> SessionResult<Vec<RecentPatient>> {
        let rows = self
            .store
            .fetch_history_rows(clinician_id)
            .await
            .map_err(SessionError::persistence)?;
        Ok(recent_patients(&rows, limit))
    }

    pub async fn session_rows(&self, session_id: &str) -> SessionResult<Vec<TestRow>> {
        self.store
            .fetch_session_rows(session_id)
            .await
            .map_err(SessionError::persistence)
    }

    pub async fn delete_session(&self, session_id: &str) -> SessionResult<usize> {
        let removed = self
            .store
            .delete_session(session_id)
            .await
            .map_err(SessionError::persistence)?;
        log_info!("deleted {removed} rows of session {session_id}");
        Ok(removed)
    }

    async fn persist(&self, require_complete: bool) -> SessionResult<SessionRecord> {
        let record = {
            let mut guard = self.state.lock().await;
            if guard.is_saving() {
                return Err(SessionError::SaveInFlight);
            }
            let record = guard.build_record(&self.policy, Utc::now())?;
            if require_complete && !record.is_complete() {
                return Err(SessionError::IncompleteSession);
            }
            guard.set_saving(true);
            record
        };
        self.publish().await;

        let outcome = self.store.save_session(&record).await;
        self.state.lock().await.set_saving(false);
        self.publish().await;

        match outcome {
            Ok(rows) => {
                log_info!(
                    "saved session {} ({rows} limbs, grade {})",
                    record.session_id,
                    record.session_grade()
                );
                Ok(record)
            }
            Err(err) => {
                log_error!("failed to save session {}: {err:#}", record.session_id);
                Err(SessionError::persistence(err))
            }
        }
    }

    async fn stop_pump(&self) {
        let task = self.pump.lock().await.take();
        if let Some(PumpTask { cancel, handle }) = task {
            cancel.cancel();
            if let Err(err) = handle.await {
                log_warn!("probe event pump ended abnormally: {err}");
            }
        }
    }

    async fn publish(&self) {
        let snapshot = self.state.lock().await.snapshot(self.link.state());
        self.snapshots.send_replace(snapshot);
    }
}

async fn pump_link_events(
    state: Arc<Mutex<EncounterState>>,
    link: DeviceLink,
    snapshots: Arc<watch::Sender<EncounterSnapshot>>,
    mut events: mpsc::UnboundedReceiver<LinkEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut guard = state.lock().await;
        match event {
            LinkEvent::Data(text) => match guard.apply_reading(&text) {
                Ok(ReadingOutcome::Committed { point, level }) => {
                    log_info!("point {point} committed at level {level}");
                }
                Ok(ReadingOutcome::ConfirmationDropped) => {
                    log_debug!("confirmation without a usable reading dropped");
                }
                Ok(ReadingOutcome::Ignored) => log_debug!("ignoring probe payload {text:?}"),
                Ok(ReadingOutcome::Live(_)) => {}
                Err(err) => log_warn!("could not record reading: {err}"),
            },
            LinkEvent::Connected => log_info!("probe ready"),
            LinkEvent::Disconnected => log_info!("probe disconnected"),
            LinkEvent::Error(reason) => log_warn!("probe link: {reason}"),
        }
        snapshots.send_replace(guard.snapshot(link.state()));
    }
}
