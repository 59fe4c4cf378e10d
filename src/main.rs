//! Runs one complete four-limb encounter against the simulated probe and prints the
//! resulting history.
//!
//! `ESTESIO_DATA_DIR` picks where the database and settings live (default `./estesio-data`).

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::info;
use rand::Rng;

use estesio_lib::{
    device::ProbeHandle, init_logging, AnatomicalPart, Database, DeviceLink, EncounterController,
    PatientRef, PointLevel, SettingsStore, SimulatedProbe,
};

const SIMULATED_PROBE: &str = "24:0A:C4:12:AB:FF";
const CLINICIAN: &str = "sim-clinician";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    info!("estesio simulator starting up...");

    let data_dir = std::env::var("ESTESIO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("estesio-data"));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings = SettingsStore::new(data_dir.join("settings.json"))?;
    let db = Arc::new(Database::new(data_dir.join("estesio.sqlite3"))?);

    let probe = SimulatedProbe::new();
    let handle = probe.handle();
    let (link, link_task) = DeviceLink::spawn(probe, settings.device().link_config());
    let keep_alive = settings.device().keep_alive_on_leave;
    let controller = EncounterController::new(link.clone(), db, settings.grading())
        .with_keep_alive_on_leave(keep_alive);

    let patient = PatientRef {
        id: uuid::Uuid::new_v4().to_string(),
        display_name: "Paciente Simulado".into(),
    };
    let patient_id = patient.id.clone();
    let session_id = controller.start_encounter(patient, CLINICIAN).await;
    info!("encounter {session_id} started");

    let mut status = link.subscribe_status();
    for part in AnatomicalPart::ALL {
        controller.begin_limb(part).await;
        controller.connect_probe(SIMULATED_PROBE);
        status
            .wait_for(|state| *state == estesio_lib::ConnectionState::ServicesReady)
            .await
            .context("device link stopped before the probe was ready")?;

        test_limb(&controller, &handle, part).await?;
        controller.leave_limb_default().await;
        if !keep_alive {
            status
                .wait_for(|state| *state == estesio_lib::ConnectionState::Disconnected)
                .await
                .context("device link stopped while closing the limb")?;
        }
    }
    settings.remember_address(SIMULATED_PROBE)?;

    let record = controller.finish_encounter().await?;
    for (part, entry) in &record.limbs {
        info!("{part}: {} ({})", entry.grade, entry.grade.description());
    }
    info!(
        "session grade: {}",
        record.session_grade().description()
    );

    if let Some(past) = controller.patient_history(&patient_id).await? {
        info!("patient {patient_id} has {} saved sessions", past.sessions.len());
    }

    let history = controller.history(CLINICIAN).await?;
    println!("{}", serde_json::to_string_pretty(&history)?);

    link.disconnect();
    link.shutdown();
    link_task.await.context("device link task panicked")?;
    Ok(())
}

async fn test_limb<S: estesio_lib::SessionStore>(
    controller: &EncounterController<S>,
    probe: &ProbeHandle,
    part: AnatomicalPart,
) -> Result<()> {
    let mut snapshots = controller.subscribe();
    for point in 0..part.point_count() {
        let value = rand::thread_rng().gen_range(1..=PointLevel::MAX);
        let level = PointLevel::confirmed(value).context("generated level out of range")?;

        controller.select_point(point).await?;
        probe.apply_filament(level).await;
        snapshots
            .wait_for(|snapshot| snapshot.points.get(&point) == Some(&level))
            .await
            .context("encounter controller went away")?;
    }

    let result = controller.finalize_limb().await?;
    info!("{part}: {} points, worst level {}", result.len(), result.max_level());
    Ok(())
}
