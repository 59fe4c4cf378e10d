use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use estesio_lib::device::{
    ConnectionState, DeviceAddress, DeviceLink, LinkConfig, Transport, TransportError,
    TransportEvent, TransportSink,
};
use estesio_lib::models::TestRow;
use estesio_lib::{
    group_history, AnatomicalPart, Database, DisabilityGrade, EncounterController,
    EncounterSnapshot, PatientRef, PointLevel,
};
use tokio::sync::watch;
use uuid::Uuid;

/// Transport whose notifications are pushed by the test, one payload at a time.
#[derive(Clone, Default)]
struct ScriptedTransport {
    sink: Arc<Mutex<Option<TransportSink>>>,
}

impl ScriptedTransport {
    fn push(&self, payload: &str) {
        let sink = self.sink.lock().unwrap();
        sink.as_ref()
            .expect("link not open")
            .send(TransportEvent::Notification(payload.as_bytes().to_vec()));
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self, _address: &DeviceAddress, sink: TransportSink) -> Result<(), TransportError> {
        sink.send(TransportEvent::Connected);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), TransportError> {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.send(TransportEvent::ServicesDiscovered(Ok(())));
        }
        Ok(())
    }

    fn enable_notifications(&mut self, _service: Uuid, _characteristic: Uuid) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        *self.sink.lock().unwrap() = None;
    }
}

struct Bench {
    controller: EncounterController<Database>,
    transport: ScriptedTransport,
    snapshots: watch::Receiver<EncounterSnapshot>,
}

async fn bench() -> Bench {
    let transport = ScriptedTransport::default();
    let (link, _task) = DeviceLink::spawn(
        transport.clone(),
        LinkConfig {
            settle_delay: Duration::from_millis(5),
        },
    );
    let db = Arc::new(Database::open_in_memory().unwrap());
    let controller = EncounterController::new(link, db, Default::default());
    controller
        .start_encounter_with_id(
            "050325_1430".into(),
            PatientRef {
                id: "p-a".into(),
                display_name: "Ana".into(),
            },
            "c-1",
        )
        .await;
    let snapshots = controller.subscribe();
    Bench {
        controller,
        transport,
        snapshots,
    }
}

impl Bench {
    async fn open_limb(&mut self, part: AnatomicalPart) {
        self.controller.begin_limb(part).await;
        self.controller.connect_probe("24:0A:C4:12:AB:FF");
        self.wait(|s| s.connection == ConnectionState::ServicesReady).await;
    }

    async fn wait<F: FnMut(&EncounterSnapshot) -> bool>(&mut self, check: F) {
        tokio::time::timeout(Duration::from_secs(2), self.snapshots.wait_for(check))
            .await
            .expect("timed out")
            .unwrap();
    }

    /// Pushes `payloads` and gives the pump time to apply them.
    async fn feed(&mut self, payloads: &[&str]) {
        for payload in payloads {
            self.transport.push(payload);
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}

fn level(value: u8) -> PointLevel {
    PointLevel::confirmed(value).unwrap()
}

#[tokio::test]
async fn full_limb_test() {
    let mut bench = bench().await;
    bench.open_limb(AnatomicalPart::RightHand).await;

    bench.controller.select_point(0).await.unwrap();
    bench.feed(&["1", "2", "3", "Enviado"]).await;
    bench.wait(|s| s.points.get(&0) == Some(&level(3))).await;

    bench.controller.select_point(1).await.unwrap();
    bench.feed(&["Enviado"]).await;

    let snapshot = bench.controller.snapshot().await;
    assert_eq!(snapshot.points, BTreeMap::from([(0, level(3))]));
    assert_eq!(snapshot.armed_point, Some(1));
}

#[tokio::test]
async fn zeros_before_confirmation_do_not_lose_the_reading() {
    let mut bench = bench().await;
    bench.open_limb(AnatomicalPart::LeftFoot).await;

    bench.controller.select_point(8).await.unwrap();
    bench.feed(&["4", "0", "6", "0", "0", "enviado"]).await;
    bench.wait(|s| s.points.get(&8) == Some(&level(6))).await;
}

#[tokio::test]
async fn redo_replaces_the_whole_limb() {
    let mut bench = bench().await;
    bench.open_limb(AnatomicalPart::LeftHand).await;

    bench.controller.select_point(0).await.unwrap();
    bench.feed(&["2", "Enviado"]).await;
    bench.controller.select_point(1).await.unwrap();
    bench.feed(&["4", "Enviado"]).await;
    bench.wait(|s| s.points.len() == 2).await;
    bench.controller.finalize_limb().await.unwrap();

    bench.controller.redo_limb(AnatomicalPart::LeftHand).await;
    assert!(!bench.controller.is_part_complete(AnatomicalPart::LeftHand).await);

    bench.open_limb(AnatomicalPart::LeftHand).await;
    bench.controller.select_point(0).await.unwrap();
    bench.feed(&["6", "Enviado"]).await;
    bench.wait(|s| s.points.get(&0) == Some(&level(6))).await;

    let redone = bench.controller.finalize_limb().await.unwrap();
    assert_eq!(redone.points(), &BTreeMap::from([(0, level(6))]));
}

#[tokio::test]
async fn empty_limb_cannot_be_finalized() {
    let mut bench = bench().await;
    bench.open_limb(AnatomicalPart::RightFoot).await;
    bench.controller.select_point(2).await.unwrap();
    bench.feed(&["0", "Enviado"]).await;

    let err = bench.controller.finalize_limb().await.unwrap_err();
    assert_eq!(
        err,
        estesio_lib::SessionError::EmptyResult {
            part: AnatomicalPart::RightFoot
        }
    );
}

fn row(patient: &str, session: &str, grade: DisabilityGrade, hour: u32) -> TestRow {
    TestRow {
        session_id: session.into(),
        patient_id: patient.into(),
        patient_display_name: patient.into(),
        clinician_id: "c-1".into(),
        body_part_id: AnatomicalPart::RightFoot,
        timestamp: Utc.with_ymd_and_hms(2025, 3, 5, hour, 0, 0).unwrap(),
        computed_grade: grade,
        deformity_flag: grade == DisabilityGrade::Two,
        points_data: BTreeMap::from([("0".to_string(), 1)]),
    }
}

#[test]
fn history_grouping() {
    let rows = vec![
        row("A", "s-old", DisabilityGrade::Zero, 8),
        row("A", "s-new", DisabilityGrade::Two, 10),
        row("A", "s-new", DisabilityGrade::Zero, 10),
        row("B", "s-b", DisabilityGrade::One, 9),
    ];

    let history = group_history(&rows);
    assert_eq!(history.len(), 2);

    let a = &history[0];
    assert_eq!(a.patient_id, "A");
    assert_eq!(a.latest().unwrap().session_id, "s-new");
    assert_eq!(a.latest().unwrap().grade, DisabilityGrade::Two);
    assert_eq!(a.sessions[1].grade, DisabilityGrade::Zero);
    assert_eq!(history[1].sessions[0].grade, DisabilityGrade::One);
}
