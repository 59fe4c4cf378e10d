//! Session aggregation: finalized limbs → persistence-ready record, and persisted rows →
//! per-patient history.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::cache::SessionResultCache;
use crate::error::{SessionError, SessionResult};
use crate::models::{
    AnatomicalPart, LimbEntry, PatientHistory, PatientRef, RecentPatient, SessionHistory,
    SessionRecord, TestRow,
};
use crate::risk::{compute_session_grade, DisabilityGrade, GradingPolicy};

pub const DEFAULT_RECENT_PATIENTS: usize = 3;

/// Who and what an encounter belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterInfo {
    pub session_id: String,
    pub patient: PatientRef,
    pub clinician_id: String,
}

/// Grades every finalized limb and packs the encounter for persistence.
///
/// Needs at least one finalized limb. Whether a partial record may be saved as work in progress
/// is the caller's call; check `SessionRecord::is_complete` before reporting it as final.
pub fn build_session_record(
    cache: &SessionResultCache,
    deformity: bool,
    info: &EncounterInfo,
    policy: &GradingPolicy,
    recorded_at: DateTime<Utc>,
) -> SessionResult<SessionRecord> {
    if cache.is_empty() {
        return Err(SessionError::IncompleteSession);
    }

    let limbs = cache
        .iter()
        .map(|(part, result)| {
            let grade = policy.limb_grade(result.levels(), deformity);
            (
                *part,
                LimbEntry {
                    result: result.clone(),
                    grade,
                },
            )
        })
        .collect();

    Ok(SessionRecord {
        session_id: info.session_id.clone(),
        patient: info.patient.clone(),
        clinician_id: info.clinician_id.clone(),
        limbs,
        deformity,
        recorded_at,
    })
}

#[derive(Default)]
struct SessionAccumulator {
    recorded_at: Option<DateTime<Utc>>,
    grades: Vec<DisabilityGrade>,
    parts: Vec<AnatomicalPart>,
}

#[derive(Default)]
struct PatientAccumulator {
    display_name: String,
    name_seen_at: Option<DateTime<Utc>>,
    sessions: BTreeMap<String, SessionAccumulator>,
}

/// Groups flat rows by patient then session; each session takes the worst limb grade.
///
/// Sessions are most-recent-first, and patients are ordered by their latest session.
pub fn group_history(rows: &[TestRow]) -> Vec<PatientHistory> {
    let mut patients: BTreeMap<&str, PatientAccumulator> = BTreeMap::new();

    for row in rows {
        let patient = patients.entry(row.patient_id.as_str()).or_default();
        if patient.name_seen_at.map_or(true, |seen| row.timestamp >= seen) {
            patient.display_name = row.patient_display_name.clone();
            patient.name_seen_at = Some(row.timestamp);
        }

        let session = patient.sessions.entry(row.session_id.clone()).or_default();
        session.recorded_at = Some(
            session
                .recorded_at
                .map_or(row.timestamp, |at| at.max(row.timestamp)),
        );
        session.grades.push(row.computed_grade);
        if !session.parts.contains(&row.body_part_id) {
            session.parts.push(row.body_part_id);
        }
    }

    let mut histories: Vec<PatientHistory> = patients
        .into_iter()
        .map(|(patient_id, acc)| {
            let mut sessions: Vec<SessionHistory> = acc
                .sessions
                .into_iter()
                .filter_map(|(session_id, mut session)| {
                    session.parts.sort();
                    Some(SessionHistory {
                        session_id,
                        recorded_at: session.recorded_at?,
                        grade: compute_session_grade(session.grades),
                        parts: session.parts,
                    })
                })
                .collect();
            sessions.sort_by(|a, b| {
                b.recorded_at
                    .cmp(&a.recorded_at)
                    .then_with(|| b.session_id.cmp(&a.session_id))
            });

            PatientHistory {
                patient_id: patient_id.to_string(),
                display_name: acc.display_name,
                sessions,
            }
        })
        .collect();

    histories.sort_by(|a, b| {
        let latest_a = a.latest().map(|s| s.recorded_at);
        let latest_b = b.latest().map(|s| s.recorded_at);
        latest_b
            .cmp(&latest_a)
            .then_with(|| a.patient_id.cmp(&b.patient_id))
    });
    histories
}

/// Distinct patients by most recent exam, newest first.
pub fn recent_patients(rows: &[TestRow], limit: usize) -> Vec<RecentPatient> {
    let mut sorted: Vec<&TestRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut seen = HashSet::new();
    let mut recent = Vec::new();
    for row in sorted {
        if recent.len() >= limit {
            break;
        }
        if !seen.insert(row.patient_id.as_str()) {
            continue;
        }
        recent.push(RecentPatient {
            patient_id: row.patient_id.clone(),
            display_name: row.patient_display_name.clone(),
            last_exam: row.timestamp,
        });
    }
    recent
}
