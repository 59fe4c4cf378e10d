//! Session-facing data models: frozen limb results, persistence-ready records, flat test rows
//! and the grouped history views built from them.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::anatomy::{part_id, AnatomicalPart};
use super::reading::PointLevel;
use crate::error::{SessionError, SessionResult};
use crate::risk::{compute_session_grade, DisabilityGrade};

/// Confirmed per-point levels for one part. Indices are validated against the part layout
/// and every level is > 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimbResult {
    part: AnatomicalPart,
    points: BTreeMap<usize, PointLevel>,
}

impl LimbResult {
    pub fn new(part: AnatomicalPart, points: BTreeMap<usize, PointLevel>) -> SessionResult<Self> {
        for (&index, level) in &points {
            if !part.contains_point(index) {
                return Err(SessionError::PointOutOfRange { part, index });
            }
            if !level.is_confirmed() {
                return Err(SessionError::InvalidLevel(level.value()));
            }
        }
        Ok(Self { part, points })
    }

    pub fn part(&self) -> AnatomicalPart {
        self.part
    }

    pub fn get(&self, index: usize) -> Option<PointLevel> {
        self.points.get(&index).copied()
    }

    pub fn points(&self) -> &BTreeMap<usize, PointLevel> {
        &self.points
    }

    pub fn levels(&self) -> impl Iterator<Item = PointLevel> + '_ {
        self.points.values().copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_level(&self) -> PointLevel {
        self.levels().max().unwrap_or(PointLevel::UNSET)
    }

    /// Wire form: point index as string → level.
    pub fn points_data(&self) -> BTreeMap<String, u8> {
        self.points
            .iter()
            .map(|(index, level)| (index.to_string(), level.value()))
            .collect()
    }

    pub fn from_points_data(
        part: AnatomicalPart,
        data: &BTreeMap<String, u8>,
    ) -> anyhow::Result<Self> {
        let mut points = BTreeMap::new();
        for (raw_index, raw_level) in data {
            let index: usize = raw_index
                .parse()
                .with_context(|| format!("invalid point index '{raw_index}' for {part}"))?;
            let level = PointLevel::confirmed(*raw_level)
                .ok_or_else(|| anyhow!("invalid level {raw_level} at point {index} of {part}"))?;
            points.insert(index, level);
        }
        LimbResult::new(part, points).map_err(anyhow::Error::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRef {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimbEntry {
    pub result: LimbResult,
    pub grade: DisabilityGrade,
}

/// Persistence-ready aggregate of one encounter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub patient: PatientRef,
    pub clinician_id: String,
    pub limbs: BTreeMap<AnatomicalPart, LimbEntry>,
    pub deformity: bool,
    pub recorded_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Clinically final only when all four parts are present.
    pub fn is_complete(&self) -> bool {
        AnatomicalPart::ALL
            .iter()
            .all(|part| self.limbs.contains_key(part))
    }

    pub fn missing_parts(&self) -> Vec<AnatomicalPart> {
        AnatomicalPart::ALL
            .into_iter()
            .filter(|part| !self.limbs.contains_key(part))
            .collect()
    }

    pub fn session_grade(&self) -> DisabilityGrade {
        compute_session_grade(self.limbs.values().map(|entry| entry.grade))
    }

    /// Row id of one limb test: `{sessionId}_{bodyPartId}`.
    pub fn row_id(session_id: &str, part: AnatomicalPart) -> String {
        format!("{session_id}_{}", part.as_str())
    }

    pub fn to_rows(&self) -> Vec<TestRow> {
        self.limbs
            .iter()
            .map(|(part, entry)| TestRow {
                session_id: self.session_id.clone(),
                patient_id: self.patient.id.clone(),
                patient_display_name: self.patient.display_name.clone(),
                clinician_id: self.clinician_id.clone(),
                body_part_id: *part,
                timestamp: self.recorded_at,
                computed_grade: entry.grade,
                deformity_flag: self.deformity,
                points_data: entry.result.points_data(),
            })
            .collect()
    }
}

/// Flat per-limb row as exchanged with the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRow {
    pub session_id: String,
    pub patient_id: String,
    pub patient_display_name: String,
    pub clinician_id: String,
    #[serde(with = "part_id")]
    pub body_part_id: AnatomicalPart,
    pub timestamp: DateTime<Utc>,
    pub computed_grade: DisabilityGrade,
    pub deformity_flag: bool,
    pub points_data: BTreeMap<String, u8>,
}

impl TestRow {
    pub fn row_id(&self) -> String {
        SessionRecord::row_id(&self.session_id, self.body_part_id)
    }

    pub fn limb_result(&self) -> anyhow::Result<LimbResult> {
        LimbResult::from_points_data(self.body_part_id, &self.points_data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub session_id: String,
    pub recorded_at: DateTime<Utc>,
    pub grade: DisabilityGrade,
    pub parts: Vec<AnatomicalPart>,
}

/// One patient's encounters, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientHistory {
    pub patient_id: String,
    pub display_name: String,
    pub sessions: Vec<SessionHistory>,
}

impl PatientHistory {
    pub fn latest(&self) -> Option<&SessionHistory> {
        self.sessions.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentPatient {
    pub patient_id: String,
    pub display_name: String,
    pub last_exam: DateTime<Utc>,
}
