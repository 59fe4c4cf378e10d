use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    helpers::{decode_points, encode_points, parse_datetime, parse_grade, parse_part},
    Database,
};
use crate::models::{AnatomicalPart, SessionRecord, TestRow};

const SELECT_COLUMNS: &str = "SELECT session_id, patient_id, patient_name, clinician_id, body_part,
        recorded_at, gif, has_deformities, points_data
 FROM tests";

fn row_to_test(row: &Row) -> Result<TestRow> {
    let body_part: String = row.get("body_part")?;
    let recorded_at: String = row.get("recorded_at")?;
    let gif: i64 = row.get("gif")?;
    let has_deformities: i64 = row.get("has_deformities")?;
    let points_data: String = row.get("points_data")?;

    Ok(TestRow {
        session_id: row.get("session_id")?,
        patient_id: row.get("patient_id")?,
        patient_display_name: row.get("patient_name")?,
        clinician_id: row.get("clinician_id")?,
        body_part_id: parse_part(&body_part)?,
        timestamp: parse_datetime(&recorded_at, "recorded_at")?,
        computed_grade: parse_grade(gif)?,
        deformity_flag: has_deformities != 0,
        points_data: decode_points(&points_data)?,
    })
}

fn collect_rows(
    conn: &rusqlite::Connection,
    sql: &str,
    param: &str,
) -> Result<Vec<TestRow>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params![param])?;
    let mut tests = Vec::new();
    while let Some(row) = rows.next()? {
        tests.push(row_to_test(row)?);
    }
    Ok(tests)
}

impl Database {
    /// Writes one row per limb in a single transaction. Re-saving a session replaces its rows,
    /// so limbs dropped from the record since the last save are deleted.
    pub async fn save_session(&self, record: &SessionRecord) -> Result<usize> {
        let rows = record.to_rows();
        let session_id = record.session_id.clone();
        let dropped: Vec<AnatomicalPart> = AnatomicalPart::ALL
            .into_iter()
            .filter(|part| !record.limbs.contains_key(part))
            .collect();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for part in &dropped {
                tx.execute(
                    "DELETE FROM tests WHERE session_id = ?1 AND body_part = ?2",
                    params![session_id, part.as_str()],
                )
                .with_context(|| format!("failed to drop {part} from session {session_id}"))?;
            }
            for test in &rows {
                tx.execute(
                    "INSERT INTO tests (id, session_id, patient_id, patient_name, clinician_id,
                        body_part, recorded_at, gif, has_deformities, points_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(id) DO UPDATE SET
                        patient_id = excluded.patient_id,
                        patient_name = excluded.patient_name,
                        clinician_id = excluded.clinician_id,
                        recorded_at = excluded.recorded_at,
                        gif = excluded.gif,
                        has_deformities = excluded.has_deformities,
                        points_data = excluded.points_data",
                    params![
                        test.row_id(),
                        test.session_id,
                        test.patient_id,
                        test.patient_display_name,
                        test.clinician_id,
                        test.body_part_id.as_str(),
                        test.timestamp.to_rfc3339(),
                        test.computed_grade.as_u8(),
                        test.deformity_flag,
                        encode_points(&test.points_data)?,
                    ],
                )
                .with_context(|| format!("failed to save test {}", test.row_id()))?;
            }
            tx.commit().context("failed to commit session")?;
            Ok(rows.len())
        })
        .await
    }

    pub async fn fetch_session_rows(&self, session_id: &str) -> Result<Vec<TestRow>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            collect_rows(
                conn,
                &format!("{SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY body_part"),
                &session_id,
            )
        })
        .await
    }

    /// Every row recorded by one clinician, newest first.
    pub async fn fetch_history_rows(&self, clinician_id: &str) -> Result<Vec<TestRow>> {
        let clinician_id = clinician_id.to_string();
        self.execute(move |conn| {
            collect_rows(
                conn,
                &format!(
                    "{SELECT_COLUMNS} WHERE clinician_id = ?1 ORDER BY recorded_at DESC, id"
                ),
                &clinician_id,
            )
        })
        .await
    }

    pub async fn fetch_patient_rows(&self, patient_id: &str) -> Result<Vec<TestRow>> {
        let patient_id = patient_id.to_string();
        self.execute(move |conn| {
            collect_rows(
                conn,
                &format!("{SELECT_COLUMNS} WHERE patient_id = ?1 ORDER BY recorded_at DESC, id"),
                &patient_id,
            )
        })
        .await
    }

    /// Removes every limb row of a session. Returns the number of rows removed.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM tests WHERE session_id = ?1", params![session_id])
                .context("failed to delete session")?;
            Ok(removed)
        })
        .await
    }
}
