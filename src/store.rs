//! Persistence boundary used by the encounter flow.

use std::future::Future;

use anyhow::Result;

use crate::db::Database;
use crate::models::{SessionRecord, TestRow};

/// Where finished encounters go and where history comes from.
///
/// Failures are reported as-is; retrying is the implementation's business.
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the number of limb rows written.
    fn save_session(&self, record: &SessionRecord) -> impl Future<Output = Result<usize>> + Send;

    fn fetch_session_rows(&self, session_id: &str)
        -> impl Future<Output = Result<Vec<TestRow>>> + Send;

    fn fetch_history_rows(
        &self,
        clinician_id: &str,
    ) -> impl Future<Output = Result<Vec<TestRow>>> + Send;

    /// Every row of one patient across clinicians, newest first.
    fn fetch_patient_rows(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<Vec<TestRow>>> + Send;

    fn delete_session(&self, session_id: &str) -> impl Future<Output = Result<usize>> + Send;
}

impl SessionStore for Database {
    fn save_session(&self, record: &SessionRecord) -> impl Future<Output = Result<usize>> + Send {
        Database::save_session(self, record)
    }

    fn fetch_session_rows(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Vec<TestRow>>> + Send {
        Database::fetch_session_rows(self, session_id)
    }

    fn fetch_history_rows(
        &self,
        clinician_id: &str,
    ) -> impl Future<Output = Result<Vec<TestRow>>> + Send {
        Database::fetch_history_rows(self, clinician_id)
    }

    fn fetch_patient_rows(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = Result<Vec<TestRow>>> + Send {
        Database::fetch_patient_rows(self, patient_id)
    }

    fn delete_session(&self, session_id: &str) -> impl Future<Output = Result<usize>> + Send {
        Database::delete_session(self, session_id)
    }
}
