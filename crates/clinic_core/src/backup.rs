//! crates/clinic_core/src/backup.rs
//!
//! Full-state backup documents. A restore replaces the whole store; the
//! document is parsed and validated completely before anything is replaced.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::ClinicData;
use crate::domain::{
    Appointment, Patient, PatientDocument, Session, SessionType, Specialty, User,
    WaitingListEntry,
};
use crate::store::{EntityStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Backup contains inconsistent data: {0}")]
    Store(#[from] StoreError),
    #[error("Backup contains the email {0} more than once")]
    DuplicateEmail(String),
}

/// One document holding every persisted key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub export_date: DateTime<Utc>,
    pub app_version: String,
    #[serde(rename = "ma_users")]
    pub users: Vec<User>,
    #[serde(rename = "ma_patients")]
    pub patients: Vec<Patient>,
    #[serde(rename = "ma_sessions")]
    pub sessions: Vec<Session>,
    #[serde(rename = "ma_appointments")]
    pub appointments: Vec<Appointment>,
    #[serde(rename = "ma_currentUser", default)]
    pub current_user: Option<User>,
    #[serde(rename = "ma_sessionTypes", default)]
    pub session_types: Vec<SessionType>,
    #[serde(rename = "ma_specialties", default)]
    pub specialties: Vec<Specialty>,
    #[serde(rename = "ma_waitingList", default)]
    pub waiting_list: Vec<WaitingListEntry>,
    #[serde(rename = "ma_documents", default)]
    pub documents: Vec<PatientDocument>,
}

/// The state a backup restores to.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredState {
    pub data: ClinicData,
    pub current_user: Option<User>,
}

impl Backup {
    pub fn capture(
        data: &ClinicData,
        current_user: Option<&User>,
        app_version: &str,
        export_date: DateTime<Utc>,
    ) -> Self {
        Self {
            export_date,
            app_version: app_version.to_string(),
            users: data.users.to_vec(),
            patients: data.patients.to_vec(),
            sessions: data.sessions.to_vec(),
            appointments: data.appointments.to_vec(),
            current_user: current_user.cloned(),
            session_types: data.session_types.to_vec(),
            specialties: data.specialties.to_vec(),
            waiting_list: data.waiting_list.to_vec(),
            documents: data.documents.to_vec(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, BackupError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates the document and builds the state it describes.
    pub fn into_state(self) -> Result<RestoredState, BackupError> {
        let mut emails = HashSet::new();
        for user in &self.users {
            if !emails.insert(user.email.trim().to_lowercase()) {
                return Err(BackupError::DuplicateEmail(user.email.clone()));
            }
        }

        let data = ClinicData {
            users: EntityStore::from_vec(self.users)?,
            patients: EntityStore::from_vec(self.patients)?,
            sessions: EntityStore::from_vec(self.sessions)?,
            appointments: EntityStore::from_vec(self.appointments)?,
            session_types: EntityStore::from_vec(self.session_types)?,
            specialties: EntityStore::from_vec(self.specialties)?,
            waiting_list: EntityStore::from_vec(self.waiting_list)?,
            documents: EntityStore::from_vec(self.documents)?,
        };
        // A current user who is not part of the restored users is dropped.
        let current_user = self
            .current_user
            .filter(|u| data.users.contains(&u.id));

        Ok(RestoredState { data, current_user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    #[test]
    fn export_then_restore_reproduces_the_store() {
        let data = seed::dataset(today());
        let admin = data.users.find(seed::ADMIN_ID).cloned();
        let json = Backup::capture(&data, admin.as_ref(), "1.4.0", Utc::now())
            .to_json()
            .unwrap();

        let restored = Backup::from_json(&json).unwrap().into_state().unwrap();
        assert_eq!(restored.data, data);
        assert_eq!(restored.current_user, admin);
    }

    #[test]
    fn document_uses_storage_keys_and_metadata_fields() {
        let data = seed::dataset(today());
        let json = Backup::capture(&data, None, "1.4.0", Utc::now()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("exportDate").is_some());
        assert_eq!(value["appVersion"], "1.4.0");
        assert_eq!(value["ma_users"].as_array().unwrap().len(), 3);
        assert_eq!(value["ma_sessions"][0]["therapistPayment"], 25.0);
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            Backup::from_json("{ not json"),
            Err(BackupError::Parse(_))
        ));
    }

    #[test]
    fn older_backups_without_catalog_keys_still_load() {
        let json = r#"{
            "exportDate": "2025-05-01T10:00:00Z",
            "appVersion": "1.0.0",
            "ma_users": [],
            "ma_patients": [],
            "ma_sessions": [],
            "ma_appointments": []
        }"#;
        let state = Backup::from_json(json).unwrap().into_state().unwrap();
        assert!(state.data.users.is_empty());
        assert!(state.current_user.is_none());
    }

    #[test]
    fn duplicate_emails_are_rejected() {
        let mut users = seed::users();
        let mut clone = users[1].clone();
        clone.id = "u99".to_string();
        clone.email = clone.email.to_uppercase();
        users.push(clone);

        let mut backup = Backup::capture(&seed::dataset(today()), None, "1", Utc::now());
        backup.users = users;
        assert!(matches!(
            backup.into_state(),
            Err(BackupError::DuplicateEmail(_))
        ));
    }
}
