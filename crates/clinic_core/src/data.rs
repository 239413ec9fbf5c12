//! crates/clinic_core/src/data.rs
//!
//! The aggregate of every entity collection, plus the fixed storage keys each
//! collection is persisted under.

use crate::domain::{
    Appointment, Patient, PatientDocument, Session, SessionType, Specialty, User,
    WaitingListEntry,
};
use crate::store::EntityStore;

/// Storage key of the authenticated user mirror.
pub const CURRENT_USER_KEY: &str = "ma_currentUser";

/// The persisted collections and the key each one lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Patients,
    Sessions,
    Appointments,
    SessionTypes,
    Specialties,
    WaitingList,
    Documents,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Users,
        Collection::Patients,
        Collection::Sessions,
        Collection::Appointments,
        Collection::SessionTypes,
        Collection::Specialties,
        Collection::WaitingList,
        Collection::Documents,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Collection::Users => "ma_users",
            Collection::Patients => "ma_patients",
            Collection::Sessions => "ma_sessions",
            Collection::Appointments => "ma_appointments",
            Collection::SessionTypes => "ma_sessionTypes",
            Collection::Specialties => "ma_specialties",
            Collection::WaitingList => "ma_waitingList",
            Collection::Documents => "ma_documents",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Every collection the clinic owns. This is the single authoritative copy;
/// other components borrow from it or work on clones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicData {
    pub users: EntityStore<User>,
    pub patients: EntityStore<Patient>,
    pub sessions: EntityStore<Session>,
    pub appointments: EntityStore<Appointment>,
    pub session_types: EntityStore<SessionType>,
    pub specialties: EntityStore<Specialty>,
    pub waiting_list: EntityStore<WaitingListEntry>,
    pub documents: EntityStore<PatientDocument>,
}

impl ClinicData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes one collection as a complete JSON array snapshot.
    pub fn snapshot(&self, collection: Collection) -> serde_json::Result<String> {
        match collection {
            Collection::Users => serde_json::to_string(self.users.list()),
            Collection::Patients => serde_json::to_string(self.patients.list()),
            Collection::Sessions => serde_json::to_string(self.sessions.list()),
            Collection::Appointments => serde_json::to_string(self.appointments.list()),
            Collection::SessionTypes => serde_json::to_string(self.session_types.list()),
            Collection::Specialties => serde_json::to_string(self.specialties.list()),
            Collection::WaitingList => serde_json::to_string(self.waiting_list.list()),
            Collection::Documents => serde_json::to_string(self.documents.list()),
        }
    }

    /// Looks up a user by login email, ignoring case.
    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        let needle = email.trim();
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(needle))
    }

    /// Display name of a patient, or "Desconhecido" for dangling references.
    pub fn patient_name(&self, patient_id: &str) -> &str {
        self.patients
            .find(patient_id)
            .map(|p| p.name.as_str())
            .unwrap_or(UNKNOWN_NAME)
    }

    /// Display name of a user, or "Desconhecido" for dangling references.
    pub fn user_name(&self, user_id: &str) -> &str {
        self.users
            .find(user_id)
            .map(|u| u.name.as_str())
            .unwrap_or(UNKNOWN_NAME)
    }
}

pub const UNKNOWN_NAME: &str = "Desconhecido";
