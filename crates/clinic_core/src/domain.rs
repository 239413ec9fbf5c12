//! crates/clinic_core/src/domain.rs
//!
//! Defines the core data structures of the clinic.
//! Field names serialize in camelCase so that persisted snapshots and backup
//! documents keep the `ma_*` key layout readable by older exports.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a fresh opaque identifier. Identifiers are never reused.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Therapist,
}

/// An administrator or therapist account. The email is the login and is
/// unique across all users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Either a PHC argon2 hash or a legacy cleartext value.
    pub password: String,
    pub role: Role,
    #[serde(default = "default_true")]
    pub active: bool,

    // Therapist-only fields. Ignored for admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty_id: Option<String>,
    /// Free-text specialty from records created before the specialty catalog.
    /// Read only when `specialty_id` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_per_session: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_therapist(&self) -> bool {
        self.role == Role::Therapist
    }
}

//=========================================================================================
// Patients
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Stored as entered; not derived from `birth_date`.
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub responsible_name: Option<String>,
    pub therapist_id: String,
    /// Legacy flat price charged by the clinic per session.
    #[serde(default)]
    pub cost_per_session: f64,
    /// Per-session-type price overrides, keyed by session type id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_prices: BTreeMap<String, f64>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

//=========================================================================================
// Sessions and appointments
//=========================================================================================

/// Sessions only ever exist as completed encounters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Completed,
}

/// A completed therapy encounter. `cost` and `therapist_payment` are snapshots
/// taken when the session was created and are never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub patient_id: String,
    pub therapist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub activities: String,
    #[serde(default)]
    pub progress_notes: String,
    #[serde(default)]
    pub homework: String,
    pub status: SessionStatus,
    pub cost: f64,
    pub therapist_payment: f64,
}

/// Stored appointment states. A converted appointment is removed from the
/// collection, so there is no completed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub therapist_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type_id: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    #[serde(default)]
    pub notes: String,
    pub status: AppointmentStatus,
}

//=========================================================================================
// Catalog and auxiliary records
//=========================================================================================

/// A configurable service offered by the clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty_id: Option<String>,
    pub default_duration: u32,
    pub default_cost: f64,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Specialty {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingListEntry {
    pub id: String,
    pub patient_id: String,
    pub therapist_id: String,
    pub priority: WaitingPriority,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a file attached to a patient's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDocument {
    pub id: String,
    pub patient_id: String,
    pub therapist_id: String,
    pub title: String,
    #[serde(default)]
    pub kind: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

fn default_true() -> bool {
    true
}
