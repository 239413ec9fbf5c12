//! crates/clinic_core/src/lifecycle.rs
//!
//! The appointment state machine and the pricing snapshot taken whenever a
//! session is created.
//!
//! ```text
//! PENDING --convert--> (removed; new COMPLETED session)
//! PENDING --cancel---> CANCELLED
//! ```
//!
//! Every check runs before the first mutation, so a failed operation leaves
//! `ClinicData` untouched.

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};

use crate::data::ClinicData;
use crate::domain::{
    new_id, Appointment, AppointmentStatus, Patient, Session, SessionStatus, SessionType, User,
};
use crate::store::{EntityStore, StoreError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("Activities must be filled in before the session can be registered")]
    ActivitiesRequired,
    #[error("Appointment {0} not found")]
    AppointmentNotFound(String),
    #[error("Appointment {id} is {status:?}, only pending appointments can change state")]
    NotPending {
        id: String,
        status: AppointmentStatus,
    },
    #[error("Patient {0} referenced by the appointment does not exist")]
    MissingPatient(String),
    #[error("Therapist {0} referenced by the appointment does not exist")]
    MissingTherapist(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Free-text fields entered when an encounter is registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionNotes {
    pub activities: String,
    pub progress_notes: String,
    pub homework: String,
}

impl SessionNotes {
    pub fn new(activities: impl Into<String>) -> Self {
        Self {
            activities: activities.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.activities.trim().is_empty() {
            return Err(LifecycleError::ActivitiesRequired);
        }
        Ok(())
    }
}

/// The monetary values frozen into a session at creation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingSnapshot {
    pub cost: f64,
    pub therapist_payment: f64,
}

/// Resolves what the clinic charges for one session, in priority order:
/// the patient's custom price for the session type, the patient's flat
/// `cost_per_session` when positive, the session type's default, then zero.
pub fn resolve_cost(
    patient: &Patient,
    session_type_id: Option<&str>,
    session_types: &EntityStore<SessionType>,
) -> f64 {
    if let Some(type_id) = session_type_id {
        if let Some(price) = patient.custom_prices.get(type_id) {
            return *price;
        }
    }
    if patient.cost_per_session > 0.0 {
        return patient.cost_per_session;
    }
    session_type_id
        .and_then(|id| session_types.find(id))
        .map(|st| st.default_cost)
        .unwrap_or(0.0)
}

/// The therapist's current per-session rate, zero when unset.
pub fn resolve_payment(therapist: &User) -> f64 {
    therapist.payment_per_session.unwrap_or(0.0)
}

/// Looks up the patient and therapist and freezes the current rates.
/// Missing references are an error rather than a zero default.
pub fn snapshot_pricing(
    data: &ClinicData,
    patient_id: &str,
    therapist_id: &str,
    session_type_id: Option<&str>,
) -> Result<PricingSnapshot, LifecycleError> {
    let patient = data
        .patients
        .find(patient_id)
        .ok_or_else(|| LifecycleError::MissingPatient(patient_id.to_string()))?;
    let therapist = data
        .users
        .find(therapist_id)
        .ok_or_else(|| LifecycleError::MissingTherapist(therapist_id.to_string()))?;

    Ok(PricingSnapshot {
        cost: resolve_cost(patient, session_type_id, &data.session_types),
        therapist_payment: resolve_payment(therapist),
    })
}

/// Turns a pending appointment into a completed session and removes the
/// appointment. Returns the new session.
pub fn convert_appointment(
    data: &mut ClinicData,
    appointment_id: &str,
    notes: SessionNotes,
) -> Result<Session, LifecycleError> {
    notes.validate()?;

    let appointment = pending_appointment(data, appointment_id)?;
    let pricing = snapshot_pricing(
        data,
        &appointment.patient_id,
        &appointment.therapist_id,
        appointment.session_type_id.as_deref(),
    )?;

    let session = Session {
        id: new_id(),
        patient_id: appointment.patient_id.clone(),
        therapist_id: appointment.therapist_id.clone(),
        session_type_id: appointment.session_type_id.clone(),
        date: appointment.date,
        start_time: appointment.time,
        duration_minutes: appointment.duration_minutes,
        activities: notes.activities,
        progress_notes: notes.progress_notes,
        homework: notes.homework,
        status: SessionStatus::Completed,
        cost: pricing.cost,
        therapist_payment: pricing.therapist_payment,
    };

    data.sessions.add(session.clone())?;
    data.appointments.remove(appointment_id);

    info!(
        appointment_id,
        session_id = %session.id,
        cost = session.cost,
        therapist_payment = session.therapist_payment,
        "Appointment converted into session"
    );
    Ok(session)
}

/// Marks a pending appointment as cancelled. The record is kept.
pub fn cancel_appointment(
    data: &mut ClinicData,
    appointment_id: &str,
) -> Result<Appointment, LifecycleError> {
    let mut appointment = pending_appointment(data, appointment_id)?;
    appointment.status = AppointmentStatus::Cancelled;
    data.appointments.update(appointment.clone())?;
    debug!(appointment_id, "Appointment cancelled");
    Ok(appointment)
}

/// Input for registering a session that was never scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDraft {
    pub patient_id: String,
    pub therapist_id: String,
    pub session_type_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub notes: SessionNotes,
}

/// Registers a completed session directly, with the same pricing snapshot
/// rules as a conversion.
pub fn record_session(data: &mut ClinicData, draft: SessionDraft) -> Result<Session, LifecycleError> {
    draft.notes.validate()?;
    let pricing = snapshot_pricing(
        data,
        &draft.patient_id,
        &draft.therapist_id,
        draft.session_type_id.as_deref(),
    )?;

    let session = Session {
        id: new_id(),
        patient_id: draft.patient_id,
        therapist_id: draft.therapist_id,
        session_type_id: draft.session_type_id,
        date: draft.date,
        start_time: draft.start_time,
        duration_minutes: draft.duration_minutes,
        activities: draft.notes.activities,
        progress_notes: draft.notes.progress_notes,
        homework: draft.notes.homework,
        status: SessionStatus::Completed,
        cost: pricing.cost,
        therapist_payment: pricing.therapist_payment,
    };
    data.sessions.add(session.clone())?;
    Ok(session)
}

/// Replaces the clinical text of a session. Monetary fields are untouched.
pub fn update_session_notes(
    data: &mut ClinicData,
    session_id: &str,
    notes: SessionNotes,
) -> Result<Session, LifecycleError> {
    notes.validate()?;
    let mut session = data.sessions.get(session_id)?.clone();
    session.activities = notes.activities;
    session.progress_notes = notes.progress_notes;
    session.homework = notes.homework;
    data.sessions.update(session.clone())?;
    Ok(session)
}

fn pending_appointment(data: &ClinicData, appointment_id: &str) -> Result<Appointment, LifecycleError> {
    let appointment = data
        .appointments
        .find(appointment_id)
        .ok_or_else(|| LifecycleError::AppointmentNotFound(appointment_id.to_string()))?;
    if appointment.status != AppointmentStatus::Pending {
        return Err(LifecycleError::NotPending {
            id: appointment.id.clone(),
            status: appointment.status,
        });
    }
    Ok(appointment.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::{self, MATILDE_ID, PATIENT_ANA_ID, SEED_APPOINTMENT_ID};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn seeded() -> ClinicData {
        seed::dataset(today())
    }

    #[test]
    fn converting_seed_appointment_snapshots_patient_and_therapist_rates() {
        let mut data = seeded();
        let sessions_before = data.sessions.len();

        let session =
            convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X")).unwrap();

        assert_eq!(session.cost, 45.0);
        assert_eq!(session.therapist_payment, 25.0);
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.patient_id, PATIENT_ANA_ID);
        assert_eq!(session.therapist_id, MATILDE_ID);
        assert_eq!(data.sessions.len(), sessions_before + 1);
        assert!(data.sessions.contains(&session.id));
        assert!(!data.appointments.contains(SEED_APPOINTMENT_ID));
    }

    #[test]
    fn blank_activities_reject_conversion_without_side_effects() {
        let mut data = seeded();
        let before = data.clone();

        let err = convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("   "))
            .unwrap_err();

        assert_eq!(err, LifecycleError::ActivitiesRequired);
        assert_eq!(data, before);
    }

    #[test]
    fn custom_price_for_session_type_wins_over_flat_cost() {
        let mut data = seeded();
        let mut patient = data.patients.find(PATIENT_ANA_ID).unwrap().clone();
        patient.custom_prices.insert("svc1".to_string(), 35.0);
        data.patients.update(patient).unwrap();

        let mut appointment = data.appointments.find(SEED_APPOINTMENT_ID).unwrap().clone();
        appointment.session_type_id = Some("svc1".to_string());
        data.appointments.update(appointment).unwrap();

        let session =
            convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X")).unwrap();
        assert_eq!(session.cost, 35.0);
    }

    #[test]
    fn session_type_default_applies_when_patient_has_no_price() {
        let data = seeded();
        let mut patient = data.patients.find(PATIENT_ANA_ID).unwrap().clone();
        patient.cost_per_session = 0.0;

        assert_eq!(resolve_cost(&patient, Some("st1"), &data.session_types), 45.0);
        assert_eq!(resolve_cost(&patient, Some("unknown"), &data.session_types), 0.0);
        assert_eq!(resolve_cost(&patient, None, &data.session_types), 0.0);
    }

    #[test]
    fn later_rate_changes_do_not_touch_existing_sessions() {
        let mut data = seeded();
        let session =
            convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X")).unwrap();

        let mut patient = data.patients.find(PATIENT_ANA_ID).unwrap().clone();
        patient.cost_per_session = 99.0;
        data.patients.update(patient).unwrap();
        let mut therapist = data.users.find(MATILDE_ID).unwrap().clone();
        therapist.payment_per_session = Some(70.0);
        data.users.update(therapist).unwrap();

        let stored = data.sessions.find(&session.id).unwrap();
        assert_eq!(stored.cost, 45.0);
        assert_eq!(stored.therapist_payment, 25.0);
    }

    #[test]
    fn missing_patient_blocks_conversion() {
        let mut data = seeded();
        data.patients.remove(PATIENT_ANA_ID);
        let before = data.clone();

        let err = convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X"))
            .unwrap_err();

        assert_eq!(err, LifecycleError::MissingPatient(PATIENT_ANA_ID.to_string()));
        assert_eq!(data, before);
    }

    #[test]
    fn missing_therapist_blocks_conversion() {
        let mut data = seeded();
        data.users.remove(MATILDE_ID);

        let err = convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X"))
            .unwrap_err();
        assert_eq!(err, LifecycleError::MissingTherapist(MATILDE_ID.to_string()));
        assert!(data.appointments.contains(SEED_APPOINTMENT_ID));
    }

    #[test]
    fn cancelled_appointments_cannot_be_converted() {
        let mut data = seeded();
        let cancelled = cancel_appointment(&mut data, SEED_APPOINTMENT_ID).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert!(data.appointments.contains(SEED_APPOINTMENT_ID));

        let err = convert_appointment(&mut data, SEED_APPOINTMENT_ID, SessionNotes::new("X"))
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotPending { .. }));
        assert!(matches!(
            cancel_appointment(&mut data, SEED_APPOINTMENT_ID),
            Err(LifecycleError::NotPending { .. })
        ));
    }

    #[test]
    fn unknown_appointment_is_reported() {
        let mut data = seeded();
        assert_eq!(
            convert_appointment(&mut data, "nope", SessionNotes::new("X")).unwrap_err(),
            LifecycleError::AppointmentNotFound("nope".to_string())
        );
    }

    #[test]
    fn note_edits_keep_the_monetary_snapshot() {
        let mut data = seeded();
        let edited = update_session_notes(
            &mut data,
            "s1",
            SessionNotes {
                activities: "Novo plano".to_string(),
                progress_notes: "Evolução positiva".to_string(),
                homework: String::new(),
            },
        )
        .unwrap();
        assert_eq!(edited.activities, "Novo plano");
        assert_eq!(edited.cost, 45.0);
        assert_eq!(edited.therapist_payment, 25.0);
    }

    #[test]
    fn recorded_sessions_use_the_same_pricing_rules() {
        let mut data = seeded();
        let session = record_session(
            &mut data,
            SessionDraft {
                patient_id: seed::PATIENT_JOAO_ID.to_string(),
                therapist_id: seed::DEMO_THERAPIST_ID.to_string(),
                session_type_id: Some("st2".to_string()),
                date: today(),
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                duration_minutes: 60,
                notes: SessionNotes::new("Motricidade fina"),
            },
        )
        .unwrap();
        // João has no flat price, so the session type default applies.
        assert_eq!(session.cost, 40.0);
        assert_eq!(session.therapist_payment, 20.0);
    }
}
