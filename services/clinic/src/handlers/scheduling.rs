//! services/clinic/src/handlers/scheduling.rs
//!
//! Appointments and sessions: scheduling, cancellation, conversion into a
//! completed session and manual session registration.

use chrono::{NaiveDate, NaiveTime};
use clinic_core::data::Collection;
use clinic_core::domain::new_id;
use clinic_core::lifecycle::{self, SessionDraft, SessionNotes};
use clinic_core::visibility::{self, can_access};
use clinic_core::{Appointment, AppointmentStatus, Session};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::handlers::patients::resolve_therapist;
use crate::state::AppState;

/// Duration used when neither the form nor the session type provides one.
pub const DEFAULT_DURATION_MINUTES: u32 = 45;

/// Form data for a new appointment.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: String,
    /// Ignored for therapists. Defaults to the patient's therapist for admins.
    pub therapist_id: Option<String>,
    pub session_type_id: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: Option<u32>,
    pub notes: String,
}

/// Form data for a session registered without an appointment.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub patient_id: String,
    pub therapist_id: Option<String>,
    pub session_type_id: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: Option<u32>,
    pub notes: SessionNotes,
}

impl AppState {
    //=====================================================================================
    // Appointments
    //=====================================================================================

    pub fn appointments(&self) -> AppResult<Vec<Appointment>> {
        let actor = self.actor()?;
        Ok(visibility::visible(self.data.appointments.list(), &actor))
    }

    /// Visible pending appointments on `day`, ordered by time.
    pub fn agenda(&self, day: NaiveDate) -> AppResult<Vec<Appointment>> {
        let mut agenda: Vec<Appointment> = self
            .appointments()?
            .into_iter()
            .filter(|a| a.date == day && a.status == AppointmentStatus::Pending)
            .collect();
        agenda.sort_by_key(|a| a.time);
        Ok(agenda)
    }

    fn visible_appointment(&self, appointment_id: &str) -> AppResult<Appointment> {
        let actor = self.actor()?;
        self.data
            .appointments
            .find(appointment_id)
            .filter(|a| can_access(*a, &actor))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment_id)))
    }

    /// Resolves the session type and the duration a new encounter gets.
    fn resolve_duration(&self, session_type_id: Option<&str>, requested: Option<u32>) -> AppResult<u32> {
        let session_type = match session_type_id {
            Some(id) => Some(
                self.data
                    .session_types
                    .find(id)
                    .ok_or_else(|| AppError::Validation(format!("Unknown session type {}", id)))?,
            ),
            None => None,
        };
        let duration = requested
            .or(session_type.map(|st| st.default_duration))
            .unwrap_or(DEFAULT_DURATION_MINUTES);
        if duration == 0 {
            return Err(AppError::Validation("Duration must be positive".to_string()));
        }
        Ok(duration)
    }

    pub async fn schedule_appointment(&mut self, draft: NewAppointment) -> AppResult<Appointment> {
        let actor = self.actor()?;
        let patient = self.patient(&draft.patient_id)?;
        let duration_minutes =
            self.resolve_duration(draft.session_type_id.as_deref(), draft.duration_minutes)?;
        let requested_therapist = draft
            .therapist_id
            .clone()
            .unwrap_or_else(|| patient.therapist_id.clone());

        let appointment = self
            .commit(&[Collection::Appointments], |data| {
                let appointment = Appointment {
                    id: new_id(),
                    patient_id: patient.id,
                    therapist_id: resolve_therapist(data, &actor, Some(requested_therapist.as_str()))?,
                    session_type_id: draft.session_type_id,
                    date: draft.date,
                    time: draft.time,
                    duration_minutes,
                    notes: draft.notes.trim().to_string(),
                    status: AppointmentStatus::Pending,
                };
                data.appointments.add(appointment.clone())?;
                Ok(appointment)
            })
            .await?;
        info!(
            appointment_id = %appointment.id,
            date = %appointment.date,
            "Appointment scheduled"
        );
        Ok(appointment)
    }

    pub async fn cancel_appointment(&mut self, appointment_id: &str) -> AppResult<Appointment> {
        self.visible_appointment(appointment_id)?;
        let cancelled = self
            .commit(&[Collection::Appointments], |data| {
                Ok(lifecycle::cancel_appointment(data, appointment_id)?)
            })
            .await?;
        info!(appointment_id, "Appointment cancelled");
        Ok(cancelled)
    }

    /// Removes an appointment outright, whatever its status.
    pub async fn delete_appointment(&mut self, appointment_id: &str) -> AppResult<Appointment> {
        self.visible_appointment(appointment_id)?;
        let removed = self
            .commit(&[Collection::Appointments], |data| {
                data.appointments
                    .remove(appointment_id)
                    .ok_or_else(|| AppError::NotFound(format!("Appointment {}", appointment_id)))
            })
            .await?;
        info!(appointment_id, "Appointment deleted");
        Ok(removed)
    }

    /// Converts a pending appointment into a completed session. The new
    /// session and the removal of the appointment are written in one batch.
    pub async fn convert_appointment(
        &mut self,
        appointment_id: &str,
        notes: SessionNotes,
    ) -> AppResult<Session> {
        notes.validate()?;
        self.visible_appointment(appointment_id)?;
        self.commit(&[Collection::Sessions, Collection::Appointments], |data| {
            Ok(lifecycle::convert_appointment(data, appointment_id, notes)?)
        })
        .await
    }

    //=====================================================================================
    // Sessions
    //=====================================================================================

    pub fn sessions(&self) -> AppResult<Vec<Session>> {
        let actor = self.actor()?;
        Ok(visibility::visible(self.data.sessions.list(), &actor))
    }

    fn visible_session(&self, session_id: &str) -> AppResult<Session> {
        let actor = self.actor()?;
        self.data
            .sessions
            .find(session_id)
            .filter(|s| can_access(*s, &actor))
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))
    }

    /// Registers a completed session that was never scheduled.
    pub async fn record_session(&mut self, draft: NewSession) -> AppResult<Session> {
        let actor = self.actor()?;
        draft.notes.validate()?;
        let patient = self.patient(&draft.patient_id)?;
        let duration_minutes =
            self.resolve_duration(draft.session_type_id.as_deref(), draft.duration_minutes)?;
        let requested_therapist = draft
            .therapist_id
            .clone()
            .unwrap_or_else(|| patient.therapist_id.clone());

        let session = self
            .commit(&[Collection::Sessions], |data| {
                let therapist_id = resolve_therapist(data, &actor, Some(requested_therapist.as_str()))?;
                Ok(lifecycle::record_session(
                    data,
                    SessionDraft {
                        patient_id: patient.id,
                        therapist_id,
                        session_type_id: draft.session_type_id,
                        date: draft.date,
                        start_time: draft.start_time,
                        duration_minutes,
                        notes: draft.notes,
                    },
                )?)
            })
            .await?;
        info!(session_id = %session.id, cost = session.cost, "Session recorded");
        Ok(session)
    }

    /// Edits the clinical notes of a session. Cost and payment never change.
    pub async fn update_session_notes(
        &mut self,
        session_id: &str,
        notes: SessionNotes,
    ) -> AppResult<Session> {
        self.visible_session(session_id)?;
        self.commit(&[Collection::Sessions], |data| {
            Ok(lifecycle::update_session_notes(data, session_id, notes)?)
        })
        .await
    }

    pub async fn delete_session(&mut self, session_id: &str) -> AppResult<Session> {
        self.visible_session(session_id)?;
        let removed = self
            .commit(&[Collection::Sessions], |data| {
                data.sessions
                    .remove(session_id)
                    .ok_or_else(|| AppError::NotFound(format!("Session {}", session_id)))
            })
            .await?;
        info!(session_id, "Session deleted");
        Ok(removed)
    }
}
