//! services/clinic/src/handlers/catalog.rs
//!
//! Session types, specialties, the waiting list and patient documents.

use chrono::{DateTime, Utc};
use clinic_core::data::{ClinicData, Collection};
use clinic_core::domain::new_id;
use clinic_core::visibility::{self, can_access};
use clinic_core::{PatientDocument, SessionType, Specialty, WaitingListEntry, WaitingPriority};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::handlers::patients::resolve_therapist;
use crate::state::AppState;

fn validate_session_type(data: &ClinicData, session_type: &SessionType) -> AppResult<()> {
    if session_type.name.trim().is_empty() {
        return Err(AppError::Validation("Session type name is required".to_string()));
    }
    if session_type.default_duration == 0 {
        return Err(AppError::Validation("Duration must be positive".to_string()));
    }
    if session_type.default_cost < 0.0 || !session_type.default_cost.is_finite() {
        return Err(AppError::Validation("Prices cannot be negative".to_string()));
    }
    if let Some(specialty_id) = &session_type.specialty_id {
        if !data.specialties.contains(specialty_id) {
            return Err(AppError::Validation(format!("Unknown specialty {}", specialty_id)));
        }
    }
    Ok(())
}

impl AppState {
    //=====================================================================================
    // Session types and specialties
    //=====================================================================================

    pub fn session_types(&self) -> AppResult<Vec<SessionType>> {
        self.actor()?;
        Ok(self.data.session_types.to_vec())
    }

    pub fn specialties(&self) -> AppResult<Vec<Specialty>> {
        self.actor()?;
        Ok(self.data.specialties.to_vec())
    }

    /// Inserts a session type, or replaces the one with the same id. An empty
    /// id gets a fresh one.
    pub async fn save_session_type(&mut self, mut session_type: SessionType) -> AppResult<SessionType> {
        self.require_admin()?;
        if session_type.id.trim().is_empty() {
            session_type.id = new_id();
        }
        let saved = self
            .commit(&[Collection::SessionTypes], |data| {
                validate_session_type(data, &session_type)?;
                if data.session_types.contains(&session_type.id) {
                    data.session_types.update(session_type.clone())?;
                } else {
                    data.session_types.add(session_type.clone())?;
                }
                Ok(session_type)
            })
            .await?;
        info!(session_type_id = %saved.id, "Session type saved");
        Ok(saved)
    }

    /// Deletes a session type. Sessions and appointments that reference it
    /// keep the id; pricing falls back to the patient's flat rate. Custom
    /// prices keyed by it are dropped.
    pub async fn delete_session_type(&mut self, session_type_id: &str) -> AppResult<SessionType> {
        self.require_admin()?;
        let removed = self
            .commit(&[Collection::SessionTypes, Collection::Patients], |data| {
                let removed = data
                    .session_types
                    .remove(session_type_id)
                    .ok_or_else(|| AppError::NotFound(format!("Session type {}", session_type_id)))?;
                let priced: Vec<_> = data
                    .patients
                    .iter()
                    .filter(|p| p.custom_prices.contains_key(session_type_id))
                    .cloned()
                    .collect();
                for mut patient in priced {
                    patient.custom_prices.remove(session_type_id);
                    data.patients.update(patient)?;
                }
                Ok(removed)
            })
            .await?;
        info!(session_type_id, "Session type deleted");
        Ok(removed)
    }

    pub async fn save_specialty(&mut self, mut specialty: Specialty) -> AppResult<Specialty> {
        self.require_admin()?;
        if specialty.name.trim().is_empty() {
            return Err(AppError::Validation("Specialty name is required".to_string()));
        }
        if specialty.id.trim().is_empty() {
            specialty.id = new_id();
        }
        let saved = self
            .commit(&[Collection::Specialties], |data| {
                if data.specialties.contains(&specialty.id) {
                    data.specialties.update(specialty.clone())?;
                } else {
                    data.specialties.add(specialty.clone())?;
                }
                Ok(specialty)
            })
            .await?;
        info!(specialty_id = %saved.id, "Specialty saved");
        Ok(saved)
    }

    /// Refused while a session type or a user still points at the specialty.
    pub async fn delete_specialty(&mut self, specialty_id: &str) -> AppResult<Specialty> {
        self.require_admin()?;
        let removed = self
            .commit(&[Collection::Specialties], |data| {
                let in_use = data
                    .session_types
                    .iter()
                    .any(|st| st.specialty_id.as_deref() == Some(specialty_id))
                    || data
                        .users
                        .iter()
                        .any(|u| u.specialty_id.as_deref() == Some(specialty_id));
                if in_use {
                    return Err(AppError::Conflict(format!(
                        "Specialty {} is still in use",
                        specialty_id
                    )));
                }
                data.specialties
                    .remove(specialty_id)
                    .ok_or_else(|| AppError::NotFound(format!("Specialty {}", specialty_id)))
            })
            .await?;
        info!(specialty_id, "Specialty deleted");
        Ok(removed)
    }

    //=====================================================================================
    // Waiting list
    //=====================================================================================

    /// Visible entries, highest priority first, then oldest first.
    pub fn waiting_list(&self) -> AppResult<Vec<WaitingListEntry>> {
        let actor = self.actor()?;
        let mut entries = visibility::visible(self.data.waiting_list.list(), &actor);
        entries.sort_by(|a, b| {
            priority_rank(b.priority)
                .cmp(&priority_rank(a.priority))
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(entries)
    }

    pub async fn add_to_waiting_list(
        &mut self,
        patient_id: &str,
        priority: WaitingPriority,
        notes: &str,
        now: DateTime<Utc>,
    ) -> AppResult<WaitingListEntry> {
        let actor = self.actor()?;
        let patient = self.patient(patient_id)?;
        let entry = self
            .commit(&[Collection::WaitingList], |data| {
                let entry = WaitingListEntry {
                    id: new_id(),
                    patient_id: patient.id,
                    therapist_id: resolve_therapist(data, &actor, Some(patient.therapist_id.as_str()))?,
                    priority,
                    notes: notes.trim().to_string(),
                    created_at: now,
                };
                data.waiting_list.add(entry.clone())?;
                Ok(entry)
            })
            .await?;
        info!(entry_id = %entry.id, patient_id, "Added to waiting list");
        Ok(entry)
    }

    pub async fn remove_from_waiting_list(&mut self, entry_id: &str) -> AppResult<WaitingListEntry> {
        let actor = self.actor()?;
        let visible = self
            .data
            .waiting_list
            .find(entry_id)
            .is_some_and(|e| can_access(e, &actor));
        if !visible {
            return Err(AppError::NotFound(format!("Waiting list entry {}", entry_id)));
        }
        self.commit(&[Collection::WaitingList], |data| {
            data.waiting_list
                .remove(entry_id)
                .ok_or_else(|| AppError::NotFound(format!("Waiting list entry {}", entry_id)))
        })
        .await
    }

    //=====================================================================================
    // Documents
    //=====================================================================================

    pub fn documents(&self, patient_id: &str) -> AppResult<Vec<PatientDocument>> {
        let actor = self.actor()?;
        self.patient(patient_id)?;
        Ok(visibility::visible(self.data.documents.list(), &actor)
            .into_iter()
            .filter(|d| d.patient_id == patient_id)
            .collect())
    }

    /// Records the metadata of a file attached to a patient's record.
    pub async fn attach_document(
        &mut self,
        patient_id: &str,
        title: &str,
        kind: &str,
        notes: &str,
        now: DateTime<Utc>,
    ) -> AppResult<PatientDocument> {
        let actor = self.actor()?;
        let patient = self.patient(patient_id)?;
        if title.trim().is_empty() {
            return Err(AppError::Validation("Document title is required".to_string()));
        }
        let document = self
            .commit(&[Collection::Documents], |data| {
                let document = PatientDocument {
                    id: new_id(),
                    patient_id: patient.id,
                    therapist_id: resolve_therapist(data, &actor, Some(patient.therapist_id.as_str()))?,
                    title: title.trim().to_string(),
                    kind: kind.trim().to_string(),
                    uploaded_at: now,
                    notes: notes.trim().to_string(),
                };
                data.documents.add(document.clone())?;
                Ok(document)
            })
            .await?;
        info!(document_id = %document.id, patient_id, "Document attached");
        Ok(document)
    }

    pub async fn remove_document(&mut self, document_id: &str) -> AppResult<PatientDocument> {
        let actor = self.actor()?;
        let visible = self
            .data
            .documents
            .find(document_id)
            .is_some_and(|d| can_access(d, &actor));
        if !visible {
            return Err(AppError::NotFound(format!("Document {}", document_id)));
        }
        self.commit(&[Collection::Documents], |data| {
            data.documents
                .remove(document_id)
                .ok_or_else(|| AppError::NotFound(format!("Document {}", document_id)))
        })
        .await
    }
}

fn priority_rank(priority: WaitingPriority) -> u8 {
    match priority {
        WaitingPriority::Low => 0,
        WaitingPriority::Normal => 1,
        WaitingPriority::High => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, hour, 0, 0).unwrap()
    }

    fn session_type(id: &str, specialty_id: Option<&str>) -> SessionType {
        SessionType {
            id: id.to_string(),
            name: "Terapia da Fala".to_string(),
            specialty_id: specialty_id.map(str::to_string),
            default_duration: 30,
            default_cost: 35.0,
            active: true,
        }
    }

    #[tokio::test]
    async fn only_admins_edit_the_catalog() {
        let mut state = as_matilde().await;
        assert!(matches!(
            state.save_session_type(session_type("", None)).await,
            Err(AppError::Forbidden(_))
        ));

        let mut state = as_admin().await;
        let saved = state.save_session_type(session_type("", Some("sp1"))).await.unwrap();
        assert!(!saved.id.is_empty());
        assert_eq!(state.session_types().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn specialties_in_use_cannot_be_deleted() {
        let mut state = as_admin().await;
        assert!(matches!(
            state.delete_specialty("sp1").await,
            Err(AppError::Conflict(_))
        ));
        let spare = state
            .save_specialty(Specialty {
                id: String::new(),
                name: "Psicomotricidade".to_string(),
                description: None,
            })
            .await
            .unwrap();
        state.delete_specialty(&spare.id).await.unwrap();
        assert_eq!(state.specialties().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_session_type_drops_custom_prices() {
        let mut state = as_admin().await;
        let mut patient = state.patient("p1").unwrap();
        patient.custom_prices.insert("st2".to_string(), 30.0);
        state.update_patient(patient).await.unwrap();

        state.delete_session_type("st2").await.unwrap();
        assert!(state.data().patients.find("p1").unwrap().custom_prices.is_empty());
        let s2 = state.data().sessions.find("s2").unwrap();
        assert_eq!(s2.session_type_id.as_deref(), Some("st2"));
        assert_eq!(s2.cost, 40.0);
    }

    #[tokio::test]
    async fn waiting_list_is_ordered_and_scoped() {
        let mut state = as_admin().await;
        state
            .add_to_waiting_list("p1", WaitingPriority::Normal, "", at(9))
            .await
            .unwrap();
        state
            .add_to_waiting_list("p2", WaitingPriority::High, "urgente", at(10))
            .await
            .unwrap();
        let order: Vec<_> = state
            .waiting_list()
            .unwrap()
            .into_iter()
            .map(|e| e.patient_id)
            .collect();
        assert_eq!(order, vec!["p2".to_string(), "p1".to_string()]);

        state.logout().await.unwrap();
        state.login("matilde@maisarticular.com", "user").await.unwrap();
        let mine = state.waiting_list().unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].therapist_id, "u2");
    }

    #[tokio::test]
    async fn therapist_waiting_list_and_documents_are_owned_by_them() {
        let mut state = as_matilde().await;
        let entry = state
            .add_to_waiting_list("p1", WaitingPriority::Low, "", at(8))
            .await
            .unwrap();
        assert_eq!(entry.therapist_id, "u2");
        let document = state
            .attach_document("p1", "Avaliação inicial", "pdf", "", at(8))
            .await
            .unwrap();
        assert_eq!(document.therapist_id, "u2");

        assert!(matches!(
            state.add_to_waiting_list("p2", WaitingPriority::High, "", at(9)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(state.data().waiting_list.iter().all(|e| e.therapist_id == "u2"));
    }

    #[tokio::test]
    async fn documents_follow_patient_ownership() {
        let mut state = as_matilde().await;
        let document = state
            .attach_document("p1", "Relatório escolar", "pdf", "", at(11))
            .await
            .unwrap();
        assert_eq!(state.documents("p1").unwrap().len(), 1);
        assert!(matches!(
            state.attach_document("p2", "Outro", "pdf", "", at(11)).await,
            Err(AppError::NotFound(_))
        ));

        state.remove_document(&document.id).await.unwrap();
        assert!(state.documents("p1").unwrap().is_empty());
    }
}
